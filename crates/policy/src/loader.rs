//! Policy file loading and validation
//!
//! The on-disk schema is deliberately looser than [`Policy`]: numeric fields
//! parse as `i64` so that out-of-range values (negative shares, limits over
//! 100) surface as validation errors naming the tier, not as opaque TOML
//! type errors. Tiers are an array of tables so declaration order survives
//! and duplicate names reach our validator.

use crate::error::{Error, Result};
use crate::types::{AutotaskDirective, Directive, LockedParameter, Policy, Tier};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const DEFAULT_PLAN_NAME: &str = "newcdb_plan";
const DEFAULT_RESTRICTED_OPERATION: &str = "ALTER SYSTEM";

// ============================================================================
// Raw schema (serde)
// ============================================================================

#[derive(Debug, Deserialize)]
struct PolicyDoc {
    plan: PlanSection,
    #[serde(default)]
    tiers: Vec<TierSection>,
}

#[derive(Debug, Deserialize)]
struct PlanSection {
    #[serde(default = "default_plan_name")]
    name: String,
    #[serde(default)]
    comment: String,
    default_directive: RawDirective,
    autotask_directive: RawAutotask,
}

#[derive(Debug, Deserialize)]
struct RawDirective {
    shares: i64,
    utilization_limit: i64,
    parallel_server_limit: i64,
}

#[derive(Debug, Deserialize)]
struct RawAutotask {
    shares: i64,
    utilization_limit: i64,
}

#[derive(Debug, Deserialize)]
struct TierSection {
    name: String,
    shares: i64,
    utilization_limit: i64,
    parallel_server_limit: i64,
    #[serde(default)]
    locked_parameters: Vec<String>,
    #[serde(default)]
    lockdown_profile: Option<String>,
    #[serde(default)]
    restricted_operation: Option<String>,
}

fn default_plan_name() -> String {
    DEFAULT_PLAN_NAME.to_string()
}

// ============================================================================
// Loading
// ============================================================================

/// Load and validate a policy from a TOML file.
///
/// The path may contain a leading tilde.
pub fn load(path: &Path) -> Result<Policy> {
    let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
    let expanded = PathBuf::from(expanded);

    let content = std::fs::read_to_string(&expanded).map_err(|source| Error::Read {
        path: expanded.clone(),
        source,
    })?;

    from_str(&content).map_err(|e| match e {
        // Attach the file path to parse errors; validation errors already
        // name the tier and field.
        Error::Parse { source, .. } => Error::Parse {
            path: expanded.clone(),
            source,
        },
        other => other,
    })
}

/// Parse and validate a policy from TOML text.
pub fn from_str(content: &str) -> Result<Policy> {
    let doc: PolicyDoc = toml::from_str(content).map_err(|source| Error::Parse {
        path: PathBuf::from("<inline>"),
        source: Box::new(source),
    })?;
    validate(doc)
}

// ============================================================================
// Validation
// ============================================================================

fn validate(doc: PolicyDoc) -> Result<Policy> {
    let plan = doc.plan.name.trim().to_string();
    if plan.is_empty() {
        return Err(Error::EmptyPlanName);
    }

    let default_directive = check_directive("default directive", &doc.plan.default_directive)?;
    let autotask_directive = check_autotask("autotask directive", &doc.plan.autotask_directive)?;

    let mut seen = HashSet::new();
    let mut tiers = Vec::with_capacity(doc.tiers.len());
    for raw in doc.tiers {
        let tier = check_tier(raw)?;
        if !seen.insert(tier.name.clone()) {
            return Err(Error::DuplicateTier { name: tier.name });
        }
        tiers.push(tier);
    }

    Ok(Policy {
        plan,
        comment: doc.plan.comment,
        default_directive,
        autotask_directive,
        tiers,
    })
}

fn check_tier(raw: TierSection) -> Result<Tier> {
    let name = raw.name.trim().to_string();
    if name.is_empty() {
        return Err(Error::EmptyTierName);
    }

    let scope = format!("tier {name}");
    check_shares(&scope, raw.shares)?;
    check_limit(&scope, "utilization_limit", raw.utilization_limit)?;
    check_limit(&scope, "parallel_server_limit", raw.parallel_server_limit)?;

    let mut locked = Vec::with_capacity(raw.locked_parameters.len());
    for param in &raw.locked_parameters {
        let parsed: LockedParameter =
            param.parse().map_err(|()| Error::UnknownParameter {
                tier: name.clone(),
                parameter: param.clone(),
            })?;
        if locked.contains(&parsed) {
            return Err(Error::DuplicateParameter {
                tier: name.clone(),
                parameter: parsed.to_string(),
            });
        }
        locked.push(parsed);
    }

    let lockdown_profile = raw
        .lockdown_profile
        .unwrap_or_else(|| format!("{name}_profile"));

    Ok(Tier {
        shares: raw.shares as u32,
        utilization_limit: raw.utilization_limit as u8,
        parallel_server_limit: raw.parallel_server_limit as u8,
        locked_parameters: locked,
        lockdown_profile,
        restricted_operation: raw
            .restricted_operation
            .unwrap_or_else(|| DEFAULT_RESTRICTED_OPERATION.to_string()),
        name,
    })
}

fn check_directive(scope: &str, raw: &RawDirective) -> Result<Directive> {
    check_shares(scope, raw.shares)?;
    check_limit(scope, "utilization_limit", raw.utilization_limit)?;
    check_limit(scope, "parallel_server_limit", raw.parallel_server_limit)?;
    Ok(Directive {
        shares: raw.shares as u32,
        utilization_limit: raw.utilization_limit as u8,
        parallel_server_limit: raw.parallel_server_limit as u8,
    })
}

fn check_autotask(scope: &str, raw: &RawAutotask) -> Result<AutotaskDirective> {
    check_shares(scope, raw.shares)?;
    check_limit(scope, "utilization_limit", raw.utilization_limit)?;
    Ok(AutotaskDirective {
        shares: raw.shares as u32,
        utilization_limit: raw.utilization_limit as u8,
    })
}

fn check_shares(scope: &str, shares: i64) -> Result<()> {
    if shares <= 0 {
        return Err(Error::InvalidShares {
            scope: scope.to_string(),
            shares,
        });
    }
    Ok(())
}

fn check_limit(scope: &str, field: &'static str, value: i64) -> Result<()> {
    if !(0..=100).contains(&value) {
        return Err(Error::LimitOutOfRange {
            scope: scope.to_string(),
            field,
            value,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const GOLD_SILVER_BRONZE: &str = r#"
[plan]
name = "newcdb_plan"
comment = "Tiered CDB plan"

[plan.default_directive]
shares = 1
utilization_limit = 10
parallel_server_limit = 10

[plan.autotask_directive]
shares = 2
utilization_limit = 60

[[tiers]]
name = "gold"
shares = 3
utilization_limit = 60
parallel_server_limit = 60
locked_parameters = ["DB_PERFORMANCE_PROFILE", "MAX_IOPS", "MAX_MBPS"]

[[tiers]]
name = "silver"
shares = 2
utilization_limit = 30
parallel_server_limit = 30
locked_parameters = ["SGA_TARGET", "PGA_AGGREGATE_TARGET"]

[[tiers]]
name = "bronze"
shares = 1
utilization_limit = 10
parallel_server_limit = 10
"#;

    #[test]
    fn test_parse_example_policy() {
        let policy = from_str(GOLD_SILVER_BRONZE).expect("valid policy");

        assert_eq!(policy.plan, "newcdb_plan");
        assert_eq!(policy.tiers.len(), 3);

        let gold = policy.find_tier("gold").unwrap();
        assert_eq!(gold.shares, 3);
        assert_eq!(gold.utilization_limit, 60);
        assert_eq!(gold.locked_parameters.len(), 3);
        assert_eq!(gold.lockdown_profile, "gold_profile");
        assert_eq!(gold.restricted_operation, "ALTER SYSTEM");

        // Declaration order is preserved
        let names: Vec<_> = policy.tiers.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["gold", "silver", "bronze"]);

        assert_eq!(policy.default_directive.shares, 1);
        assert_eq!(policy.default_directive.utilization_limit, 10);
        assert_eq!(policy.autotask_directive.shares, 2);
        assert_eq!(policy.autotask_directive.utilization_limit, 60);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(GOLD_SILVER_BRONZE.as_bytes()).unwrap();

        let policy = load(file.path()).expect("valid policy file");
        assert_eq!(policy.tiers.len(), 3);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load(Path::new("/nonexistent/tiers.toml")).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }

    #[test]
    fn test_rejects_zero_shares() {
        let toml = GOLD_SILVER_BRONZE.replace("name = \"bronze\"\nshares = 1", "name = \"bronze\"\nshares = 0");
        let err = from_str(&toml).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidShares { ref scope, shares: 0 } if scope == "tier bronze"
        ));
    }

    #[test]
    fn test_rejects_negative_shares() {
        let toml = GOLD_SILVER_BRONZE.replace("name = \"gold\"\nshares = 3", "name = \"gold\"\nshares = -2");
        let err = from_str(&toml).unwrap_err();
        assert!(matches!(err, Error::InvalidShares { shares: -2, .. }));
    }

    #[test]
    fn test_rejects_limit_over_100() {
        let toml = GOLD_SILVER_BRONZE.replace("utilization_limit = 30", "utilization_limit = 130");
        let err = from_str(&toml).unwrap_err();
        assert!(matches!(
            err,
            Error::LimitOutOfRange {
                field: "utilization_limit",
                value: 130,
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_duplicate_tier() {
        let toml = format!(
            "{GOLD_SILVER_BRONZE}\n[[tiers]]\nname = \"gold\"\nshares = 5\nutilization_limit = 50\nparallel_server_limit = 50\n"
        );
        let err = from_str(&toml).unwrap_err();
        assert!(matches!(err, Error::DuplicateTier { ref name } if name == "gold"));
    }

    #[test]
    fn test_rejects_unknown_parameter() {
        let toml = GOLD_SILVER_BRONZE.replace("\"MAX_MBPS\"", "\"CPU_COUNT\"");
        let err = from_str(&toml).unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownParameter { ref tier, ref parameter }
                if tier == "gold" && parameter == "CPU_COUNT"
        ));
    }

    #[test]
    fn test_rejects_duplicate_parameter() {
        let toml = GOLD_SILVER_BRONZE.replace("\"MAX_MBPS\"", "\"MAX_IOPS\"");
        let err = from_str(&toml).unwrap_err();
        assert!(matches!(err, Error::DuplicateParameter { .. }));
    }

    #[test]
    fn test_rejects_invalid_default_directive() {
        let toml = GOLD_SILVER_BRONZE.replace(
            "[plan.default_directive]\nshares = 1",
            "[plan.default_directive]\nshares = 0",
        );
        let err = from_str(&toml).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidShares { ref scope, .. } if scope == "default directive"
        ));
    }

    #[test]
    fn test_plan_name_defaults() {
        let toml = GOLD_SILVER_BRONZE.replace("name = \"newcdb_plan\"\n", "");
        let policy = from_str(&toml).expect("valid policy");
        assert_eq!(policy.plan, "newcdb_plan");
    }

    #[test]
    fn test_custom_lockdown_profile_name() {
        let toml = GOLD_SILVER_BRONZE.replace(
            "name = \"gold\"",
            "name = \"gold\"\nlockdown_profile = \"gold_lock\"",
        );
        let policy = from_str(&toml).expect("valid policy");
        assert_eq!(policy.find_tier("gold").unwrap().lockdown_profile, "gold_lock");
    }
}
