//! Validated policy model
//!
//! These types come out of the loader already range-checked: shares are
//! positive, limits sit in [0, 100], tier names are unique, and locked
//! parameters are members of the allowed set.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Initialization parameters a tier's lockdown profile may restrict.
///
/// This is the full allowed set; anything else in a policy file is rejected
/// by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockedParameter {
    DbPerformanceProfile,
    MaxIops,
    MaxMbps,
    Sessions,
    PgaAggregateTarget,
    PgaAggregateLimit,
    SgaTarget,
    SgaMinSize,
    SharedPoolSize,
    DbCacheSize,
}

impl LockedParameter {
    /// All allowed parameters, in catalog order.
    pub const ALL: [Self; 10] = [
        Self::DbPerformanceProfile,
        Self::MaxIops,
        Self::MaxMbps,
        Self::Sessions,
        Self::PgaAggregateTarget,
        Self::PgaAggregateLimit,
        Self::SgaTarget,
        Self::SgaMinSize,
        Self::SharedPoolSize,
        Self::DbCacheSize,
    ];

    /// The parameter name as the database catalog spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DbPerformanceProfile => "DB_PERFORMANCE_PROFILE",
            Self::MaxIops => "MAX_IOPS",
            Self::MaxMbps => "MAX_MBPS",
            Self::Sessions => "SESSIONS",
            Self::PgaAggregateTarget => "PGA_AGGREGATE_TARGET",
            Self::PgaAggregateLimit => "PGA_AGGREGATE_LIMIT",
            Self::SgaTarget => "SGA_TARGET",
            Self::SgaMinSize => "SGA_MIN_SIZE",
            Self::SharedPoolSize => "SHARED_POOL_SIZE",
            Self::DbCacheSize => "DB_CACHE_SIZE",
        }
    }
}

impl fmt::Display for LockedParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockedParameter {
    type Err = ();

    /// Case-insensitive parse from the catalog spelling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        Self::ALL
            .iter()
            .find(|p| p.as_str() == upper)
            .copied()
            .ok_or(())
    }
}

/// Resource limits for one plan directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    /// Relative CPU weight under contention
    pub shares: u32,
    /// Percent of CPU this consumer may use (0-100)
    pub utilization_limit: u8,
    /// Percent of parallel execution servers before queueing (0-100)
    pub parallel_server_limit: u8,
}

/// Resource limits for the maintenance-task directive.
///
/// Autotask directives carry no parallel-server limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutotaskDirective {
    pub shares: u32,
    pub utilization_limit: u8,
}

/// One service tier: a named directive plus its lockdown rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier {
    /// Tier name, unique within the policy (e.g. "gold")
    pub name: String,
    pub shares: u32,
    pub utilization_limit: u8,
    pub parallel_server_limit: u8,
    /// Parameters the tier's lockdown profile restricts
    pub locked_parameters: Vec<LockedParameter>,
    /// Lockdown profile name, defaults to `<name>_profile`
    pub lockdown_profile: String,
    /// Statement the lockdown rules disallow, defaults to `ALTER SYSTEM`
    pub restricted_operation: String,
}

impl Tier {
    /// The plan directive this tier maps to.
    pub fn directive(&self) -> Directive {
        Directive {
            shares: self.shares,
            utilization_limit: self.utilization_limit,
            parallel_server_limit: self.parallel_server_limit,
        }
    }
}

/// A fully validated tier policy.
///
/// Tiers keep their declaration order from the policy file; ordering by
/// shares implies relative priority but is not stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// Resource plan name
    pub plan: String,
    /// Comment recorded on the plan in the catalog
    pub comment: String,
    /// Directive for PDBs that match no tier
    pub default_directive: Directive,
    /// Directive for maintenance tasks
    pub autotask_directive: AutotaskDirective,
    pub tiers: Vec<Tier>,
}

impl Policy {
    /// Find a tier by name.
    pub fn find_tier(&self, name: &str) -> Option<&Tier> {
        self.tiers.iter().find(|t| t.name == name)
    }

    /// Tiers that carry at least one locked parameter.
    pub fn lockdown_tiers(&self) -> impl Iterator<Item = &Tier> {
        self.tiers.iter().filter(|t| !t.locked_parameters.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_roundtrip() {
        for p in LockedParameter::ALL {
            assert_eq!(p.as_str().parse::<LockedParameter>().unwrap(), p);
        }
    }

    #[test]
    fn test_parameter_parse_case_insensitive() {
        assert_eq!(
            "max_iops".parse::<LockedParameter>().unwrap(),
            LockedParameter::MaxIops
        );
        assert_eq!(
            "Sga_Target".parse::<LockedParameter>().unwrap(),
            LockedParameter::SgaTarget
        );
    }

    #[test]
    fn test_parameter_parse_unknown() {
        assert!("CPU_COUNT".parse::<LockedParameter>().is_err());
        assert!("".parse::<LockedParameter>().is_err());
    }

    #[test]
    fn test_tier_directive() {
        let tier = Tier {
            name: "gold".into(),
            shares: 3,
            utilization_limit: 60,
            parallel_server_limit: 60,
            locked_parameters: vec![],
            lockdown_profile: "gold_profile".into(),
            restricted_operation: "ALTER SYSTEM".into(),
        };
        assert_eq!(
            tier.directive(),
            Directive {
                shares: 3,
                utilization_limit: 60,
                parallel_server_limit: 60,
            }
        );
    }
}
