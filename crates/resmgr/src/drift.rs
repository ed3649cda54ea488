//! Drift computation - desired policy vs catalog state.
//!
//! Read-only: queries the control plane and compares against the policy
//! without touching anything. The CLI renders the result as a diff.

use crate::backend::ControlPlane;
use crate::error::{Error, Result};
use crate::types::{
    AUTOTASK_DIRECTIVE_PROFILE, DEFAULT_DIRECTIVE_PROFILE, DirectiveRow, LockdownRule,
};
use policy::{LockedParameter, Policy};

/// A directive present in both places with different values.
#[derive(Debug, Clone)]
pub struct DirectiveMismatch {
    pub profile: String,
    pub current: DirectiveRow,
    pub desired: DirectiveRow,
}

/// Everything that differs between the policy and the catalog.
#[derive(Debug, Clone, Default)]
pub struct DriftReport {
    /// The plan itself is absent from the catalog
    pub plan_missing: bool,
    /// Desired directives absent from the catalog
    pub missing: Vec<DirectiveRow>,
    /// Directives whose values differ
    pub mismatched: Vec<DirectiveMismatch>,
    /// Catalog directives no tier declares
    pub extra: Vec<DirectiveRow>,
    /// Lockdown profiles that do not exist yet
    pub missing_profiles: Vec<String>,
    /// Declared rules absent from an existing profile
    pub missing_rules: Vec<(String, LockedParameter)>,
}

impl DriftReport {
    pub fn has_drift(&self) -> bool {
        self.plan_missing
            || !self.missing.is_empty()
            || !self.mismatched.is_empty()
            || !self.extra.is_empty()
            || !self.missing_profiles.is_empty()
            || !self.missing_rules.is_empty()
    }
}

/// The directive rows a policy wants in the catalog.
pub fn desired_rows(policy: &Policy) -> Vec<DirectiveRow> {
    let mut rows: Vec<DirectiveRow> = policy
        .tiers
        .iter()
        .map(|tier| DirectiveRow {
            plan: policy.plan.clone(),
            profile: tier.name.clone(),
            shares: tier.shares,
            utilization_limit: tier.utilization_limit,
            parallel_server_limit: Some(tier.parallel_server_limit),
        })
        .collect();
    rows.push(DirectiveRow {
        plan: policy.plan.clone(),
        profile: DEFAULT_DIRECTIVE_PROFILE.to_string(),
        shares: policy.default_directive.shares,
        utilization_limit: policy.default_directive.utilization_limit,
        parallel_server_limit: Some(policy.default_directive.parallel_server_limit),
    });
    rows.push(DirectiveRow {
        plan: policy.plan.clone(),
        profile: AUTOTASK_DIRECTIVE_PROFILE.to_string(),
        shares: policy.autotask_directive.shares,
        utilization_limit: policy.autotask_directive.utilization_limit,
        parallel_server_limit: None,
    });
    rows
}

/// Compare the policy against the live catalog.
pub fn compute_drift<C: ControlPlane + ?Sized>(
    plane: &mut C,
    policy: &Policy,
) -> Result<DriftReport> {
    let mut report = DriftReport::default();

    let current = match plane.plan_directives(&policy.plan) {
        Ok(rows) => rows,
        Err(Error::MissingPlan { .. }) => {
            report.plan_missing = true;
            report.missing = desired_rows(policy);
            lockdown_drift(plane, policy, &mut report)?;
            return Ok(report);
        }
        Err(e) => return Err(e),
    };

    for desired in desired_rows(policy) {
        match current.iter().find(|r| r.profile == desired.profile) {
            None => report.missing.push(desired),
            Some(row)
                if row.shares != desired.shares
                    || row.utilization_limit != desired.utilization_limit
                    || row.parallel_server_limit != desired.parallel_server_limit =>
            {
                report.mismatched.push(DirectiveMismatch {
                    profile: desired.profile.clone(),
                    current: row.clone(),
                    desired,
                });
            }
            Some(_) => {}
        }
    }

    let desired = desired_rows(policy);
    report.extra = current
        .into_iter()
        .filter(|row| !desired.iter().any(|d| d.profile == row.profile))
        .collect();

    lockdown_drift(plane, policy, &mut report)?;
    Ok(report)
}

fn lockdown_drift<C: ControlPlane + ?Sized>(
    plane: &mut C,
    policy: &Policy,
    report: &mut DriftReport,
) -> Result<()> {
    for tier in policy.lockdown_tiers() {
        let profile = tier.lockdown_profile.as_str();
        if !plane.profile_exists(profile)? {
            report.missing_profiles.push(profile.to_string());
            continue;
        }
        let rules: Vec<LockdownRule> = plane.profile_rules(profile)?;
        for param in &tier.locked_parameters {
            if !rules.iter().any(|r| r.parameter == *param) {
                report.missing_rules.push((profile.to_string(), *param));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::{NoObserver, apply_plan};
    use crate::backend::memory::MemoryControlPlane;
    use crate::lockdown::apply_lockdown;
    use crate::retry::RetryConfig;
    use crate::types::{ApplyOptions, LockdownOptions};

    fn fixture() -> Policy {
        policy::from_str(
            r#"
[plan]
name = "newcdb_plan"

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
locked_parameters = ["MAX_IOPS"]
"#,
        )
        .expect("valid fixture")
    }

    #[test]
    fn test_everything_missing_before_apply() {
        let mut cp = MemoryControlPlane::new();
        let report = compute_drift(&mut cp, &fixture()).unwrap();

        assert!(report.plan_missing);
        assert_eq!(report.missing.len(), 3);
        assert_eq!(report.missing_profiles, vec!["gold_profile".to_string()]);
        assert!(report.has_drift());
    }

    #[test]
    fn test_no_drift_after_full_apply() {
        let mut cp = MemoryControlPlane::new();
        let policy = fixture();
        apply_plan(
            &mut cp,
            &policy,
            &ApplyOptions::default(),
            &RetryConfig::no_retry(),
            &mut NoObserver,
        )
        .unwrap();
        apply_lockdown(&mut cp, &policy, &LockdownOptions::default(), &mut NoObserver).unwrap();

        let report = compute_drift(&mut cp, &policy).unwrap();
        assert!(!report.has_drift());
    }

    #[test]
    fn test_mismatch_detected_after_policy_change() {
        let mut cp = MemoryControlPlane::new();
        let mut policy = fixture();
        apply_plan(
            &mut cp,
            &policy,
            &ApplyOptions::default(),
            &RetryConfig::no_retry(),
            &mut NoObserver,
        )
        .unwrap();

        policy.tiers[0].shares = 5;
        let report = compute_drift(&mut cp, &policy).unwrap();
        assert_eq!(report.mismatched.len(), 1);
        assert_eq!(report.mismatched[0].profile, "gold");
        assert_eq!(report.mismatched[0].desired.shares, 5);
        assert_eq!(report.mismatched[0].current.shares, 3);
    }

    #[test]
    fn test_extra_directive_reported() {
        let mut cp = MemoryControlPlane::new();
        let mut policy = fixture();
        apply_plan(
            &mut cp,
            &policy,
            &ApplyOptions::default(),
            &RetryConfig::no_retry(),
            &mut NoObserver,
        )
        .unwrap();

        // Drop the tier from the policy; its catalog row becomes drift
        policy.tiers.clear();
        let report = compute_drift(&mut cp, &policy).unwrap();
        assert_eq!(report.extra.len(), 1);
        assert_eq!(report.extra[0].profile, "gold");
    }

    #[test]
    fn test_missing_rule_reported() {
        let mut cp = MemoryControlPlane::new();
        let policy = fixture();
        apply_plan(
            &mut cp,
            &policy,
            &ApplyOptions::default(),
            &RetryConfig::no_retry(),
            &mut NoObserver,
        )
        .unwrap();
        apply_lockdown(&mut cp, &policy, &LockdownOptions::default(), &mut NoObserver).unwrap();

        let mut extended = policy.clone();
        extended.tiers[0]
            .locked_parameters
            .push(LockedParameter::SgaTarget);
        let report = compute_drift(&mut cp, &extended).unwrap();
        assert_eq!(
            report.missing_rules,
            vec![("gold_profile".to_string(), LockedParameter::SgaTarget)]
        );
    }
}
