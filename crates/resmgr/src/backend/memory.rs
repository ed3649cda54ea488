//! In-memory fake control plane.
//!
//! Implements the full capability surface with real pending-area
//! semantics: staged changes become visible in the catalog only on
//! submit, and a clear discards them. Failure injection hooks let tests
//! exercise validation rejections, submit failures, and transient
//! outages without a database.

use std::collections::BTreeMap;

use crate::backend::{ActivePlanControl, LockdownCatalog, PendingArea, PlanCatalog};
use crate::error::{Error, Result};
use crate::types::{
    AUTOTASK_DIRECTIVE_PROFILE, DEFAULT_DIRECTIVE_PROFILE, DirectiveRow, LockdownRule, PlanInfo,
};
use policy::{AutotaskDirective, Directive};

#[derive(Debug, Clone, Default)]
struct StoredPlan {
    comment: String,
    directives: Vec<DirectiveRow>,
}

/// An in-memory control plane for tests and dry development.
#[derive(Debug, Default)]
pub struct MemoryControlPlane {
    /// Staged copy of the catalog while a pending area is open
    pending: Option<BTreeMap<String, StoredPlan>>,
    plans: BTreeMap<String, StoredPlan>,
    active: Option<String>,
    profiles: BTreeMap<String, Vec<LockdownRule>>,

    fail_validate: Option<String>,
    fail_submit: Option<String>,
    fail_directive_profile: Option<String>,
    unavailable_validates: u32,
}

impl MemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next validate fail with `PlanValidation` carrying `message`.
    pub fn fail_next_validate(&mut self, message: &str) {
        self.fail_validate = Some(message.to_string());
    }

    /// Make the next submit fail with `Submit` carrying `message`.
    pub fn fail_next_submit(&mut self, message: &str) {
        self.fail_submit = Some(message.to_string());
    }

    /// Make staging a directive for `profile` fail.
    pub fn fail_directive_for(&mut self, profile: &str) {
        self.fail_directive_profile = Some(profile.to_string());
    }

    /// Make the next `n` validates fail with a transient `Unavailable`.
    pub fn unavailable_validates(&mut self, n: u32) {
        self.unavailable_validates = n;
    }

    /// Whether a pending area is currently open.
    pub fn pending_open(&self) -> bool {
        self.pending.is_some()
    }

    fn staged(&mut self) -> Result<&mut BTreeMap<String, StoredPlan>> {
        self.pending.as_mut().ok_or(Error::PendingAreaNotOpen)
    }

    fn upsert_row(stored: &mut StoredPlan, row: DirectiveRow) {
        if let Some(existing) = stored
            .directives
            .iter_mut()
            .find(|d| d.profile == row.profile)
        {
            *existing = row;
        } else {
            stored.directives.push(row);
        }
    }
}

impl PendingArea for MemoryControlPlane {
    fn open_pending_area(&mut self) -> Result<()> {
        if self.pending.is_some() {
            return Err(Error::PendingAreaOpen);
        }
        self.pending = Some(self.plans.clone());
        Ok(())
    }

    fn clear_pending_area(&mut self) -> Result<()> {
        if self.pending.take().is_none() {
            return Err(Error::PendingAreaNotOpen);
        }
        Ok(())
    }

    fn validate_pending_area(&mut self) -> Result<()> {
        if self.pending.is_none() {
            return Err(Error::PendingAreaNotOpen);
        }
        if self.unavailable_validates > 0 {
            self.unavailable_validates -= 1;
            return Err(Error::Unavailable {
                message: "injected outage".into(),
            });
        }
        if let Some(message) = self.fail_validate.take() {
            return Err(Error::PlanValidation {
                plan: String::new(),
                message,
            });
        }
        Ok(())
    }

    fn submit_pending_area(&mut self) -> Result<()> {
        if self.pending.is_none() {
            return Err(Error::PendingAreaNotOpen);
        }
        if let Some(message) = self.fail_submit.take() {
            // The area stays open; the caller is responsible for clearing it.
            return Err(Error::Submit {
                plan: String::new(),
                message,
            });
        }
        self.plans = self.pending.take().expect("checked above");
        Ok(())
    }
}

impl PlanCatalog for MemoryControlPlane {
    fn create_plan(&mut self, plan: &str, comment: &str) -> Result<()> {
        let staged = self.staged()?;
        staged
            .entry(plan.to_string())
            .or_default()
            .comment = comment.to_string();
        Ok(())
    }

    fn upsert_profile_directive(
        &mut self,
        plan: &str,
        profile: &str,
        directive: &Directive,
    ) -> Result<()> {
        if self
            .fail_directive_profile
            .as_deref()
            .is_some_and(|p| p == profile)
        {
            return Err(Error::CommandFailed {
                call: format!("upsert_profile_directive {plan}/{profile}"),
                message: "injected failure".into(),
            });
        }
        let row = DirectiveRow {
            plan: plan.to_string(),
            profile: profile.to_string(),
            shares: directive.shares,
            utilization_limit: directive.utilization_limit,
            parallel_server_limit: Some(directive.parallel_server_limit),
        };
        let staged = self.staged()?;
        let stored = staged.get_mut(plan).ok_or_else(|| Error::MissingPlan {
            plan: plan.to_string(),
        })?;
        Self::upsert_row(stored, row);
        Ok(())
    }

    fn update_default_directive(&mut self, plan: &str, directive: &Directive) -> Result<()> {
        let row = DirectiveRow {
            plan: plan.to_string(),
            profile: DEFAULT_DIRECTIVE_PROFILE.to_string(),
            shares: directive.shares,
            utilization_limit: directive.utilization_limit,
            parallel_server_limit: Some(directive.parallel_server_limit),
        };
        let staged = self.staged()?;
        let stored = staged.get_mut(plan).ok_or_else(|| Error::MissingPlan {
            plan: plan.to_string(),
        })?;
        Self::upsert_row(stored, row);
        Ok(())
    }

    fn update_autotask_directive(
        &mut self,
        plan: &str,
        directive: &AutotaskDirective,
    ) -> Result<()> {
        let row = DirectiveRow {
            plan: plan.to_string(),
            profile: AUTOTASK_DIRECTIVE_PROFILE.to_string(),
            shares: directive.shares,
            utilization_limit: directive.utilization_limit,
            parallel_server_limit: None,
        };
        let staged = self.staged()?;
        let stored = staged.get_mut(plan).ok_or_else(|| Error::MissingPlan {
            plan: plan.to_string(),
        })?;
        Self::upsert_row(stored, row);
        Ok(())
    }

    fn list_plans(&mut self) -> Result<Vec<PlanInfo>> {
        Ok(self
            .plans
            .iter()
            .map(|(name, stored)| PlanInfo {
                name: name.clone(),
                status: None,
                comment: stored.comment.clone(),
            })
            .collect())
    }

    fn plan_directives(&mut self, plan: &str) -> Result<Vec<DirectiveRow>> {
        let stored = self.plans.get(plan).ok_or_else(|| Error::MissingPlan {
            plan: plan.to_string(),
        })?;
        Ok(stored.directives.clone())
    }
}

impl ActivePlanControl for MemoryControlPlane {
    fn set_active_plan(&mut self, plan: &str) -> Result<()> {
        if !self.plans.contains_key(plan) {
            return Err(Error::MissingPlan {
                plan: plan.to_string(),
            });
        }
        self.active = Some(plan.to_string());
        Ok(())
    }

    fn active_plan(&mut self) -> Result<Option<String>> {
        Ok(self.active.clone())
    }
}

impl LockdownCatalog for MemoryControlPlane {
    fn create_profile(&mut self, profile: &str) -> Result<()> {
        if self.profiles.contains_key(profile) {
            return Err(Error::ProfileExists {
                profile: profile.to_string(),
            });
        }
        self.profiles.insert(profile.to_string(), Vec::new());
        Ok(())
    }

    fn drop_profile(&mut self, profile: &str) -> Result<()> {
        if self.profiles.remove(profile).is_none() {
            return Err(Error::MissingProfile {
                profile: profile.to_string(),
            });
        }
        Ok(())
    }

    fn profile_exists(&mut self, profile: &str) -> Result<bool> {
        Ok(self.profiles.contains_key(profile))
    }

    fn add_rule(&mut self, profile: &str, rule: &LockdownRule) -> Result<()> {
        let rules = self
            .profiles
            .get_mut(profile)
            .ok_or_else(|| Error::MissingProfile {
                profile: profile.to_string(),
            })?;
        if rules.iter().any(|r| r.parameter == rule.parameter) {
            return Err(Error::DuplicateRule {
                profile: profile.to_string(),
                parameter: rule.parameter.to_string(),
            });
        }
        rules.push(rule.clone());
        Ok(())
    }

    fn profile_rules(&mut self, profile: &str) -> Result<Vec<LockdownRule>> {
        let rules = self
            .profiles
            .get(profile)
            .ok_or_else(|| Error::MissingProfile {
                profile: profile.to_string(),
            })?;
        Ok(rules.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy::LockedParameter;

    fn gold() -> Directive {
        Directive {
            shares: 3,
            utilization_limit: 60,
            parallel_server_limit: 60,
        }
    }

    #[test]
    fn test_staging_requires_open_pending_area() {
        let mut cp = MemoryControlPlane::new();
        let err = cp.create_plan("p1", "").unwrap_err();
        assert!(matches!(err, Error::PendingAreaNotOpen));
    }

    #[test]
    fn test_double_open_fails() {
        let mut cp = MemoryControlPlane::new();
        cp.open_pending_area().unwrap();
        assert!(matches!(
            cp.open_pending_area().unwrap_err(),
            Error::PendingAreaOpen
        ));
    }

    #[test]
    fn test_submit_makes_staged_visible() {
        let mut cp = MemoryControlPlane::new();
        cp.open_pending_area().unwrap();
        cp.create_plan("p1", "test plan").unwrap();
        cp.upsert_profile_directive("p1", "gold", &gold()).unwrap();

        // Not visible before submit
        assert!(cp.list_plans().unwrap().is_empty());

        cp.submit_pending_area().unwrap();
        let plans = cp.list_plans().unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].comment, "test plan");
        assert_eq!(cp.plan_directives("p1").unwrap().len(), 1);
    }

    #[test]
    fn test_clear_discards_staged() {
        let mut cp = MemoryControlPlane::new();
        cp.open_pending_area().unwrap();
        cp.create_plan("p1", "").unwrap();
        cp.clear_pending_area().unwrap();

        assert!(cp.list_plans().unwrap().is_empty());
        assert!(!cp.pending_open());
    }

    #[test]
    fn test_upsert_replaces_existing_directive() {
        let mut cp = MemoryControlPlane::new();
        cp.open_pending_area().unwrap();
        cp.create_plan("p1", "").unwrap();
        cp.upsert_profile_directive("p1", "gold", &gold()).unwrap();
        cp.upsert_profile_directive(
            "p1",
            "gold",
            &Directive {
                shares: 5,
                utilization_limit: 80,
                parallel_server_limit: 80,
            },
        )
        .unwrap();
        cp.submit_pending_area().unwrap();

        let rows = cp.plan_directives("p1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].shares, 5);
    }

    #[test]
    fn test_set_active_plan_requires_submitted_plan() {
        let mut cp = MemoryControlPlane::new();
        assert!(matches!(
            cp.set_active_plan("nope").unwrap_err(),
            Error::MissingPlan { .. }
        ));
    }

    #[test]
    fn test_duplicate_rule_rejected() {
        let mut cp = MemoryControlPlane::new();
        cp.create_profile("gold_profile").unwrap();
        let rule = LockdownRule::new(LockedParameter::MaxIops, "ALTER SYSTEM");
        cp.add_rule("gold_profile", &rule).unwrap();

        let err = cp.add_rule("gold_profile", &rule).unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateRule { ref profile, ref parameter }
                if profile == "gold_profile" && parameter == "MAX_IOPS"
        ));
    }

    #[test]
    fn test_profile_lifecycle() {
        let mut cp = MemoryControlPlane::new();
        assert!(!cp.profile_exists("gold_profile").unwrap());
        cp.create_profile("gold_profile").unwrap();
        assert!(cp.profile_exists("gold_profile").unwrap());
        assert!(matches!(
            cp.create_profile("gold_profile").unwrap_err(),
            Error::ProfileExists { .. }
        ));
        cp.drop_profile("gold_profile").unwrap();
        assert!(!cp.profile_exists("gold_profile").unwrap());
    }
}
