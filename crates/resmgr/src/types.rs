//! Core types for control-plane operations

use policy::LockedParameter;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Catalog profile name the default PDB directive is stored under.
pub const DEFAULT_DIRECTIVE_PROFILE: &str = "ORA$DEFAULT_PDB_DIRECTIVE";

/// Catalog profile name the maintenance-task directive is stored under.
pub const AUTOTASK_DIRECTIVE_PROFILE: &str = "ORA$AUTOTASK";

/// One row of the plan catalog, as returned by the observability query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanInfo {
    pub name: String,
    /// Catalog status; `None` for a settled plan
    pub status: Option<String>,
    pub comment: String,
}

/// One directive row of a plan, as stored in the catalog.
///
/// The default and autotask directives appear under the
/// [`DEFAULT_DIRECTIVE_PROFILE`] and [`AUTOTASK_DIRECTIVE_PROFILE`]
/// profile names; autotask rows carry no parallel-server limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectiveRow {
    pub plan: String,
    pub profile: String,
    pub shares: u32,
    pub utilization_limit: u8,
    pub parallel_server_limit: Option<u8>,
}

/// One rule of a lockdown profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockdownRule {
    pub parameter: LockedParameter,
    /// Statement the rule disallows (e.g. `ALTER SYSTEM`)
    pub operation: String,
}

impl LockdownRule {
    pub fn new(parameter: LockedParameter, operation: impl Into<String>) -> Self {
        Self {
            parameter,
            operation: operation.into(),
        }
    }

    /// Rule name, stable per parameter within a profile.
    pub fn name(&self) -> String {
        format!("lock_{}", self.parameter.as_str().to_ascii_lowercase())
    }
}

/// What to do when a lockdown profile already exists.
///
/// The collision behavior is always chosen explicitly; there is no
/// implicit default inside the applier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExistingProfile {
    /// Fail with `ProfileExists`
    Error,
    /// Keep the profile, reconcile missing rules only
    #[default]
    Skip,
    /// Drop and recreate the profile with the declared rules
    Replace,
}

impl fmt::Display for ExistingProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Skip => write!(f, "skip"),
            Self::Replace => write!(f, "replace"),
        }
    }
}

/// Options for a plan application run.
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Don't issue any external call, just log what would happen
    pub dry_run: bool,
    /// Set the plan as the active resource-manager plan after submit
    pub activate: bool,
}

/// Phases of one plan application, strictly forward.
///
/// Any failure before [`ApplyPhase::Submitted`] discards the pending area;
/// there is no partial-commit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApplyPhase {
    Empty,
    PendingOpen,
    DirectivesStaged,
    Validated,
    Submitted,
    Active,
}

impl fmt::Display for ApplyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Empty => "empty",
            Self::PendingOpen => "pending-open",
            Self::DirectivesStaged => "directives-staged",
            Self::Validated => "validated",
            Self::Submitted => "submitted",
            Self::Active => "active",
        };
        f.write_str(s)
    }
}

/// Summary of a plan application run.
#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub plan: String,
    /// Furthest phase reached
    pub phase: ApplyPhase,
    /// Tier directives staged (excludes default/autotask)
    pub directives: usize,
    /// Whether the plan was made the active resource-manager plan
    pub activated: bool,
    pub dry_run: bool,
}

/// Options for a lockdown application run.
#[derive(Debug, Clone, Default)]
pub struct LockdownOptions {
    pub dry_run: bool,
    pub existing: ExistingProfile,
}

/// Summary of a lockdown application run.
#[derive(Debug, Clone, Default)]
pub struct LockdownReport {
    pub profiles_created: usize,
    pub profiles_replaced: usize,
    pub profiles_kept: usize,
    pub rules_added: usize,
    pub rules_kept: usize,
}

impl LockdownReport {
    /// Total number of profiles touched.
    pub fn profiles(&self) -> usize {
        self.profiles_created + self.profiles_replaced + self.profiles_kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_name() {
        let rule = LockdownRule::new(LockedParameter::MaxIops, "ALTER SYSTEM");
        assert_eq!(rule.name(), "lock_max_iops");
    }

    #[test]
    fn test_phase_ordering() {
        assert!(ApplyPhase::Empty < ApplyPhase::PendingOpen);
        assert!(ApplyPhase::Validated < ApplyPhase::Submitted);
        assert!(ApplyPhase::Submitted < ApplyPhase::Active);
    }

    #[test]
    fn test_existing_profile_default_is_skip() {
        assert_eq!(ExistingProfile::default(), ExistingProfile::Skip);
    }
}
