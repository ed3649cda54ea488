//! Control-plane capability traits.
//!
//! The external resource manager is modeled as four capability groups.
//! [`ControlPlane`] glues them together for code that needs the whole
//! surface. Backends:
//! - [`sqlplus::SqlplusBackend`] shells out to the vendor CLI
//! - [`memory::MemoryControlPlane`] is an in-memory fake with real
//!   pending-area transactional semantics, for tests
//!
//! Every call takes `&mut self`: a caller owns the control plane
//! exclusively for the duration of a session, which is how the external
//! system serializes pending-area access. Reads are `&mut` too because a
//! real backend multiplexes them over the same session handle.

use crate::error::Result;
use crate::types::{DirectiveRow, LockdownRule, PlanInfo};
use policy::{AutotaskDirective, Directive};

pub mod memory;
pub mod sqlplus;

/// The staging transaction for resource-manager configuration changes.
///
/// Lifecycle: open, stage directives through [`PlanCatalog`], validate,
/// then either submit (changes become visible atomically) or clear
/// (nothing happened). There is no partial commit.
pub trait PendingArea {
    /// Open a pending area. Fails if one is already open in this session.
    fn open_pending_area(&mut self) -> Result<()>;

    /// Discard the pending area and everything staged in it.
    fn clear_pending_area(&mut self) -> Result<()>;

    /// Ask the external validator to check the staged directives.
    fn validate_pending_area(&mut self) -> Result<()>;

    /// Commit the pending area, making all staged changes visible.
    fn submit_pending_area(&mut self) -> Result<()>;
}

/// Plan and directive management. All mutations are staged in the open
/// pending area and only take effect on submit.
pub trait PlanCatalog {
    /// Create the named plan, or update its comment if it already exists.
    fn create_plan(&mut self, plan: &str, comment: &str) -> Result<()>;

    /// Create the profile directive, or update it if it already exists.
    fn upsert_profile_directive(
        &mut self,
        plan: &str,
        profile: &str,
        directive: &Directive,
    ) -> Result<()>;

    /// Update the directive applied to PDBs with no matching profile.
    fn update_default_directive(&mut self, plan: &str, directive: &Directive) -> Result<()>;

    /// Update the directive applied to maintenance tasks.
    fn update_autotask_directive(
        &mut self,
        plan: &str,
        directive: &AutotaskDirective,
    ) -> Result<()>;

    /// All known plans: the observability query used to verify submission.
    fn list_plans(&mut self) -> Result<Vec<PlanInfo>>;

    /// The directive rows of one plan, for drift reporting.
    fn plan_directives(&mut self, plan: &str) -> Result<Vec<DirectiveRow>>;
}

/// The process-wide active resource plan setting, explicit so callers and
/// tests can inject a fake.
pub trait ActivePlanControl {
    fn set_active_plan(&mut self, plan: &str) -> Result<()>;

    fn active_plan(&mut self) -> Result<Option<String>>;
}

/// Lockdown profile management. Profile DDL is immediate (not staged in
/// the pending area).
pub trait LockdownCatalog {
    /// Create an empty profile. Fails with `ProfileExists` if present.
    fn create_profile(&mut self, profile: &str) -> Result<()>;

    /// Drop a profile and its rules.
    fn drop_profile(&mut self, profile: &str) -> Result<()>;

    fn profile_exists(&mut self, profile: &str) -> Result<bool>;

    /// Add one rule. Fails with `DuplicateRule` if the (profile, parameter)
    /// pair already has a rule.
    fn add_rule(&mut self, profile: &str, rule: &LockdownRule) -> Result<()>;

    fn profile_rules(&mut self, profile: &str) -> Result<Vec<LockdownRule>>;
}

/// The full control-plane surface.
pub trait ControlPlane: PendingArea + PlanCatalog + ActivePlanControl + LockdownCatalog {}

impl<T: PendingArea + PlanCatalog + ActivePlanControl + LockdownCatalog> ControlPlane for T {}
