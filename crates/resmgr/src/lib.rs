//! # resmgr
//!
//! Control-plane abstraction and appliers for CDB resource plans and
//! lockdown profiles.
//!
//! The external resource manager owns the scheduler, the share
//! enforcement, and the pending-area transaction; this crate only
//! issues declarative calls against it and preserves its all-or-nothing
//! guarantee:
//!
//! - [`backend`]: four capability traits ([`PendingArea`],
//!   [`PlanCatalog`], [`ActivePlanControl`], [`LockdownCatalog`]) with a
//!   sqlplus shell-out backend and an in-memory fake for tests
//! - [`pending`]: a scoped guard that discards the pending area on every
//!   non-submitted exit path
//! - [`apply`]: stage -> validate -> submit -> activate, strictly in
//!   order, with retry only on transient read/validate failures
//! - [`lockdown`]: per-tier lockdown profiles with explicit
//!   existing-profile behavior
//! - [`drift`]: read-only comparison of policy vs catalog
//!
//! ## Example
//!
//! ```ignore
//! use resmgr::{apply_plan, ApplyOptions, NoObserver, RetryConfig};
//! use resmgr::backend::memory::MemoryControlPlane;
//!
//! let policy = policy::load("tiers.toml".as_ref())?;
//! let mut plane = MemoryControlPlane::new();
//! let report = apply_plan(
//!     &mut plane,
//!     &policy,
//!     &ApplyOptions { activate: true, ..Default::default() },
//!     &RetryConfig::default(),
//!     &mut NoObserver,
//! )?;
//! ```

pub mod apply;
pub mod backend;
pub mod drift;
pub mod error;
pub mod lockdown;
pub mod pending;
pub mod retry;
pub mod types;

// Re-export main types at crate root
pub use apply::{ApplyObserver, NoObserver, apply_plan};
pub use backend::{ActivePlanControl, ControlPlane, LockdownCatalog, PendingArea, PlanCatalog};
pub use drift::{DirectiveMismatch, DriftReport, compute_drift, desired_rows};
pub use error::{Error, ErrorCategory, Result};
pub use lockdown::apply_lockdown;
pub use pending::PendingAreaGuard;
pub use retry::{RetryCallback, RetryConfig, with_retry};
pub use types::{
    ApplyOptions, ApplyPhase, ApplyReport, DirectiveRow, ExistingProfile, LockdownOptions,
    LockdownReport, LockdownRule, PlanInfo,
};
