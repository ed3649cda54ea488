//! # policy
//!
//! Schema, loading, and validation for tier policy files.
//!
//! A policy file declares a resource plan (name, default directive,
//! autotask directive) and a list of tiers, each with CPU shares,
//! utilization/parallel-server limits, and the initialization parameters
//! its lockdown profile restricts:
//!
//! ```toml
//! [plan]
//! name = "newcdb_plan"
//!
//! [plan.default_directive]
//! shares = 1
//! utilization_limit = 10
//! parallel_server_limit = 10
//!
//! [plan.autotask_directive]
//! shares = 2
//! utilization_limit = 60
//!
//! [[tiers]]
//! name = "gold"
//! shares = 3
//! utilization_limit = 60
//! parallel_server_limit = 60
//! locked_parameters = ["DB_PERFORMANCE_PROFILE", "MAX_IOPS"]
//! ```
//!
//! [`load`] and [`from_str`] return a [`Policy`] whose invariants already
//! hold; downstream code never re-checks ranges.

pub mod error;
pub mod loader;
pub mod types;

pub use error::{Error, Result};
pub use loader::{from_str, load};
pub use types::{AutotaskDirective, Directive, LockedParameter, Policy, Tier};
