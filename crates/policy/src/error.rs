//! Error types for policy loading and validation

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or validating a tier policy.
///
/// Every validation variant names the tier (or pseudo-directive) and the
/// offending field, so the message alone is enough to fix the policy file.
/// Validation errors are never retried - they require corrected input.
#[derive(Error, Debug)]
pub enum Error {
    /// Policy file could not be read
    #[error("could not read policy file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Policy file is not valid TOML
    #[error("invalid TOML in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },

    /// Plan name is empty
    #[error("plan name cannot be empty")]
    EmptyPlanName,

    /// A tier was declared without a name
    #[error("tier name cannot be empty")]
    EmptyTierName,

    /// Two tiers share the same name
    #[error("duplicate tier: {name}")]
    DuplicateTier { name: String },

    /// Shares must be a positive integer
    #[error("{scope}: shares must be positive, got {shares}")]
    InvalidShares { scope: String, shares: i64 },

    /// A utilization or parallel-server limit is outside [0, 100]
    #[error("{scope}: {field} must be between 0 and 100, got {value}")]
    LimitOutOfRange {
        scope: String,
        field: &'static str,
        value: i64,
    },

    /// A locked parameter is not in the allowed set
    #[error("tier {tier}: unknown locked parameter: {parameter}")]
    UnknownParameter { tier: String, parameter: String },

    /// The same parameter is locked twice within one tier
    #[error("tier {tier}: duplicate locked parameter: {parameter}")]
    DuplicateParameter { tier: String, parameter: String },
}

/// Result type for policy operations
pub type Result<T> = std::result::Result<T, Error>;
