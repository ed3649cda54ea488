//! Error types for control-plane operations.
//!
//! Errors are categorized to enable retry logic and appropriate user
//! feedback. Every variant that concerns a plan, profile, or directive
//! names it, so a failure can be traced to the exact configuration call.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Categories of control-plane errors for retry logic.
///
/// Only [`ErrorCategory::Transient`] is worth retrying, and even then only
/// for read-only and validation calls. A failed submit is never retried:
/// after an ambiguous failure the plan may already be committed, and a
/// second submit risks double application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connection or timeout problem (transient, retryable on reads)
    Transient,
    /// The external validator rejected the staged directives
    Validation,
    /// The pending-area submit itself failed
    Submit,
    /// A lockdown rule or profile was added twice without replace
    Duplicate,
    /// The target object already exists (drives upsert fallback)
    AlreadyExists,
    /// A named plan or profile does not exist
    NotFound,
    /// Insufficient privileges or failed authentication
    Permission,
    /// Pending-area lifecycle violation
    State,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Whether this error means the operation was already done
    /// (safe to fall back to an update).
    pub fn is_ignorable(&self) -> bool {
        matches!(self, Self::AlreadyExists)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Transient => "Control plane unreachable",
            Self::Validation => "Staged directives rejected",
            Self::Submit => "Pending-area submit failed",
            Self::Duplicate => "Rule already present",
            Self::AlreadyExists => "Object already exists",
            Self::NotFound => "Object not found",
            Self::Permission => "Insufficient privileges",
            Self::State => "Pending-area lifecycle violation",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Transient => "Check connectivity to the database and try again",
            Self::Validation => "Fix the rejected directive in the policy file",
            Self::Submit => "Inspect the catalog before re-running; the plan may be partially visible",
            Self::Duplicate => "Use --on-existing-profile replace to rebuild the profile",
            Self::AlreadyExists => "No action needed - the object is already configured",
            Self::NotFound => "Verify the plan/profile name or apply the plan first",
            Self::Permission => "Connect with an account holding administer-resource-manager rights",
            Self::State => "Discard the open pending area and re-run",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur while talking to the resource-manager control plane.
#[derive(Debug, Error)]
pub enum Error {
    /// The external validator rejected the staged pending area
    #[error("plan {plan}: pending-area validation failed: {message}")]
    PlanValidation {
        /// Plan whose staged directives were rejected
        plan: String,
        /// Message from the external validator
        message: String,
    },

    /// The pending-area submit failed; the area must be discarded
    #[error("plan {plan}: submit failed: {message}")]
    Submit { plan: String, message: String },

    /// A lockdown rule was added twice for the same (profile, parameter)
    #[error("lockdown profile {profile}: rule for {parameter} already exists")]
    DuplicateRule { profile: String, parameter: String },

    /// A lockdown profile with this name already exists
    #[error("lockdown profile already exists: {profile}")]
    ProfileExists { profile: String },

    /// A plan directive already exists (caught internally to drive upsert)
    #[error("plan {plan}: directive for {profile} already exists")]
    DirectiveExists { plan: String, profile: String },

    /// The named resource plan does not exist
    #[error("resource plan does not exist: {plan}")]
    MissingPlan { plan: String },

    /// The named lockdown profile does not exist
    #[error("lockdown profile does not exist: {profile}")]
    MissingProfile { profile: String },

    /// Connection refused, dropped, or timed out
    #[error("control plane unavailable: {message}")]
    Unavailable { message: String },

    /// The connected account lacks the required privileges
    #[error("permission denied: {message}")]
    Permission { message: String },

    /// A staging call was issued with no pending area open
    #[error("pending area is not open")]
    PendingAreaNotOpen,

    /// A pending area is already open in this session
    #[error("pending area is already open")]
    PendingAreaOpen,

    /// The sqlplus binary could not be found or executed
    #[error("sqlplus not found; set [connection] sqlplus_binary in the config")]
    SqlplusNotFound,

    /// A control-plane call failed for an uncategorized reason
    #[error("{call} failed: {message}")]
    CommandFailed {
        /// The call that failed (e.g. "create_plan newcdb_plan")
        call: String,
        /// Raw output from the control plane
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for control-plane operations.
pub type Result<T> = std::result::Result<T, Error>;

static ORA_CODE: OnceLock<Regex> = OnceLock::new();

fn ora_code(output: &str) -> Option<u32> {
    let re = ORA_CODE.get_or_init(|| Regex::new(r"ORA-(\d{5})").expect("static pattern"));
    re.captures(output)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

impl Error {
    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::PlanValidation { .. } => ErrorCategory::Validation,
            Error::Submit { .. } => ErrorCategory::Submit,
            Error::DuplicateRule { .. } => ErrorCategory::Duplicate,
            Error::ProfileExists { .. } | Error::DirectiveExists { .. } => {
                ErrorCategory::AlreadyExists
            }
            Error::MissingPlan { .. } | Error::MissingProfile { .. } => ErrorCategory::NotFound,
            Error::Unavailable { .. } => ErrorCategory::Transient,
            Error::Permission { .. } => ErrorCategory::Permission,
            Error::PendingAreaNotOpen | Error::PendingAreaOpen => ErrorCategory::State,
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether this error means the object already exists.
    pub fn is_ignorable(&self) -> bool {
        self.category().is_ignorable()
    }

    /// Attach the plan name to validation/submit failures raised by a
    /// backend that cannot know which plan the pending area holds.
    pub fn for_plan(self, plan: &str) -> Self {
        match self {
            Self::PlanValidation { message, .. } => Self::PlanValidation {
                plan: plan.to_string(),
                message,
            },
            Self::Submit { message, .. } => Self::Submit {
                plan: plan.to_string(),
                message,
            },
            other => other,
        }
    }

    /// Create an error from sqlplus output.
    ///
    /// Classifies by the first ORA code in the output; `call` names the
    /// control-plane call for context when no code matches a known class.
    pub fn from_sqlplus_output(call: &str, output: &str) -> Self {
        let trimmed = output.trim();

        match ora_code(output) {
            // Connection-layer failures: unreachable listener, lost contact,
            // connect timeout. Transient.
            Some(3113 | 3114 | 12170 | 12514 | 12537 | 12541 | 12543) => Error::Unavailable {
                message: trimmed.to_string(),
            },

            // Authentication and privilege failures
            Some(1017 | 1031) => Error::Permission {
                message: trimmed.to_string(),
            },

            // Pending-area lifecycle
            Some(29370) => Error::PendingAreaOpen,
            Some(29371) => Error::PendingAreaNotOpen,

            // Validation of the pending area failed
            Some(29382) => Error::PlanValidation {
                plan: String::new(),
                message: trimmed.to_string(),
            },

            // Named plan missing
            Some(29358) => Error::MissingPlan {
                plan: call.to_string(),
            },

            _ => {
                // Fall back to text matching for classes without a stable code
                let lower = trimmed.to_ascii_lowercase();
                if lower.contains("timed out") || lower.contains("connection refused") {
                    Error::Unavailable {
                        message: trimmed.to_string(),
                    }
                } else if lower.contains("insufficient privileges") {
                    Error::Permission {
                        message: trimmed.to_string(),
                    }
                } else {
                    Error::CommandFailed {
                        call: call.to_string(),
                        message: trimmed.to_string(),
                    }
                }
            }
        }
    }
}
