//! Retry logic with exponential backoff for transient errors.
//!
//! Only read-only and validate calls are ever wrapped in [`with_retry`];
//! staging calls and pending-area submits are issued exactly once.

use crate::error::{Error, Result};
use std::thread;
use std::time::Duration;

/// Retry configuration for transient control-plane failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Callback trait for retry progress notifications.
pub trait RetryCallback {
    /// Called when an operation is being retried.
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &Error, delay: Duration);
}

/// No-op callback that does nothing.
pub struct NoCallback;

impl RetryCallback for NoCallback {
    fn on_retry(&self, _attempt: u32, _max_attempts: u32, _error: &Error, _delay: Duration) {}
}

/// Callback that logs retry information.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &Error, delay: Duration) {
        log::warn!(
            "attempt {}/{} failed: {}. Retrying in {}s...",
            attempt,
            max_attempts,
            error,
            delay.as_secs()
        );
    }
}

/// Execute an operation with retry logic.
///
/// Retries the operation if it returns a retryable (transient) error,
/// using exponential backoff between attempts. Non-retryable errors
/// return immediately.
pub fn with_retry<T, F>(
    config: &RetryConfig,
    callback: Option<&dyn RetryCallback>,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut last_error: Option<Error> = None;

    for attempt in 0..config.max_attempts {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.is_retryable() {
                    return Err(e);
                }

                if attempt + 1 >= config.max_attempts {
                    last_error = Some(e);
                    break;
                }

                let delay = config.delay_for_attempt(attempt);
                if let Some(cb) = callback {
                    cb.on_retry(attempt + 1, config.max_attempts, &e, delay);
                }
                thread::sleep(delay);

                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::Unavailable {
        message: "retry exhausted".to_string(),
    }))
}
