use std::time::Duration;

use conveyor_config::shared::RetryConfig;

use crate::error::ErrorKind;

/// Stateless retry policy for transient failures.
///
/// Attempt `n` (0-indexed) waits `initial_delay * backoff_factor^n` before
/// re-executing, clamped to `max_delay`, and no attempt is made once
/// `n > max_retries`. Non-transient failure kinds are refused at attempt 0
/// regardless of the remaining budget.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_factor: f64,
}

impl RetryPolicy {
    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_factor: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff_factor: backoff_factor.max(1.0),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.initial_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            f64::from(config.backoff_factor),
        )
    }

    /// A policy that never retries, useful for fail-fast paths.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO, 1.0)
    }

    /// Backoff delay before retry attempt `attempt` (0-indexed).
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.powi(attempt.min(i32::MAX as u32) as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;

        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }

    /// Whether retry attempt `attempt` should be made for a failure of the
    /// given kind.
    pub fn should_retry(&self, attempt: u32, kind: ErrorKind) -> bool {
        if attempt > self.max_retries {
            return false;
        }

        kind.is_transient()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
