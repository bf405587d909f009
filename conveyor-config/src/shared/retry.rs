use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Retry policy configuration for transient stage and fetch failures.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Delay, in milliseconds, before the first retry.
    pub initial_delay_ms: u64,
    /// Upper bound on the delay between retries.
    pub max_delay_ms: u64,
    /// Exponential backoff multiplier applied to the delay after each attempt.
    pub backoff_factor: f32,
}

impl RetryConfig {
    /// Checks that the backoff multiplier cannot shrink delays.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.backoff_factor < 1.0 {
            return Err(ValidationError::BackoffFactorBelowOne);
        }

        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
        }
    }
}
