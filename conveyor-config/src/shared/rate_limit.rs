use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Request budget for a single extractor talking to a throttled API.
///
/// Each extractor owns its own limiter, so one slow API never throttles
/// another extractor in the same job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests admitted per fixed one-minute window.
    pub requests_per_minute: u32,
    /// Optional maximum requests per day; unset means unlimited.
    pub requests_per_day: Option<u32>,
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.requests_per_minute == 0 {
            return Err(ValidationError::RequestsPerMinuteZero);
        }

        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            requests_per_day: None,
        }
    }
}
