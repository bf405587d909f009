use serde::{Deserialize, Serialize};

use crate::ValidationError;
use crate::shared::RetryConfig;

/// Run-level settings for a pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Whether a failed stage is recorded and skipped instead of aborting the
    /// whole run.
    ///
    /// Evaluated once per run; it is never re-evaluated per error kind.
    #[serde(default)]
    pub continue_on_error: bool,
    /// Maximum number of extraction stages running concurrently.
    #[serde(default = "default_parallelism")]
    pub max_parallel_extractors: u16,
    /// Maximum number of load stages running concurrently.
    #[serde(default = "default_parallelism")]
    pub max_parallel_loaders: u16,
    /// Optional per-stage timeout in milliseconds.
    ///
    /// Expiry is treated as a transient failure subject to the retry policy.
    #[serde(default)]
    pub stage_timeout_ms: Option<u64>,
    /// Retry policy applied to transient stage failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_parallelism() -> u16 {
    4
}

impl PipelineSettings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_parallel_extractors == 0 {
            return Err(ValidationError::ParallelismZero("max_parallel_extractors"));
        }
        if self.max_parallel_loaders == 0 {
            return Err(ValidationError::ParallelismZero("max_parallel_loaders"));
        }
        self.retry.validate()?;

        Ok(())
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            max_parallel_extractors: default_parallelism(),
            max_parallel_loaders: default_parallelism(),
            stage_timeout_ms: None,
            retry: RetryConfig::default(),
        }
    }
}
