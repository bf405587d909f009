use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Disposition applied when the destination already holds data.
///
/// Only the first batch of a chunked load honors this setting; every
/// subsequent batch appends, so a replace never discards rows committed
/// earlier in the same load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IfExists {
    /// Refuse to load when the destination already exists.
    Fail,
    /// Drop and recreate the destination before the first batch.
    Replace,
    /// Keep existing data and add to it.
    Append,
}

/// Batch configuration for chunked loading.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoadBatchConfig {
    /// Maximum number of records loaded under one transactional boundary.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Disposition for the first batch of a load.
    #[serde(default = "default_if_exists")]
    pub if_exists: IfExists,
}

fn default_batch_size() -> usize {
    1000
}

fn default_if_exists() -> IfExists {
    IfExists::Fail
}

impl LoadBatchConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 {
            return Err(ValidationError::BatchSizeZero);
        }

        Ok(())
    }
}

impl Default for LoadBatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            if_exists: default_if_exists(),
        }
    }
}
