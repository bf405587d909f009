use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::ConveyorResult;
use crate::loader::base::{BatchDisposition, Loader};
use crate::types::Dataset;

#[derive(Debug, Default)]
struct Inner {
    batches: Vec<(BatchDisposition, Dataset)>,
}

/// Loader that records every batch in memory.
///
/// Reference implementation of the chunked loading contract, and the
/// destination used by examples and tests to assert on what was committed.
#[derive(Debug, Clone)]
pub struct MemoryLoader {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Batches committed so far, with their dispositions.
    pub async fn batches(&self) -> Vec<(BatchDisposition, Dataset)> {
        let inner = self.inner.lock().await;
        inner.batches.clone()
    }

    /// Total rows committed across batches.
    pub async fn committed_rows(&self) -> u64 {
        let inner = self.inner.lock().await;
        inner
            .batches
            .iter()
            .map(|(_, dataset)| dataset.len() as u64)
            .sum()
    }
}

impl Default for MemoryLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Loader for MemoryLoader {
    async fn validate_destination(&self) -> ConveyorResult<()> {
        Ok(())
    }

    async fn load_batch(
        &self,
        batch: &Dataset,
        disposition: BatchDisposition,
    ) -> ConveyorResult<()> {
        let mut inner = self.inner.lock().await;
        info!(
            dataset = batch.name,
            rows = batch.len(),
            ?disposition,
            "committing batch to memory destination"
        );
        inner.batches.push((disposition, batch.clone()));

        Ok(())
    }
}
