//! In-memory registry of the named datasets flowing through one job run.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::conveyor_error;
use crate::error::{ConveyorError, ConveyorResult, ErrorKind};
use crate::types::Dataset;

#[derive(Debug, Default)]
struct Inner {
    datasets: HashMap<String, Dataset>,
}

/// Mapping from dataset name to [`Dataset`], owned by the pipeline for the
/// duration of one job run.
///
/// Handles are cheap clones sharing the same map. Registration during the
/// concurrent extraction phase is serialized by the internal mutex; during
/// transform and load phases the pipeline guarantees a single writer, so no
/// reader ever observes a half-written dataset. There is no cross-job
/// persistence: the store is created at job start and dropped at job end.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    inner: Arc<Mutex<Inner>>,
}

impl DatasetStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Registers a dataset under its own name, replacing any existing entry.
    pub async fn register(&self, dataset: Dataset) {
        let mut inner = self.inner.lock().await;

        debug!(
            dataset = dataset.name,
            rows = dataset.len(),
            "registering dataset"
        );
        if inner
            .datasets
            .insert(dataset.name.clone(), dataset)
            .is_some()
        {
            warn!("a dataset with the same name was replaced in the store");
        }
    }

    /// Returns a copy of the named dataset.
    ///
    /// A missing name is a configuration or ordering bug surfaced as
    /// [`ErrorKind::MissingDataset`]; static validation catches most of these
    /// before any I/O happens.
    pub async fn get(&self, name: &str) -> ConveyorResult<Dataset> {
        let inner = self.inner.lock().await;

        inner.datasets.get(name).cloned().ok_or_else(|| {
            conveyor_error!(
                ErrorKind::MissingDataset,
                "Dataset not found in store",
                name
            )
        })
    }

    /// Returns a copy of the named dataset if present.
    pub async fn try_get(&self, name: &str) -> Option<Dataset> {
        let inner = self.inner.lock().await;
        inner.datasets.get(name).cloned()
    }

    /// Removes and returns the named dataset.
    pub async fn remove(&self, name: &str) -> Option<Dataset> {
        let mut inner = self.inner.lock().await;
        inner.datasets.remove(name)
    }

    /// Registered dataset names in sorted order.
    pub async fn names(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        let mut names: Vec<String> = inner.datasets.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.datasets.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshot of dataset names and row counts, used for the diagnostic
    /// dump when a run fails.
    pub async fn summary(&self) -> Vec<(String, usize)> {
        let inner = self.inner.lock().await;
        let mut summary: Vec<(String, usize)> = inner
            .datasets
            .iter()
            .map(|(name, dataset)| (name.clone(), dataset.len()))
            .collect();
        summary.sort();
        summary
    }
}

impl Default for DatasetStore {
    fn default() -> Self {
        Self::new()
    }
}
