//! Shared helpers for unit and integration tests.
//!
//! In-memory test doubles mirroring the shipped connectors: scripted page
//! fetchers, failing loaders, and small dataset builders. Also useful to
//! downstream connector crates testing against the core contracts.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::conveyor_error;
use crate::error::{ConveyorError, ConveyorResult, ErrorKind};
use crate::loader::base::{BatchDisposition, Loader};
use crate::loader::memory::MemoryLoader;
use crate::resilience::paginator::{PageFetcher, PageRequest, PageResponse};
use crate::types::{
    Cell, Dataset, DatasetMetadata, FieldSchema, FieldType, Row, Schema,
};

/// Schema used by most tests: `id` int, `category` string, `amount` float.
pub fn sample_schema() -> Schema {
    Schema::new(vec![
        FieldSchema::new("id", FieldType::Int),
        FieldSchema::new("category", FieldType::String),
        FieldSchema::new("amount", FieldType::Float),
    ])
}

/// Builds one row matching [`sample_schema`].
pub fn sample_row(id: i64, category: &str, amount: f64) -> Row {
    Row::new(vec![
        Cell::Int(id),
        Cell::String(category.to_string()),
        Cell::Float(amount),
    ])
}

/// Builds a dataset of `rows` records cycling through three categories.
pub fn sample_dataset(name: &str, rows: usize) -> Dataset {
    let categories = ["a", "b", "c"];
    let rows: Vec<Row> = (0..rows)
        .map(|i| sample_row(i as i64, categories[i % categories.len()], i as f64 * 1.5))
        .collect();

    dataset_from_rows(name, rows)
}

/// Builds a dataset over [`sample_schema`] from explicit rows.
pub fn dataset_from_rows(name: &str, rows: Vec<Row>) -> Dataset {
    let record_count = rows.len() as u64;
    Dataset::new(
        name,
        sample_schema(),
        rows,
        DatasetMetadata::new(format!("test:{name}"), record_count),
    )
    .expect("test rows must match the sample schema")
}

/// Page fetcher that replays a scripted sequence of responses.
///
/// Records every request it receives so tests can assert on pagination state,
/// retry behavior, and request counts.
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<ConveyorResult<PageResponse>>>,
    requests: Mutex<Vec<PageRequest>>,
}

impl ScriptedFetcher {
    pub fn new(pages: Vec<ConveyorResult<PageResponse>>) -> Self {
        Self {
            script: Mutex::new(pages.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of fetch calls made so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch_page(&self, request: PageRequest) -> ConveyorResult<PageResponse> {
        self.requests.lock().unwrap().push(request);

        self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(conveyor_error!(
                ErrorKind::SourceUnavailable,
                "Scripted fetcher ran out of pages"
            ))
        })
    }
}

/// Loader that fails on one specific batch and delegates the rest to a
/// [`MemoryLoader`].
///
/// Batch indices are 1-based, matching how batches appear in reports.
#[derive(Debug)]
pub struct FailingLoader {
    delegate: MemoryLoader,
    fail_on_batch: usize,
    attempts: AtomicUsize,
}

impl FailingLoader {
    pub fn failing_on_batch(fail_on_batch: usize) -> Self {
        Self {
            delegate: MemoryLoader::new(),
            fail_on_batch,
            attempts: AtomicUsize::new(0),
        }
    }

    pub async fn committed_rows(&self) -> u64 {
        self.delegate.committed_rows().await
    }

    pub async fn batches(&self) -> Vec<(BatchDisposition, Dataset)> {
        self.delegate.batches().await
    }
}

#[async_trait]
impl Loader for FailingLoader {
    async fn validate_destination(&self) -> ConveyorResult<()> {
        Ok(())
    }

    async fn load_batch(
        &self,
        batch: &Dataset,
        disposition: BatchDisposition,
    ) -> ConveyorResult<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt == self.fail_on_batch {
            return Err(conveyor_error!(
                ErrorKind::DestinationError,
                "Simulated destination failure",
                format!("batch attempt {attempt}")
            ));
        }

        self.delegate.load_batch(batch, disposition).await
    }
}
