use async_trait::async_trait;

use crate::error::ConveyorResult;
use crate::types::Dataset;

/// Datasets produced by one extraction.
///
/// Most extractors produce exactly one dataset; multi-query extractors may
/// register several named datasets in one call.
#[derive(Debug)]
pub enum ExtractOutput {
    Single(Dataset),
    Many(Vec<Dataset>),
}

impl ExtractOutput {
    pub fn into_datasets(self) -> Vec<Dataset> {
        match self {
            ExtractOutput::Single(dataset) => vec![dataset],
            ExtractOutput::Many(datasets) => datasets,
        }
    }

    /// Total number of records across all produced datasets.
    pub fn record_count(&self) -> u64 {
        match self {
            ExtractOutput::Single(dataset) => dataset.len() as u64,
            ExtractOutput::Many(datasets) => {
                datasets.iter().map(|dataset| dataset.len() as u64).sum()
            }
        }
    }
}

/// Contract implemented by every source connector.
///
/// Implementations are constructed fallibly from configuration by the
/// registry and must fail fast with a descriptive error on invalid options.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Checks that the source is reachable and correctly configured, before
    /// any data is pulled.
    async fn validate_source(&self) -> ConveyorResult<()>;

    /// Pulls data from the source into one or more named datasets.
    async fn extract(&self) -> ConveyorResult<ExtractOutput>;
}

#[async_trait]
impl<E: Extractor + ?Sized> Extractor for std::sync::Arc<E> {
    async fn validate_source(&self) -> ConveyorResult<()> {
        (**self).validate_source().await
    }

    async fn extract(&self) -> ConveyorResult<ExtractOutput> {
        (**self).extract().await
    }
}
