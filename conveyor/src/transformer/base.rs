use async_trait::async_trait;

use crate::conveyor_error;
use crate::error::{ConveyorError, ConveyorResult, ErrorKind};
use crate::types::Dataset;

/// Dataset(s) handed to a transformer, as declared in configuration.
#[derive(Debug)]
pub enum TransformInput {
    Single(Dataset),
    Many(Vec<Dataset>),
}

impl TransformInput {
    /// Unwraps a single-input transform, failing for multi-input stages.
    pub fn into_single(self) -> ConveyorResult<Dataset> {
        match self {
            TransformInput::Single(dataset) => Ok(dataset),
            TransformInput::Many(datasets) => Err(conveyor_error!(
                ErrorKind::TransformFailed,
                "Transformer expects exactly one input dataset",
                format!("got {} datasets", datasets.len())
            )),
        }
    }

    /// Total number of records across all input datasets.
    pub fn record_count(&self) -> u64 {
        match self {
            TransformInput::Single(dataset) => dataset.len() as u64,
            TransformInput::Many(datasets) => {
                datasets.iter().map(|dataset| dataset.len() as u64).sum()
            }
        }
    }
}

/// Result of one transform stage.
#[derive(Debug)]
pub enum TransformOutput {
    /// Replaces the stage's input dataset under the input's declared name.
    Replace(Dataset),
    /// Registers every returned dataset under its own name, overwriting
    /// existing entries. Declared inputs that are not returned are removed
    /// from the store, which is how a consuming transform retires a dataset.
    Datasets(Vec<Dataset>),
}

impl TransformOutput {
    /// Total number of records across all output datasets.
    pub fn record_count(&self) -> u64 {
        match self {
            TransformOutput::Replace(dataset) => dataset.len() as u64,
            TransformOutput::Datasets(datasets) => {
                datasets.iter().map(|dataset| dataset.len() as u64).sum()
            }
        }
    }
}

/// Contract implemented by every transform connector.
///
/// Transformers read their declared input datasets and produce either a
/// single replacement or a fan-out of named datasets; they never talk to
/// external systems.
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(&self, input: TransformInput) -> ConveyorResult<TransformOutput>;
}
