use async_trait::async_trait;
use conveyor_config::shared::IfExists;

use crate::error::ConveyorResult;
use crate::types::Dataset;

/// How a single batch relates to the destination's existing contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchDisposition {
    /// The first batch of a load; establishes the destination according to
    /// the configured policy. Connectors apply any create/replace DDL before
    /// writing data rows, so a failed first batch leaves an empty destination
    /// rather than a missing one.
    First(IfExists),
    /// Every subsequent batch appends to what earlier batches committed.
    Append,
}

/// Contract implemented by every destination connector.
///
/// The core owns splitting a dataset into batches; connectors only see one
/// batch at a time, each to be committed under its own transactional
/// boundary.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Checks that the destination is reachable and ready to receive data.
    async fn validate_destination(&self) -> ConveyorResult<()>;

    /// Loads one batch under a transactional boundary scoped to that batch.
    async fn load_batch(&self, batch: &Dataset, disposition: BatchDisposition)
    -> ConveyorResult<()>;
}

#[async_trait]
impl<L: Loader + ?Sized> Loader for std::sync::Arc<L> {
    async fn validate_destination(&self) -> ConveyorResult<()> {
        (**self).validate_destination().await
    }

    async fn load_batch(
        &self,
        batch: &Dataset,
        disposition: BatchDisposition,
    ) -> ConveyorResult<()> {
        (**self).load_batch(batch, disposition).await
    }
}
