use conveyor_config::shared::LoadBatchConfig;
use std::ops::Range;
use tracing::{debug, info, warn};

use crate::conveyor_error;
use crate::error::{ConveyorError, ErrorKind};
use crate::loader::base::{BatchDisposition, Loader};
use crate::types::{Dataset, JobContext};

/// Outcome of one chunked load.
///
/// Committed batches are never rolled back when a later batch fails; the
/// report carries both what made it in and the failure, so partial success
/// is a value rather than an exception.
#[derive(Debug)]
pub struct ChunkedLoadReport {
    pub batches_committed: usize,
    pub rows_committed: u64,
    pub error: Option<ConveyorError>,
}

/// Splits `total` rows into consecutive ranges of at most `batch_size`.
pub fn plan_batches(total: usize, batch_size: usize) -> Vec<Range<usize>> {
    let mut batches = Vec::new();
    let mut start = 0;

    while start < total {
        let end = (start + batch_size).min(total);
        batches.push(start..end);
        start = end;
    }

    // An empty dataset still performs one empty first batch so that the
    // destination is established according to the configured policy.
    if batches.is_empty() {
        batches.push(0..0);
    }

    batches
}

/// Drives a chunked load of one dataset through a [`Loader`].
///
/// The first batch carries the configured `if_exists` disposition, every
/// later batch appends. A mid-sequence failure stops the load: prior batches
/// remain committed and the failure is reported as
/// [`ErrorKind::LoadBatchFailed`] with the batch index.
pub async fn load_chunked(
    ctx: &JobContext,
    loader: &dyn Loader,
    dataset: &Dataset,
    config: &LoadBatchConfig,
) -> ChunkedLoadReport {
    let batches = plan_batches(dataset.len(), config.batch_size);
    let total_batches = batches.len();

    let mut report = ChunkedLoadReport {
        batches_committed: 0,
        rows_committed: 0,
        error: None,
    };

    for (index, range) in batches.into_iter().enumerate() {
        // One batch is the unit of work under cancellation: the batch in
        // flight commits, no further batch starts.
        if index > 0 && ctx.is_cancelled() {
            warn!(
                dataset = dataset.name,
                committed = report.batches_committed,
                "load cancelled between batches"
            );
            report.error = Some(conveyor_error!(
                ErrorKind::Cancelled,
                "Load cancelled between batches",
                format!("after batch {} of {total_batches}", index)
            ));
            break;
        }

        let disposition = if index == 0 {
            BatchDisposition::First(config.if_exists)
        } else {
            BatchDisposition::Append
        };

        let batch_rows = range.len() as u64;
        let batch = Dataset {
            name: dataset.name.clone(),
            schema: dataset.schema.clone(),
            rows: dataset.rows[range].to_vec(),
            metadata: dataset.metadata.clone(),
        };

        debug!(
            dataset = dataset.name,
            batch = index + 1,
            total_batches,
            rows = batch_rows,
            "loading batch"
        );

        match loader.load_batch(&batch, disposition).await {
            Ok(()) => {
                report.batches_committed += 1;
                report.rows_committed += batch_rows;
            }
            Err(err) => {
                warn!(
                    dataset = dataset.name,
                    batch = index + 1,
                    total_batches,
                    "batch load failed, keeping previously committed batches: {err}"
                );
                report.error = Some(conveyor_error!(
                    ErrorKind::LoadBatchFailed,
                    "Batch load failed",
                    format!("batch {} of {total_batches}: {err}", index + 1)
                ));
                break;
            }
        }
    }

    if report.error.is_none() {
        info!(
            dataset = dataset.name,
            batches = report.batches_committed,
            rows = report.rows_committed,
            "chunked load finished"
        );
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_config::shared::{IfExists, PipelineSettings};

    use crate::concurrency::shutdown::create_shutdown_channel;
    use crate::loader::memory::MemoryLoader;
    use crate::test_utils::{FailingLoader, sample_dataset};

    fn test_ctx() -> JobContext {
        let (_tx, rx) = create_shutdown_channel();
        JobContext::new("job_test".into(), PipelineSettings::default(), rx)
    }

    fn batch_config(batch_size: usize, if_exists: IfExists) -> LoadBatchConfig {
        LoadBatchConfig {
            batch_size,
            if_exists,
        }
    }

    #[test]
    fn batches_split_evenly_with_remainder() {
        let plan = plan_batches(2500, 1000);
        assert_eq!(plan, vec![0..1000, 1000..2000, 2000..2500]);
    }

    #[test]
    fn empty_dataset_still_establishes_the_destination() {
        assert_eq!(plan_batches(0, 1000), vec![0..0]);
    }

    #[tokio::test]
    async fn dispositions_replace_then_append() {
        let loader = MemoryLoader::new();
        let dataset = sample_dataset("orders", 2500);

        let report = load_chunked(
            &test_ctx(),
            &loader,
            &dataset,
            &batch_config(1000, IfExists::Replace),
        )
        .await;

        assert!(report.error.is_none());
        assert_eq!(report.batches_committed, 3);
        assert_eq!(report.rows_committed, 2500);

        let batches = loader.batches().await;
        assert_eq!(batches.len(), 3);
        assert_eq!(
            batches[0].0,
            BatchDisposition::First(IfExists::Replace)
        );
        assert_eq!(batches[1].0, BatchDisposition::Append);
        assert_eq!(batches[2].0, BatchDisposition::Append);
        assert_eq!(batches[0].1.len(), 1000);
        assert_eq!(batches[2].1.len(), 500);
    }

    #[tokio::test]
    async fn failed_batch_keeps_prior_commits() {
        let loader = FailingLoader::failing_on_batch(2);
        let dataset = sample_dataset("orders", 2500);

        let report = load_chunked(
            &test_ctx(),
            &loader,
            &dataset,
            &batch_config(1000, IfExists::Append),
        )
        .await;

        assert_eq!(report.batches_committed, 1);
        assert_eq!(report.rows_committed, 1000);
        let error = report.error.unwrap();
        assert_eq!(error.kind(), ErrorKind::LoadBatchFailed);
        assert!(error.detail().unwrap().contains("batch 2 of 3"));

        assert_eq!(loader.committed_rows().await, 1000);
    }

    #[tokio::test]
    async fn small_dataset_loads_in_one_batch() {
        let loader = MemoryLoader::new();
        let dataset = sample_dataset("orders", 5);

        let report = load_chunked(
            &test_ctx(),
            &loader,
            &dataset,
            &batch_config(1000, IfExists::Fail),
        )
        .await;

        assert!(report.error.is_none());
        assert_eq!(report.batches_committed, 1);
        assert_eq!(loader.batches().await.len(), 1);
    }
}
