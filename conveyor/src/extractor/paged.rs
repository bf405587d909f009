use std::sync::Arc;

use async_trait::async_trait;
use conveyor_config::shared::{PaginationConfig, RateLimitConfig, RetryConfig};
use tracing::{debug, info};

use crate::bail;
use crate::error::{ConveyorError, ConveyorResult, ErrorKind};
use crate::extractor::base::{ExtractOutput, Extractor};
use crate::resilience::paginator::{PageFetcher, PageTurn, Paginator};
use crate::resilience::rate_limiter::RateLimiter;
use crate::resilience::retry::RetryPolicy;
use crate::types::{Dataset, DatasetMetadata, JobContext, Row, Schema};

/// Extractor for paginated, rate-limited sources.
///
/// Owns its [`RateLimiter`], shared only with the retry/pagination loop for
/// this one source. The protocol-specific page fetch is supplied as a
/// [`PageFetcher`] by the concrete connector.
pub struct PagedExtractor {
    dataset_name: String,
    schema: Schema,
    fetcher: Arc<dyn PageFetcher>,
    pagination: PaginationConfig,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    ctx: JobContext,
}

impl PagedExtractor {
    pub fn new(
        ctx: &JobContext,
        dataset_name: impl Into<String>,
        schema: Schema,
        fetcher: Arc<dyn PageFetcher>,
        pagination: PaginationConfig,
        rate_limit: &RateLimitConfig,
        retry: &RetryConfig,
    ) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            schema,
            fetcher,
            pagination,
            limiter: Arc::new(RateLimiter::new(rate_limit)),
            retry: RetryPolicy::from_config(retry),
            ctx: ctx.clone(),
        }
    }
}

#[async_trait]
impl Extractor for PagedExtractor {
    async fn validate_source(&self) -> ConveyorResult<()> {
        self.fetcher.validate().await
    }

    async fn extract(&self) -> ConveyorResult<ExtractOutput> {
        let mut paginator = Paginator::new(
            &self.pagination,
            self.limiter.clone(),
            self.retry.clone(),
        );
        let mut rows: Vec<Row> = Vec::new();

        loop {
            // One page is the unit of work: an in-flight fetch finishes, but
            // no new page is requested once the run is cancelled.
            if self.ctx.is_cancelled() {
                bail!(
                    ErrorKind::Cancelled,
                    "Extraction cancelled before completion",
                    self.dataset_name.clone()
                );
            }

            match paginator.next(self.fetcher.as_ref()).await? {
                PageTurn::Page {
                    rows: page_rows,
                    has_more,
                } => {
                    debug!(
                        dataset = self.dataset_name,
                        page = paginator.pages_fetched(),
                        rows = page_rows.len(),
                        "fetched page"
                    );
                    rows.extend(page_rows);
                    if !has_more {
                        break;
                    }
                }
                PageTurn::Finished => break,
            }
        }

        let record_count = rows.len() as u64;
        let mut dataset = Dataset::new(
            self.dataset_name.clone(),
            self.schema.clone(),
            rows,
            DatasetMetadata::new(format!("paged:{}", self.dataset_name), record_count),
        )?;

        if paginator.truncated() {
            // Whether a truncated extraction is fatal is a run-level decision,
            // evaluated once through `continue_on_error`.
            if !self.ctx.settings.continue_on_error {
                let cause = paginator
                    .truncation_cause()
                    .cloned()
                    .unwrap_or_else(|| {
                        ConveyorError::from((
                            ErrorKind::SourceUnavailable,
                            "Pagination truncated without a recorded cause",
                        ))
                    });
                return Err(cause);
            }

            dataset.tag("truncated");
        }

        info!(
            dataset = self.dataset_name,
            pages = paginator.pages_fetched(),
            rows = dataset.len(),
            truncated = paginator.truncated(),
            "paged extraction finished"
        );

        Ok(ExtractOutput::Single(dataset))
    }
}
