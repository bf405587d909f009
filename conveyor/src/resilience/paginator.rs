use std::sync::Arc;

use async_trait::async_trait;
use conveyor_config::shared::{PaginationConfig, PaginationMode};
use tracing::{debug, warn};

use crate::conveyor_error;
use crate::error::{ConveyorError, ConveyorResult, ErrorKind};
use crate::resilience::rate_limiter::RateLimiter;
use crate::resilience::retry::RetryPolicy;
use crate::types::Row;

/// Parameters for one page request, derived from the pagination state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    /// Offset pagination: fetch the page with this index.
    Offset { page: u32, page_size: u32 },
    /// Cursor pagination: fetch the page after this continuation token.
    /// `None` requests the first page.
    Cursor {
        cursor: Option<String>,
        page_size: u32,
    },
}

/// One page of results returned by a [`PageFetcher`].
#[derive(Debug, Clone)]
pub struct PageResponse {
    pub rows: Vec<Row>,
    /// Continuation token for cursor pagination; `None` ends the pagination.
    /// Fetchers typically locate it with [`json_value_at_path`] using the
    /// configured `cursor_path`.
    pub next_cursor: Option<String>,
}

/// Performs one page request against a concrete source.
///
/// The HTTP (or other protocol) implementation lives in the connector; the
/// paginator only drives the fetch with rate limiting and retries.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Checks that the source is reachable before extraction starts.
    async fn validate(&self) -> ConveyorResult<()> {
        Ok(())
    }

    async fn fetch_page(&self, request: PageRequest) -> ConveyorResult<PageResponse>;
}

/// Result of advancing the paginator by one page.
#[derive(Debug)]
pub enum PageTurn {
    /// A fetched page; `has_more` is `false` on the final page.
    Page { rows: Vec<Row>, has_more: bool },
    /// Pagination has ended; no request was issued.
    Finished,
}

#[derive(Debug)]
enum PaginationState {
    Offset { next_page: u32 },
    Cursor {
        cursor: Option<String>,
        started: bool,
    },
}

/// Drives repeated page fetches against a rate-limited, possibly unreliable
/// source.
///
/// Before each request the paginator waits on the extractor's [`RateLimiter`];
/// a transient fetch failure is retried for the same page (pagination state
/// never advances on failure) within the [`RetryPolicy`] budget.
///
/// Failure policy: if the very first page fails after exhausting retries the
/// whole extraction fails with no partial result. If a later page fails, the
/// pages fetched so far stand, a truncation warning is logged, and the caller
/// decides whether truncation is fatal via `continue_on_error`.
#[derive(Debug)]
pub struct Paginator {
    state: PaginationState,
    page_size: u32,
    max_pages: u32,
    pages_fetched: u32,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    done: bool,
    truncated: bool,
    truncation_cause: Option<ConveyorError>,
}

impl Paginator {
    pub fn new(config: &PaginationConfig, limiter: Arc<RateLimiter>, retry: RetryPolicy) -> Self {
        let state = match config.mode {
            PaginationMode::Offset => PaginationState::Offset {
                next_page: config.start_page,
            },
            PaginationMode::Cursor => PaginationState::Cursor {
                cursor: None,
                started: false,
            },
        };

        Self {
            state,
            page_size: config.page_size,
            max_pages: config.max_pages,
            pages_fetched: 0,
            limiter,
            retry,
            done: false,
            truncated: false,
            truncation_cause: None,
        }
    }

    /// Number of pages fetched successfully so far.
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// Returns `true` when pagination ended early after a later page failed.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// The failure that caused the truncation, if any.
    pub fn truncation_cause(&self) -> Option<&ConveyorError> {
        self.truncation_cause.as_ref()
    }

    /// Fetches the next page through the supplied fetcher.
    ///
    /// Stop conditions are checked before a request is issued, so once the
    /// page budget is exhausted or the server signalled the end, no further
    /// request leaves the process.
    pub async fn next(&mut self, fetcher: &dyn PageFetcher) -> ConveyorResult<PageTurn> {
        if self.done {
            return Ok(PageTurn::Finished);
        }

        if self.pages_fetched >= self.max_pages {
            debug!(max_pages = self.max_pages, "page budget reached");
            self.done = true;
            return Ok(PageTurn::Finished);
        }

        let request = match &self.state {
            PaginationState::Offset { next_page } => PageRequest::Offset {
                page: *next_page,
                page_size: self.page_size,
            },
            PaginationState::Cursor { cursor, started } => {
                if *started && cursor.is_none() {
                    self.done = true;
                    return Ok(PageTurn::Finished);
                }
                PageRequest::Cursor {
                    cursor: cursor.clone(),
                    page_size: self.page_size,
                }
            }
        };

        let response = match self.fetch_with_retries(fetcher, request).await {
            Ok(response) => response,
            Err(err) => {
                self.done = true;

                if self.pages_fetched == 0 {
                    return Err(conveyor_error!(
                        err.kind(),
                        "Pagination failed on the first page",
                        err
                    ));
                }

                warn!(
                    pages_fetched = self.pages_fetched,
                    "pagination truncated after a page failed, returning pages fetched so far: {err}"
                );
                self.truncated = true;
                self.truncation_cause = Some(err);

                return Ok(PageTurn::Finished);
            }
        };

        self.pages_fetched += 1;

        let short_page = (response.rows.len() as u64) < u64::from(self.page_size);
        match &mut self.state {
            PaginationState::Offset { next_page } => {
                *next_page += 1;
                if short_page {
                    self.done = true;
                }
            }
            PaginationState::Cursor { cursor, started } => {
                *started = true;
                *cursor = response.next_cursor.clone();
                if cursor.is_none() {
                    self.done = true;
                }
            }
        }

        if self.pages_fetched >= self.max_pages {
            self.done = true;
        }

        Ok(PageTurn::Page {
            rows: response.rows,
            has_more: !self.done,
        })
    }

    /// Fetches one page, waiting on the rate limiter before every attempt and
    /// retrying the same page on transient failures.
    async fn fetch_with_retries(
        &self,
        fetcher: &dyn PageFetcher,
        request: PageRequest,
    ) -> ConveyorResult<PageResponse> {
        let mut attempt = 0;

        loop {
            self.limiter.acquire().await;

            match fetcher.fetch_page(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if !self.retry.should_retry(attempt, err.kind()) {
                        return Err(err);
                    }

                    let delay = self.retry.next_delay(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "page fetch failed, retrying the same page: {err}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Looks up a value in a JSON document by dot-notation path.
///
/// Path segments index into objects by key and into arrays by number, e.g.
/// `data.pages.0.cursor`. Returns `None` when any segment is absent.
pub fn json_value_at_path<'a>(
    value: &'a serde_json::Value,
    path: &str,
) -> Option<&'a serde_json::Value> {
    let mut current = value;

    for part in path.split('.') {
        match current {
            serde_json::Value::Object(map) => {
                current = map.get(part)?;
            }
            serde_json::Value::Array(items) => {
                let index: usize = part.parse().ok()?;
                current = items.get(index)?;
            }
            _ => return None,
        }
    }

    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_config::shared::RateLimitConfig;
    use serde_json::json;

    use crate::test_utils::ScriptedFetcher;
    use crate::types::Cell;

    fn unlimited() -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(&RateLimitConfig {
            requests_per_minute: 1000,
            requests_per_day: None,
        }))
    }

    fn page(rows: usize) -> PageResponse {
        PageResponse {
            rows: (0..rows).map(|i| Row::new(vec![Cell::Int(i as i64)])).collect(),
            next_cursor: None,
        }
    }

    fn cursor_page(rows: usize, next_cursor: Option<&str>) -> PageResponse {
        PageResponse {
            next_cursor: next_cursor.map(str::to_string),
            ..page(rows)
        }
    }

    fn offset_config(page_size: u32, max_pages: u32) -> PaginationConfig {
        PaginationConfig {
            mode: PaginationMode::Offset,
            page_size,
            start_page: 1,
            max_pages,
            cursor_path: None,
        }
    }

    fn cursor_config(page_size: u32, max_pages: u32) -> PaginationConfig {
        PaginationConfig {
            mode: PaginationMode::Cursor,
            page_size,
            start_page: 1,
            max_pages,
            cursor_path: Some("meta.next".into()),
        }
    }

    #[tokio::test]
    async fn offset_pagination_stops_on_short_page() {
        let fetcher = ScriptedFetcher::new(vec![Ok(page(2)), Ok(page(1))]);
        let mut paginator =
            Paginator::new(&offset_config(2, 100), unlimited(), RetryPolicy::none());

        let PageTurn::Page { rows, has_more } = paginator.next(&fetcher).await.unwrap() else {
            panic!("expected a page");
        };
        assert_eq!(rows.len(), 2);
        assert!(has_more);

        let PageTurn::Page { rows, has_more } = paginator.next(&fetcher).await.unwrap() else {
            panic!("expected a page");
        };
        assert_eq!(rows.len(), 1);
        assert!(!has_more);

        assert!(matches!(
            paginator.next(&fetcher).await.unwrap(),
            PageTurn::Finished
        ));
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn offset_pagination_never_exceeds_max_pages() {
        let fetcher = ScriptedFetcher::new(vec![Ok(page(2)), Ok(page(2)), Ok(page(2))]);
        let mut paginator = Paginator::new(&offset_config(2, 2), unlimited(), RetryPolicy::none());

        assert!(matches!(
            paginator.next(&fetcher).await.unwrap(),
            PageTurn::Page { has_more: true, .. }
        ));
        assert!(matches!(
            paginator.next(&fetcher).await.unwrap(),
            PageTurn::Page { has_more: false, .. }
        ));
        // The budget is checked before issuing a request.
        assert!(matches!(
            paginator.next(&fetcher).await.unwrap(),
            PageTurn::Finished
        ));
        assert_eq!(paginator.pages_fetched(), 2);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn cursor_pagination_stops_without_request_when_cursor_absent() {
        let fetcher = ScriptedFetcher::new(vec![Ok(cursor_page(2, None))]);
        let mut paginator = Paginator::new(&cursor_config(2, 100), unlimited(), RetryPolicy::none());

        assert!(matches!(
            paginator.next(&fetcher).await.unwrap(),
            PageTurn::Page { has_more: false, .. }
        ));
        assert!(matches!(
            paginator.next(&fetcher).await.unwrap(),
            PageTurn::Finished
        ));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn cursor_pagination_follows_tokens() {
        let fetcher = ScriptedFetcher::new(vec![
            Ok(cursor_page(2, Some("abc"))),
            Ok(cursor_page(2, Some("def"))),
            Ok(cursor_page(1, None)),
        ]);
        let mut paginator = Paginator::new(&cursor_config(2, 100), unlimited(), RetryPolicy::none());

        let mut total_rows = 0;
        while let PageTurn::Page { rows, .. } = paginator.next(&fetcher).await.unwrap() {
            total_rows += rows.len();
        }

        assert_eq!(total_rows, 5);
        assert_eq!(paginator.pages_fetched(), 3);
        assert_eq!(
            fetcher.requests().last(),
            Some(&PageRequest::Cursor {
                cursor: Some("def".into()),
                page_size: 2
            })
        );
    }

    #[tokio::test]
    async fn first_page_failure_fails_the_extraction() {
        let fetcher = ScriptedFetcher::new(vec![Err(conveyor_error!(
            ErrorKind::AuthenticationFailed,
            "Credentials rejected"
        ))]);
        let mut paginator =
            Paginator::new(&offset_config(2, 100), unlimited(), RetryPolicy::none());

        let err = paginator.next(&fetcher).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
        assert!(!paginator.truncated());
    }

    #[tokio::test]
    async fn later_page_failure_truncates() {
        let fetcher = ScriptedFetcher::new(vec![
            Ok(page(2)),
            Err(conveyor_error!(ErrorKind::MalformedResponse, "Bad body")),
        ]);
        let mut paginator =
            Paginator::new(&offset_config(2, 100), unlimited(), RetryPolicy::none());

        assert!(matches!(
            paginator.next(&fetcher).await.unwrap(),
            PageTurn::Page { .. }
        ));
        assert!(matches!(
            paginator.next(&fetcher).await.unwrap(),
            PageTurn::Finished
        ));
        assert!(paginator.truncated());
        assert_eq!(
            paginator.truncation_cause().unwrap().kind(),
            ErrorKind::MalformedResponse
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_the_same_page() {
        let fetcher = ScriptedFetcher::new(vec![
            Err(conveyor_error!(ErrorKind::TimedOut, "Request timed out")),
            Ok(page(1)),
        ]);
        let policy = RetryPolicy::new(
            2,
            std::time::Duration::from_millis(10),
            std::time::Duration::from_secs(1),
            2.0,
        );
        let mut paginator = Paginator::new(&offset_config(2, 100), unlimited(), policy);

        let PageTurn::Page { rows, has_more } = paginator.next(&fetcher).await.unwrap() else {
            panic!("expected a page");
        };
        assert_eq!(rows.len(), 1);
        assert!(!has_more);

        // Both attempts requested the same page index.
        let requests = fetcher.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], requests[1]);
    }

    #[test]
    fn json_path_lookup_handles_objects_and_arrays() {
        let body = json!({"data": {"pages": [{"cursor": "abc"}]}});

        assert_eq!(
            json_value_at_path(&body, "data.pages.0.cursor"),
            Some(&json!("abc"))
        );
        assert_eq!(json_value_at_path(&body, "data.missing"), None);
        assert_eq!(json_value_at_path(&body, "data.pages.7"), None);
    }
}
