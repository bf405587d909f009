use std::sync::Arc;
use std::time::Duration;

use conveyor::concurrency::shutdown::create_shutdown_channel;
use conveyor::error::{ConveyorError, ErrorKind};
use conveyor::extractor::Extractor;
use conveyor::extractor::paged::PagedExtractor;
use conveyor::resilience::paginator::PageResponse;
use conveyor::test_utils::{ScriptedFetcher, sample_row, sample_schema};
use conveyor::types::JobContext;
use conveyor_config::shared::{
    PaginationConfig, PaginationMode, PipelineSettings, RateLimitConfig, RetryConfig,
};
use conveyor_telemetry::init_test_tracing;
use tokio::time::Instant;

fn paged_context(continue_on_error: bool) -> JobContext {
    let (_tx, rx) = create_shutdown_channel();
    let settings = PipelineSettings {
        continue_on_error,
        ..Default::default()
    };
    JobContext::new("job_resilience".into(), settings, rx)
}

fn page_of(rows: usize) -> PageResponse {
    PageResponse {
        rows: (0..rows)
            .map(|i| sample_row(i as i64, "a", i as f64))
            .collect(),
        next_cursor: None,
    }
}

#[tokio::test(start_paused = true)]
async fn rate_limited_pages_are_at_least_a_minute_apart() {
    init_test_tracing();

    // Two required page fetches under a one-request-per-minute budget.
    let fetcher = Arc::new(ScriptedFetcher::new(vec![Ok(page_of(2)), Ok(page_of(1))]));
    let extractor = PagedExtractor::new(
        &paged_context(false),
        "orders",
        sample_schema(),
        fetcher.clone(),
        PaginationConfig {
            mode: PaginationMode::Offset,
            page_size: 2,
            start_page: 1,
            max_pages: 10,
            cursor_path: None,
        },
        &RateLimitConfig {
            requests_per_minute: 1,
            requests_per_day: None,
        },
        &RetryConfig::default(),
    );

    let started = Instant::now();
    let output = extractor.extract().await.unwrap();

    assert_eq!(output.record_count(), 3);
    assert_eq!(fetcher.calls(), 2);
    // Simulated time between the two fetches covers a full rate window.
    assert!(started.elapsed() >= Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn unlimited_budget_adds_no_latency() {
    init_test_tracing();

    let fetcher = Arc::new(ScriptedFetcher::new(vec![Ok(page_of(2)), Ok(page_of(1))]));
    let extractor = PagedExtractor::new(
        &paged_context(false),
        "orders",
        sample_schema(),
        fetcher,
        PaginationConfig {
            mode: PaginationMode::Offset,
            page_size: 2,
            start_page: 1,
            max_pages: 10,
            cursor_path: None,
        },
        &RateLimitConfig {
            requests_per_minute: 100,
            requests_per_day: None,
        },
        &RetryConfig::default(),
    );

    let started = Instant::now();
    extractor.extract().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn retries_back_off_before_succeeding() {
    init_test_tracing();

    let fetcher = Arc::new(ScriptedFetcher::new(vec![
        Err(ConveyorError::from((
            ErrorKind::TimedOut,
            "Request timed out",
        ))),
        Ok(page_of(1)),
    ]));
    let extractor = PagedExtractor::new(
        &paged_context(false),
        "orders",
        sample_schema(),
        fetcher.clone(),
        PaginationConfig {
            mode: PaginationMode::Offset,
            page_size: 2,
            start_page: 1,
            max_pages: 10,
            cursor_path: None,
        },
        &RateLimitConfig::default(),
        &RetryConfig {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_factor: 2.0,
        },
    );

    let started = Instant::now();
    let output = extractor.extract().await.unwrap();

    assert_eq!(output.record_count(), 1);
    assert_eq!(fetcher.calls(), 2);
    // The single retry waited the initial backoff delay.
    assert!(started.elapsed() >= Duration::from_millis(500));
}
