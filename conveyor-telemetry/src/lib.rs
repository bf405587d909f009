//! Telemetry initialization for conveyor binaries and tests.
//!
//! Sets up structured logging with `tracing`: pretty ANSI console output by
//! default, plus an optional JSON log file with a non-blocking appender for
//! unattended runs.

use std::io::Error;
use std::path::{Path, PathBuf};
use std::{
    backtrace::{Backtrace, BacktraceStatus},
    panic::PanicHookInfo,
    sync::Once,
};
use thiserror::Error;
use tracing::subscriber::{SetGlobalDefaultError, set_global_default};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::{LogTracer, log_tracer::SetLoggerError};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::{EnvFilter, FmtSubscriber, Layer, Registry, fmt, layer::SubscriberExt};

/// Default directive applied when neither a level flag nor `RUST_LOG` is set.
const DEFAULT_LOG_DIRECTIVE: &str = "info";

/// Errors that can occur during tracing initialization.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to parse log filter directive: {0}")]
    InvalidFilter(#[from] ParseError),

    #[error("failed to init log tracer: {0}")]
    InitLogTracer(#[from] SetLoggerError),

    #[error("failed to set global default subscriber: {0}")]
    SetGlobalDefault(#[from] SetGlobalDefaultError),

    #[error("an io error occurred: {0}")]
    Io(#[from] Error),
}

/// Logging destinations and levels for one process.
#[derive(Debug, Default, Clone)]
pub struct TelemetryConfig {
    /// Level directive for the log file (and for the console when no file is
    /// configured). Falls back to `RUST_LOG`, then to `info`.
    pub log_level: Option<String>,
    /// Level directive for console output when a log file is also configured.
    pub console_level: Option<String>,
    /// Path of the JSON log file; console-only logging when unset.
    pub log_file: Option<PathBuf>,
}

/// Log flusher handle for ensuring logs are written before shutdown.
///
/// File logging returns a [`WorkerGuard`] that must be kept alive until the
/// process exits, otherwise buffered log lines may be lost.
#[must_use]
pub enum LogFlusher {
    /// Flusher backing a non-blocking file appender.
    Flusher(WorkerGuard),
    /// Console logging does not require explicit flushing.
    NullFlusher,
}

static INIT_TEST_TRACING: Once = Once::new();

/// Initializes tracing for test environments.
///
/// Call once at the beginning of tests. Set `ENABLE_TRACING=1` to view tracing
/// output:
/// ```bash
/// ENABLE_TRACING=1 cargo test test_name
/// ```
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var("ENABLE_TRACING").is_ok() {
            let _log_flusher = init_tracing(&TelemetryConfig::default())
                .expect("Failed to initialize tracing for tests");
        }
    });
}

/// Initializes tracing for the application.
///
/// Without a log file, events go to the console in a pretty, ANSI-colored
/// format. With a log file, events are written as JSON lines through a
/// non-blocking appender while the console keeps a compact format at its own
/// level.
pub fn init_tracing(config: &TelemetryConfig) -> Result<LogFlusher, TracingError> {
    // Initialize the log tracer so that events emitted through the `log`
    // crate by third-party libraries are captured by the subscriber too.
    LogTracer::init()?;

    let log_flusher = match &config.log_file {
        Some(log_file) => configure_file_tracing(config, log_file)?,
        None => configure_console_tracing(config)?,
    };

    set_tracing_panic_hook();

    // Return the log flusher to ensure logs are flushed before the application
    // exits, without this the logs in memory may not be flushed to the file.
    Ok(log_flusher)
}

/// Builds an [`EnvFilter`] from an explicit directive, `RUST_LOG`, or the
/// default level, in that order.
fn build_filter(directive: Option<&str>) -> Result<EnvFilter, TracingError> {
    match directive {
        Some(directive) => Ok(EnvFilter::try_new(directive)?),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE))),
    }
}

/// Configures JSON file logging with a secondary console layer.
fn configure_file_tracing(
    config: &TelemetryConfig,
    log_file: &Path,
) -> Result<LogFlusher, TracingError> {
    let directory = log_file.parent().unwrap_or_else(|| Path::new("."));
    let file_name = log_file
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "conveyor.log".into());

    std::fs::create_dir_all(directory)?;

    // Create a non-blocking appender to avoid stalling pipeline tasks while
    // log lines are written to disk.
    let file_appender = tracing_appender::rolling::never(directory, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_format = fmt::format()
        .with_level(true)
        // ANSI colors are only for terminal output.
        .with_ansi(false)
        .with_target(false);

    let file_layer = fmt::layer()
        .event_format(file_format)
        .with_writer(file_writer)
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_filter(build_filter(config.log_level.as_deref())?);

    let console_layer = fmt::layer()
        .with_ansi(true)
        .with_target(false)
        .with_filter(build_filter(config.console_level.as_deref())?);

    let subscriber = Registry::default().with(file_layer).with(console_layer);

    set_global_default(subscriber)?;

    Ok(LogFlusher::Flusher(guard))
}

/// Configures pretty console logging for interactive runs.
fn configure_console_tracing(config: &TelemetryConfig) -> Result<LogFlusher, TracingError> {
    let format = fmt::format()
        // Emit the log level in the log output.
        .with_level(true)
        // Enable ANSI colors for terminal output.
        .with_ansi(true)
        // Make it pretty.
        .pretty()
        // Disable line number and file in the log output to reduce noise.
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    let subscriber = FmtSubscriber::builder()
        .event_format(format)
        .with_env_filter(build_filter(config.log_level.as_deref())?)
        .finish();

    set_global_default(subscriber)?;

    Ok(LogFlusher::NullFlusher)
}

/// Sets up a custom panic hook for structured panic logging.
///
/// Replaces the default panic hook so that panic information is captured by
/// the tracing system instead of only going to stderr.
fn set_tracing_panic_hook() {
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        panic_hook(info);
        prev_hook(info);
    }));
}

/// Custom panic hook that logs panic information using tracing.
fn panic_hook(panic_info: &PanicHookInfo) {
    let backtrace = Backtrace::capture();
    let (backtrace, note) = match backtrace.status() {
        BacktraceStatus::Captured => (Some(backtrace), None),
        BacktraceStatus::Disabled => (
            None,
            Some("run with RUST_BACKTRACE=1 to display backtraces"),
        ),
        BacktraceStatus::Unsupported => {
            (None, Some("backtraces are not supported on this platform"))
        }
        _ => (None, Some("backtrace status is unknown")),
    };

    let payload = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    };

    let location = panic_info.location().map(|location| location.to_string());

    tracing::error!(
        panic.payload = payload,
        panic.location = location,
        panic.backtrace = backtrace.map(tracing::field::display),
        panic.note = note,
        "a panic occurred",
    );
}
