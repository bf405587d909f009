use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use conveyor_telemetry::{TelemetryConfig, init_tracing};

use crate::core::run_job;

mod core;

/// Exit code for a run that finished with status `failed`.
const EXIT_FAILED: u8 = 1;
/// Exit code for configuration errors, before any stage ran.
const EXIT_CONFIG: u8 = 2;

/// Declarative batch ETL job runner.
#[derive(Debug, Parser)]
#[command(name = "conveyor", version, about)]
pub struct Args {
    /// Path to the job configuration file (YAML).
    #[arg(short, long)]
    pub config: PathBuf,

    /// Log level directive for the log file, or for the console when no log
    /// file is configured (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path of the JSON log file; console-only logging when omitted.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Console log level when a log file is also configured.
    #[arg(long)]
    pub console_level: Option<String>,

    /// Directory for the job summary report.
    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,

    /// Set up the pipeline and validate sources/destinations without moving
    /// any data.
    #[arg(long)]
    pub dry_run: bool,

    /// Validate the configuration without instantiating any connector.
    #[arg(long)]
    pub validate_only: bool,

    /// Custom job id for this run; generated when omitted.
    #[arg(long)]
    pub job_id: Option<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let telemetry = TelemetryConfig {
        log_level: args.log_level.clone(),
        console_level: args.console_level.clone(),
        log_file: args.log_file.clone(),
    };
    let _log_flusher = match init_tracing(&telemetry) {
        Ok(flusher) => flusher,
        Err(err) => {
            eprintln!("failed to initialize logging: {err}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!("failed to start the async runtime: {err}");
            return ExitCode::from(EXIT_FAILED);
        }
    };

    runtime.block_on(run_job(args))
}
