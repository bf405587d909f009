use std::path::{Path, PathBuf};
use std::process::ExitCode;

use conveyor::error::{ConveyorError, ErrorKind};
use conveyor::pipeline::{Pipeline, RunMode};
use conveyor::registry::Registry;
use conveyor::types::JobReport;
use conveyor_config::load_from_path;
use conveyor_config::shared::JobConfig;
use tracing::{error, info, warn};

use crate::{Args, EXIT_CONFIG, EXIT_FAILED};

/// Loads the configuration, runs the pipeline, and maps the outcome to an
/// exit code.
///
/// Exit 0 covers `completed_success` and `completed_partial` (validate-only
/// and dry runs count as success); a partial run is only visible in the
/// status field of the report.
pub async fn run_job(args: Args) -> ExitCode {
    let config: JobConfig = match load_from_path(&args.config) {
        Ok(config) => config,
        Err(err) => {
            error!(path = %args.config.display(), "failed to load job configuration: {err}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let mode = if args.validate_only {
        RunMode::ValidateOnly
    } else if args.dry_run {
        RunMode::DryRun
    } else {
        RunMode::Full
    };

    let pipeline = match Pipeline::new(args.job_id.clone(), config, Registry::with_builtins()) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            error!("invalid job configuration: {err}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    info!(job_id = pipeline.job_id(), config = %args.config.display(), "job starting");

    // Listen for termination signals and translate them into a pipeline
    // shutdown, so in-flight pages and batches can finish cleanly.
    let shutdown_tx = pipeline.shutdown_tx();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        warn!("shutdown signal received, cancelling the run");
        let _ = shutdown_tx.shutdown();
    });

    match pipeline.run(mode).await {
        Ok(report) => {
            log_report(&report);

            if mode == RunMode::Full
                && let Err(err) = write_report(&args.output_dir, &report)
            {
                warn!("failed to write the job report: {err}");
            }

            if report.status.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_FAILED)
            }
        }
        Err(err) => {
            error!("job aborted: {err}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

/// Configuration and validation problems get their own exit code so wrappers
/// can distinguish a broken job file from a failed run.
fn exit_code_for(err: &ConveyorError) -> u8 {
    match err.kind() {
        ErrorKind::ConfigError | ErrorKind::MissingDataset | ErrorKind::ValidationFailed => {
            EXIT_CONFIG
        }
        _ => EXIT_FAILED,
    }
}

/// Logs the human-readable job summary, enumerating every failed stage with
/// its error category and message.
fn log_report(report: &JobReport) {
    info!(
        job_id = report.job_id,
        status = %report.status,
        duration_ms = report.duration_ms,
        stages = report.stages.len(),
        records_loaded = report.records_loaded(),
        "job finished"
    );

    for stage in &report.stages {
        if stage.success {
            info!(
                stage = stage.stage,
                kind = stage.kind,
                records_in = stage.records_in,
                records_out = stage.records_out,
                duration_ms = stage.duration_ms,
                "stage summary"
            );
        } else {
            error!(
                stage = stage.stage,
                kind = stage.kind,
                error_kind = stage.error_kind.as_deref().unwrap_or("unknown"),
                error = stage.error.as_deref().unwrap_or("unknown"),
                "stage failed"
            );
        }
    }
}

/// Writes the JSON job report to `<output_dir>/<job_id>_report.json`.
fn write_report(output_dir: &Path, report: &JobReport) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let path = output_dir.join(format!("{}_report.json", report.job_id));
    let body = serde_json::to_string_pretty(report)?;
    std::fs::write(&path, body)?;

    info!(path = %path.display(), "job report written");

    Ok(path)
}

/// Waits for SIGTERM or SIGINT (Ctrl+C elsewhere).
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
        let mut sigint =
            signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
