//! Core pipeline orchestration and execution.
//!
//! Contains the [`Pipeline`] struct that sequences extraction, transformation
//! and loading phases over the dataset store, enforcing static dependency
//! validation before any I/O and converging on a single final job status.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use conveyor_config::shared::JobConfig;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::bail;
use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use crate::conveyor_error;
use crate::error::{ConveyorError, ConveyorResult, ErrorKind};
use crate::registry::Registry;
use crate::stage::{BoundStage, StageComponent, StageKind, StageResult, StageRunner, StageSpec};
use crate::store::DatasetStore;
use crate::types::{JobContext, JobId, JobReport, JobStatus, generate_job_id};

/// How much of the pipeline lifecycle a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Validate, set up, and execute all phases.
    Full,
    /// Stop after static validation, before any component is constructed.
    ValidateOnly,
    /// Stop after setup and the source/destination validation hooks, before
    /// any data moves.
    DryRun,
}

/// Phases of one pipeline run, in order.
///
/// All extraction stages complete before any transform begins, and all
/// transforms before any load. The model deliberately does not interleave
/// extraction and transformation of different datasets: some pipelining
/// opportunity is traded for a simple, auditable state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelinePhase {
    Validating,
    SettingUp,
    Extracting,
    Transforming,
    Loading,
}

impl std::fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelinePhase::Validating => write!(f, "validating"),
            PipelinePhase::SettingUp => write!(f, "setting_up"),
            PipelinePhase::Extracting => write!(f, "extracting"),
            PipelinePhase::Transforming => write!(f, "transforming"),
            PipelinePhase::Loading => write!(f, "loading"),
        }
    }
}

/// Top-level orchestrator of one ETL job run.
///
/// A [`Pipeline`] owns the dataset store and the shutdown channel for the
/// duration of the run. Connectors are resolved through the [`Registry`] and
/// receive the per-run [`JobContext`]; no mutable state survives the run
/// beyond the returned [`JobReport`].
pub struct Pipeline {
    config: Arc<JobConfig>,
    registry: Arc<Registry>,
    job_id: JobId,
    shutdown_tx: ShutdownTx,
    shutdown_rx: ShutdownRx,
}

impl Pipeline {
    /// Creates a pipeline for the given job configuration.
    ///
    /// Structural configuration problems are rejected here, before a job id
    /// even appears in the logs of a run.
    pub fn new(
        job_id: Option<JobId>,
        config: JobConfig,
        registry: Registry,
    ) -> ConveyorResult<Self> {
        config.validate()?;

        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            job_id: job_id.unwrap_or_else(generate_job_id),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Returns the unique identifier for this job run.
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Returns a handle for cancelling this run.
    ///
    /// On cancellation, in-flight units of work (one page, one batch) finish
    /// and no new units start; results already committed are not rolled back.
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Runs the job to completion and returns its report.
    ///
    /// Errors are returned only for problems that abort before execution
    /// (configuration and static validation); everything that happens once
    /// stages start running is captured in the report instead.
    pub async fn run(self, mode: RunMode) -> ConveyorResult<JobReport> {
        info!(job_id = self.job_id, phase = %PipelinePhase::Validating, "starting pipeline");

        let load_sources = validate_dependencies(&self.config)?;

        if mode == RunMode::ValidateOnly {
            info!(job_id = self.job_id, "validation succeeded, stopping as requested");
            let ctx = self.context();
            return Ok(JobReport::new(
                self.job_id.clone(),
                JobStatus::CompletedSuccess,
                ctx.started_at,
                &[],
            ));
        }

        info!(job_id = self.job_id, phase = %PipelinePhase::SettingUp, "setting up components");

        let ctx = self.context();
        let store = DatasetStore::new();
        let continue_on_error = ctx.settings.continue_on_error;

        let plan = self.setup(&ctx, &load_sources)?;
        let (stages, mut results) = Self::run_validation_hooks(plan).await;
        let setup_failures = !results.is_empty();

        if setup_failures && !continue_on_error {
            error!(job_id = self.job_id, "component validation failed, aborting run");
            return Ok(self
                .finalize(&ctx, JobStatus::Failed, results, &store)
                .await);
        }

        if mode == RunMode::DryRun {
            let status = if setup_failures {
                JobStatus::CompletedPartial
            } else {
                JobStatus::CompletedSuccess
            };
            info!(job_id = self.job_id, "dry run finished without moving data");
            return Ok(self.finalize(&ctx, status, results, &store).await);
        }

        let StagePlan {
            extracts,
            transforms,
            loads,
        } = stages;

        // Extraction phase: independent stages run concurrently, bounded by
        // the configured parallelism limit.
        info!(job_id = self.job_id, phase = %PipelinePhase::Extracting, stages = extracts.len(), "starting phase");
        let extract_results = self
            .run_concurrent_phase(&ctx, extracts, &store, ctx.settings.max_parallel_extractors)
            .await;
        let extraction_failed = extract_results.iter().any(|result| !result.success);
        let records_extracted: u64 = extract_results
            .iter()
            .map(|result| result.records_out)
            .sum();
        results.extend(extract_results);

        if extraction_failed && !continue_on_error {
            return Ok(self
                .finalize(&ctx, JobStatus::Failed, results, &store)
                .await);
        }
        if let Some(aborted) = self.check_cancelled(&ctx, &mut results, StageKind::Transform) {
            return Ok(self.finalize(&ctx, aborted, results, &store).await);
        }

        // A run whose sources yielded nothing completes without touching any
        // destination.
        if records_extracted == 0 && !extraction_failed {
            warn!(job_id = self.job_id, "no records extracted, skipping transform and load phases");
            return Ok(self
                .finalize(&ctx, JobStatus::CompletedSuccess, results, &store)
                .await);
        }

        // Transform phase: strictly sequential in configured order, since a
        // later transform may read datasets produced by an earlier one.
        info!(job_id = self.job_id, phase = %PipelinePhase::Transforming, stages = transforms.len(), "starting phase");
        let runner = StageRunner::new(ctx.clone());
        for stage in transforms {
            if let Some(aborted) = self.check_cancelled(&ctx, &mut results, StageKind::Transform) {
                return Ok(self.finalize(&ctx, aborted, results, &store).await);
            }

            let result = runner.run(&stage, &store).await;
            let failed = !result.success;
            results.push(result);

            if failed && !continue_on_error {
                return Ok(self
                    .finalize(&ctx, JobStatus::Failed, results, &store)
                    .await);
            }
        }

        if let Some(aborted) = self.check_cancelled(&ctx, &mut results, StageKind::Load) {
            return Ok(self.finalize(&ctx, aborted, results, &store).await);
        }

        // Load phase: independent destinations load concurrently.
        info!(job_id = self.job_id, phase = %PipelinePhase::Loading, stages = loads.len(), "starting phase");
        let load_results = self
            .run_concurrent_phase(&ctx, loads, &store, ctx.settings.max_parallel_loaders)
            .await;
        let loading_failed = load_results.iter().any(|result| !result.success);
        results.extend(load_results);

        if loading_failed && !continue_on_error {
            return Ok(self
                .finalize(&ctx, JobStatus::Failed, results, &store)
                .await);
        }

        let status = if results.iter().all(|result| result.success) {
            JobStatus::CompletedSuccess
        } else {
            JobStatus::CompletedPartial
        };

        Ok(self.finalize(&ctx, status, results, &store).await)
    }

    fn context(&self) -> JobContext {
        JobContext::new(
            self.job_id.clone(),
            self.config.pipeline.clone(),
            self.shutdown_rx.clone(),
        )
    }

    /// Constructs every component through the registry and runs the
    /// source/destination validation hooks.
    ///
    /// Construction failures are configuration errors and abort immediately;
    /// hook failures are per-stage validation failures returned as failed
    /// stage results.
    fn setup(&self, ctx: &JobContext, load_sources: &[String]) -> ConveyorResult<StagePlan> {
        let timeout = self.config.pipeline.stage_timeout_ms.map(Duration::from_millis);

        let mut extracts = Vec::with_capacity(self.config.extractors.len());
        for config in &self.config.extractors {
            let spec = StageSpec {
                name: config.name.clone(),
                kind: StageKind::Extract,
                inputs: Vec::new(),
                outputs: config.output_names(),
                timeout,
                batch: None,
            };
            let extractor = self.registry.build_extractor(ctx, config)?;
            extracts.push(BoundStage {
                spec,
                component: StageComponent::Extractor(extractor),
            });
        }

        let mut transforms = Vec::with_capacity(self.config.transformers.len());
        for config in &self.config.transformers {
            let spec = StageSpec {
                name: config.name.clone(),
                kind: StageKind::Transform,
                inputs: config.inputs.clone(),
                outputs: config.output_names(),
                timeout,
                batch: None,
            };
            let transformer = self.registry.build_transformer(ctx, config)?;
            transforms.push(BoundStage {
                spec,
                component: StageComponent::Transformer(transformer),
            });
        }

        let mut loads = Vec::with_capacity(self.config.loaders.len());
        for (config, source) in self.config.loaders.iter().zip(load_sources) {
            let spec = StageSpec {
                name: config.name.clone(),
                kind: StageKind::Load,
                inputs: vec![source.clone()],
                outputs: Vec::new(),
                timeout,
                batch: Some(config.batch.clone()),
            };
            let loader = self.registry.build_loader(ctx, config)?;
            loads.push(BoundStage {
                spec,
                component: StageComponent::Loader(loader),
            });
        }

        Ok(StagePlan {
            extracts,
            transforms,
            loads,
        })
    }

    /// Runs the validation hooks of every bound component, returning failed
    /// stage results for hooks that rejected their source or destination and
    /// retaining only the stages that passed.
    async fn run_validation_hooks(
        plan: StagePlan,
    ) -> (StagePlan, Vec<StageResult>) {
        let mut failures = Vec::new();

        let mut extracts = Vec::with_capacity(plan.extracts.len());
        for stage in plan.extracts {
            let StageComponent::Extractor(extractor) = &stage.component else {
                unreachable!("extract plan only holds extractors");
            };

            match extractor.validate_source().await {
                Ok(()) => extracts.push(stage),
                Err(err) => failures.push(StageResult::failed(
                    stage.spec.name.clone(),
                    StageKind::Extract,
                    conveyor_error!(ErrorKind::ValidationFailed, "Source validation failed", err),
                )),
            }
        }

        let mut loads = Vec::with_capacity(plan.loads.len());
        for stage in plan.loads {
            let StageComponent::Loader(loader) = &stage.component else {
                unreachable!("load plan only holds loaders");
            };

            match loader.validate_destination().await {
                Ok(()) => loads.push(stage),
                Err(err) => failures.push(StageResult::failed(
                    stage.spec.name.clone(),
                    StageKind::Load,
                    conveyor_error!(
                        ErrorKind::ValidationFailed,
                        "Destination validation failed",
                        err
                    ),
                )),
            }
        }

        (
            StagePlan {
                extracts,
                transforms: plan.transforms,
                loads,
            },
            failures,
        )
    }

    /// Runs one phase's stages concurrently, bounded by a semaphore.
    async fn run_concurrent_phase(
        &self,
        ctx: &JobContext,
        stages: Vec<BoundStage>,
        store: &DatasetStore,
        parallelism: u16,
    ) -> Vec<StageResult> {
        let semaphore = Arc::new(Semaphore::new(parallelism as usize));
        let mut join_set = JoinSet::new();

        for stage in stages {
            let semaphore = semaphore.clone();
            let store = store.clone();
            let runner = StageRunner::new(ctx.clone());

            join_set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return StageResult::failed(
                        stage.spec.name.clone(),
                        stage.spec.kind,
                        ConveyorError::from((
                            ErrorKind::InvalidState,
                            "Stage permit pool closed before the stage could run",
                        )),
                    );
                };

                runner.run(&stage, &store).await
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(join_err) => {
                    error!("a stage task panicked: {join_err}");
                    results.push(StageResult::failed(
                        "unknown",
                        StageKind::Extract,
                        conveyor_error!(
                            ErrorKind::InvalidState,
                            "Stage task panicked",
                            join_err
                        ),
                    ));
                }
            }
        }

        // Completion order is nondeterministic under concurrency; reports
        // stay stable when sorted by stage name.
        results.sort_by(|a, b| a.stage.cmp(&b.stage));
        results
    }

    /// Appends a cancellation record and maps the run to `Failed` when the
    /// shutdown signal has been observed.
    fn check_cancelled(
        &self,
        ctx: &JobContext,
        results: &mut Vec<StageResult>,
        next_phase: StageKind,
    ) -> Option<JobStatus> {
        if !ctx.is_cancelled() {
            return None;
        }

        warn!(job_id = self.job_id, "run cancelled, no further stages will start");
        results.push(StageResult::failed(
            "pipeline",
            next_phase,
            ConveyorError::from((ErrorKind::Cancelled, "Run cancelled by shutdown signal")),
        ));

        Some(JobStatus::Failed)
    }

    async fn finalize(
        &self,
        ctx: &JobContext,
        status: JobStatus,
        results: Vec<StageResult>,
        store: &DatasetStore,
    ) -> JobReport {
        if status == JobStatus::Failed {
            // Diagnostic dump: the store is discarded with the run, so record
            // what it held at the moment of failure.
            let summary = store.summary().await;
            error!(job_id = self.job_id, datasets = ?summary, "run failed");
        }

        let report = JobReport::new(self.job_id.clone(), status, ctx.started_at, &results);
        info!(
            job_id = self.job_id,
            status = %status,
            stages = report.stages.len(),
            duration_ms = report.duration_ms,
            "pipeline finished"
        );

        report
    }
}

struct StagePlan {
    extracts: Vec<BoundStage>,
    transforms: Vec<BoundStage>,
    loads: Vec<BoundStage>,
}

/// Static dataset dependency check, before any I/O occurs.
///
/// Walks the configured stages in execution order and verifies that every
/// declared transform input and load source is produced by an earlier stage.
/// Returns the resolved source dataset name for every loader.
fn validate_dependencies(config: &JobConfig) -> ConveyorResult<Vec<String>> {
    let mut produced: HashSet<String> = HashSet::new();

    for extractor in &config.extractors {
        for name in extractor.output_names() {
            produced.insert(name);
        }
    }

    for transformer in &config.transformers {
        for input in &transformer.inputs {
            if !produced.contains(input) {
                bail!(
                    ErrorKind::MissingDataset,
                    "Transform input is not produced by any earlier stage",
                    format!("transformer '{}' reads '{input}'", transformer.name)
                );
            }
        }
        for name in transformer.output_names() {
            produced.insert(name);
        }
    }

    // The default load source is the sole dataset left by the phase that
    // immediately precedes loading.
    let preceding_outputs: Vec<String> = match config.transformers.last() {
        Some(transformer) => transformer.output_names(),
        None => config
            .extractors
            .iter()
            .flat_map(|extractor| extractor.output_names())
            .collect(),
    };

    let mut sources = Vec::with_capacity(config.loaders.len());
    for loader in &config.loaders {
        let source = match &loader.source_dataset {
            Some(source) => {
                if !produced.contains(source) {
                    bail!(
                        ErrorKind::MissingDataset,
                        "Load source is not produced by any earlier stage",
                        format!("loader '{}' reads '{source}'", loader.name)
                    );
                }
                source.clone()
            }
            None => {
                if preceding_outputs.len() != 1 {
                    bail!(
                        ErrorKind::ConfigError,
                        "Load source is ambiguous",
                        format!(
                            "loader '{}' declares no `source_dataset` and the preceding phase \
                             leaves {} datasets",
                            loader.name,
                            preceding_outputs.len()
                        )
                    );
                }
                preceding_outputs[0].clone()
            }
        };
        sources.push(source);
    }

    Ok(sources)
}
