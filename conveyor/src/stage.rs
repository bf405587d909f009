//! Execution of a single pipeline stage with error classification, retry
//! handling, and metrics capture.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use conveyor_config::shared::LoadBatchConfig;
use tracing::{debug, info, warn};

use crate::conveyor_error;
use crate::error::{ConveyorError, ConveyorResult, ErrorKind};
use crate::extractor::Extractor;
use crate::loader::chunked::load_chunked;
use crate::loader::Loader;
use crate::resilience::retry::RetryPolicy;
use crate::store::DatasetStore;
use crate::transformer::{TransformInput, TransformOutput, Transformer};
use crate::types::JobContext;

/// The kind of work a stage performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Extract,
    Transform,
    Load,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageKind::Extract => write!(f, "extract"),
            StageKind::Transform => write!(f, "transform"),
            StageKind::Load => write!(f, "load"),
        }
    }
}

/// Identity and dataset wiring of one stage.
#[derive(Debug, Clone)]
pub struct StageSpec {
    pub name: String,
    pub kind: StageKind,
    /// Datasets read from the store. Empty for extraction; the single source
    /// dataset for loads.
    pub inputs: Vec<String>,
    /// Datasets left registered after the stage runs.
    pub outputs: Vec<String>,
    /// Per-stage timeout; expiry counts as a transient failure.
    pub timeout: Option<Duration>,
    /// Chunked loading configuration, load stages only.
    pub batch: Option<LoadBatchConfig>,
}

/// The concrete connector bound to a stage.
pub enum StageComponent {
    Extractor(Box<dyn Extractor>),
    Transformer(Box<dyn Transformer>),
    Loader(Box<dyn Loader>),
}

/// A stage ready to run: its spec plus the constructed connector.
pub struct BoundStage {
    pub spec: StageSpec,
    pub component: StageComponent,
}

/// Outcome of one stage execution.
#[derive(Debug)]
pub struct StageResult {
    pub stage: String,
    pub kind: StageKind,
    pub success: bool,
    pub records_in: u64,
    pub records_out: u64,
    pub duration: Duration,
    pub error: Option<ConveyorError>,
}

impl StageResult {
    /// A failure produced outside normal execution, e.g. a validation hook.
    pub fn failed(stage: impl Into<String>, kind: StageKind, error: ConveyorError) -> Self {
        Self {
            stage: stage.into(),
            kind,
            success: false,
            records_in: 0,
            records_out: 0,
            duration: Duration::ZERO,
            error: Some(error),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct StageCounts {
    records_in: u64,
    records_out: u64,
}

/// Executes one stage against the dataset store.
///
/// Transient failures are retried within the pipeline's retry policy; the
/// retries stay invisible to the pipeline unless the budget is exhausted.
/// Every outcome, success or failure, is captured as a [`StageResult`].
pub struct StageRunner {
    ctx: JobContext,
    retry: RetryPolicy,
}

impl StageRunner {
    pub fn new(ctx: JobContext) -> Self {
        let retry = RetryPolicy::from_config(&ctx.settings.retry);
        Self { ctx, retry }
    }

    pub async fn run(&self, stage: &BoundStage, store: &DatasetStore) -> StageResult {
        let started = Instant::now();
        info!(stage = stage.spec.name, kind = %stage.spec.kind, "running stage");

        let mut attempt = 0;
        let (counts, error) = loop {
            let (counts, error) = self.attempt(stage, store).await;

            match error {
                Some(err) if self.may_retry(stage, counts, &err, attempt) => {
                    let delay = self.retry.next_delay(attempt);
                    warn!(
                        stage = stage.spec.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "stage failed with a transient error, retrying: {err}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                error => break (counts, error),
            }
        };

        let duration = started.elapsed();
        match &error {
            None => info!(
                stage = stage.spec.name,
                records_in = counts.records_in,
                records_out = counts.records_out,
                duration_ms = duration.as_millis() as u64,
                "stage completed"
            ),
            Some(err) => warn!(
                stage = stage.spec.name,
                duration_ms = duration.as_millis() as u64,
                "stage failed: {err}"
            ),
        }

        StageResult {
            stage: stage.spec.name.clone(),
            kind: stage.spec.kind,
            success: error.is_none(),
            records_in: counts.records_in,
            records_out: counts.records_out,
            duration,
            error,
        }
    }

    /// Whether a failed attempt is eligible for another try.
    ///
    /// A load stage that already committed batches is never rerun, because
    /// committed batches stand and a rerun would duplicate them.
    fn may_retry(
        &self,
        stage: &BoundStage,
        counts: StageCounts,
        error: &ConveyorError,
        attempt: u32,
    ) -> bool {
        if stage.spec.kind == StageKind::Load && counts.records_out > 0 {
            return false;
        }

        self.retry.should_retry(attempt, error.kind())
    }

    async fn attempt(&self, stage: &BoundStage, store: &DatasetStore) -> (StageCounts, Option<ConveyorError>) {
        match stage.spec.timeout {
            Some(timeout) => {
                match tokio::time::timeout(timeout, self.attempt_inner(stage, store)).await {
                    Ok(outcome) => outcome,
                    Err(_) => (
                        StageCounts::default(),
                        Some(conveyor_error!(
                            ErrorKind::TimedOut,
                            "Stage timed out",
                            format!(
                                "stage '{}' exceeded {}ms",
                                stage.spec.name,
                                timeout.as_millis()
                            )
                        )),
                    ),
                }
            }
            None => self.attempt_inner(stage, store).await,
        }
    }

    async fn attempt_inner(
        &self,
        stage: &BoundStage,
        store: &DatasetStore,
    ) -> (StageCounts, Option<ConveyorError>) {
        match &stage.component {
            StageComponent::Extractor(extractor) => {
                match self.run_extract(&stage.spec, extractor.as_ref(), store).await {
                    Ok(counts) => (counts, None),
                    Err(err) => (StageCounts::default(), Some(err)),
                }
            }
            StageComponent::Transformer(transformer) => {
                match self
                    .run_transform(&stage.spec, transformer.as_ref(), store)
                    .await
                {
                    Ok(counts) => (counts, None),
                    Err(err) => (StageCounts::default(), Some(err)),
                }
            }
            StageComponent::Loader(loader) => {
                self.run_load(&stage.spec, loader.as_ref(), store).await
            }
        }
    }

    async fn run_extract(
        &self,
        spec: &StageSpec,
        extractor: &dyn Extractor,
        store: &DatasetStore,
    ) -> ConveyorResult<StageCounts> {
        let output = extractor.extract().await?;
        let records = output.record_count();

        let mut datasets = output.into_datasets();

        // A single produced dataset is registered under the stage's declared
        // output name; multi-dataset extractors name their own outputs.
        if datasets.len() == 1 && spec.outputs.len() == 1 {
            let dataset = datasets.remove(0).renamed(spec.outputs[0].clone());
            datasets.push(dataset);
        }

        let produced: HashSet<String> = datasets.iter().map(|d| d.name.clone()).collect();
        for declared in &spec.outputs {
            if !produced.contains(declared) {
                warn!(
                    stage = spec.name,
                    dataset = declared,
                    "declared output dataset was not produced by the extractor"
                );
            }
        }

        for dataset in datasets {
            store.register(dataset).await;
        }

        Ok(StageCounts {
            records_in: records,
            records_out: records,
        })
    }

    async fn run_transform(
        &self,
        spec: &StageSpec,
        transformer: &dyn Transformer,
        store: &DatasetStore,
    ) -> ConveyorResult<StageCounts> {
        let mut inputs = Vec::with_capacity(spec.inputs.len());
        for name in &spec.inputs {
            inputs.push(store.get(name).await?);
        }

        let records_in: u64 = inputs.iter().map(|d| d.len() as u64).sum();
        let input = if inputs.len() == 1 {
            TransformInput::Single(inputs.remove(0))
        } else {
            TransformInput::Many(inputs)
        };

        let output = transformer.transform(input).await?;
        let records_out = output.record_count();

        match output {
            TransformOutput::Replace(dataset) => {
                store
                    .register(dataset.renamed(spec.inputs[0].clone()))
                    .await;
            }
            TransformOutput::Datasets(datasets) => {
                let returned: HashSet<String> = datasets.iter().map(|d| d.name.clone()).collect();

                for dataset in datasets {
                    store.register(dataset).await;
                }

                // A consuming transform retires inputs it did not return.
                for input_name in &spec.inputs {
                    if !returned.contains(input_name) && store.remove(input_name).await.is_some() {
                        debug!(
                            stage = spec.name,
                            dataset = input_name,
                            "input dataset retired by transform"
                        );
                    }
                }
            }
        }

        Ok(StageCounts {
            records_in,
            records_out,
        })
    }

    async fn run_load(
        &self,
        spec: &StageSpec,
        loader: &dyn Loader,
        store: &DatasetStore,
    ) -> (StageCounts, Option<ConveyorError>) {
        let source = &spec.inputs[0];
        let dataset = match store.get(source).await {
            Ok(dataset) => dataset,
            Err(err) => return (StageCounts::default(), Some(err)),
        };

        let batch = spec.batch.clone().unwrap_or_default();
        let report = load_chunked(&self.ctx, loader, &dataset, &batch).await;

        (
            StageCounts {
                records_in: dataset.len() as u64,
                records_out: report.rows_committed,
            },
            report.error,
        )
    }
}
