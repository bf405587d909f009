use std::time::Duration;

use chrono::{DateTime, Utc};
use conveyor_config::shared::PipelineSettings;
use serde::Serialize;
use uuid::Uuid;

use crate::concurrency::shutdown::ShutdownRx;
use crate::stage::{StageKind, StageResult};

/// Unique identifier of one job run, caller-supplied or generated.
pub type JobId = String;

/// Generates a job id of the form `job_<timestamp>_<suffix>`.
pub fn generate_job_id() -> JobId {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("job_{timestamp}_{}", &suffix[..8])
}

/// Lifecycle status of a job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    CompletedSuccess,
    CompletedPartial,
    Failed,
}

impl JobStatus {
    /// Returns `true` for terminal statuses that map to a zero exit code.
    ///
    /// A partial completion still exits zero; the status field is the only
    /// place where the degradation is visible.
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::CompletedSuccess | JobStatus::CompletedPartial)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::CompletedSuccess => write!(f, "completed_success"),
            JobStatus::CompletedPartial => write!(f, "completed_partial"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Per-job context handed to every component constructor.
///
/// Replaces process-wide mutable state: everything a connector may need about
/// the run it participates in travels through this value, and nothing
/// survives between job runs.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub started_at: DateTime<Utc>,
    pub settings: PipelineSettings,
    shutdown: ShutdownRx,
}

impl JobContext {
    pub fn new(job_id: JobId, settings: PipelineSettings, shutdown: ShutdownRx) -> Self {
        Self {
            job_id,
            started_at: Utc::now(),
            settings,
            shutdown,
        }
    }

    /// Returns `true` once the run has been cancelled.
    ///
    /// Components check this between units of work; the current page or batch
    /// is always allowed to finish.
    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_shutdown()
    }
}

/// Serializable summary of one executed stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageSummary {
    pub stage: String,
    pub kind: String,
    pub success: bool,
    pub records_in: u64,
    pub records_out: u64,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&StageResult> for StageSummary {
    fn from(result: &StageResult) -> Self {
        Self {
            stage: result.stage.clone(),
            kind: match result.kind {
                StageKind::Extract => "extract".to_string(),
                StageKind::Transform => "transform".to_string(),
                StageKind::Load => "load".to_string(),
            },
            success: result.success,
            records_in: result.records_in,
            records_out: result.records_out,
            duration_ms: result.duration.as_millis() as u64,
            error_kind: result.error.as_ref().map(|err| format!("{:?}", err.kind())),
            error: result.error.as_ref().map(|err| err.to_string()),
        }
    }
}

/// Final report of one job run.
///
/// The only state that outlives the run, besides the log stream. Written as
/// JSON by the CLI and logged as a human-readable summary.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: JobId,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub stages: Vec<StageSummary>,
}

impl JobReport {
    pub fn new(
        job_id: JobId,
        status: JobStatus,
        started_at: DateTime<Utc>,
        results: &[StageResult],
    ) -> Self {
        let finished_at = Utc::now();
        let duration = (finished_at - started_at)
            .to_std()
            .unwrap_or(Duration::ZERO);

        Self {
            job_id,
            status,
            started_at,
            finished_at,
            duration_ms: duration.as_millis() as u64,
            stages: results.iter().map(StageSummary::from).collect(),
        }
    }

    /// Stages that failed, in execution order.
    pub fn failed_stages(&self) -> impl Iterator<Item = &StageSummary> {
        self.stages.iter().filter(|stage| !stage.success)
    }

    /// Total records written by successful load stages.
    pub fn records_loaded(&self) -> u64 {
        self.stages
            .iter()
            .filter(|stage| stage.kind == "load")
            .map(|stage| stage.records_out)
            .sum()
    }
}
