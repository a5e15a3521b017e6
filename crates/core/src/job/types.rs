//! Job types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pipeline::{JobResults, PipelineError, Stage, StageOptions, StageStatus};
use crate::pricing::StageCost;

/// Lifecycle state of a job.
///
/// Legal transitions: Pending → Processing → {Completed, Failed},
/// Pending → Cancelled, and Pending → Failed for faults before processing starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// States from which a job may move into `self`.
    pub fn predecessors(&self) -> &'static [JobStatus] {
        match self {
            JobStatus::Pending => &[],
            JobStatus::Processing => &[JobStatus::Pending],
            JobStatus::Completed => &[JobStatus::Processing],
            JobStatus::Failed => &[JobStatus::Pending, JobStatus::Processing],
            JobStatus::Cancelled => &[JobStatus::Pending],
        }
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        next.predecessors().contains(self)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Per-stage progress. Stages that were not requested stay `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrich: Option<StageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upscale: Option<StageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infuse: Option<StageStatus>,
}

impl JobProgress {
    /// Pending progress for each requested stage.
    pub fn for_stages(stages: &[Stage]) -> Self {
        let mut progress = Self::default();
        for stage in stages {
            progress.set(*stage, StageStatus::Pending);
        }
        progress
    }

    pub fn get(&self, stage: Stage) -> Option<StageStatus> {
        match stage {
            Stage::Enrich => self.enrich,
            Stage::Upscale => self.upscale,
            Stage::Infuse => self.infuse,
        }
    }

    pub fn set(&mut self, stage: Stage, status: StageStatus) {
        let slot = match stage {
            Stage::Enrich => &mut self.enrich,
            Stage::Upscale => &mut self.upscale,
            Stage::Infuse => &mut self.infuse,
        };
        *slot = Some(status);
    }
}

/// Credits associated with a job.
///
/// `charged` is fixed at creation; `refunded` only ever moves from zero to
/// `charged`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCost {
    pub estimated: i64,
    pub charged: i64,
    pub refunded: i64,
    #[serde(default)]
    pub breakdown: Vec<StageCost>,
}

impl JobCost {
    /// Credits the account is out of pocket for this job.
    pub fn net(&self) -> i64 {
        self.charged - self.refunded
    }
}

/// Structured failure attached to a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub retryable: bool,
}

impl JobError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: "internal_error".to_string(),
            message: message.into(),
            stage: None,
            retryable: true,
        }
    }
}

impl From<&PipelineError> for JobError {
    fn from(err: &PipelineError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            stage: Some(err.stage()),
            retryable: err.retryable(),
        }
    }
}

/// A persisted enhancement job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub account_id: String,
    pub image_url: String,
    /// Requested stages, ordered and deduplicated.
    pub operations: Vec<Stage>,
    pub options: StageOptions,
    pub status: JobStatus,
    pub progress: JobProgress,
    pub cost: JobCost,
    pub results: Option<JobResults>,
    pub error: Option<JobError>,
    pub idempotency_key: Option<String>,
    pub webhook_url: Option<String>,
    /// Free-form client metadata, echoed back untouched.
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// New job id: `job_` followed by 12 hex characters.
    pub fn generate_id() -> String {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        format!("job_{}", &hex[..12])
    }
}

/// Aggregated job activity for one account over a period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub jobs_total: i64,
    pub jobs_completed: i64,
    pub jobs_failed: i64,
    pub jobs_cancelled: i64,
    /// Credits charged minus credits refunded.
    pub credits_spent: i64,
    /// Non-refunded spend per stage, from each job's recorded breakdown.
    pub credits_by_stage: BTreeMap<String, i64>,
}
