//! Pipeline types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One enhancement stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Metadata enrichment.
    Enrich,
    /// Resolution upscaling.
    Upscale,
    /// Metadata infusion into the image.
    Infuse,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 3] = [Stage::Enrich, Stage::Upscale, Stage::Infuse];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Enrich => "enrich",
            Stage::Upscale => "upscale",
            Stage::Infuse => "infuse",
        }
    }

    /// Deduplicate and order a requested stage list.
    pub fn normalize(stages: &[Stage]) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|s| stages.contains(s))
            .collect()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enrich" => Ok(Stage::Enrich),
            "upscale" => Ok(Stage::Upscale),
            "infuse" => Ok(Stage::Infuse),
            other => Err(format!("unknown stage: {}", other)),
        }
    }
}

/// Progress of a single stage within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Processing => "processing",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
        }
    }
}

impl FromStr for StageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StageStatus::Pending),
            "processing" => Ok(StageStatus::Processing),
            "completed" => Ok(StageStatus::Completed),
            "failed" => Ok(StageStatus::Failed),
            other => Err(format!("unknown stage status: {}", other)),
        }
    }
}

/// Request sent to a stage provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRequest {
    /// Current working image.
    pub image_url: String,
    pub account_id: String,
    pub job_id: String,
    /// Stage-specific parameters.
    pub parameters: Value,
}

/// Output of a successful stage call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageOutput {
    Enrich { metadata: Value },
    /// `None` keeps the current working image.
    Upscale { image_url: Option<String> },
    Infuse { image_url: Option<String> },
}

/// URLs produced over a job's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultUrls {
    pub original: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upscaled: Option<String>,
    #[serde(rename = "final", default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
}

/// Accumulated outputs of all completed stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub urls: ResultUrls,
}

impl JobResults {
    pub fn new(original_url: impl Into<String>) -> Self {
        Self {
            metadata: None,
            urls: ResultUrls {
                original: original_url.into(),
                upscaled: None,
                final_url: None,
            },
        }
    }

    /// Image that the next stage should operate on.
    pub fn working_image(&self) -> &str {
        self.urls
            .upscaled
            .as_deref()
            .unwrap_or(&self.urls.original)
    }

    /// Merge a stage output into the results.
    pub fn merge(&mut self, output: StageOutput) {
        match output {
            StageOutput::Enrich { metadata } => self.metadata = Some(metadata),
            StageOutput::Upscale { image_url } => {
                if let Some(url) = image_url {
                    self.urls.upscaled = Some(url);
                }
            }
            StageOutput::Infuse { image_url } => {
                if let Some(url) = image_url {
                    self.urls.final_url = Some(url);
                }
            }
        }
    }
}

/// Errors that abort a pipeline run. All of them are retryable by the client.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} stage failed: {message}")]
    StageFailed { stage: Stage, message: String },

    #[error("{stage} stage timed out after {timeout_secs}s")]
    StageTimeout { stage: Stage, timeout_secs: u64 },

    #[error("failed to record {stage} progress: {message}")]
    Progress { stage: Stage, message: String },
}

impl PipelineError {
    /// Stage that was running when the pipeline aborted.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::StageFailed { stage, .. }
            | PipelineError::StageTimeout { stage, .. }
            | PipelineError::Progress { stage, .. } => *stage,
        }
    }

    pub fn code(&self) -> &'static str {
        "pipeline_error"
    }

    pub fn retryable(&self) -> bool {
        true
    }
}
