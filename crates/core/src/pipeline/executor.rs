//! Pipeline executor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::options::StageOptions;
use super::provider::StageProvider;
use super::types::{JobResults, PipelineError, Stage, StageRequest, StageStatus};
use crate::metrics::STAGE_DURATION;

/// Error raised by a [`ProgressTracker`].
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ProgressError(pub String);

/// Receives per-stage progress while a pipeline runs.
#[async_trait]
pub trait ProgressTracker: Send + Sync {
    async fn update(&self, stage: Stage, status: StageStatus) -> Result<(), ProgressError>;
}

/// Everything the executor needs to run one job.
#[derive(Debug, Clone)]
pub struct PipelineInput {
    pub job_id: String,
    pub account_id: String,
    pub image_url: String,
    pub stages: Vec<Stage>,
    pub options: StageOptions,
}

/// Runs requested stages in order against a [`StageProvider`].
///
/// The first failing stage aborts the run. There is no retry at this level.
pub struct PipelineExecutor {
    provider: Arc<dyn StageProvider>,
    stage_timeout: Duration,
}

impl PipelineExecutor {
    pub fn new(provider: Arc<dyn StageProvider>, stage_timeout: Duration) -> Self {
        Self {
            provider,
            stage_timeout,
        }
    }

    pub fn stage_timeout(&self) -> Duration {
        self.stage_timeout
    }

    /// Execute the input's stages, reporting progress to `tracker`.
    ///
    /// Stages not listed in the input are skipped without a progress update.
    pub async fn execute(
        &self,
        input: &PipelineInput,
        tracker: &dyn ProgressTracker,
    ) -> Result<JobResults, PipelineError> {
        let mut results = JobResults::new(&input.image_url);

        for stage in Stage::normalize(&input.stages) {
            tracker
                .update(stage, StageStatus::Processing)
                .await
                .map_err(|e| PipelineError::Progress {
                    stage,
                    message: e.to_string(),
                })?;

            let request = StageRequest {
                image_url: results.working_image().to_string(),
                account_id: input.account_id.clone(),
                job_id: input.job_id.clone(),
                parameters: match stage {
                    Stage::Enrich => input.options.enrich_parameters(),
                    Stage::Upscale => input.options.upscale_parameters(),
                    Stage::Infuse => input.options.infuse_parameters(results.metadata.as_ref()),
                },
            };

            debug!(job_id = %input.job_id, %stage, provider = self.provider.name(), "Starting stage");
            let started = Instant::now();
            let outcome =
                tokio::time::timeout(self.stage_timeout, self.provider.execute(stage, &request))
                    .await;
            let elapsed = started.elapsed().as_secs_f64();

            let output = match outcome {
                Ok(Ok(output)) => {
                    STAGE_DURATION
                        .with_label_values(&[stage.as_str(), "success"])
                        .observe(elapsed);
                    output
                }
                Ok(Err(e)) => {
                    STAGE_DURATION
                        .with_label_values(&[stage.as_str(), "failed"])
                        .observe(elapsed);
                    self.mark_failed(input, stage, tracker).await;
                    return Err(PipelineError::StageFailed {
                        stage,
                        message: e.to_string(),
                    });
                }
                Err(_) => {
                    STAGE_DURATION
                        .with_label_values(&[stage.as_str(), "timeout"])
                        .observe(elapsed);
                    self.mark_failed(input, stage, tracker).await;
                    return Err(PipelineError::StageTimeout {
                        stage,
                        timeout_secs: self.stage_timeout.as_secs(),
                    });
                }
            };

            results.merge(output);

            tracker
                .update(stage, StageStatus::Completed)
                .await
                .map_err(|e| PipelineError::Progress {
                    stage,
                    message: e.to_string(),
                })?;

            info!(job_id = %input.job_id, %stage, elapsed_secs = elapsed, "Stage completed");
        }

        Ok(results)
    }

    async fn mark_failed(&self, input: &PipelineInput, stage: Stage, tracker: &dyn ProgressTracker) {
        if let Err(e) = tracker.update(stage, StageStatus::Failed).await {
            warn!(job_id = %input.job_id, %stage, error = %e, "Failed to record stage failure");
        }
    }
}
