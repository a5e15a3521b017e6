//! Mock stage provider for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

use crate::pipeline::{ProviderError, Stage, StageOutput, StageProvider, StageRequest};

/// A recorded stage call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedStageCall {
    pub stage: Stage,
    pub request: StageRequest,
}

/// Mock implementation of the StageProvider trait.
///
/// Provides controllable behavior for testing:
/// - Track calls for assertions
/// - Canned output per stage
/// - Simulated failures and delays per stage
/// - A gate that holds every call until released
///
/// # Example
///
/// ```rust,ignore
/// use gateway_core::testing::MockStageProvider;
///
/// let provider = MockStageProvider::new();
/// provider.fail_stage(Stage::Upscale, "model crashed").await;
///
/// // ... run a job ...
///
/// assert_eq!(provider.call_count().await, 2);
/// ```
#[derive(Debug)]
pub struct MockStageProvider {
    calls: Arc<RwLock<Vec<RecordedStageCall>>>,
    outputs: Arc<RwLock<HashMap<Stage, StageOutput>>>,
    failures: Arc<RwLock<HashMap<Stage, String>>>,
    delays: Arc<RwLock<HashMap<Stage, Duration>>>,
    gate: watch::Sender<bool>,
}

impl Default for MockStageProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStageProvider {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            calls: Arc::new(RwLock::new(Vec::new())),
            outputs: Arc::new(RwLock::new(HashMap::new())),
            failures: Arc::new(RwLock::new(HashMap::new())),
            delays: Arc::new(RwLock::new(HashMap::new())),
            gate,
        }
    }

    /// Get all recorded calls.
    pub async fn recorded_calls(&self) -> Vec<RecordedStageCall> {
        self.calls.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// Set the output returned for the output's stage.
    pub async fn set_output(&self, output: StageOutput) {
        let stage = match &output {
            StageOutput::Enrich { .. } => Stage::Enrich,
            StageOutput::Upscale { .. } => Stage::Upscale,
            StageOutput::Infuse { .. } => Stage::Infuse,
        };
        self.outputs.write().await.insert(stage, output);
    }

    /// Make every call for `stage` fail.
    pub async fn fail_stage(&self, stage: Stage, message: impl Into<String>) {
        self.failures.write().await.insert(stage, message.into());
    }

    /// Delay every call for `stage`.
    pub async fn set_delay(&self, stage: Stage, delay: Duration) {
        self.delays.write().await.insert(stage, delay);
    }

    /// Block all calls until [`release`](Self::release) is called.
    pub fn hold(&self) {
        self.gate.send_replace(true);
    }

    /// Let held and future calls proceed.
    pub fn release(&self) {
        self.gate.send_replace(false);
    }

    fn default_output(stage: Stage, request: &StageRequest) -> StageOutput {
        match stage {
            Stage::Enrich => StageOutput::Enrich {
                metadata: serde_json::json!({ "title": "Untitled", "source": "mock" }),
            },
            Stage::Upscale => StageOutput::Upscale {
                image_url: Some(format!("{}?upscaled=1", request.image_url)),
            },
            Stage::Infuse => StageOutput::Infuse {
                image_url: Some(format!("{}?final=1", request.image_url)),
            },
        }
    }
}

#[async_trait]
impl StageProvider for MockStageProvider {
    async fn execute(
        &self,
        stage: Stage,
        request: &StageRequest,
    ) -> Result<StageOutput, ProviderError> {
        self.calls.write().await.push(RecordedStageCall {
            stage,
            request: request.clone(),
        });

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|held| !*held).await;

        let delay = self.delays.read().await.get(&stage).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.failures.read().await.get(&stage) {
            return Err(ProviderError::Unavailable(message.clone()));
        }

        Ok(self
            .outputs
            .read()
            .await
            .get(&stage)
            .cloned()
            .unwrap_or_else(|| Self::default_output(stage, request)))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
