//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the outbound service traits,
//! allowing end-to-end job tests without real stage providers or webhook
//! receivers.
//!
//! # Example
//!
//! ```rust,ignore
//! use gateway_core::testing::{fixtures, MockStageProvider, RecordingWebhookDispatcher};
//!
//! let provider = Arc::new(MockStageProvider::new());
//! let webhooks = Arc::new(RecordingWebhookDispatcher::new());
//! let orchestrator = fixtures::orchestrator(ledger, provider.clone(), webhooks.clone(), 8);
//!
//! // Configure mock responses
//! provider.fail_stage(Stage::Upscale, "out of memory").await;
//! ```

mod failing_store;
mod mock_stage_provider;
mod mock_webhook;

pub use failing_store::FailingJobStore;
pub use mock_stage_provider::{MockStageProvider, RecordedStageCall};
pub use mock_webhook::{RecordedWebhook, RecordingWebhookDispatcher};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::job::{Job, JobStatus, JobStore, SqliteJobStore};
    use crate::ledger::Ledger;
    use crate::orchestrator::{JobOrchestrator, OrchestratorConfig, WebhookSecrets};
    use crate::pipeline::{PipelineExecutor, StageProvider};
    use crate::pricing::PricingConfig;
    use crate::webhook::WebhookDispatcher;

    /// Default per-stage timeout for test executors.
    pub const TEST_STAGE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Build an orchestrator over an in-memory job store with default pricing.
    pub fn orchestrator(
        ledger: Arc<dyn Ledger>,
        provider: Arc<dyn StageProvider>,
        dispatcher: Arc<dyn WebhookDispatcher>,
        max_concurrent_jobs: usize,
    ) -> JobOrchestrator {
        orchestrator_with_timeout(
            ledger,
            provider,
            dispatcher,
            max_concurrent_jobs,
            TEST_STAGE_TIMEOUT,
        )
    }

    /// Like [`orchestrator`] with an explicit stage timeout.
    pub fn orchestrator_with_timeout(
        ledger: Arc<dyn Ledger>,
        provider: Arc<dyn StageProvider>,
        dispatcher: Arc<dyn WebhookDispatcher>,
        max_concurrent_jobs: usize,
        stage_timeout: Duration,
    ) -> JobOrchestrator {
        let store = SqliteJobStore::in_memory().expect("in-memory job store");
        orchestrator_with_store(
            ledger,
            Arc::new(store),
            provider,
            dispatcher,
            max_concurrent_jobs,
            stage_timeout,
        )
    }

    /// Build an orchestrator over an explicit job store.
    pub fn orchestrator_with_store(
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn JobStore>,
        provider: Arc<dyn StageProvider>,
        dispatcher: Arc<dyn WebhookDispatcher>,
        max_concurrent_jobs: usize,
        stage_timeout: Duration,
    ) -> JobOrchestrator {
        JobOrchestrator::new(
            OrchestratorConfig {
                max_concurrent_jobs,
                ..OrchestratorConfig::default()
            },
            PricingConfig::default(),
            ledger,
            store,
            Arc::new(PipelineExecutor::new(provider, stage_timeout)),
            dispatcher,
            WebhookSecrets::new(HashMap::new(), Some(TEST_WEBHOOK_SECRET.to_string())),
        )
    }

    /// Fallback webhook secret used by fixture orchestrators.
    pub const TEST_WEBHOOK_SECRET: &str = "whsec_test";

    /// Poll until the job reaches a terminal status or `timeout` elapses.
    pub async fn wait_for_terminal(
        orchestrator: &JobOrchestrator,
        job_id: &str,
        account_id: &str,
        timeout: Duration,
    ) -> Option<Job> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(job) = orchestrator.get(job_id, account_id) {
                if job.status.is_terminal() {
                    return Some(job);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Poll until the job reaches `status` or `timeout` elapses.
    pub async fn wait_for_status(
        orchestrator: &JobOrchestrator,
        job_id: &str,
        account_id: &str,
        status: JobStatus,
        timeout: Duration,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if matches!(orchestrator.get(job_id, account_id), Ok(ref job) if job.status == status) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
