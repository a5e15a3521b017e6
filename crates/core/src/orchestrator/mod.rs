//! Job orchestrator.
//!
//! Composes the ledger, job store, pipeline executor and webhook dispatcher
//! into the job lifecycle:
//! - **Create**: charge first, then persist; a job never exists unpaid
//! - **Run**: background task bounded by `max_concurrent_jobs`
//! - **Settle**: COMPLETED keeps the charge, FAILED and CANCELLED refund it in full

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::{JobOrchestrator, MAX_PAGE_SIZE};
pub use types::{
    CreateJobRequest, OrchestratorError, OrchestratorStatus, RecoveryReport, WebhookSecrets,
    MAX_IDEMPOTENCY_KEY_LEN,
};
