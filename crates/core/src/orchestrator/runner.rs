//! Job orchestrator implementation.
//!
//! Drives jobs through the lifecycle:
//! - Create: validate, charge, persist as PENDING, hand off to a background task
//! - Run: wait for an execution slot, PROCESSING, pipeline, COMPLETED or FAILED
//! - Cancel: PENDING only, with a full refund
//!
//! Every fault after the charge is settled at job granularity. The job ends
//! FAILED and the charge is refunded exactly once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::job::{
    Job, JobCost, JobError, JobFilter, JobPage, JobProgress, JobStatus, JobStore, JobStoreError,
    JobUpdate, UsageStats,
};
use crate::ledger::{reasons, Ledger, LedgerError};
use crate::metrics::{JOBS_CREATED, JOB_OUTCOMES};
use crate::pipeline::{
    PipelineExecutor, PipelineInput, ProgressError, ProgressTracker, Stage, StageOptions,
    StageStatus,
};
use crate::pricing::{CostEstimate, PricingConfig};
use crate::webhook::{WebhookDispatcher, WebhookEvent, WebhookPayload, WebhookTarget};

use super::config::OrchestratorConfig;
use super::types::{
    resolve_operations, CreateJobRequest, OrchestratorError, OrchestratorStatus, RecoveryReport,
    WebhookSecrets,
};

/// Usage statistics cover this many trailing days.
const USAGE_PERIOD_DAYS: i64 = 30;

/// Upper bound for a single page of jobs.
pub const MAX_PAGE_SIZE: i64 = 100;

type IdempotencyLocks = Mutex<HashMap<(String, String), Arc<tokio::sync::Mutex<()>>>>;

/// Implementation of ProgressTracker that persists stage progress to the job store.
struct StoreProgressTracker {
    job_id: String,
    store: Arc<dyn JobStore>,
}

#[async_trait]
impl ProgressTracker for StoreProgressTracker {
    async fn update(&self, stage: Stage, status: StageStatus) -> Result<(), ProgressError> {
        self.store
            .update(&self.job_id, &JobUpdate::new().stage(stage, status))
            .map(|_| ())
            .map_err(|e| ProgressError(e.to_string()))
    }
}

/// Decrements a load counter when dropped.
struct LoadGuard(Arc<AtomicUsize>);

impl LoadGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Everything a background job task needs.
#[derive(Clone)]
struct JobContext {
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn JobStore>,
    executor: Arc<PipelineExecutor>,
    dispatcher: Arc<dyn WebhookDispatcher>,
    secrets: Arc<WebhookSecrets>,
    slots: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    queued: Arc<AtomicUsize>,
}

impl JobContext {
    /// Background task: wait for a slot, run the pipeline, settle the outcome.
    async fn run_job(self, job: Job, queued: LoadGuard) {
        let _permit = match Arc::clone(&self.slots).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!(job_id = %job.id, "Execution slots closed, job left pending");
                return;
            }
        };
        drop(queued);
        let _active = LoadGuard::enter(&self.active);

        // A job cancelled while queued fails this conditional transition.
        match self.store.update(
            &job.id,
            &JobUpdate::new()
                .status(JobStatus::Processing)
                .started_at(Utc::now()),
        ) {
            Ok(true) => {}
            Ok(false) => {
                debug!(job_id = %job.id, "Job no longer pending, not starting");
                return;
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Failed to start job");
                self.fail_job(&job, JobError::internal(e.to_string()));
                return;
            }
        }
        info!(job_id = %job.id, account_id = %job.account_id, "Job processing");

        let input = PipelineInput {
            job_id: job.id.clone(),
            account_id: job.account_id.clone(),
            image_url: job.image_url.clone(),
            stages: job.operations.clone(),
            options: job.options.clone(),
        };
        let tracker = StoreProgressTracker {
            job_id: job.id.clone(),
            store: Arc::clone(&self.store),
        };

        match self.executor.execute(&input, &tracker).await {
            Ok(results) => {
                let update = JobUpdate::new()
                    .status(JobStatus::Completed)
                    .results(results)
                    .completed_at(Utc::now());
                match self.store.update(&job.id, &update) {
                    Ok(true) => {
                        info!(job_id = %job.id, "Job completed");
                        JOB_OUTCOMES.with_label_values(&["completed"]).inc();
                        self.notify(&job, WebhookEvent::JobCompleted);
                    }
                    Ok(false) => {
                        warn!(job_id = %job.id, "Job left processing before completion was recorded");
                    }
                    Err(e) => {
                        error!(job_id = %job.id, error = %e, "Failed to record job completion");
                        self.fail_job(&job, JobError::internal(e.to_string()));
                    }
                }
            }
            Err(e) => {
                warn!(job_id = %job.id, stage = %e.stage(), error = %e, "Pipeline failed");
                self.fail_job(&job, JobError::from(&e));
            }
        }
    }

    /// Move the job to FAILED and refund the full charge.
    ///
    /// The refund goes out even when the status cannot be written; the ledger
    /// pays each job back at most once. A job that is already terminal keeps
    /// its outcome.
    fn fail_job(&self, job: &Job, job_error: JobError) {
        let update = JobUpdate::new()
            .status(JobStatus::Failed)
            .error(job_error)
            .refunded(job.cost.charged)
            .completed_at(Utc::now());

        match self.store.update(&job.id, &update) {
            Ok(true) => {
                self.refund(job, reasons::JOB_FAILED);
                JOB_OUTCOMES.with_label_values(&["failed"]).inc();
                info!(job_id = %job.id, refunded = job.cost.charged, "Job failed");
                self.notify(job, WebhookEvent::JobFailed);
            }
            Ok(false) => {
                debug!(job_id = %job.id, "Job already terminal, no refund issued");
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Failed to record job failure, refunding anyway");
                self.refund(job, reasons::JOB_FAILED);
                JOB_OUTCOMES.with_label_values(&["failed"]).inc();
            }
        }
    }

    fn refund(&self, job: &Job, reason: &str) {
        match self
            .ledger
            .refund_job(&job.account_id, &job.id, job.cost.charged, reason)
        {
            Ok(Some(_)) => {}
            Ok(None) => debug!(job_id = %job.id, "Refund already on record"),
            Err(e) => {
                error!(job_id = %job.id, account_id = %job.account_id, error = %e, "Refund failed");
            }
        }
    }

    /// Fire the job's webhook, if it has one.
    fn notify(&self, job: &Job, event: WebhookEvent) {
        let Some(ref url) = job.webhook_url else {
            return;
        };

        let current = match self.store.get(&job.id, &job.account_id) {
            Ok(Some(current)) => current,
            Ok(None) => job.clone(),
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Failed to reload job for webhook");
                job.clone()
            }
        };

        let target = WebhookTarget::new(url.clone(), self.secrets.resolve(&job.account_id));
        self.dispatcher
            .dispatch(target, WebhookPayload::for_job(event, &current));
    }
}

/// The job orchestrator - owns the job lifecycle from charge to settlement.
pub struct JobOrchestrator {
    config: OrchestratorConfig,
    pricing: PricingConfig,
    ctx: JobContext,
    idempotency_locks: IdempotencyLocks,
}

impl JobOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        config: OrchestratorConfig,
        pricing: PricingConfig,
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn JobStore>,
        executor: Arc<PipelineExecutor>,
        dispatcher: Arc<dyn WebhookDispatcher>,
        secrets: WebhookSecrets,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));

        Self {
            config,
            pricing,
            ctx: JobContext {
                ledger,
                store,
                executor,
                dispatcher,
                secrets: Arc::new(secrets),
                slots,
                active: Arc::new(AtomicUsize::new(0)),
                queued: Arc::new(AtomicUsize::new(0)),
            },
            idempotency_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn pricing(&self) -> &PricingConfig {
        &self.pricing
    }

    /// Current load.
    pub fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            active_jobs: self.ctx.active.load(Ordering::SeqCst),
            queued_jobs: self.ctx.queued.load(Ordering::SeqCst),
            max_concurrent_jobs: self.config.max_concurrent_jobs,
        }
    }

    /// Wait until no job is queued or running. Returns false on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let status = self.status();
            if status.active_jobs == 0 && status.queued_jobs == 0 {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Settle jobs left unfinished by a previous process.
    ///
    /// PROCESSING jobs were interrupted mid-pipeline and are failed with a full
    /// refund. PENDING jobs never started and are queued again.
    pub fn recover(&self) -> Result<RecoveryReport, OrchestratorError> {
        let unfinished = self.ctx.store.list_unfinished()?;
        let mut report = RecoveryReport::default();

        for job in unfinished {
            match job.status {
                JobStatus::Processing => {
                    warn!(job_id = %job.id, account_id = %job.account_id, "Failing job interrupted by restart");
                    self.ctx.fail_job(
                        &job,
                        JobError::internal("job interrupted by a gateway restart"),
                    );
                    report.failed += 1;
                }
                JobStatus::Pending => {
                    info!(job_id = %job.id, account_id = %job.account_id, "Requeueing pending job");
                    let queued = LoadGuard::enter(&self.ctx.queued);
                    tokio::spawn(self.ctx.clone().run_job(job, queued));
                    report.requeued += 1;
                }
                _ => {}
            }
        }

        if report.failed > 0 || report.requeued > 0 {
            info!(failed = report.failed, requeued = report.requeued, "Recovered unfinished jobs");
        }
        Ok(report)
    }

    /// Drain in-flight jobs within the configured grace period.
    pub async fn shutdown(&self) {
        let status = self.status();
        info!(
            active = status.active_jobs,
            queued = status.queued_jobs,
            "Draining job orchestrator"
        );
        if !self
            .wait_idle(Duration::from_secs(self.config.shutdown_grace_secs))
            .await
        {
            warn!("Shutdown grace period elapsed with jobs still in flight");
        }
    }

    /// Price a stage selection without side effects.
    pub fn estimate(
        &self,
        operations: Option<&[Stage]>,
        options: &StageOptions,
    ) -> Result<CostEstimate, OrchestratorError> {
        let operations = resolve_operations(operations)?;
        Ok(self.pricing.estimate(&operations, options))
    }

    /// Create a job: charge the account, persist it, and start it in the background.
    ///
    /// A repeated idempotency key returns the existing job without charging.
    pub async fn create(&self, request: CreateJobRequest) -> Result<Job, OrchestratorError> {
        let operations = request.validate()?;

        let Some(key) = request.idempotency_key.clone() else {
            return self.create_unlocked(request, operations).await;
        };

        let lock_key = (request.account_id.clone(), key);
        let lock = self.idempotency_lock(&lock_key);
        let result = {
            let _guard = lock.lock().await;
            self.create_unlocked(request, operations).await
        };
        self.prune_idempotency_lock(&lock_key, lock);
        result
    }

    async fn create_unlocked(
        &self,
        request: CreateJobRequest,
        operations: Vec<Stage>,
    ) -> Result<Job, OrchestratorError> {
        let account_id = request.account_id.as_str();

        if let Some(ref key) = request.idempotency_key {
            if let Some(existing) = self.ctx.store.find_by_idempotency_key(account_id, key)? {
                debug!(job_id = %existing.id, account_id, "Idempotent replay");
                return Ok(existing);
            }
        }

        let estimate = self.pricing.estimate(&operations, &request.options);
        let job_id = Job::generate_id();

        match self
            .ctx
            .ledger
            .reserve(account_id, estimate.total, reasons::JOB_CREATED, Some(&job_id))
        {
            Ok(_) => {}
            Err(LedgerError::InsufficientFunds { balance, required }) => {
                info!(account_id, balance, required, "Job rejected, insufficient credits");
                return Err(OrchestratorError::InsufficientFunds { balance, required });
            }
            Err(LedgerError::AccountNotFound(id)) => {
                return Err(OrchestratorError::AccountNotFound(id));
            }
            Err(e) => return Err(e.into()),
        }

        let job = Job {
            id: job_id,
            account_id: request.account_id.clone(),
            image_url: request.image_url,
            progress: JobProgress::for_stages(&operations),
            operations,
            options: request.options,
            status: JobStatus::Pending,
            cost: JobCost {
                estimated: estimate.total,
                charged: estimate.total,
                refunded: 0,
                breakdown: estimate.breakdown,
            },
            results: None,
            error: None,
            idempotency_key: request.idempotency_key,
            webhook_url: request.webhook_url,
            metadata: request.metadata,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };

        if let Err(e) = self.ctx.store.insert(&job) {
            // The reservation has no job to belong to.
            self.ctx.refund(&job, reasons::JOB_CREATE_FAILED);

            if let JobStoreError::Conflict {
                ref account_id,
                ref idempotency_key,
            } = e
            {
                if let Some(existing) = self
                    .ctx
                    .store
                    .find_by_idempotency_key(account_id, idempotency_key)?
                {
                    debug!(job_id = %existing.id, "Lost idempotency race, returning winner");
                    return Ok(existing);
                }
            }
            error!(job_id = %job.id, error = %e, "Failed to persist job, reservation released");
            return Err(e.into());
        }

        JOBS_CREATED.inc();
        info!(
            job_id = %job.id,
            account_id = %job.account_id,
            cost = job.cost.charged,
            operations = ?job.operations,
            "Job created"
        );

        let queued = LoadGuard::enter(&self.ctx.queued);
        tokio::spawn(self.ctx.clone().run_job(job.clone(), queued));

        Ok(job)
    }

    fn idempotency_lock(&self, key: &(String, String)) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .idempotency_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    fn prune_idempotency_lock(&self, key: &(String, String), lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .idempotency_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Only the map and this caller hold it: nobody else is waiting.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    /// Fetch a job owned by `account_id`.
    pub fn get(&self, job_id: &str, account_id: &str) -> Result<Job, OrchestratorError> {
        self.ctx
            .store
            .get(job_id, account_id)?
            .ok_or_else(|| OrchestratorError::NotFound(job_id.to_string()))
    }

    /// List an account's jobs, newest first.
    pub fn list(&self, account_id: &str, filter: &JobFilter) -> Result<JobPage, OrchestratorError> {
        if !(1..=MAX_PAGE_SIZE).contains(&filter.limit) {
            return Err(OrchestratorError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        if filter.offset < 0 {
            return Err(OrchestratorError::Validation(
                "offset must not be negative".to_string(),
            ));
        }
        Ok(self.ctx.store.list(account_id, filter)?)
    }

    /// Cancel a PENDING job and refund it in full.
    ///
    /// Returns false when the job is absent, owned by someone else, or already
    /// past PENDING.
    pub fn cancel(&self, job_id: &str, account_id: &str) -> Result<bool, OrchestratorError> {
        let Some(job) = self.ctx.store.get(job_id, account_id)? else {
            return Ok(false);
        };
        if job.status != JobStatus::Pending {
            return Ok(false);
        }

        let update = JobUpdate::new()
            .status(JobStatus::Cancelled)
            .refunded(job.cost.charged)
            .completed_at(Utc::now());
        if !self.ctx.store.update(job_id, &update)? {
            // Picked up by a worker in the meantime.
            return Ok(false);
        }

        self.ctx.refund(&job, reasons::JOB_CANCELLED);
        JOB_OUTCOMES.with_label_values(&["cancelled"]).inc();
        info!(job_id, account_id, refunded = job.cost.charged, "Job cancelled");
        self.ctx.notify(&job, WebhookEvent::JobCancelled);

        Ok(true)
    }

    /// Usage over the trailing 30 days.
    pub fn usage(&self, account_id: &str) -> Result<UsageStats, OrchestratorError> {
        let since = Utc::now() - chrono::Duration::days(USAGE_PERIOD_DAYS);
        Ok(self.ctx.store.usage(account_id, since)?)
    }
}
