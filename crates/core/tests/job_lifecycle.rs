//! Job lifecycle integration tests.
//!
//! These tests drive jobs through the orchestrator against on-disk SQLite
//! stores and the mock stage provider:
//! pending -> processing -> completed | failed, and pending -> cancelled

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tempfile::TempDir;
use tokio_test::assert_ok;

use gateway_core::{
    ledger::reasons,
    testing::{fixtures, FailingJobStore, MockStageProvider, RecordingWebhookDispatcher},
    webhook::{sign, verify},
    CreateJobRequest, JobFilter, JobOrchestrator, JobStatus, JobStore, Ledger, RecoveryReport,
    SqliteJobStore, SqliteLedger, Stage, StageStatus, Tier, TransactionKind, WebhookEvent,
};

const ACCOUNT: &str = "acct_gallery";
const WAIT: Duration = Duration::from_secs(5);

/// Test helper to create all dependencies for orchestrator testing.
struct TestHarness {
    ledger: Arc<SqliteLedger>,
    provider: Arc<MockStageProvider>,
    webhooks: Arc<RecordingWebhookDispatcher>,
    orchestrator: Arc<JobOrchestrator>,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new(balance: i64, max_concurrent_jobs: usize) -> Self {
        Self::with_timeout(balance, max_concurrent_jobs, fixtures::TEST_STAGE_TIMEOUT)
    }

    fn with_timeout(balance: i64, max_concurrent_jobs: usize, stage_timeout: Duration) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let ledger = Arc::new(
            SqliteLedger::new(&temp_dir.path().join("ledger.db")).expect("Failed to create ledger"),
        );
        ledger
            .open_account(ACCOUNT, Tier::Gallery, balance)
            .expect("Failed to open account");

        let provider = Arc::new(MockStageProvider::new());
        let webhooks = Arc::new(RecordingWebhookDispatcher::new());
        let orchestrator = Arc::new(fixtures::orchestrator_with_timeout(
            ledger.clone(),
            provider.clone(),
            webhooks.clone(),
            max_concurrent_jobs,
            stage_timeout,
        ));

        Self {
            ledger,
            provider,
            webhooks,
            orchestrator,
            _temp_dir: temp_dir,
        }
    }

    fn balance(&self) -> i64 {
        self.ledger.account(ACCOUNT).unwrap().unwrap().balance
    }

    fn request(&self) -> CreateJobRequest {
        CreateJobRequest::new(ACCOUNT, "https://img.example/painting.png")
            .with_webhook_url("https://hooks.example/gateway")
    }
}

#[tokio::test]
async fn test_completed_job_end_to_end() {
    let h = TestHarness::new(100, 8);

    let job = h.orchestrator.create(h.request()).await.unwrap();
    let done = fixtures::wait_for_terminal(&h.orchestrator, &job.id, ACCOUNT, WAIT)
        .await
        .expect("job should finish");

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.cost.charged, 4);
    assert_eq!(done.cost.refunded, 0);
    for stage in Stage::ALL {
        assert_eq!(done.progress.get(stage), Some(StageStatus::Completed));
    }

    let results = done.results.unwrap();
    assert_eq!(results.urls.original, "https://img.example/painting.png");
    assert_eq!(
        results.urls.upscaled.as_deref(),
        Some("https://img.example/painting.png?upscaled=1")
    );
    assert!(results.metadata.is_some());

    // Stages ran in order, each on the previous stage's image.
    let calls = h.provider.recorded_calls().await;
    let stages: Vec<_> = calls.iter().map(|c| c.stage).collect();
    assert_eq!(stages, Stage::ALL.to_vec());
    assert_eq!(
        calls[2].request.image_url,
        "https://img.example/painting.png?upscaled=1"
    );

    assert_eq!(h.balance(), 96);
    assert!(h.orchestrator.wait_idle(WAIT).await);
    assert_eq!(h.webhooks.events(), vec![WebhookEvent::JobCompleted]);
}

#[tokio::test]
async fn test_ledger_conservation_across_outcomes() {
    let h = TestHarness::new(50, 2);
    h.provider.fail_stage(Stage::Infuse, "encoder unavailable").await;

    let mut ids = Vec::new();
    for i in 0..4 {
        let ops = if i % 2 == 0 {
            vec![Stage::Enrich, Stage::Upscale]
        } else {
            Stage::ALL.to_vec()
        };
        ids.push(
            h.orchestrator
                .create(h.request().with_operations(ops))
                .await
                .unwrap()
                .id,
        );
    }
    assert!(h.orchestrator.wait_idle(WAIT).await);

    let mut net = 0;
    for id in &ids {
        let job = h.orchestrator.get(id, ACCOUNT).unwrap();
        assert!(job.status.is_terminal());
        net += job.cost.charged - job.cost.refunded;
    }
    assert_eq!(50 - h.balance(), net);
    assert_eq!(net, 3 + 3);

    let trail = h.ledger.transactions(ACCOUNT, 100, 0).unwrap();
    assert_eq!(trail.total, 6);
    let refunds: Vec<_> = trail
        .transactions
        .iter()
        .filter(|t| t.kind == TransactionKind::Refund)
        .collect();
    assert_eq!(refunds.len(), 2);
    assert!(refunds.iter().all(|t| t.reason == reasons::JOB_FAILED));
    assert!(refunds.iter().all(|t| t.amount == 4));
}

#[tokio::test]
async fn test_concurrent_idempotent_creates_charge_once() {
    let h = TestHarness::new(20, 8);

    let attempts = (0..6).map(|_| {
        let orchestrator = Arc::clone(&h.orchestrator);
        let request = h.request().with_idempotency_key("order-42");
        tokio::spawn(async move { orchestrator.create(request).await })
    });
    let jobs: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    assert!(jobs.iter().all(|j| j.id == jobs[0].id));
    assert_eq!(h.balance(), 16);
    assert_eq!(
        h.orchestrator
            .list(ACCOUNT, &JobFilter::new())
            .unwrap()
            .total,
        1
    );
    assert!(h.orchestrator.wait_idle(WAIT).await);
    assert_eq!(h.provider.call_count().await, 3);
}

#[tokio::test]
async fn test_cancel_queued_job_refunds_and_never_runs() {
    let h = TestHarness::new(20, 1);
    h.provider.hold();

    let blocker = h.orchestrator.create(h.request()).await.unwrap();
    assert!(
        fixtures::wait_for_status(&h.orchestrator, &blocker.id, ACCOUNT, JobStatus::Processing, WAIT)
            .await
    );

    let queued = h.orchestrator.create(h.request()).await.unwrap();
    assert_eq!(h.balance(), 12);

    // Processing jobs cannot be cancelled.
    assert!(!assert_ok!(h.orchestrator.cancel(&blocker.id, ACCOUNT)));
    assert!(assert_ok!(h.orchestrator.cancel(&queued.id, ACCOUNT)));
    assert_eq!(h.balance(), 16);

    h.provider.release();
    assert!(h.orchestrator.wait_idle(WAIT).await);

    let cancelled = h.orchestrator.get(&queued.id, ACCOUNT).unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert_eq!(cancelled.cost.refunded, cancelled.cost.charged);
    assert!(cancelled.completed_at.is_some());

    let calls = h.provider.recorded_calls().await;
    assert!(calls.iter().all(|c| c.request.job_id == blocker.id));
    assert_eq!(
        h.webhooks.events(),
        vec![WebhookEvent::JobCancelled, WebhookEvent::JobCompleted]
    );
}

#[tokio::test]
async fn test_upscale_failure_refunds_total_charge() {
    let h = TestHarness::new(10, 8);
    h.provider.fail_stage(Stage::Upscale, "CUDA out of memory").await;

    let job = h.orchestrator.create(h.request()).await.unwrap();
    let failed = fixtures::wait_for_terminal(&h.orchestrator, &job.id, ACCOUNT, WAIT)
        .await
        .unwrap();

    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.progress.enrich, Some(StageStatus::Completed));
    assert_eq!(failed.progress.upscale, Some(StageStatus::Failed));
    assert_eq!(failed.cost.refunded, 4);
    assert_eq!(h.balance(), 10);

    let error = failed.error.unwrap();
    assert_eq!(error.code, "pipeline_error");
    assert_eq!(error.stage, Some(Stage::Upscale));
    assert!(error.retryable);
    assert!(error.message.contains("CUDA out of memory"));

    assert!(h.orchestrator.wait_idle(WAIT).await);
    let sent = h.webhooks.deliveries();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload.event, WebhookEvent::JobFailed);
    assert_eq!(sent[0].payload.status, JobStatus::Failed);
}

#[tokio::test]
async fn test_stage_timeout_fails_job() {
    let h = TestHarness::with_timeout(10, 8, Duration::from_millis(100));
    h.provider
        .set_delay(Stage::Enrich, Duration::from_secs(3))
        .await;

    let job = h
        .orchestrator
        .create(h.request().with_operations(vec![Stage::Enrich]))
        .await
        .unwrap();
    let failed = fixtures::wait_for_terminal(&h.orchestrator, &job.id, ACCOUNT, WAIT)
        .await
        .unwrap();

    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.progress.enrich, Some(StageStatus::Failed));
    assert_eq!(failed.error.unwrap().stage, Some(Stage::Enrich));
    assert_eq!(h.balance(), 10);
}

#[tokio::test]
async fn test_webhook_signature_from_recorded_delivery() {
    let h = TestHarness::new(10, 8);
    let job = h.orchestrator.create(h.request()).await.unwrap();
    fixtures::wait_for_terminal(&h.orchestrator, &job.id, ACCOUNT, WAIT)
        .await
        .unwrap();
    assert!(h.orchestrator.wait_idle(WAIT).await);

    let delivery = h.webhooks.deliveries().pop().unwrap();
    let secret = delivery.target.secret.unwrap();
    assert_eq!(secret, fixtures::TEST_WEBHOOK_SECRET);

    let body = serde_json::to_vec(&delivery.payload).unwrap();
    let now = 1_704_067_200;
    let header = sign(&body, &secret, now).unwrap();
    assert!(verify(&body, &header, &secret, 300, now).is_ok());
    assert!(verify(&body, &header, &secret, 300, now + 301).is_err());

    let mut tampered = body.clone();
    tampered[0] ^= 0x20;
    assert!(verify(&tampered, &header, &secret, 300, now).is_err());
}

#[tokio::test]
async fn test_list_pagination_is_stable() {
    let h = TestHarness::new(100, 8);
    for _ in 0..5 {
        h.orchestrator
            .create(h.request().with_operations(vec![Stage::Infuse]))
            .await
            .unwrap();
    }
    assert!(h.orchestrator.wait_idle(WAIT).await);

    let filter = JobFilter::new().with_limit(2).with_offset(1);
    let first = h.orchestrator.list(ACCOUNT, &filter).unwrap();
    let second = h.orchestrator.list(ACCOUNT, &filter).unwrap();

    assert_eq!(first.total, 5);
    assert_eq!(first.total, second.total);
    let ids = |page: &gateway_core::JobPage| page.jobs.iter().map(|j| j.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&first), ids(&second));
    assert_eq!(first.jobs.len(), 2);
}

#[tokio::test]
async fn test_usage_reflects_spend() {
    let h = TestHarness::new(100, 8);
    h.provider.fail_stage(Stage::Infuse, "nope").await;

    h.orchestrator
        .create(h.request().with_operations(vec![Stage::Enrich, Stage::Upscale]))
        .await
        .unwrap();
    h.orchestrator.create(h.request()).await.unwrap();
    assert!(h.orchestrator.wait_idle(WAIT).await);

    let usage = h.orchestrator.usage(ACCOUNT).unwrap();
    assert_eq!(usage.jobs_total, 2);
    assert_eq!(usage.jobs_completed, 1);
    assert_eq!(usage.jobs_failed, 1);
    assert_eq!(usage.credits_spent, 3);
    assert_eq!(usage.credits_by_stage.get("enrich"), Some(&1));
    assert_eq!(usage.credits_by_stage.get("upscale"), Some(&2));
    assert_eq!(usage.credits_by_stage.get("infuse"), None);
}

fn refunds_for(ledger: &SqliteLedger, job_id: &str) -> usize {
    ledger
        .transactions(ACCOUNT, 100, 0)
        .unwrap()
        .transactions
        .iter()
        .filter(|tx| tx.kind == TransactionKind::Refund && tx.job_id.as_deref() == Some(job_id))
        .count()
}

#[tokio::test]
async fn test_unrecordable_outcome_still_refunds_once() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = Arc::new(SqliteLedger::new(&temp_dir.path().join("ledger.db")).unwrap());
    ledger.open_account(ACCOUNT, Tier::Gallery, 10).unwrap();

    let store = Arc::new(FailingJobStore::new(Arc::new(
        SqliteJobStore::in_memory().unwrap(),
    )));
    store.fail_status(JobStatus::Completed);
    store.fail_status(JobStatus::Failed);

    let orchestrator = fixtures::orchestrator_with_store(
        ledger.clone(),
        store.clone(),
        Arc::new(MockStageProvider::new()),
        Arc::new(RecordingWebhookDispatcher::new()),
        8,
        fixtures::TEST_STAGE_TIMEOUT,
    );

    let job = orchestrator
        .create(CreateJobRequest::new(ACCOUNT, "https://img.example/painting.png"))
        .await
        .unwrap();
    assert_eq!(job.cost.charged, 4);
    assert!(orchestrator.wait_idle(WAIT).await);

    // Neither outcome could be written, but the charge came back.
    let stuck = orchestrator.get(&job.id, ACCOUNT).unwrap();
    assert_eq!(stuck.status, JobStatus::Processing);
    assert_eq!(ledger.account(ACCOUNT).unwrap().unwrap().balance, 10);
    assert_eq!(refunds_for(&ledger, &job.id), 1);

    // Once the store recovers, the job is settled without paying twice.
    store.heal();
    let report = orchestrator.recover().unwrap();
    assert_eq!(report, RecoveryReport { failed: 1, requeued: 0 });

    let failed = orchestrator.get(&job.id, ACCOUNT).unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.error.unwrap().code, "internal_error");
    assert_eq!(ledger.account(ACCOUNT).unwrap().unwrap().balance, 10);
    assert_eq!(refunds_for(&ledger, &job.id), 1);
}

#[tokio::test]
async fn test_recover_unfinished_jobs_after_restart() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("gateway.db");
    let ledger = Arc::new(SqliteLedger::new(&db_path).unwrap());
    ledger.open_account(ACCOUNT, Tier::Gallery, 20).unwrap();

    // First process: one job stuck mid-pipeline, one waiting for a slot.
    let stalled = Arc::new(MockStageProvider::new());
    stalled.hold();
    let before = fixtures::orchestrator_with_store(
        ledger.clone(),
        Arc::new(SqliteJobStore::new(&db_path).unwrap()),
        stalled.clone(),
        Arc::new(RecordingWebhookDispatcher::new()),
        1,
        fixtures::TEST_STAGE_TIMEOUT,
    );
    let request = CreateJobRequest::new(ACCOUNT, "https://img.example/painting.png");
    let interrupted = before.create(request.clone()).await.unwrap();
    assert!(
        fixtures::wait_for_status(&before, &interrupted.id, ACCOUNT, JobStatus::Processing, WAIT)
            .await
    );
    let waiting = before.create(request).await.unwrap();
    assert_eq!(ledger.account(ACCOUNT).unwrap().unwrap().balance, 12);
    drop(before);

    // Second process over the same database.
    let store = Arc::new(SqliteJobStore::new(&db_path).unwrap());
    assert_eq!(store.list_unfinished().unwrap().len(), 2);
    let after = fixtures::orchestrator_with_store(
        ledger.clone(),
        store,
        Arc::new(MockStageProvider::new()),
        Arc::new(RecordingWebhookDispatcher::new()),
        1,
        fixtures::TEST_STAGE_TIMEOUT,
    );

    let report = after.recover().unwrap();
    assert_eq!(report, RecoveryReport { failed: 1, requeued: 1 });

    let failed = after.get(&interrupted.id, ACCOUNT).unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.cost.refunded, failed.cost.charged);

    let completed = fixtures::wait_for_terminal(&after, &waiting.id, ACCOUNT, WAIT)
        .await
        .expect("requeued job should finish");
    assert_eq!(completed.status, JobStatus::Completed);

    assert_eq!(ledger.account(ACCOUNT).unwrap().unwrap().balance, 16);
    assert_eq!(refunds_for(&ledger, &interrupted.id), 1);
}
