//! Job store wrapper that fails chosen status writes.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};

use crate::job::{
    Job, JobFilter, JobPage, JobStatus, JobStore, JobStoreError, JobUpdate, UsageStats,
};

/// Delegates to an inner store, except that updates moving a job into one of
/// the configured statuses fail with [`JobStoreError::Database`].
///
/// # Example
///
/// ```rust,ignore
/// let store = Arc::new(FailingJobStore::new(Arc::new(SqliteJobStore::in_memory()?)));
/// store.fail_status(JobStatus::Completed);
/// store.fail_status(JobStatus::Failed);
/// ```
pub struct FailingJobStore {
    inner: Arc<dyn JobStore>,
    failing: Mutex<HashSet<JobStatus>>,
}

impl FailingJobStore {
    pub fn new(inner: Arc<dyn JobStore>) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Make every update into `status` fail.
    pub fn fail_status(&self, status: JobStatus) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(status);
    }

    /// Stop injecting failures.
    pub fn heal(&self) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn should_fail(&self, update: &JobUpdate) -> bool {
        let failing = self.failing.lock().unwrap_or_else(PoisonError::into_inner);
        update.status.is_some_and(|s| failing.contains(&s))
    }
}

impl JobStore for FailingJobStore {
    fn insert(&self, job: &Job) -> Result<(), JobStoreError> {
        self.inner.insert(job)
    }

    fn find_by_idempotency_key(
        &self,
        account_id: &str,
        key: &str,
    ) -> Result<Option<Job>, JobStoreError> {
        self.inner.find_by_idempotency_key(account_id, key)
    }

    fn get(&self, job_id: &str, account_id: &str) -> Result<Option<Job>, JobStoreError> {
        self.inner.get(job_id, account_id)
    }

    fn list(&self, account_id: &str, filter: &JobFilter) -> Result<JobPage, JobStoreError> {
        self.inner.list(account_id, filter)
    }

    fn update(&self, job_id: &str, update: &JobUpdate) -> Result<bool, JobStoreError> {
        if self.should_fail(update) {
            return Err(JobStoreError::Database("disk I/O error".to_string()));
        }
        self.inner.update(job_id, update)
    }

    fn list_unfinished(&self) -> Result<Vec<Job>, JobStoreError> {
        self.inner.list_unfinished()
    }

    fn usage(&self, account_id: &str, since: DateTime<Utc>) -> Result<UsageStats, JobStoreError> {
        self.inner.usage(account_id, since)
    }
}
