//! Job storage trait and query types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use super::{Job, JobError, JobStatus, UsageStats};
use crate::pipeline::{JobResults, Stage, StageStatus};

/// Error type for job store operations.
#[derive(Debug, Error)]
pub enum JobStoreError {
    /// A job already exists for this account and idempotency key.
    #[error("job already exists for idempotency key {idempotency_key}")]
    Conflict {
        account_id: String,
        idempotency_key: String,
    },

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Filter for listing an account's jobs.
#[derive(Debug, Clone)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl JobFilter {
    pub fn new() -> Self {
        Self {
            status: None,
            limit: 20,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// One page of jobs plus the unpaginated total.
#[derive(Debug, Clone, Serialize)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub total: i64,
}

/// Partial update of a job record.
///
/// Only the fields that are set are written, each to its own column, so
/// concurrent updates to different fields never clobber each other. When
/// `status` is set the whole update is conditional on the current status being
/// a legal predecessor.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Vec<(Stage, StageStatus)>,
    pub refunded: Option<i64>,
    pub results: Option<JobResults>,
    pub error: Option<JobError>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn stage(mut self, stage: Stage, status: StageStatus) -> Self {
        self.progress.push((stage, status));
        self
    }

    pub fn refunded(mut self, amount: i64) -> Self {
        self.refunded = Some(amount);
        self
    }

    pub fn results(mut self, results: JobResults) -> Self {
        self.results = Some(results);
        self
    }

    pub fn error(mut self, error: JobError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.progress.is_empty()
            && self.refunded.is_none()
            && self.results.is_none()
            && self.error.is_none()
            && self.started_at.is_none()
            && self.completed_at.is_none()
    }
}

/// Trait for job storage backends.
pub trait JobStore: Send + Sync {
    /// Persist a new job.
    ///
    /// Fails with [`JobStoreError::Conflict`] if the account already has a job
    /// with the same idempotency key.
    fn insert(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Find the job created with `key` by `account_id`.
    fn find_by_idempotency_key(
        &self,
        account_id: &str,
        key: &str,
    ) -> Result<Option<Job>, JobStoreError>;

    /// Get a job owned by `account_id`. A job owned by another account is
    /// reported as absent.
    fn get(&self, job_id: &str, account_id: &str) -> Result<Option<Job>, JobStoreError>;

    /// List an account's jobs, most recent first.
    fn list(&self, account_id: &str, filter: &JobFilter) -> Result<JobPage, JobStoreError>;

    /// Apply a partial update. Returns false if the job does not exist or the
    /// status transition is not allowed, in which case nothing is written.
    fn update(&self, job_id: &str, update: &JobUpdate) -> Result<bool, JobStoreError>;

    /// Every PENDING or PROCESSING job across all accounts, oldest first.
    fn list_unfinished(&self) -> Result<Vec<Job>, JobStoreError>;

    /// Aggregate an account's jobs created at or after `since`.
    fn usage(&self, account_id: &str, since: DateTime<Utc>) -> Result<UsageStats, JobStoreError>;
}
