//! Webhook payload and error types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::{Job, JobError, JobStatus};
use crate::pipeline::JobResults;

/// Errors from webhook signing and verification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("malformed signature header")]
    MalformedHeader,

    #[error("signature timestamp outside tolerance ({age_secs}s old)")]
    Expired { age_secs: i64 },

    #[error("signature mismatch")]
    Mismatch,

    #[error("invalid signing key")]
    InvalidKey,
}

/// Event names sent in the `event` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookEvent {
    #[serde(rename = "job.completed")]
    JobCompleted,
    #[serde(rename = "job.failed")]
    JobFailed,
    #[serde(rename = "job.cancelled")]
    JobCancelled,
}

impl WebhookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEvent::JobCompleted => "job.completed",
            WebhookEvent::JobFailed => "job.failed",
            WebhookEvent::JobCancelled => "job.cancelled",
        }
    }
}

/// Body POSTed to the subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event: WebhookEvent,
    pub job_id: String,
    pub status: JobStatus,
    pub results: Option<JobResults>,
    pub error: Option<JobError>,
    pub timestamp: DateTime<Utc>,
}

impl WebhookPayload {
    /// Build the payload describing a job's current state.
    pub fn for_job(event: WebhookEvent, job: &Job) -> Self {
        Self {
            event,
            job_id: job.id.clone(),
            status: job.status,
            results: job.results.clone(),
            error: job.error.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Where to deliver a webhook and how to sign it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookTarget {
    pub url: String,
    pub secret: Option<String>,
}

impl WebhookTarget {
    pub fn new(url: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            url: url.into(),
            secret,
        }
    }
}
