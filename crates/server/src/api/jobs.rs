//! Job API handlers.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use gateway_core::{
    CreateJobRequest, Job, JobCost, JobError, JobFilter, JobProgress, JobResults, JobStatus,
    Stage, StageOptions,
};

use super::error::{ApiError, ApiResult};
use super::middleware::AuthUser;
use crate::state::AppState;

/// Default page size for job listings
const DEFAULT_LIMIT: i64 = 20;

/// Headers that carry the client's idempotency key, in order of preference.
const IDEMPOTENCY_HEADERS: [&str; 2] = ["idempotency-key", "x-request-id"];

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for creating a job
#[derive(Debug, Deserialize)]
pub struct CreateJobBody {
    pub image_url: String,
    /// Stages to run; all of them when omitted.
    #[serde(default)]
    pub operations: Option<Vec<Stage>>,
    #[serde(default)]
    pub options: StageOptions,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub status: Option<JobStatus>,
}

#[derive(Debug, Serialize)]
pub struct JobLinks {
    #[serde(rename = "self")]
    pub self_link: String,
    pub cancel: String,
}

impl JobLinks {
    fn for_job(job_id: &str) -> Self {
        let path = format!("/v1/jobs/{}", job_id);
        Self {
            self_link: path.clone(),
            cancel: path,
        }
    }
}

/// Response for an accepted job
#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub operations: Vec<Stage>,
    pub cost: JobCost,
    pub created_at: DateTime<Utc>,
    pub links: JobLinks,
}

impl From<Job> for CreateJobResponse {
    fn from(job: Job) -> Self {
        Self {
            links: JobLinks::for_job(&job.id),
            job_id: job.id,
            status: job.status,
            operations: job.operations,
            cost: job.cost,
            created_at: job.created_at,
        }
    }
}

/// Full job view
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub image_url: String,
    pub operations: Vec<Stage>,
    pub options: StageOptions,
    pub progress: JobProgress,
    pub results: Option<JobResults>,
    pub error: Option<JobError>,
    pub cost: JobCost,
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            image_url: job.image_url,
            operations: job.operations,
            options: job.options,
            progress: job.progress,
            results: job.results,
            error: job.error,
            cost: job.cost,
            metadata: job.metadata,
            webhook_url: job.webhook_url,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobResponse>,
    pub pagination: Pagination,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a job. Responds 202 as soon as the job is charged and stored.
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    AuthUser(account_id): AuthUser,
    headers: HeaderMap,
    body: Result<Json<CreateJobBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;

    let request = CreateJobRequest {
        account_id,
        image_url: body.image_url,
        operations: body.operations,
        options: body.options,
        webhook_url: body.webhook_url,
        metadata: body.metadata,
        idempotency_key: idempotency_key(&headers),
    };

    let job = state.orchestrator().create(request).await?;

    Ok((StatusCode::ACCEPTED, Json(CreateJobResponse::from(job))))
}

/// List the caller's jobs, newest first.
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    AuthUser(account_id): AuthUser,
    params: Result<Query<ListJobsParams>, QueryRejection>,
) -> ApiResult<Json<ListJobsResponse>> {
    let Query(params) = params?;

    let mut filter = JobFilter::new()
        .with_limit(params.limit.unwrap_or(DEFAULT_LIMIT))
        .with_offset(params.offset.unwrap_or(0));
    if let Some(status) = params.status {
        filter = filter.with_status(status);
    }

    let page = state.orchestrator().list(&account_id, &filter)?;
    let has_more = filter.offset + (page.jobs.len() as i64) < page.total;

    Ok(Json(ListJobsResponse {
        jobs: page.jobs.into_iter().map(JobResponse::from).collect(),
        pagination: Pagination {
            total: page.total,
            limit: filter.limit,
            offset: filter.offset,
            has_more,
        },
    }))
}

/// Get a single job.
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    AuthUser(account_id): AuthUser,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobResponse>> {
    let job = state.orchestrator().get(&job_id, &account_id)?;
    Ok(Json(JobResponse::from(job)))
}

/// Cancel a pending job. 204 on success, 404 when absent or no longer pending.
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    AuthUser(account_id): AuthUser,
    Path(job_id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.orchestrator().cancel(&job_id, &account_id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::job_not_found(&job_id)
            .with_detail("cancellable", serde_json::json!(false)))
    }
}

fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    IDEMPOTENCY_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_idempotency_key_prefers_idempotency_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("req-1"));
        headers.insert("idempotency-key", HeaderValue::from_static("idem-1"));
        assert_eq!(idempotency_key(&headers).as_deref(), Some("idem-1"));
    }

    #[test]
    fn test_idempotency_key_falls_back_to_request_id() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static(" req-1 "));
        assert_eq!(idempotency_key(&headers).as_deref(), Some("req-1"));
        assert_eq!(idempotency_key(&HeaderMap::new()), None);
    }

    #[test]
    fn test_links_point_at_job() {
        let links = JobLinks::for_job("job_0123456789ab");
        let json = serde_json::to_value(&links).unwrap();
        assert_eq!(json["self"], "/v1/jobs/job_0123456789ab");
        assert_eq!(json["cancel"], "/v1/jobs/job_0123456789ab");
    }
}
