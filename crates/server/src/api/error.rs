//! API error type and HTTP response mapping.
//!
//! Every error response has the shape
//! `{"error": {"code": "...", "message": "...", ...details}}`.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};
use tracing::error;

use gateway_core::{LedgerError, OrchestratorError, RateLimitError};

/// API result type.
pub type ApiResult<T> = Result<T, ApiError>;

/// HTTP API error with a stable machine-readable code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Map<String, Value>,
    headers: HeaderMap,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: Map::new(),
            headers: HeaderMap::new(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn insufficient_credits(balance: i64, required: i64) -> Self {
        Self::new(
            StatusCode::PAYMENT_REQUIRED,
            "insufficient_credits",
            format!(
                "Insufficient credits: balance {}, required {}",
                balance, required
            ),
        )
        .with_detail("balance", json!(balance))
        .with_detail("required", json!(required))
    }

    pub fn job_not_found(job_id: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "job_not_found",
            format!("Job not found: {}", job_id),
        )
    }

    pub fn account_not_found(account_id: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "account_not_found",
            format!("Account not found: {}", account_id),
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", message)
    }

    /// Internal failure. The cause is logged, the client gets a generic message.
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        error!(error = %cause, "Internal error while handling request");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Internal server error",
        )
    }

    pub fn rate_limited(retry_after_secs: u64, limit: u32, remaining: u32, reset_at: i64) -> Self {
        let mut err = Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            format!(
                "Rate limit of {} requests per minute exceeded, retry in {}s",
                limit, retry_after_secs
            ),
        )
        .with_detail("retry_after", json!(retry_after_secs));
        insert_rate_limit_headers(&mut err.headers, limit, remaining, reset_at);
        if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
            err.headers.insert("retry-after", value);
        }
        err
    }

    #[must_use]
    pub fn with_detail(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

/// Set the `X-RateLimit-*` headers.
pub fn insert_rate_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, reset_at: i64) {
    for (name, value) in [
        ("x-ratelimit-limit", limit.to_string()),
        ("x-ratelimit-remaining", remaining.to_string()),
        ("x-ratelimit-reset", reset_at.to_string()),
    ] {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = Map::new();
        body.insert("code".to_string(), json!(self.code));
        body.insert("message".to_string(), json!(self.message));
        body.extend(self.details);

        let mut response = (self.status, Json(json!({ "error": body }))).into_response();
        response.headers_mut().extend(self.headers);
        response
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::InsufficientFunds { balance, required } => {
                Self::insufficient_credits(balance, required)
            }
            OrchestratorError::AccountNotFound(id) => Self::account_not_found(&id),
            OrchestratorError::Validation(message) => Self::validation(message),
            OrchestratorError::NotFound(id) => Self::job_not_found(&id),
            OrchestratorError::Ledger(e) => e.into(),
            e @ (OrchestratorError::JobStore(_) | OrchestratorError::Internal(_)) => {
                Self::internal(e)
            }
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds { balance, required } => {
                Self::insufficient_credits(balance, required)
            }
            LedgerError::AccountNotFound(id) => Self::account_not_found(&id),
            e @ LedgerError::Database(_) => Self::internal(e),
        }
    }
}

impl From<RateLimitError> for ApiError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Exceeded {
                retry_after_secs,
                limit,
                remaining,
                reset_at,
            } => Self::rate_limited(retry_after_secs, limit, remaining, reset_at),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}
