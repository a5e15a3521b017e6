//! Types for the job orchestrator.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::job::JobStoreError;
use crate::pipeline::{Stage, StageOptions};

/// Maximum accepted idempotency key length.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The account cannot cover the job's cost. No job was created.
    #[error("insufficient credits: balance {balance}, required {required}")]
    InsufficientFunds { balance: i64, required: i64 },

    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// Malformed request. Nothing was charged or stored.
    #[error("validation error: {0}")]
    Validation(String),

    /// Job absent or owned by another account.
    #[error("job not found: {0}")]
    NotFound(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("job store error: {0}")]
    JobStore(#[from] JobStoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// A request to create a job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub account_id: String,
    pub image_url: String,
    /// Requested stages. `None` means all three.
    #[serde(default)]
    pub operations: Option<Vec<Stage>>,
    #[serde(default)]
    pub options: StageOptions,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl CreateJobRequest {
    pub fn new(account_id: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            image_url: image_url.into(),
            ..Self::default()
        }
    }

    pub fn with_operations(mut self, operations: Vec<Stage>) -> Self {
        self.operations = Some(operations);
        self
    }

    pub fn with_options(mut self, options: StageOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_webhook_url(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Webhook signing secrets, resolved per account with a global fallback.
#[derive(Debug, Clone, Default)]
pub struct WebhookSecrets {
    per_account: HashMap<String, String>,
    fallback: Option<String>,
}

impl WebhookSecrets {
    pub fn new(per_account: HashMap<String, String>, fallback: Option<String>) -> Self {
        Self {
            per_account,
            fallback,
        }
    }

    pub fn resolve(&self, account_id: &str) -> Option<String> {
        self.per_account
            .get(account_id)
            .or(self.fallback.as_ref())
            .cloned()
    }
}

/// Snapshot of orchestrator load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// Jobs currently executing stages.
    pub active_jobs: usize,
    /// Jobs waiting for an execution slot.
    pub queued_jobs: usize,
    pub max_concurrent_jobs: usize,
}

/// Outcome of [`JobOrchestrator::recover`](super::JobOrchestrator::recover).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Interrupted PROCESSING jobs failed and refunded.
    pub failed: usize,
    /// PENDING jobs queued again.
    pub requeued: usize,
}

/// Validate stage selection: `None` selects every stage, an explicit list
/// must be non-empty and is ordered and deduplicated.
pub(crate) fn resolve_operations(operations: Option<&[Stage]>) -> Result<Vec<Stage>, OrchestratorError> {
    match operations {
        None => Ok(Stage::ALL.to_vec()),
        Some([]) => Err(OrchestratorError::Validation(
            "at least one operation is required".to_string(),
        )),
        Some(stages) => Ok(Stage::normalize(stages)),
    }
}

pub(crate) fn validate_http_url(field: &str, value: &str) -> Result<(), OrchestratorError> {
    let url = reqwest::Url::parse(value)
        .map_err(|e| OrchestratorError::Validation(format!("{} is not a valid URL: {}", field, e)))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(()),
        _ => Err(OrchestratorError::Validation(format!(
            "{} must be an http or https URL",
            field
        ))),
    }
}

impl CreateJobRequest {
    /// Check the request and return the normalized stage list.
    pub(crate) fn validate(&self) -> Result<Vec<Stage>, OrchestratorError> {
        if self.account_id.is_empty() {
            return Err(OrchestratorError::Validation(
                "account_id is required".to_string(),
            ));
        }
        validate_http_url("image_url", &self.image_url)?;
        let operations = resolve_operations(self.operations.as_deref())?;

        if let Some(ref url) = self.webhook_url {
            validate_http_url("webhook_url", url)?;
        }
        if let Some(ref metadata) = self.metadata {
            if !metadata.is_object() {
                return Err(OrchestratorError::Validation(
                    "metadata must be a JSON object".to_string(),
                ));
            }
        }
        if let Some(ref key) = self.idempotency_key {
            if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
                return Err(OrchestratorError::Validation(format!(
                    "idempotency key must be 1-{} characters",
                    MAX_IDEMPOTENCY_KEY_LEN
                )));
            }
        }

        Ok(operations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> CreateJobRequest {
        CreateJobRequest::new("acct", "https://img.example/a.png")
    }

    #[test]
    fn test_operations_default_to_all_stages() {
        assert_eq!(request().validate().unwrap(), Stage::ALL.to_vec());
    }

    #[test]
    fn test_operations_are_normalized() {
        let ops = request()
            .with_operations(vec![Stage::Infuse, Stage::Enrich, Stage::Infuse])
            .validate()
            .unwrap();
        assert_eq!(ops, vec![Stage::Enrich, Stage::Infuse]);
    }

    #[test]
    fn test_empty_operations_rejected() {
        let err = request().with_operations(vec![]).validate().unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation(_)));
    }

    #[test]
    fn test_image_url_must_be_http() {
        for url in ["ftp://img.example/a.png", "not a url", "file:///etc/passwd", ""] {
            let err = CreateJobRequest::new("acct", url).validate().unwrap_err();
            assert!(matches!(err, OrchestratorError::Validation(_)), "{}", url);
        }
    }

    #[test]
    fn test_webhook_url_must_be_http() {
        let err = request()
            .with_webhook_url("mailto:ops@example.com")
            .validate()
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation(_)));
        assert!(request()
            .with_webhook_url("https://hooks.example/x")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_metadata_must_be_object() {
        assert!(request().with_metadata(json!([1, 2])).validate().is_err());
        assert!(request().with_metadata(json!({"k": "v"})).validate().is_ok());
    }

    #[test]
    fn test_idempotency_key_length() {
        let long = "k".repeat(MAX_IDEMPOTENCY_KEY_LEN + 1);
        assert!(request().with_idempotency_key(long).validate().is_err());
        assert!(request()
            .with_idempotency_key("k".repeat(MAX_IDEMPOTENCY_KEY_LEN))
            .validate()
            .is_ok());
    }

    #[test]
    fn test_webhook_secret_resolution() {
        let secrets = WebhookSecrets::new(
            HashMap::from([("acct".to_string(), "own".to_string())]),
            Some("global".to_string()),
        );
        assert_eq!(secrets.resolve("acct").as_deref(), Some("own"));
        assert_eq!(secrets.resolve("other").as_deref(), Some("global"));
        assert_eq!(WebhookSecrets::default().resolve("acct"), None);
    }

    #[test]
    fn test_error_display() {
        let err = OrchestratorError::InsufficientFunds {
            balance: 1,
            required: 4,
        };
        assert_eq!(err.to_string(), "insufficient credits: balance 1, required 4");
    }
}
