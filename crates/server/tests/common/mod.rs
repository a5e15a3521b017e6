//! Common test utilities for in-process API testing with mocks.
//!
//! This module provides a test fixture that builds the real router over an
//! in-memory job store, an on-disk ledger and mock stage providers, so the
//! HTTP surface can be exercised end to end without external services.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use gateway_core::testing::{fixtures, MockStageProvider, RecordingWebhookDispatcher};
use gateway_core::{
    hash_api_key, load_config_from_str, AccountConfig, ApiKeyAuthenticator, ApiKeyEntry,
    AuthConfig, AuthMethod, FixedWindowRateLimiter, Job, JobOrchestrator, Ledger,
    RateLimitConfig, SqliteLedger, Tier,
};
use gateway_server::state::AppState;

/// API key of the primary test account.
pub const API_KEY: &str = "gw_test_primary";
/// Account the primary key authenticates as.
pub const ACCOUNT: &str = "acct_primary";
/// API key of a second, unrelated account.
pub const OTHER_API_KEY: &str = "gw_test_other";
pub const OTHER_ACCOUNT: &str = "acct_other";

/// Test fixture for API testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_job_creation() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/v1/jobs", json!({
///         "image_url": "https://img.example/a.png"
///     })).await;
///
///     assert_eq!(response.status, 202);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock stage provider - control stage outputs, failures and delays
    pub provider: Arc<MockStageProvider>,
    /// Recorded webhook deliveries
    pub webhooks: Arc<RecordingWebhookDispatcher>,
    pub ledger: Arc<SqliteLedger>,
    pub orchestrator: Arc<JobOrchestrator>,
    /// Keeps the ledger database alive
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub balance: i64,
    pub tier: Tier,
    /// Requests per minute for the primary account's tier
    pub rate_limit: u32,
    pub max_concurrent_jobs: usize,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            balance: 100,
            tier: Tier::Studio,
            rate_limit: 1000,
            max_concurrent_jobs: 4,
        }
    }
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let provider = Arc::new(MockStageProvider::new());
        let webhooks = Arc::new(RecordingWebhookDispatcher::new());

        let mut config = load_config_from_str("[auth]\nmethod = \"api_key\"")
            .expect("Failed to parse base config");
        config.database.path = temp_dir.path().join("test.db");
        config.auth = AuthConfig {
            method: AuthMethod::ApiKey,
            api_keys: vec![
                ApiKeyEntry {
                    key_sha256: hash_api_key(API_KEY),
                    account_id: ACCOUNT.to_string(),
                    label: Some("primary".to_string()),
                },
                ApiKeyEntry {
                    key_sha256: hash_api_key(OTHER_API_KEY),
                    account_id: OTHER_ACCOUNT.to_string(),
                    label: None,
                },
            ],
        };
        config.accounts = vec![
            AccountConfig {
                id: ACCOUNT.to_string(),
                tier: test_config.tier,
                initial_balance: test_config.balance,
                webhook_secret: Some("whsec_primary".to_string()),
            },
            AccountConfig {
                id: OTHER_ACCOUNT.to_string(),
                tier: Tier::FreeTrial,
                initial_balance: 100,
                webhook_secret: None,
            },
        ];
        config.rate_limit = RateLimitConfig {
            free_trial: 1000,
            curator: test_config.rate_limit,
            studio: test_config.rate_limit,
            gallery: test_config.rate_limit,
        };
        config.orchestrator.max_concurrent_jobs = test_config.max_concurrent_jobs;

        let ledger = Arc::new(
            SqliteLedger::new(&config.database.path).expect("Failed to create ledger"),
        );
        for account in &config.accounts {
            ledger
                .open_account(&account.id, account.tier, account.initial_balance)
                .expect("Failed to open account");
        }

        let orchestrator = Arc::new(fixtures::orchestrator(
            ledger.clone(),
            provider.clone(),
            webhooks.clone(),
            test_config.max_concurrent_jobs,
        ));

        let authenticator =
            ApiKeyAuthenticator::new(&config.auth.api_keys).expect("Failed to create authenticator");

        let state = Arc::new(AppState::new(
            config,
            Arc::new(authenticator),
            orchestrator.clone(),
            ledger.clone(),
            Arc::new(FixedWindowRateLimiter::new()),
        ));

        let router = gateway_server::api::create_router(state);

        Self {
            router,
            provider,
            webhooks,
            ledger,
            orchestrator,
            temp_dir,
        }
    }

    /// Send a GET request as the primary account.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, &[("x-api-key", API_KEY)]).await
    }

    /// Send a POST request with JSON body as the primary account.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), &[("x-api-key", API_KEY)])
            .await
    }

    /// Send a DELETE request as the primary account.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None, &[("x-api-key", API_KEY)])
            .await
    }

    /// Send a request with explicit headers (no credentials added).
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);
        for (name, value) in headers {
            request_builder = request_builder.header(*name, *value);
        }

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    /// Send a POST request with a raw body (for malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .header("x-api-key", API_KEY)
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub fn balance(&self, account_id: &str) -> i64 {
        self.ledger
            .account(account_id)
            .unwrap()
            .expect("account exists")
            .balance
    }

    /// Wait until the job reaches a terminal status.
    pub async fn wait_for_terminal(&self, job_id: &str) -> Job {
        fixtures::wait_for_terminal(&self.orchestrator, job_id, ACCOUNT, Duration::from_secs(5))
            .await
            .expect("job did not finish in time")
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
