pub mod auth;
pub mod config;
pub mod job;
pub mod ledger;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod pricing;
pub mod rate_limit;
pub mod testing;
pub mod webhook;

pub use auth::{
    create_authenticator, hash_api_key, ApiKeyAuthenticator, AuthError, AuthRequest,
    Authenticator, Identity, NoneAuthenticator, ANONYMOUS_ACCOUNT,
};
pub use config::{
    config_path, load_config, load_config_from_str, validate_config, AccountConfig, ApiKeyEntry,
    AuthConfig, AuthMethod, Config, ConfigError, DatabaseConfig, SanitizedConfig, ServerConfig,
};
pub use job::{
    Job, JobCost, JobError, JobFilter, JobPage, JobProgress, JobStatus, JobStore, JobStoreError,
    SqliteJobStore, UsageStats,
};
pub use ledger::{
    Account, Ledger, LedgerError, LedgerTransaction, SqliteLedger, Tier, TransactionKind,
    TransactionPage,
};
pub use orchestrator::{
    CreateJobRequest, JobOrchestrator, OrchestratorConfig, OrchestratorError, OrchestratorStatus,
    RecoveryReport, WebhookSecrets, MAX_PAGE_SIZE,
};
pub use pipeline::{
    HttpStageProvider, JobResults, PipelineError, PipelineExecutor, ProviderConfig, Stage,
    StageOptions, StageProvider, StageStatus,
};
pub use pricing::{CostEstimate, PricingConfig, StageCost};
pub use rate_limit::{
    FixedWindowRateLimiter, RateLimitConfig, RateLimitError, RateLimitStatus, RateLimiter,
};
pub use webhook::{
    HttpWebhookDispatcher, WebhookConfig, WebhookDispatcher, WebhookError, WebhookEvent,
    WebhookPayload, WebhookTarget,
};
