use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::ledger::Tier;
use crate::orchestrator::OrchestratorConfig;
use crate::pipeline::ProviderConfig;
use crate::pricing::PricingConfig;
use crate::rate_limit::RateLimitConfig;
use crate::webhook::WebhookConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Accounts opened at startup (existing balances are left untouched).
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub providers: ProviderConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// Accepted API keys (required when `method = "api_key"`).
    #[serde(default)]
    pub api_keys: Vec<ApiKeyEntry>,
}

/// One accepted API key, stored as a SHA-256 digest.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiKeyEntry {
    /// Lowercase hex SHA-256 of the raw key.
    pub key_sha256: String,
    /// Account the key authenticates as.
    pub account_id: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("gateway.db")
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    ApiKey,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::ApiKey => "api_key",
        }
    }
}

/// An account provisioned from configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
    pub id: String,
    #[serde(default)]
    pub tier: Tier,
    /// Starting credits when the account does not exist yet.
    #[serde(default)]
    pub initial_balance: i64,
    /// Signing secret for this account's webhooks.
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub accounts: Vec<SanitizedAccountConfig>,
    pub rate_limit: RateLimitConfig,
    pub pricing: PricingConfig,
    pub providers: ProviderConfig,
    pub webhook: SanitizedWebhookConfig,
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
    /// Key labels (or account ids) only, never digests.
    pub api_keys: Vec<String>,
}

/// Sanitized account config (webhook secret hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAccountConfig {
    pub id: String,
    pub tier: Tier,
    pub initial_balance: i64,
    pub webhook_secret_configured: bool,
}

/// Sanitized webhook config (signing secret hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedWebhookConfig {
    pub timeout_secs: u64,
    pub max_age_secs: i64,
    pub signing_secret_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: config.auth.method.as_str().to_string(),
                api_keys: config
                    .auth
                    .api_keys
                    .iter()
                    .map(|k| k.label.clone().unwrap_or_else(|| k.account_id.clone()))
                    .collect(),
            },
            server: config.server.clone(),
            database: config.database.clone(),
            accounts: config
                .accounts
                .iter()
                .map(|a| SanitizedAccountConfig {
                    id: a.id.clone(),
                    tier: a.tier,
                    initial_balance: a.initial_balance,
                    webhook_secret_configured: a.webhook_secret.is_some(),
                })
                .collect(),
            rate_limit: config.rate_limit.clone(),
            pricing: config.pricing.clone(),
            providers: config.providers.clone(),
            webhook: SanitizedWebhookConfig {
                timeout_secs: config.webhook.timeout_secs,
                max_age_secs: config.webhook.max_age_secs,
                signing_secret_configured: config.webhook.signing_secret.is_some(),
            },
            orchestrator: config.orchestrator.clone(),
        }
    }
}
