use async_trait::async_trait;
use thiserror::Error;

use super::types::{AuthRequest, Identity};

#[derive(Debug, Error)]
pub enum AuthError {
    /// No `Authorization: Bearer` or `X-API-Key` header was sent.
    #[error("Authentication required")]
    MissingCredentials,

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The key table could not be built from configuration.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl AuthError {
    /// Label used for the auth failure counter.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials => "missing_credentials",
            AuthError::InvalidCredentials(_) => "invalid_credentials",
            AuthError::ConfigurationError(_) => "configuration_error",
        }
    }
}

/// Resolves the account a request acts on.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError>;

    /// Name of this authentication method, as reported by `/v1/config`.
    fn method_name(&self) -> &'static str;

    /// Whether requests must carry an API key. When false every request
    /// acts as the anonymous account.
    fn requires_credentials(&self) -> bool {
        true
    }
}
