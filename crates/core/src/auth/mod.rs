//! Request authentication.
//!
//! Resolves each request to an [`Identity`] naming the account it acts on.

mod api_key;
mod none;
mod traits;
mod types;

pub use api_key::*;
pub use none::*;
pub use traits::*;
pub use types::*;

use crate::config::{AuthConfig, AuthMethod};

/// Build the authenticator selected by `auth.method`.
pub fn create_authenticator(config: &AuthConfig) -> Result<Box<dyn Authenticator>, AuthError> {
    match config.method {
        AuthMethod::None => {
            tracing::warn!("Authentication disabled, all requests act as the anonymous account");
            Ok(Box::new(NoneAuthenticator::new()))
        }
        AuthMethod::ApiKey if config.api_keys.is_empty() => Err(AuthError::ConfigurationError(
            "auth.method = \"api_key\" needs at least one auth.api_keys entry".to_string(),
        )),
        AuthMethod::ApiKey => {
            let authenticator = ApiKeyAuthenticator::new(&config.api_keys)?;
            tracing::debug!(keys = config.api_keys.len(), "API key table loaded");
            Ok(Box::new(authenticator))
        }
    }
}
