//! API Key authentication.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{AuthError, AuthRequest, Authenticator, Identity};
use crate::config::ApiKeyEntry;

/// Length of the digest prefix used as the credential id.
pub const KEY_ID_LEN: usize = 12;

/// Length in bytes of a SHA-256 digest.
const DIGEST_LEN: usize = 32;

/// A configured key, digest decoded for comparison.
struct KnownKey {
    digest: Vec<u8>,
    digest_hex: String,
    account_id: String,
    label: Option<String>,
}

/// Authenticator that validates requests against configured API key digests.
///
/// Accepts the key in either:
/// - `Authorization: Bearer <key>` header
/// - `X-API-Key: <key>` header
///
/// Only SHA-256 digests of keys are configured; the presented key is hashed
/// and compared in constant time.
pub struct ApiKeyAuthenticator {
    keys: Vec<KnownKey>,
}

impl ApiKeyAuthenticator {
    pub fn new(entries: &[ApiKeyEntry]) -> Result<Self, AuthError> {
        let keys = entries
            .iter()
            .map(|entry| {
                let digest_hex = entry.key_sha256.to_ascii_lowercase();
                let digest = hex::decode(&digest_hex).map_err(|_| {
                    AuthError::ConfigurationError(format!(
                        "api key digest for {} is not valid hex",
                        entry.account_id
                    ))
                })?;
                if digest.len() != DIGEST_LEN {
                    return Err(AuthError::ConfigurationError(format!(
                        "api key digest for {} must be a 64-character SHA-256 hex digest",
                        entry.account_id
                    )));
                }
                Ok(KnownKey {
                    digest,
                    digest_hex,
                    account_id: entry.account_id.clone(),
                    label: entry.label.clone(),
                })
            })
            .collect::<Result<Vec<_>, AuthError>>()?;

        Ok(Self { keys })
    }

    /// Extract API key from request headers.
    /// Checks Authorization: Bearer and X-API-Key headers.
    fn extract_key(&self, request: &AuthRequest) -> Option<String> {
        // Check Authorization: Bearer <key>
        if let Some(auth_header) = request.headers.get("authorization") {
            if let Some(key) = auth_header.strip_prefix("Bearer ") {
                return Some(key.trim().to_string());
            }
            // Also support lowercase
            if let Some(key) = auth_header.strip_prefix("bearer ") {
                return Some(key.trim().to_string());
            }
        }

        // Check X-API-Key header
        if let Some(key) = request.headers.get("x-api-key") {
            return Some(key.trim().to_string());
        }

        None
    }
}

/// Lowercase hex SHA-256 of a raw key, as configured in `auth.api_keys`.
pub fn hash_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let provided_key = self
            .extract_key(request)
            .filter(|k| !k.is_empty())
            .ok_or(AuthError::MissingCredentials)?;
        let provided = Sha256::digest(provided_key.as_bytes());

        // Constant-time comparison to prevent timing attacks
        let known = self
            .keys
            .iter()
            .find(|k| constant_time_eq(provided.as_slice(), &k.digest))
            .ok_or_else(|| AuthError::InvalidCredentials("Invalid API key".to_string()))?;

        let mut claims = std::collections::HashMap::new();
        if let Some(ref label) = known.label {
            claims.insert("label".to_string(), serde_json::json!(label));
        }

        Ok(Identity {
            account_id: known.account_id.clone(),
            method: "api_key".to_string(),
            key_id: Some(known.digest_hex[..KEY_ID_LEN].to_string()),
            claims,
        })
    }

    fn method_name(&self) -> &'static str {
        "api_key"
    }
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
