use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

/// Request information for authentication
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub headers: HashMap<String, String>,
    pub source_ip: IpAddr,
}

/// Account id used when authentication is disabled.
pub const ANONYMOUS_ACCOUNT: &str = "anonymous";

/// Authenticated identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Account the request acts on.
    pub account_id: String,
    pub method: String,
    /// Stable, non-secret credential id (digest prefix) when a key was used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    pub claims: HashMap<String, serde_json::Value>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            account_id: ANONYMOUS_ACCOUNT.to_string(),
            method: "none".to_string(),
            key_id: None,
            claims: HashMap::new(),
        }
    }

    /// Key for per-credential rate limiting.
    pub fn rate_limit_key(&self) -> String {
        match self.key_id {
            Some(ref key_id) => format!("key:{}", key_id),
            None => format!("account:{}", self.account_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_identity() {
        let identity = Identity::anonymous();
        assert_eq!(identity.account_id, "anonymous");
        assert_eq!(identity.method, "none");
        assert!(identity.key_id.is_none());
        assert!(identity.claims.is_empty());
        assert_eq!(identity.rate_limit_key(), "account:anonymous");
    }

    #[test]
    fn test_identity_serialization() {
        let identity = Identity {
            account_id: "acct_123".to_string(),
            method: "api_key".to_string(),
            key_id: Some("9f86d081884c".to_string()),
            claims: {
                let mut map = HashMap::new();
                map.insert("email".to_string(), serde_json::json!("user@example.com"));
                map
            },
        };

        let json = serde_json::to_string(&identity).unwrap();
        let deserialized: Identity = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.account_id, "acct_123");
        assert_eq!(deserialized.method, "api_key");
        assert_eq!(deserialized.rate_limit_key(), "key:9f86d081884c");
        assert_eq!(
            deserialized.claims.get("email"),
            Some(&serde_json::json!("user@example.com"))
        );
    }
}
