//! Webhook delivery configuration.

use serde::{Deserialize, Serialize};

/// Configuration for outbound webhooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Per-delivery HTTP timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum signature age accepted by verification, in seconds.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: i64,

    /// Fallback signing secret for accounts without their own.
    /// When neither exists, webhooks are sent unsigned.
    #[serde(default)]
    pub signing_secret: Option<String>,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_age_secs() -> i64 {
    300
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_age_secs: default_max_age_secs(),
            signing_secret: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WebhookConfig::default();
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.max_age_secs, 300);
        assert!(config.signing_secret.is_none());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: WebhookConfig = toml::from_str(r#"signing_secret = "whsec""#).unwrap();
        assert_eq!(config.signing_secret.as_deref(), Some("whsec"));
        assert_eq!(config.max_age_secs, 300);
    }
}
