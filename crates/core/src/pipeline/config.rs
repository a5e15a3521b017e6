//! Stage provider configuration.

use serde::{Deserialize, Serialize};

/// Base URLs of the three downstream stage providers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Metadata enrichment service (receives `POST /enrich`).
    #[serde(default = "default_enrich_url")]
    pub enrich_url: String,
    /// Upscaling service (receives `POST /upscale`).
    #[serde(default = "default_upscale_url")]
    pub upscale_url: String,
    /// Metadata infusion service (receives `POST /infuse`).
    #[serde(default = "default_infuse_url")]
    pub infuse_url: String,
    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enrich_url: default_enrich_url(),
            upscale_url: default_upscale_url(),
            infuse_url: default_infuse_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_enrich_url() -> String {
    "http://127.0.0.1:8101".to_string()
}

fn default_upscale_url() -> String {
    "http://127.0.0.1:8102".to_string()
}

fn default_infuse_url() -> String {
    "http://127.0.0.1:8103".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: ProviderConfig = toml::from_str("").unwrap();
        assert_eq!(config.timeout_secs, 300);
        assert!(config.enrich_url.starts_with("http://"));
    }

    #[test]
    fn test_override() {
        let config: ProviderConfig = toml::from_str(
            r#"
enrich_url = "https://enrich.internal"
timeout_secs = 45
"#,
        )
        .unwrap();
        assert_eq!(config.enrich_url, "https://enrich.internal");
        assert_eq!(config.timeout_secs, 45);
        assert_eq!(config.upscale_url, "http://127.0.0.1:8102");
    }
}
