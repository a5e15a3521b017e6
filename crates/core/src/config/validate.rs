use std::collections::HashSet;

use super::{types::Config, AuthMethod, ConfigError};

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - API keys: present for `api_key` auth, 64-hex digests, known accounts
/// - Accounts: unique ids, non-negative balances
/// - Prices non-negative, rate limits and timeouts positive
/// - Provider URLs are http(s)
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    // Accounts
    let mut account_ids = HashSet::new();
    for account in &config.accounts {
        if account.id.is_empty() {
            return Err(invalid("accounts[].id cannot be empty"));
        }
        if !account_ids.insert(account.id.as_str()) {
            return Err(invalid(format!("duplicate account id: {}", account.id)));
        }
        if account.initial_balance < 0 {
            return Err(invalid(format!(
                "accounts[{}].initial_balance cannot be negative",
                account.id
            )));
        }
    }

    // Auth
    if config.auth.method == AuthMethod::ApiKey && config.auth.api_keys.is_empty() {
        return Err(invalid(
            "auth.method = \"api_key\" requires at least one auth.api_keys entry",
        ));
    }
    for key in &config.auth.api_keys {
        if !is_sha256_hex(&key.key_sha256) {
            return Err(invalid(format!(
                "api key for {} must be a 64-character hex SHA-256 digest",
                key.account_id
            )));
        }
        if !account_ids.contains(key.account_id.as_str()) {
            return Err(invalid(format!(
                "api key references unknown account: {}",
                key.account_id
            )));
        }
    }

    // Pricing
    let pricing = &config.pricing;
    for (name, price) in [
        ("enrich_standard", pricing.enrich_standard),
        ("enrich_full", pricing.enrich_full),
        ("upscale_low", pricing.upscale_low),
        ("upscale_high", pricing.upscale_high),
        ("infuse", pricing.infuse),
    ] {
        if price < 0 {
            return Err(invalid(format!("pricing.{} cannot be negative", name)));
        }
    }

    // Rate limits
    let limits = &config.rate_limit;
    for (name, limit) in [
        ("free_trial", limits.free_trial),
        ("curator", limits.curator),
        ("studio", limits.studio),
        ("gallery", limits.gallery),
    ] {
        if limit == 0 {
            return Err(invalid(format!("rate_limit.{} must be greater than 0", name)));
        }
    }

    // Providers
    let providers = &config.providers;
    for (name, url) in [
        ("enrich_url", &providers.enrich_url),
        ("upscale_url", &providers.upscale_url),
        ("infuse_url", &providers.infuse_url),
    ] {
        if !is_http_url(url) {
            return Err(invalid(format!("providers.{} must be an http(s) URL", name)));
        }
    }
    if providers.timeout_secs == 0 {
        return Err(invalid("providers.timeout_secs must be greater than 0"));
    }

    // Webhooks
    if config.webhook.timeout_secs == 0 {
        return Err(invalid("webhook.timeout_secs must be greater than 0"));
    }
    if config.webhook.max_age_secs <= 0 {
        return Err(invalid("webhook.max_age_secs must be greater than 0"));
    }

    // Orchestrator
    if config.orchestrator.max_concurrent_jobs == 0 {
        return Err(invalid("orchestrator.max_concurrent_jobs must be greater than 0"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    const DIGEST: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    fn config(extra: &str) -> Config {
        load_config_from_str(&format!(
            r#"
[auth]
method = "none"

[[accounts]]
id = "acct_1"
initial_balance = 10
{}
"#,
            extra
        ))
        .unwrap()
    }

    fn assert_invalid(config: &Config) {
        let result = validate_config(config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))), "{:?}", result);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&config("")).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = config("");
        config.server.port = 0;
        assert_invalid(&config);
    }

    #[test]
    fn test_api_key_method_requires_keys() {
        let mut config = config("");
        config.auth.method = AuthMethod::ApiKey;
        assert_invalid(&config);
    }

    #[test]
    fn test_api_key_entries() {
        let ok = load_config_from_str(&format!(
            r#"
[auth]
method = "api_key"

[[auth.api_keys]]
key_sha256 = "{}"
account_id = "acct_1"

[[accounts]]
id = "acct_1"
"#,
            DIGEST
        ))
        .unwrap();
        assert!(validate_config(&ok).is_ok());

        let mut bad_digest = ok.clone();
        bad_digest.auth.api_keys[0].key_sha256 = "abc".to_string();
        assert_invalid(&bad_digest);

        let mut unknown_account = ok.clone();
        unknown_account.auth.api_keys[0].account_id = "ghost".to_string();
        assert_invalid(&unknown_account);
    }

    #[test]
    fn test_duplicate_accounts_rejected() {
        assert_invalid(&config(
            r#"
[[accounts]]
id = "acct_1"
"#,
        ));
    }

    #[test]
    fn test_negative_values_rejected() {
        let mut negative_price = config("");
        negative_price.pricing.infuse = -1;
        assert_invalid(&negative_price);

        let mut negative_balance = config("");
        negative_balance.accounts[0].initial_balance = -5;
        assert_invalid(&negative_balance);
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut zero_rate = config("");
        zero_rate.rate_limit.gallery = 0;
        assert_invalid(&zero_rate);

        let mut zero_jobs = config("");
        zero_jobs.orchestrator.max_concurrent_jobs = 0;
        assert_invalid(&zero_jobs);

        let mut zero_timeout = config("");
        zero_timeout.providers.timeout_secs = 0;
        assert_invalid(&zero_timeout);
    }

    #[test]
    fn test_provider_url_scheme() {
        let mut config = config("");
        config.providers.upscale_url = "grpc://upscaler:50051".to_string();
        assert_invalid(&config);
    }
}
