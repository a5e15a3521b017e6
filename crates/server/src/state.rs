use std::sync::Arc;

use gateway_core::{
    Authenticator, Config, JobOrchestrator, Ledger, RateLimiter, SanitizedConfig, Tier,
};

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    orchestrator: Arc<JobOrchestrator>,
    ledger: Arc<dyn Ledger>,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl AppState {
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        orchestrator: Arc<JobOrchestrator>,
        ledger: Arc<dyn Ledger>,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            config,
            authenticator,
            orchestrator,
            ledger,
            rate_limiter,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn orchestrator(&self) -> &JobOrchestrator {
        self.orchestrator.as_ref()
    }

    pub fn ledger(&self) -> &dyn Ledger {
        self.ledger.as_ref()
    }

    pub fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    /// Tier used for rate limiting. Unknown accounts get the lowest tier.
    pub fn tier_of(&self, account_id: &str) -> Tier {
        match self.ledger.account(account_id) {
            Ok(Some(account)) => account.tier,
            Ok(None) => Tier::default(),
            Err(e) => {
                tracing::warn!(account_id, error = %e, "Failed to look up account tier");
                Tier::default()
            }
        }
    }
}
