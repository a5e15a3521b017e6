//! Rate limit configuration.

use serde::{Deserialize, Serialize};

use crate::ledger::Tier;

/// Requests per minute allowed for each account tier.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_free_trial")]
    pub free_trial: u32,
    #[serde(default = "default_curator")]
    pub curator: u32,
    #[serde(default = "default_studio")]
    pub studio: u32,
    #[serde(default = "default_gallery")]
    pub gallery: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            free_trial: default_free_trial(),
            curator: default_curator(),
            studio: default_studio(),
            gallery: default_gallery(),
        }
    }
}

impl RateLimitConfig {
    /// Requests per minute for `tier`.
    pub fn limit_for(&self, tier: Tier) -> u32 {
        match tier {
            Tier::FreeTrial => self.free_trial,
            Tier::Curator => self.curator,
            Tier::Studio => self.studio,
            Tier::Gallery => self.gallery,
        }
    }
}

fn default_free_trial() -> u32 {
    10
}

fn default_curator() -> u32 {
    30
}

fn default_studio() -> u32 {
    100
}

fn default_gallery() -> u32 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let config = RateLimitConfig::default();
        assert_eq!(config.limit_for(Tier::FreeTrial), 10);
        assert_eq!(config.limit_for(Tier::Curator), 30);
        assert_eq!(config.limit_for(Tier::Studio), 100);
        assert_eq!(config.limit_for(Tier::Gallery), 300);
    }

    #[test]
    fn test_partial_override() {
        let config: RateLimitConfig = toml::from_str("studio = 5").unwrap();
        assert_eq!(config.studio, 5);
        assert_eq!(config.gallery, 300);
    }
}
