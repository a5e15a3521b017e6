//! Credit pricing for enhancement stages.
//!
//! Costs are a pure function of the requested stages and their options.

use serde::{Deserialize, Serialize};

use crate::pipeline::{EnrichTier, Stage, StageOptions};

/// Credit cost of each stage variant.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PricingConfig {
    #[serde(default = "default_one")]
    pub enrich_standard: i64,
    #[serde(default = "default_two")]
    pub enrich_full: i64,
    #[serde(default = "default_one")]
    pub upscale_low: i64,
    #[serde(default = "default_two")]
    pub upscale_high: i64,
    #[serde(default = "default_one")]
    pub infuse: i64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            enrich_standard: default_one(),
            enrich_full: default_two(),
            upscale_low: default_one(),
            upscale_high: default_two(),
            infuse: default_one(),
        }
    }
}

fn default_one() -> i64 {
    1
}

fn default_two() -> i64 {
    2
}

/// Cost of one stage within an estimate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCost {
    pub stage: Stage,
    pub cost: i64,
    /// The option that selected the price (tier, model or format).
    pub option: String,
}

/// Total and per-stage cost of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub total: i64,
    pub breakdown: Vec<StageCost>,
}

impl CostEstimate {
    /// Cost attributed to `stage`, zero if it was not requested.
    pub fn cost_of(&self, stage: Stage) -> i64 {
        self.breakdown
            .iter()
            .filter(|c| c.stage == stage)
            .map(|c| c.cost)
            .sum()
    }
}

impl PricingConfig {
    /// Price the given stages. Duplicate stages are charged once.
    pub fn estimate(&self, stages: &[Stage], options: &StageOptions) -> CostEstimate {
        let breakdown: Vec<StageCost> = Stage::normalize(stages)
            .into_iter()
            .map(|stage| match stage {
                Stage::Enrich => StageCost {
                    stage,
                    cost: match options.enrich.tier {
                        EnrichTier::Standard => self.enrich_standard,
                        EnrichTier::Full => self.enrich_full,
                    },
                    option: options.enrich.tier.as_str().to_string(),
                },
                Stage::Upscale => StageCost {
                    stage,
                    cost: if options.upscale.model.is_high_cost() {
                        self.upscale_high
                    } else {
                        self.upscale_low
                    },
                    option: options.upscale.model.as_str().to_string(),
                },
                Stage::Infuse => StageCost {
                    stage,
                    cost: self.infuse,
                    option: options.infuse.format.as_str().to_string(),
                },
            })
            .collect();

        CostEstimate {
            total: breakdown.iter().map(|c| c.cost).sum(),
            breakdown,
        }
    }
}
