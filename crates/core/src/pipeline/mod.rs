//! Sequential multi-stage enhancement pipeline.
//!
//! Stages always run in the order enrich → upscale → infuse. Upscaling
//! replaces the working image for later stages and infusion consumes the
//! metadata produced by enrichment.

mod config;
mod executor;
mod options;
mod provider;
mod types;

pub use config::ProviderConfig;
pub use executor::{PipelineExecutor, PipelineInput, ProgressError, ProgressTracker};
pub use options::{EnrichOptions, EnrichTier, InfuseOptions, OutputFormat, StageOptions, UpscaleModel, UpscaleOptions};
pub use provider::{HttpStageProvider, ProviderError, StageProvider};
pub use types::{JobResults, PipelineError, ResultUrls, Stage, StageOutput, StageRequest, StageStatus};
