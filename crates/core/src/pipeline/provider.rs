//! Stage provider trait and HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use super::config::ProviderConfig;
use super::types::{Stage, StageOutput, StageRequest};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// A downstream service that executes enhancement stages.
#[async_trait]
pub trait StageProvider: Send + Sync {
    /// Run `stage` against the request's working image.
    async fn execute(&self, stage: Stage, request: &StageRequest)
        -> Result<StageOutput, ProviderError>;

    /// Name for logging.
    fn name(&self) -> &'static str;
}

#[derive(Debug, Deserialize)]
struct EnrichResponse {
    #[serde(default, alias = "golden_codex")]
    metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct UpscaleResponse {
    #[serde(default)]
    upscaled_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InfuseResponse {
    #[serde(default)]
    final_url: Option<String>,
}

/// Calls the three stage services over HTTP (`POST {base}/{stage}` with a JSON body).
pub struct HttpStageProvider {
    client: Client,
    config: ProviderConfig,
}

impl HttpStageProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, stage: Stage) -> String {
        let base = match stage {
            Stage::Enrich => &self.config.enrich_url,
            Stage::Upscale => &self.config.upscale_url,
            Stage::Infuse => &self.config.infuse_url,
        };
        format!("{}/{}", base.trim_end_matches('/'), stage.as_str())
    }
}

#[async_trait]
impl StageProvider for HttpStageProvider {
    async fn execute(
        &self,
        stage: Stage,
        request: &StageRequest,
    ) -> Result<StageOutput, ProviderError> {
        let url = self.endpoint(stage);
        debug!(%stage, url = %url, job_id = %request.job_id, "Calling stage provider");

        let response = self.client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let body = response.text().await?;
        let invalid = |e: serde_json::Error| ProviderError::InvalidResponse(e.to_string());

        let output = match stage {
            Stage::Enrich => {
                let parsed: EnrichResponse = serde_json::from_str(&body).map_err(invalid)?;
                StageOutput::Enrich {
                    metadata: parsed
                        .metadata
                        .unwrap_or_else(|| Value::Object(Map::new())),
                }
            }
            Stage::Upscale => {
                let parsed: UpscaleResponse = serde_json::from_str(&body).map_err(invalid)?;
                StageOutput::Upscale {
                    image_url: parsed.upscaled_image_url,
                }
            }
            Stage::Infuse => {
                let parsed: InfuseResponse = serde_json::from_str(&body).map_err(invalid)?;
                StageOutput::Infuse {
                    image_url: parsed.final_url,
                }
            }
        };

        Ok(output)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
