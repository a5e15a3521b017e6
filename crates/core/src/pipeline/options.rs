//! Per-stage request options.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Options for all stages. Options for stages that are not requested are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageOptions {
    #[serde(default)]
    pub enrich: EnrichOptions,
    #[serde(default)]
    pub upscale: UpscaleOptions,
    #[serde(default)]
    pub infuse: InfuseOptions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichTier {
    #[default]
    Standard,
    Full,
}

impl EnrichTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichTier::Standard => "standard",
            EnrichTier::Full => "full",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichOptions {
    #[serde(default)]
    pub tier: EnrichTier,
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            tier: EnrichTier::default(),
            language: default_language(),
        }
    }
}

fn default_language() -> String {
    "en".to_string()
}

/// Upscaling model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpscaleModel {
    #[serde(rename = "2x")]
    X2,
    #[default]
    #[serde(rename = "4x")]
    X4,
    #[serde(rename = "anime")]
    Anime,
    #[serde(rename = "photo")]
    Photo,
}

impl UpscaleModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpscaleModel::X2 => "2x",
            UpscaleModel::X4 => "4x",
            UpscaleModel::Anime => "anime",
            UpscaleModel::Photo => "photo",
        }
    }

    /// Whether the model is billed at the high upscale rate.
    pub fn is_high_cost(&self) -> bool {
        matches!(self, UpscaleModel::X4 | UpscaleModel::Photo)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpscaleOptions {
    #[serde(default)]
    pub model: UpscaleModel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpg,
    Webp,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpg => "jpg",
            OutputFormat::Webp => "webp",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfuseOptions {
    #[serde(default)]
    pub format: OutputFormat,
}

impl StageOptions {
    pub(crate) fn enrich_parameters(&self) -> Value {
        json!({
            "analysis_depth": self.enrich.tier.as_str(),
            "metadata_tier": self.enrich.tier.as_str(),
            "language": self.enrich.language,
        })
    }

    pub(crate) fn upscale_parameters(&self) -> Value {
        json!({ "model": self.upscale.model.as_str() })
    }

    pub(crate) fn infuse_parameters(&self, metadata: Option<&Value>) -> Value {
        json!({
            "metadata": metadata.cloned().unwrap_or_else(|| json!({})),
            "output_format": self.infuse.format.as_str(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let options: StageOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options.enrich.tier, EnrichTier::Standard);
        assert_eq!(options.enrich.language, "en");
        assert_eq!(options.upscale.model, UpscaleModel::X4);
        assert_eq!(options.infuse.format, OutputFormat::Png);
    }

    #[test]
    fn test_model_wire_names() {
        let options: UpscaleOptions = serde_json::from_str(r#"{"model":"anime"}"#).unwrap();
        assert_eq!(options.model, UpscaleModel::Anime);
        assert!(serde_json::from_str::<UpscaleOptions>(r#"{"model":"8x"}"#).is_err());
    }

    #[test]
    fn test_high_cost_models() {
        let high: Vec<_> = [
            UpscaleModel::X2,
            UpscaleModel::X4,
            UpscaleModel::Anime,
            UpscaleModel::Photo,
        ]
        .into_iter()
        .filter(UpscaleModel::is_high_cost)
        .collect();
        assert_eq!(high, vec![UpscaleModel::X4, UpscaleModel::Photo]);
    }

    #[test]
    fn test_infuse_parameters_default_metadata() {
        let options = StageOptions::default();
        let params = options.infuse_parameters(None);
        assert_eq!(params["metadata"], json!({}));
        assert_eq!(params["output_format"], "png");
    }
}
