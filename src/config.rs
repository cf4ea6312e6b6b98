//! Pipeline configuration.
//!
//! Loaded from an optional TOML file with environment-variable overrides.
//! Every field has a default so the pipeline runs with zero configuration
//! in tests and local development.

use std::path::Path;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

const DEFAULT_GBP_API_BASE: &str = "https://mybusiness.googleapis.com/v4";
const DEFAULT_GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_GBP_LANGUAGE_CODE: &str = "en-US";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Base URL of the Google Business Profile API.
    pub gbp_api_base: String,
    /// Google's OAuth token endpoint, for refresh-token exchanges.
    pub google_token_endpoint: String,
    /// `languageCode` sent on Local Posts.
    pub gbp_language_code: String,
    /// OAuth client credentials for token refresh. None disables the GBP
    /// channel's HTTP transport.
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            gbp_api_base: DEFAULT_GBP_API_BASE.to_string(),
            google_token_endpoint: DEFAULT_GOOGLE_TOKEN_ENDPOINT.to_string(),
            gbp_language_code: DEFAULT_GBP_LANGUAGE_CODE.to_string(),
            google_client_id: None,
            google_client_secret: None,
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file, then apply environment overrides. A missing
    /// file is fine — defaults plus environment apply.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            let parsed: Self = toml::from_str(&raw)
                .with_context(|| format!("parse config {}", path.display()))?;
            info!(path = %path.display(), "loaded pipeline config");
            parsed
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Environment overrides, applied after file load.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("GEOPILOT_GBP_API_BASE") {
            self.gbp_api_base = v;
        }
        if let Ok(v) = std::env::var("GEOPILOT_GOOGLE_TOKEN_ENDPOINT") {
            self.google_token_endpoint = v;
        }
        if let Ok(v) = std::env::var("GEOPILOT_GBP_LANGUAGE_CODE") {
            self.gbp_language_code = v;
        }
        if let Ok(v) = std::env::var("GEOPILOT_GOOGLE_CLIENT_ID") {
            self.google_client_id = Some(v);
        }
        if let Ok(v) = std::env::var("GEOPILOT_GOOGLE_CLIENT_SECRET") {
            self.google_client_secret = Some(v);
        }
    }

    /// Whether enough OAuth configuration exists to construct the GBP
    /// HTTP transport.
    pub fn gbp_configured(&self) -> bool {
        self.google_client_id.is_some() && self.google_client_secret.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = PipelineConfig::default();
        assert_eq!(config.gbp_api_base, DEFAULT_GBP_API_BASE);
        assert_eq!(config.gbp_language_code, "en-US");
        assert!(!config.gbp_configured());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: PipelineConfig = toml::from_str("gbp_language_code = \"en-GB\"").unwrap();
        assert_eq!(config.gbp_language_code, "en-GB");
        assert_eq!(config.google_token_endpoint, DEFAULT_GOOGLE_TOKEN_ENDPOINT);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let config = PipelineConfig::load(Path::new("/nonexistent/geopilot.toml")).unwrap();
        assert_eq!(config.gbp_api_base, DEFAULT_GBP_API_BASE);
    }
}
