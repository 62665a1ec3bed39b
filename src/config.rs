//! Configuration for complaint-lens
//!
//! Settings are grouped per concern. Defaults work offline with the local
//! services; a JSON file and a few environment variables override them.

use crate::error::{LensError, Result};
use crate::views::MAX_PRECISION;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable holding the API key for the hosted services
pub const ENV_API_KEY: &str = "COMPLAINT_LENS_API_KEY";
/// Environment variable overriding the chat completions base URL
pub const ENV_API_BASE: &str = "COMPLAINT_LENS_API_BASE";
/// Environment variable overriding the embedding endpoint
pub const ENV_EMBEDDING_ENDPOINT: &str = "COMPLAINT_LENS_EMBEDDING_ENDPOINT";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub generation: GenerationConfig,
    pub embedding: EmbeddingConfig,
    pub pipeline: PipelineConfig,
    pub database: DatabaseConfig,
}

/// Text generation service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Base URL of an OpenAI-compatible API; `None` uses the provider default
    pub api_base: Option<String>,
    /// API key; may be empty for local OpenAI-compatible servers
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            max_tokens: 256,
        }
    }
}

/// Embedding service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Base URL exposing `models/{model}:predict`
    pub endpoint: String,
    pub api_key: String,
    pub text_model: String,
    pub multimodal_model: String,
    /// Vector dimension produced by the local embedder
    pub dimension: usize,
    /// Number of inputs sent per service request
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/v1".to_string(),
            api_key: String::new(),
            text_model: "text-embedding-004".to_string(),
            multimodal_model: "multimodalembedding@001".to_string(),
            dimension: 256,
            batch_size: 32,
        }
    }
}

/// Stage execution and view settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum in-flight service calls within a stage
    pub concurrency: usize,
    /// Time budget for a single stage attempt
    pub stage_timeout_secs: u64,
    /// Whole-stage attempts before giving up
    pub max_stage_attempts: u32,
    /// Narratives must be strictly longer than this to be embedded
    pub min_narrative_length: usize,
    /// Trailing window of the anomaly view, in days
    pub rolling_window_days: u32,
    /// Decimal places used to bin hotspot coordinates; `None` groups exactly
    pub hotspot_precision: Option<u32>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            stage_timeout_secs: 600,
            max_stage_attempts: 1,
            min_narrative_length: 50,
            rolling_window_days: 30,
            hotspot_precision: None,
        }
    }
}

/// Database location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("complaints.db"),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file; missing fields take their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LensError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&content)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var(ENV_API_KEY) {
            self.generation.api_key = key.clone();
            self.embedding.api_key = key;
        }
        if let Ok(base) = std::env::var(ENV_API_BASE) {
            self.generation.api_base = Some(base);
        }
        if let Ok(endpoint) = std::env::var(ENV_EMBEDDING_ENDPOINT) {
            self.embedding.endpoint = endpoint;
        }
        self
    }

    /// Reject settings no stage can run with
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.concurrency == 0 {
            return Err(LensError::Config("pipeline.concurrency must be > 0".into()));
        }
        if self.pipeline.max_stage_attempts == 0 {
            return Err(LensError::Config(
                "pipeline.max_stage_attempts must be > 0".into(),
            ));
        }
        if self.pipeline.stage_timeout_secs == 0 {
            return Err(LensError::Config(
                "pipeline.stage_timeout_secs must be > 0".into(),
            ));
        }
        if self.pipeline.rolling_window_days == 0 {
            return Err(LensError::Config(
                "pipeline.rolling_window_days must be > 0".into(),
            ));
        }
        if let Some(precision) = self.pipeline.hotspot_precision {
            if precision > MAX_PRECISION {
                return Err(LensError::Config(format!(
                    "pipeline.hotspot_precision must be <= {}",
                    MAX_PRECISION
                )));
            }
        }
        if self.embedding.batch_size == 0 {
            return Err(LensError::Config("embedding.batch_size must be > 0".into()));
        }
        if self.embedding.dimension == 0 {
            return Err(LensError::Config("embedding.dimension must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.rolling_window_days, 30);
        assert_eq!(config.pipeline.min_narrative_length, 50);
        assert!(config.pipeline.hotspot_precision.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lens.json");
        std::fs::write(
            &path,
            r#"{"pipeline": {"concurrency": 2}, "database": {"path": "x.db"}}"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.pipeline.concurrency, 2);
        assert_eq!(config.pipeline.rolling_window_days, 30);
        assert_eq!(config.database.path, PathBuf::from("x.db"));
        assert_eq!(config.generation.model, "gpt-4o-mini");
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.pipeline.concurrency = 0;
        assert!(matches!(config.validate(), Err(LensError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_oversized_hotspot_precision() {
        let mut config = Config::default();
        config.pipeline.hotspot_precision = Some(MAX_PRECISION);
        assert!(config.validate().is_ok());
        config.pipeline.hotspot_precision = Some(309);
        assert!(matches!(config.validate(), Err(LensError::Config(_))));
    }
}
