//! Configuration for the triage pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use triage_agent::RetryPolicy;

use crate::error::TriageError;

/// Configuration for one pipeline instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline instance ID (appears in logs)
    pub pipeline_id: String,
    /// Retry policy applied by model-backed stages
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Model backend configuration
    #[serde(default)]
    pub model: ModelConfig,
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pipeline_id: uuid::Uuid::new_v4().to_string(),
            retry: RetryPolicy::default(),
            model: ModelConfig::default(),
            general: GeneralConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Create a new config with pipeline ID.
    pub fn new(pipeline_id: impl Into<String>) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            ..Default::default()
        }
    }

    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Load config from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TriageError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| TriageError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(Self::from_yaml(&yaml)?)
    }
}

/// Model backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// OpenAI-compatible base URL
    pub base_url: String,
    /// Model name
    pub model: String,
    /// Environment variable holding the API key, if any
    pub api_key_env: Option<String>,
    /// Request timeout (seconds)
    pub timeout_secs: u64,
    /// Maximum tokens per completion
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Send `response_format: json_object`; turn off for servers that reject it
    pub json_mode: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            model: "default".to_string(),
            api_key_env: None,
            timeout_secs: 120,
            max_tokens: 2048,
            temperature: 0.0,
            json_mode: true,
        }
    }
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Resolve the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|key| !key.is_empty())
    }
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
