//! Configuration types and validation for the pipeline

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default Donut inference endpoint the classifier adapter talks to
pub const DEFAULT_CLASSIFIER_ENDPOINT: &str =
    "https://api-inference.huggingface.co/models/naver-clova-ix/donut-base";

/// Global pipeline execution config
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub classifier: ClassifierConfig,
    pub on_classifier_failure: ClassifierFailurePolicy,
    pub raster: RasterConfig,
    pub key: KeySource,
    pub scope: ScopeConfig,
}

/// Remote classifier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub endpoint: String,
    /// Environment variable holding the bearer token, if any
    pub api_key_env: Option<String>,
    pub timeout_ms: u64,
}

/// What to do when the classifier cannot be reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierFailurePolicy {
    /// Continue with zero candidates; the report flags degraded coverage
    #[default]
    ReturnUnredacted,
    /// Abort the request
    FailClosed,
}

/// First-page rendering settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfig {
    pub dpi: u32,
    pub jpeg_quality: u8,
    /// Directory containing the PDFium shared library; system lookup when unset
    pub pdfium_library_path: Option<PathBuf>,
}

/// Where the symmetric payload key comes from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum KeySource {
    /// Random key generated at startup, never persisted
    #[default]
    Ephemeral,
    /// Hex or base64 key read from an environment variable
    Env { var: String },
    /// Hex or base64 key read from a file
    File { path: PathBuf },
}

/// Per-invocation working storage settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Parent directory for scratch directories; the system temp dir when unset
    pub temp_root: Option<PathBuf>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_CLASSIFIER_ENDPOINT.to_string(),
            api_key_env: Some("HF_API_KEY".to_string()),
            timeout_ms: 10_000,
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            jpeg_quality: 85,
            pdfium_library_path: None,
        }
    }
}

impl ProcessingConfig {
    /// Parses JSON first, then YAML.
    pub fn parse(content: &str) -> Result<Self> {
        let config: ProcessingConfig = serde_json::from_str(content)
            .or_else(|_| serde_yaml::from_str(content))
            .map_err(|e| Error::ConfigError(format!("Config parsing error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config file: {}", e)))?;
        Self::parse(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.classifier.endpoint.trim().is_empty() {
            return Err(Error::ConfigError("Classifier endpoint must not be empty".into()));
        }
        if self.classifier.timeout_ms == 0 {
            return Err(Error::ConfigError("Classifier timeout must be positive".into()));
        }
        if !(36..=600).contains(&self.raster.dpi) {
            return Err(Error::ConfigError(format!(
                "Raster DPI {} outside 36..=600",
                self.raster.dpi
            )));
        }
        if !(1..=100).contains(&self.raster.jpeg_quality) {
            return Err(Error::ConfigError("JPEG quality must be within 1..=100".into()));
        }
        if let KeySource::Env { var } = &self.key {
            if var.is_empty() {
                return Err(Error::ConfigError("Key environment variable name is empty".into()));
            }
        }
        Ok(())
    }
}
