//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Main configuration for the resfill pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Document reading configuration.
    pub document: DocumentConfig,

    /// Prompt construction configuration.
    pub prompt: PromptConfig,

    /// Model call retry configuration.
    pub retry: RetryConfig,

    /// Spreadsheet template configuration.
    pub template: TemplateConfig,

    /// Output file configuration.
    pub output: OutputConfig,

    /// Batch processing configuration.
    pub batch: BatchConfig,
}

/// Document reading configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Minimum number of non-whitespace characters for a document to count
    /// as having extractable text.
    pub min_text_chars: usize,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self { min_text_chars: 1 }
    }
}

/// Prompt construction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Maximum number of characters of document text sent to the model.
    pub max_input_chars: usize,

    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_input_chars: 16_000,
            temperature: 0.0,
        }
    }
}

/// Model call retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Additional attempts after the first failed one.
    pub max_retries: u32,

    /// Backoff step in milliseconds; attempt `n` waits `n * backoff_ms`.
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_ms: 3_000,
        }
    }
}

/// Spreadsheet template configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Path to the layout-v1 template.
    pub path: PathBuf,

    /// Write the generation time into the timestamp cell.
    pub stamp_generated_at: bool,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("templates/template.xlsx"),
            stamp_generated_at: true,
        }
    }
}

/// Output file configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Suffix appended to the input stem for the spreadsheet.
    pub suffix: String,

    /// Also write the canonical record as `<stem>_parsed.json`.
    pub write_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            suffix: "_filled".to_string(),
            write_json: false,
        }
    }
}

/// Batch processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of documents processed concurrently.
    pub jobs: usize,

    /// Descend into subdirectories when given a directory.
    pub recursive: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            jobs: 4,
            recursive: false,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| ConfigError::File {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}

pub const API_KEY_VAR: &str = "DEEPSEEK_API_KEY";
pub const BASE_URL_VAR: &str = "DEEPSEEK_BASE_URL";
pub const MODEL_VAR: &str = "AI_MODEL";
pub const TIMEOUT_VAR: &str = "AI_TIMEOUT";

const DEFAULT_MODEL: &str = "deepseek-chat";
const DEFAULT_TIMEOUT_SECS: u64 = 150;

/// Language model service settings, read once from the environment.
#[derive(Clone)]
pub struct ModelSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for ModelSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSettings")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ModelSettings {
    /// Read settings from the process environment, loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get(API_KEY_VAR).ok_or(ConfigError::MissingVar(API_KEY_VAR))?;
        let base_url = get(BASE_URL_VAR).ok_or(ConfigError::MissingVar(BASE_URL_VAR))?;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::InvalidVar {
                key: BASE_URL_VAR,
                reason: format!("'{base_url}' is not an http(s) URL"),
            });
        }

        let model = get(MODEL_VAR).unwrap_or_else(|| DEFAULT_MODEL.to_string());
        // litellm-style "provider/model" identifiers name the provider first
        let model = match model.split_once('/') {
            Some((_, name)) if !name.is_empty() => name.to_string(),
            _ => model,
        };

        let timeout_secs = match get(TIMEOUT_VAR) {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| ConfigError::InvalidVar {
                    key: TIMEOUT_VAR,
                    reason: format!("'{raw}' is not a positive number of seconds"),
                })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            api_key: api_key.trim().to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}
