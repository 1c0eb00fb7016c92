//! Configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scheduler::{LimiterConfig, SchedulerConfig};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Batch scheduler configuration
    pub scheduler: SchedulerConfig,

    /// Rate limiter configuration
    pub limiter: LimiterConfig,

    /// Extraction prompt/schema configuration
    pub extraction: ExtractionConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: ./rex.yml
        let local_config = PathBuf::from("rex.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/reportex/rex.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("reportex").join("rex.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// List every missing prerequisite for an extraction run.
    ///
    /// An empty list means the run can start.
    pub fn missing_info(&self) -> Vec<String> {
        let mut missing = Vec::new();

        match self.extraction.resolve_system_prompt() {
            Ok(prompt) if !prompt.trim().is_empty() => {}
            _ => missing.push("System prompt in configuration file".to_string()),
        }

        if self.extraction.schema_files.is_empty() {
            missing.push("At least one JSON Schema in configuration file".to_string());
        }

        if std::env::var(&self.llm.api_key_env).is_err() {
            missing.push(format!("LLM API key ({} environment variable)", self.llm.api_key_env));
        }

        if self.llm.model.trim().is_empty() {
            missing.push("LLM model selection".to_string());
        }

        missing
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "openai" (and compatible) or "gemini"
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL; empty selects the provider's default endpoint
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: String::new(),
            timeout_ms: 300_000,
        }
    }
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).map_err(|_| {
            eyre::eyre!(
                "LLM API key not found. Set the {} environment variable.",
                self.api_key_env
            )
        })
    }
}

/// Extraction prompt/schema configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Instruction text sent with every report
    #[serde(rename = "system-prompt")]
    pub system_prompt: String,

    /// File to read the instruction text from; takes precedence when set
    #[serde(rename = "system-prompt-file")]
    pub system_prompt_file: Option<PathBuf>,

    /// JSON Schema files, one extraction per schema per report
    #[serde(rename = "schema-files")]
    pub schema_files: Vec<PathBuf>,

    /// Model call attempts per task before giving up on parseable output
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Base sampling seed; attempt number is added per retry
    #[serde(rename = "base-seed")]
    pub base_seed: i64,

    /// Sampling temperature
    pub temperature: f32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            system_prompt_file: None,
            schema_files: Vec::new(),
            max_attempts: 3,
            base_seed: 1234,
            temperature: 0.0,
        }
    }
}

impl ExtractionConfig {
    /// The instruction text, reading the prompt file when configured
    pub fn resolve_system_prompt(&self) -> Result<String> {
        if let Some(path) = &self.system_prompt_file {
            return fs::read_to_string(path).context(format!("Failed to read system prompt from {}", path.display()));
        }
        Ok(self.system_prompt.clone())
    }

    /// Parse every configured schema file
    pub fn load_schemas(&self) -> Result<Vec<Arc<Value>>> {
        self.schema_files
            .iter()
            .map(|path| {
                let content =
                    fs::read_to_string(path).context(format!("Failed to read schema file {}", path.display()))?;
                let schema: Value = serde_json::from_str(&content)
                    .context(format!("Failed to parse schema file {}", path.display()))?;
                Ok(Arc::new(schema))
            })
            .collect()
    }
}
