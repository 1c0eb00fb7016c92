//! Model client layer
//!
//! Provider-specific clients behind one [`ModelClient`] capability, selected
//! once at setup.

use std::sync::Arc;

use tracing::debug;

mod client;
mod error;
mod gemini;
mod openai;

pub use client::{Completion, CompletionRequest, ModelClient, ModelInfo, QuotaUsage};
pub use error::LlmError;
pub use gemini::{DEFAULT_GEMINI_BASE_URL, GeminiClient};
pub use openai::{DEFAULT_OPENAI_BASE_URL, OpenAiClient};

use crate::config::LlmConfig;

/// Create a model client based on the provider named in config
///
/// Supports "openai" (and compatible endpoints) and "gemini".
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn ModelClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiClient::from_config(config)?)),
        "gemini" => Ok(Arc::new(GeminiClient::from_config(config)?)),
        other => Err(LlmError::InvalidResponse(format!(
            "Unknown LLM provider: '{}'. Supported: openai, gemini",
            other
        ))),
    }
}
