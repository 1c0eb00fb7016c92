//! OpenAI-compatible chat completions client
//!
//! Works against api.openai.com and compatible endpoints (Azure OpenAI,
//! vLLM, Ollama, ...). Parses the `x-ratelimit-*` response headers into a
//! quota snapshot for the rate limiter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use tracing::debug;

use super::{Completion, CompletionRequest, LlmError, ModelClient, ModelInfo, QuotaUsage};
use crate::config::LlmConfig;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible API client
pub struct OpenAiClient {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenAiClient {
    /// Create a new client from configuration
    ///
    /// Reads the API key from the environment variable named in config. The
    /// configured timeout applies per request, so a hung call surfaces as a
    /// recoverable network error.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(model = %config.model, "from_config: called");
        let api_key = config
            .get_api_key()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(LlmError::Network)?;

        let base_url = if config.base_url.is_empty() {
            DEFAULT_OPENAI_BASE_URL.to_string()
        } else {
            config.base_url.trim_end_matches('/').to_string()
        };

        Ok(Self {
            api_key,
            base_url,
            http,
        })
    }

    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_query },
            ],
            "temperature": request.temperature,
        });

        if let Some(seed) = request.seed {
            body["seed"] = serde_json::json!(seed);
        }

        body
    }
}

fn header_u32(headers: &HeaderMap, name: &str) -> Option<u32> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u32>().ok())
}

fn parse_quota(headers: &HeaderMap) -> Option<QuotaUsage> {
    let limit_requests = header_u32(headers, "x-ratelimit-limit-requests");
    let remaining_requests = header_u32(headers, "x-ratelimit-remaining-requests");

    if limit_requests.is_none() && remaining_requests.is_none() {
        return None;
    }
    Some(QuotaUsage {
        limit_requests,
        remaining_requests,
    })
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        debug!(model = %request.model, seed = ?request.seed, "complete: called");
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request_body(&request);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(LlmError::Network)?;

        let status = response.status().as_u16();
        let quota = parse_quota(response.headers());

        if !response.status().is_success() {
            let retry_after = parse_retry_after(response.headers());
            let message = response.text().await.unwrap_or_default();
            debug!(status, "complete: non-success status");
            return Err(LlmError::from_status(status, message, retry_after));
        }

        let payload: ChatCompletionResponse = response.json().await.map_err(LlmError::Network)?;
        let text = payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        debug!(text_len = text.len(), quota = ?quota, "complete: success");
        Ok(Completion { text, quota })
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        debug!("list_models: called");
        let url = format!("{}/models", self.base_url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(LlmError::Network)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status, message, None));
        }

        let payload: ModelsResponse = response.json().await.map_err(LlmError::Network)?;
        let mut models: Vec<ModelInfo> = payload
            .data
            .into_iter()
            .map(|entry| ModelInfo {
                display_name: entry.id.clone(),
                id: entry.id,
            })
            .collect();
        models.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(models)
    }

    fn provider(&self) -> &'static str {
        "openai"
    }
}

// OpenAI API response types

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}
