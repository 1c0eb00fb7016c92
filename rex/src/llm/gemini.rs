//! Google Gemini generateContent client
//!
//! Gemini takes a single combined prompt rather than role-separated
//! messages, and does not advertise request quotas in response headers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{Completion, CompletionRequest, LlmError, ModelClient, ModelInfo};
use crate::config::LlmConfig;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini API client
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    http: Client,
}

impl GeminiClient {
    /// Create a new client from configuration
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
            DEFAULT_GEMINI_BASE_URL.to_string()
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
        // Single combined prompt: instructions and query in one part.
        let contents = format!("{}\n\n{}", request.system_prompt, request.user_query);
        serde_json::json!({
            "contents": [ { "parts": [ { "text": contents } ] } ],
            "generationConfig": { "temperature": request.temperature },
        })
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        debug!(model = %request.model, "complete: called");
        let url = format!("{}/models/{}:generateContent", self.base_url, request.model);
        let body = self.build_request_body(&request);

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(LlmError::Network)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = parse_retry_after(response.headers());
            let message = response.text().await.unwrap_or_default();
            debug!(status, "complete: non-success status");
            return Err(LlmError::from_status(status, message, retry_after));
        }

        let payload: GenerateContentResponse = response.json().await.map_err(LlmError::Network)?;
        let text = payload.text();

        debug!(text_len = text.len(), "complete: success");
        Ok(Completion { text, quota: None })
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        debug!("list_models: called");
        let url = format!("{}/models", self.base_url);

        let response = self
            .http
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .query(&[("pageSize", "200")])
            .send()
            .await
            .map_err(LlmError::Network)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status, message, None));
        }

        let payload: ModelsResponse = response.json().await.map_err(LlmError::Network)?;
        Ok(filter_text_models(payload.models))
    }

    fn provider(&self) -> &'static str {
        "gemini"
    }
}

/// Keep gemini text models, excluding embeddings; fall back to every
/// non-embedding model when the name filter matches nothing. Newest first.
fn filter_text_models(models: Vec<GeminiModel>) -> Vec<ModelInfo> {
    let non_embedding: Vec<&GeminiModel> = models
        .iter()
        .filter(|m| !m.name.contains("embedding"))
        .collect();

    let mut selected: Vec<ModelInfo> = non_embedding
        .iter()
        .filter(|m| m.name.contains("gemini"))
        .map(|m| m.to_info())
        .collect();

    if selected.is_empty() {
        selected = non_embedding.iter().map(|m| m.to_info()).collect();
    }

    selected.sort_by(|a, b| b.id.cmp(&a.id));
    selected
}

// Gemini API response types

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

impl GenerateContentResponse {
    fn text(&self) -> String {
        self.candidates
            .as_deref()
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.content.as_ref())
            .and_then(|content| content.parts.as_deref())
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<GeminiModel>,
}

#[derive(Debug, Deserialize)]
struct GeminiModel {
    name: String,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
}

impl GeminiModel {
    fn to_info(&self) -> ModelInfo {
        let id = self.name.trim_start_matches("models/").to_string();
        ModelInfo {
            display_name: self.display_name.clone().unwrap_or_else(|| id.clone()),
            id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(name: &str) -> GeminiModel {
        GeminiModel {
            name: name.to_string(),
            display_name: None,
        }
    }

    #[test]
    fn test_build_request_body_combines_prompts() {
        let client = GeminiClient {
            api_key: "test-key".to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            http: Client::new(),
        };

        let body = client.build_request_body(&CompletionRequest {
            model: "gemini-flash-latest".to_string(),
            system_prompt: "instructions".to_string(),
            user_query: "query".to_string(),
            temperature: 0.0,
            seed: Some(1234),
        });

        assert_eq!(
            body["contents"][0]["parts"][0]["text"],
            "instructions\n\nquery"
        );
        assert_eq!(body["generationConfig"]["temperature"], 0.0);
    }

    #[test]
    fn test_filter_text_models_excludes_embeddings() {
        let models = vec![
            model("models/gemini-flash-latest"),
            model("models/gemini-embedding-001"),
            model("models/gemini-pro-latest"),
        ];

        let infos = filter_text_models(models);
        let ids: Vec<&str> = infos.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["gemini-pro-latest", "gemini-flash-latest"]);
    }

    #[test]
    fn test_filter_text_models_falls_back_to_non_embedding() {
        let models = vec![model("models/other-model"), model("models/text-embedding-004")];

        let infos = filter_text_models(models);
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].id, "other-model");
    }

    #[test]
    fn test_response_text_joins_parts() {
        let payload: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "foo "}, {"text": "bar"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(payload.text(), "foo bar");
    }

    #[test]
    fn test_response_text_handles_empty_candidates() {
        let payload: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(payload.text(), "");
    }
}
