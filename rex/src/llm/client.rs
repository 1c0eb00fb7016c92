//! Model client capability and request/response types
//!
//! One object-safe trait with a single completion method; provider-specific
//! clients are selected once at setup and injected wherever completions are
//! needed. No shared global client handles.

use async_trait::async_trait;
use tracing::debug;

use super::LlmError;

/// A completion request - everything needed for one model call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model identifier
    pub model: String,

    /// Instruction prompt (system/developer role)
    pub system_prompt: String,

    /// Query prompt (user role)
    pub user_query: String,

    /// Sampling temperature; extraction runs at 0.0
    pub temperature: f32,

    /// Sampling seed, varied per retry attempt so repeated failures are not
    /// deterministic repeats. Ignored by providers without seed support.
    pub seed: Option<i64>,
}

/// Raw completion output plus any quota headers the endpoint reported
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub quota: Option<QuotaUsage>,
}

/// Remaining-quota snapshot parsed from rate limit response headers
#[derive(Debug, Clone, Copy, Default)]
pub struct QuotaUsage {
    pub limit_requests: Option<u32>,
    pub remaining_requests: Option<u32>,
}

/// A model advertised by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: String,
    pub display_name: String,
}

/// Capability for calling a model endpoint
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Execute one completion and return the free-form output text
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError>;

    /// List the models available to the configured credentials
    async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError>;

    /// Provider name, e.g. "openai"
    fn provider(&self) -> &'static str;

    /// Check credentials by listing models.
    ///
    /// Returns `Ok(false)` when the endpoint rejects the key; other failures
    /// propagate.
    async fn validate_credentials(&self) -> Result<bool, LlmError> {
        debug!(provider = self.provider(), "validate_credentials: called");
        match self.list_models().await {
            Ok(_) => Ok(true),
            Err(err) if err.is_auth() => Ok(false),
            Err(err) => Err(err),
        }
    }
}
