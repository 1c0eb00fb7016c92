//! LLM error types

use std::time::Duration;
use thiserror::Error;

use crate::scheduler::TaskError;

/// Errors that can occur when talking to a model endpoint
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("authentication failed (status {status})")]
    Auth { status: u16 },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Classify an HTTP status into the matching variant
    pub fn from_status(status: u16, message: String, retry_after: Option<Duration>) -> Self {
        match status {
            401 | 403 => LlmError::Auth { status },
            429 => LlmError::RateLimited { retry_after },
            _ => LlmError::Api { status, message },
        }
    }

    /// Check if this is a credential failure that should abort the run
    pub fn is_auth(&self) -> bool {
        matches!(self, LlmError::Auth { .. })
    }

    /// Check if this is an explicit over-limit response
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    /// Get the HTTP status code, when one was observed
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Auth { status } => Some(*status),
            LlmError::RateLimited { .. } => Some(429),
            LlmError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl TaskError for LlmError {
    fn is_rate_limit(&self) -> bool {
        LlmError::is_rate_limit(self)
    }

    fn is_auth(&self) -> bool {
        LlmError::is_auth(self)
    }
}
