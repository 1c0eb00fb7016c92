//! Per-task execution: the function injected into the scheduler
//!
//! One extraction call = build prompts, invoke the model, pull a fenced JSON
//! block out of the reply. Malformed output is retried with a different seed
//! up to a fixed cap; running out of attempts yields an empty object, which
//! is a valid "nothing extracted" outcome rather than an error. Credential
//! and over-limit failures propagate untouched so the scheduler and caller
//! can react.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::parser::extract_and_parse;
use super::prompts::{build_developer_prompt, build_user_query};
use super::task::ExtractionTask;
use crate::config::ExtractionConfig;
use crate::llm::{CompletionRequest, LlmError, ModelClient};
use crate::scheduler::{AdaptiveRateLimiter, TaskExecutor, TerminationFlag};

/// Executes extraction tasks against a model endpoint
pub struct Extractor {
    client: Arc<dyn ModelClient>,
    flag: TerminationFlag,
    limiter: Option<Arc<AdaptiveRateLimiter>>,
    max_attempts: u32,
    base_seed: i64,
    temperature: f32,
}

impl Extractor {
    pub fn new(client: Arc<dyn ModelClient>, config: &ExtractionConfig, flag: TerminationFlag) -> Self {
        Self {
            client,
            flag,
            limiter: None,
            max_attempts: config.max_attempts.max(1),
            base_seed: config.base_seed,
            temperature: config.temperature,
        }
    }

    /// Forward quota headers observed on responses to the rate limiter
    pub fn with_limiter(mut self, limiter: Arc<AdaptiveRateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    fn empty_result() -> Value {
        Value::Object(Default::default())
    }
}

#[async_trait]
impl TaskExecutor for Extractor {
    type Task = ExtractionTask;
    type Output = Value;
    type Error = LlmError;

    async fn execute(&self, task: &ExtractionTask) -> Result<Value, LlmError> {
        let system_prompt = build_developer_prompt(&task.system_prompt, &task.content);
        let user_query = build_user_query(&task.schema);

        let mut attempt = 0;
        while attempt < self.max_attempts && !self.flag.is_terminated() {
            let request = CompletionRequest {
                model: task.model.to_string(),
                system_prompt: system_prompt.clone(),
                user_query: user_query.clone(),
                temperature: self.temperature,
                seed: Some(self.base_seed + attempt as i64),
            };

            // Auth, rate-limit, and transport errors propagate here; only
            // malformed output goes around the loop again.
            let completion = self.client.complete(request).await?;

            if let (Some(limiter), Some(quota)) = (&self.limiter, &completion.quota) {
                limiter.observe_quota(quota.limit_requests, quota.remaining_requests);
            }

            match extract_and_parse(&completion.text) {
                Some(value) => {
                    debug!(
                        report = %task.report_name,
                        schema_id = task.schema_id,
                        attempt = attempt + 1,
                        "extraction parsed"
                    );
                    return Ok(value);
                }
                None => {
                    warn!(
                        report = %task.report_name,
                        schema_id = task.schema_id,
                        attempt = attempt + 1,
                        "no valid JSON block in model output"
                    );
                }
            }
            attempt += 1;
        }

        if self.flag.is_terminated() {
            debug!(report = %task.report_name, schema_id = task.schema_id, "cancelled, returning empty result");
        }
        Ok(Self::empty_result())
    }
}
