//! ReportEx - adaptive-concurrency structured extraction
//!
//! Drives potentially hundreds of LLM extraction calls (one per
//! report×schema pair) against an endpoint whose throughput limits are
//! unknown and discoverable only by observing responses. The scheduler
//! balances throughput against the risk of being rate limited, recovers
//! from transient failures without operator intervention, supports mid-run
//! cancellation, and distinguishes fatal credential errors from recoverable
//! ones.
//!
//! # Core Concepts
//!
//! - **Sliding-window pacing**: every call passes the rate limiter first
//! - **Multiplicative adaptation**: batch width halves on any failure and
//!   doubles after a sustained success streak
//! - **Batches are barriers**: a new batch never starts before the previous
//!   one fully resolves, bounding peak concurrency exactly
//! - **Callers classify**: the scheduler treats failures uniformly; auth
//!   versus recoverable is decided by the execution function and the
//!   `on_task_done` callback
//!
//! # Modules
//!
//! - [`scheduler`] - rate limiter and dynamic batch scheduler
//! - [`llm`] - model client capability and provider implementations
//! - [`extraction`] - task building, prompts, parsing, per-task retry engine
//! - [`results`] - combined output rows, CSV, provenance
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod extraction;
pub mod llm;
pub mod results;
pub mod scheduler;

// Re-export commonly used types
pub use config::{Config, ExtractionConfig, LlmConfig};
pub use extraction::{
    Extraction, ExtractionProgress, ExtractionTask, Extractor, Report, build_extraction_tasks,
    count_extraction_progress, update_report_with_extraction,
};
pub use llm::{
    Completion, CompletionRequest, GeminiClient, LlmError, ModelClient, ModelInfo, OpenAiClient,
    QuotaUsage, create_client,
};
pub use results::{Provenance, ResultsDocument, combine_extracted_data, convert_to_csv};
pub use scheduler::{
    AdaptiveRateLimiter, DynamicScheduler, LimiterConfig, LimiterSnapshot, RunSummary,
    SchedulerConfig, TaskError, TaskExecutor, TerminateReason, TerminationFlag,
};
