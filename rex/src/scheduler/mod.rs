//! Adaptive concurrency scheduling for remote API calls
//!
//! Two cooperating pieces: [`AdaptiveRateLimiter`] paces individual calls
//! against a sliding-window budget and computes error backoff, and
//! [`DynamicScheduler`] drives a task list through sequential batches whose
//! width adapts to observed outcomes.

mod config;
mod core;
mod limiter;

pub use config::{LimiterConfig, SchedulerConfig};
pub use limiter::{AdaptiveRateLimiter, LimiterSnapshot};

pub use self::core::{
    DynamicScheduler, RunSummary, TaskError, TaskExecutor, TerminateReason, TerminationFlag,
};
