//! Scheduler and rate limiter configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Batch scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Batch width for the first batch
    #[serde(rename = "initial-concurrency")]
    pub initial_concurrency: usize,

    /// Upper bound on batch width
    #[serde(rename = "max-concurrency")]
    pub max_concurrency: usize,

    /// Consecutive successes required before the width doubles
    #[serde(rename = "success-threshold")]
    pub success_threshold: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_concurrency: 1,
            max_concurrency: 50,
            success_threshold: 5,
        }
    }
}

/// Rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Max calls admitted per sliding window
    #[serde(rename = "max-requests-per-window")]
    pub max_requests_per_window: u32,

    /// Sliding window duration in seconds
    #[serde(rename = "window-secs")]
    pub window_secs: u64,

    /// Backoff growth factor applied per error
    #[serde(rename = "backoff-multiplier")]
    pub backoff_multiplier: f64,

    /// Backoff starting point in milliseconds
    #[serde(rename = "min-backoff-ms")]
    pub min_backoff_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(rename = "max-backoff-ms")]
    pub max_backoff_ms: u64,

    /// Minimum wait after an explicit over-limit response, in milliseconds
    #[serde(rename = "rate-limit-floor-ms")]
    pub rate_limit_floor_ms: u64,

    /// Consecutive errors after which the run should be abandoned
    #[serde(rename = "max-consecutive-errors")]
    pub max_consecutive_errors: u32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_requests_per_window: 50,
            window_secs: 60,
            backoff_multiplier: 2.0,
            min_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            rate_limit_floor_ms: 5_000,
            max_consecutive_errors: 5,
        }
    }
}

impl LimiterConfig {
    /// Get the sliding window as a Duration
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Get the minimum backoff as a Duration
    pub fn min_backoff(&self) -> Duration {
        Duration::from_millis(self.min_backoff_ms)
    }

    /// Get the backoff ceiling as a Duration
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Get the over-limit floor as a Duration
    pub fn rate_limit_floor(&self) -> Duration {
        Duration::from_millis(self.rate_limit_floor_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scheduler_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.initial_concurrency, 1);
        assert_eq!(config.max_concurrency, 50);
        assert_eq!(config.success_threshold, 5);
    }

    #[test]
    fn test_default_limiter_config() {
        let config = LimiterConfig::default();
        assert_eq!(config.max_requests_per_window, 50);
        assert_eq!(config.window(), Duration::from_secs(60));
        assert_eq!(config.min_backoff(), Duration::from_millis(1_000));
        assert_eq!(config.max_backoff(), Duration::from_millis(60_000));
        assert_eq!(config.rate_limit_floor(), Duration::from_millis(5_000));
    }

    #[test]
    fn test_deserialize_kebab_keys() {
        let yaml = r#"
initial-concurrency: 2
max-concurrency: 16
"#;
        let config: SchedulerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.initial_concurrency, 2);
        assert_eq!(config.max_concurrency, 16);
        // Defaults for unspecified
        assert_eq!(config.success_threshold, 5);
    }
}
