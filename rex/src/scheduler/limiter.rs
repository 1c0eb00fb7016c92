//! Adaptive rate limiting with exponential backoff
//!
//! Tracks recent call timestamps in a sliding window to hold the caller to a
//! requests-per-window budget, and computes a growing backoff delay after
//! errors. Quota headers reported by the API, when available, tighten the
//! budget and feed a safe-parallelism estimate the scheduler can use as a
//! growth ceiling.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::config::LimiterConfig;

/// Point-in-time view of limiter state, for logging and tests
#[derive(Debug, Clone, Copy)]
pub struct LimiterSnapshot {
    pub window_len: usize,
    pub current_backoff: Duration,
    pub consecutive_errors: u32,
}

struct LimiterInner {
    /// Admission timestamps, oldest first. Never contains entries older than
    /// one window at the moment of inspection.
    window: VecDeque<Instant>,
    current_backoff: Duration,
    consecutive_errors: u32,
    last_error_at: Option<Instant>,
    /// Effective requests-per-window budget; starts at the configured value
    /// and may be tightened by quota headers.
    budget: u32,
    full_quota_observations: u32,
    concurrency_hint: Option<usize>,
}

/// Sliding-window rate limiter with multiplicative backoff.
///
/// The limiter itself never fails; it only computes delays. All I/O failures
/// are classified and handled by the caller.
pub struct AdaptiveRateLimiter {
    config: LimiterConfig,
    inner: Mutex<LimiterInner>,
}

impl AdaptiveRateLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        let inner = LimiterInner {
            window: VecDeque::new(),
            current_backoff: config.min_backoff(),
            consecutive_errors: 0,
            last_error_at: None,
            budget: config.max_requests_per_window.max(1),
            full_quota_observations: 0,
            concurrency_hint: None,
        };
        Self {
            config,
            inner: Mutex::new(inner),
        }
    }

    /// Suspend until issuing a call stays within the budget, then record it.
    ///
    /// Prunes timestamps older than the window, and when the window is full
    /// waits for the oldest retained entry to expire. The prune/check/record
    /// sequence runs under the lock and re-checks after every wait, so the
    /// budget holds for any interleaving of concurrent callers.
    pub async fn enforce(&self) {
        loop {
            let wait = {
                let mut inner = self.inner.lock().unwrap();
                let now = Instant::now();
                while let Some(front) = inner.window.front() {
                    if now.duration_since(*front) >= self.config.window() {
                        inner.window.pop_front();
                    } else {
                        break;
                    }
                }

                if (inner.window.len() as u32) < inner.budget {
                    inner.window.push_back(now);
                    return;
                }

                let oldest = *inner.window.front().unwrap();
                self.config.window() - now.duration_since(oldest)
            };

            debug!(wait_ms = wait.as_millis() as u64, "request budget reached, waiting for window slot");
            tokio::time::sleep(wait).await;
        }
    }

    /// Record a failure and return the delay the caller should apply.
    ///
    /// Backoff grows multiplicatively with ±10% jitter up to the ceiling.
    /// Explicit over-limit responses additionally floor the delay, since they
    /// mean the configured budget itself was wrong.
    pub fn on_error(&self, is_rate_limit: bool) -> Duration {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_errors += 1;
        inner.last_error_at = Some(Instant::now());

        let jitter = rand::rng().random_range(0.9..=1.1);
        let mut next = inner
            .current_backoff
            .mul_f64(self.config.backoff_multiplier * jitter)
            .min(self.config.max_backoff());
        if is_rate_limit {
            next = next.max(self.config.rate_limit_floor());
        }
        inner.current_backoff = next;

        warn!(
            consecutive_errors = inner.consecutive_errors,
            backoff_ms = next.as_millis() as u64,
            rate_limited = is_rate_limit,
            "backing off after error"
        );
        next
    }

    /// Record a success.
    ///
    /// Backoff and the error streak reset only once more than one window has
    /// elapsed since the last error; a single success right after an error is
    /// not recovery.
    pub fn on_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(last_error) = inner.last_error_at {
            if Instant::now().duration_since(last_error) <= self.config.window() {
                return;
            }
        }
        if inner.consecutive_errors > 0 {
            debug!("error streak cleared after quiet period");
        }
        inner.consecutive_errors = 0;
        inner.current_backoff = self.config.min_backoff();
    }

    /// Fold remaining-quota response headers into limiter state.
    ///
    /// The advertised limit tightens the budget (never loosens past the
    /// configured value), near-exhaustion grows backoff before the endpoint
    /// pushes back, and three consecutive full observations promote a safe
    /// parallelism estimate.
    pub fn observe_quota(&self, limit_requests: Option<u32>, remaining_requests: Option<u32>) {
        let mut inner = self.inner.lock().unwrap();

        if let Some(limit) = limit_requests {
            let tightened = limit.clamp(1, self.config.max_requests_per_window);
            if tightened != inner.budget {
                debug!(budget = tightened, "tightening request budget from quota headers");
                inner.budget = tightened;
            }
        }

        match (limit_requests, remaining_requests) {
            (Some(limit), Some(remaining)) => {
                if limit > 0 && (remaining as f64) < (limit as f64) * 0.1 {
                    warn!(remaining, limit, "remaining quota low, growing backoff");
                    inner.current_backoff = inner
                        .current_backoff
                        .mul_f64(self.config.backoff_multiplier)
                        .min(self.config.max_backoff());
                }
                inner.full_quota_observations += 1;
                if inner.full_quota_observations >= 3 && inner.concurrency_hint.is_none() {
                    let hint = ((limit / 4).max(1) as usize).min(64);
                    debug!(hint, "promoted safe parallelism estimate");
                    inner.concurrency_hint = Some(hint);
                }
            }
            _ => {
                // Partial headers don't count toward the estimate.
                inner.full_quota_observations = 0;
            }
        }
    }

    /// Ceiling hint for the scheduler, once enough quota headers were seen
    pub fn concurrency_hint(&self) -> Option<usize> {
        self.inner.lock().unwrap().concurrency_hint
    }

    /// True once the error streak has exhausted the configured budget.
    ///
    /// Callers use this to stop a run that keeps being rate limited instead
    /// of backing off forever.
    pub fn should_terminate_early(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.consecutive_errors >= self.config.max_consecutive_errors
    }

    pub fn snapshot(&self) -> LimiterSnapshot {
        let inner = self.inner.lock().unwrap();
        LimiterSnapshot {
            window_len: inner.window.len(),
            current_backoff: inner.current_backoff,
            consecutive_errors: inner.consecutive_errors,
        }
    }
}
