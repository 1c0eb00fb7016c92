//! Dynamic batch scheduler
//!
//! Drives a task list through sequential batches of adaptively sized
//! concurrency. Tasks inside a batch run concurrently and may complete in
//! any order; a new batch never starts before the previous one fully
//! resolves, so peak concurrency is always bounded by the current width.
//! Width halves immediately on any failure and doubles between batches after
//! a sustained success streak.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info, warn};

use super::config::SchedulerConfig;
use super::limiter::AdaptiveRateLimiter;

/// Error classification the scheduler needs from task failures.
///
/// The scheduler treats every failure the same for halving and backoff; these
/// predicates only tell the rate limiter whether the endpoint explicitly
/// signalled an over-limit condition, and let callers recognize fatal
/// credential failures inside `on_task_done`.
pub trait TaskError: std::error::Error {
    fn is_rate_limit(&self) -> bool;
    fn is_auth(&self) -> bool;
}

/// The injected per-task execution function.
///
/// Tasks are opaque to the scheduler; it only hands them to the executor and
/// receives back a result or an error.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    type Task: Send + Sync;
    type Output: Send;
    type Error: TaskError + Send;

    async fn execute(&self, task: &Self::Task) -> Result<Self::Output, Self::Error>;
}

/// Why a run stopped before the task list was exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateReason {
    /// External stop request
    Requested,
    /// Credentials rejected by the endpoint
    AuthFailure,
    /// Rate limiting exhausted the error budget
    RateLimited,
}

/// Monotonic cancellation flag shared between the scheduler, the execution
/// function, and the caller.
///
/// Set once, never cleared; the first terminate wins and later calls are
/// no-ops.
#[derive(Clone, Default)]
pub struct TerminationFlag {
    inner: Arc<FlagInner>,
}

#[derive(Default)]
struct FlagInner {
    terminated: AtomicBool,
    reason: Mutex<Option<TerminateReason>>,
}

impl TerminationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn terminate(&self, reason: TerminateReason) {
        if !self.inner.terminated.swap(true, Ordering::SeqCst) {
            *self.inner.reason.lock().unwrap() = Some(reason);
            info!(?reason, "termination requested");
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<TerminateReason> {
        *self.inner.reason.lock().unwrap()
    }
}

/// Final accounting for a run. Outcome delivery itself is incremental via
/// `on_task_done`.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    /// Tasks actually dispatched (and reported exactly once each)
    pub dispatched: usize,
    /// Length of the input task list
    pub total: usize,
    /// Set when the run stopped early
    pub reason: Option<TerminateReason>,
}

struct SchedulerInner {
    concurrency: usize,
    consecutive_successes: u32,
    batch_errors: u32,
}

/// Batch scheduler with multiplicative width adaptation.
pub struct DynamicScheduler<E: TaskExecutor> {
    config: SchedulerConfig,
    limiter: Arc<AdaptiveRateLimiter>,
    executor: Arc<E>,
    flag: TerminationFlag,
    inner: Mutex<SchedulerInner>,
}

impl<E: TaskExecutor> DynamicScheduler<E> {
    pub fn new(
        config: SchedulerConfig,
        limiter: Arc<AdaptiveRateLimiter>,
        executor: Arc<E>,
        flag: TerminationFlag,
    ) -> Self {
        let concurrency = config.initial_concurrency.clamp(1, config.max_concurrency.max(1));
        Self {
            config,
            limiter,
            executor,
            flag,
            inner: Mutex::new(SchedulerInner {
                concurrency,
                consecutive_successes: 0,
                batch_errors: 0,
            }),
        }
    }

    /// Current batch width. Always in `1..=max_concurrency`.
    pub fn concurrency(&self) -> usize {
        self.inner.lock().unwrap().concurrency
    }

    pub fn limiter(&self) -> &Arc<AdaptiveRateLimiter> {
        &self.limiter
    }

    /// Shared termination flag; clones can stop the run from anywhere.
    pub fn flag(&self) -> TerminationFlag {
        self.flag.clone()
    }

    /// Idempotent external stop. In-flight tasks finish and report first.
    pub fn terminate(&self) {
        self.flag.terminate(TerminateReason::Requested);
    }

    /// Execute `tasks` to completion or until terminated.
    ///
    /// `on_task_done` fires exactly once per dispatched task, in completion
    /// order, only after any error backoff for that task has elapsed.
    /// `on_batch_complete` fires once per batch, after all of the batch's
    /// `on_task_done` calls. Never returns an error: every outcome is
    /// funneled through the callbacks.
    pub async fn run<F, B>(&self, tasks: &[E::Task], mut on_task_done: F, mut on_batch_complete: B) -> RunSummary
    where
        F: FnMut(&E::Task, &Result<E::Output, E::Error>),
        B: FnMut(),
    {
        let total = tasks.len();
        let mut dispatched = 0usize;

        while dispatched < total {
            if self.flag.is_terminated() {
                debug!(dispatched, total, "terminated, not starting another batch");
                break;
            }

            let width = self.concurrency().min(total - dispatched);
            self.inner.lock().unwrap().batch_errors = 0;
            debug!(batch_size = width, dispatched, total, "dispatching batch");

            let batch = &tasks[dispatched..dispatched + width];
            let mut in_flight: FuturesUnordered<_> = batch.iter().map(|task| self.run_task(task)).collect();
            while let Some((task, outcome)) = in_flight.next().await {
                on_task_done(task, &outcome);
            }
            drop(in_flight);

            dispatched += width;
            on_batch_complete();
            self.adjust_after_batch();
        }

        let summary = RunSummary {
            dispatched,
            total,
            reason: self.flag.reason(),
        };
        info!(dispatched, total, reason = ?summary.reason, "run finished");
        summary
    }

    async fn run_task<'a>(&self, task: &'a E::Task) -> (&'a E::Task, Result<E::Output, E::Error>) {
        self.limiter.enforce().await;
        let outcome = self.executor.execute(task).await;

        match &outcome {
            Ok(_) => {
                self.limiter.on_success();
                self.inner.lock().unwrap().consecutive_successes += 1;
            }
            Err(err) => {
                let delay = self.limiter.on_error(err.is_rate_limit());
                {
                    let mut inner = self.inner.lock().unwrap();
                    inner.batch_errors += 1;
                    inner.consecutive_successes = 0;
                    if inner.concurrency > 1 {
                        let halved = (inner.concurrency / 2).max(1);
                        warn!(from = inner.concurrency, to = halved, "halving concurrency after failure");
                        inner.concurrency = halved;
                    }
                }
                tokio::time::sleep(delay).await;
            }
        }

        (task, outcome)
    }

    /// Width growth happens only between batches, never while calls are in
    /// flight. A fully clean batch below the success threshold is enough
    /// evidence to double; any error in the batch blocks growth.
    fn adjust_after_batch(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.batch_errors > 0 || inner.concurrency >= self.config.max_concurrency {
            return;
        }

        let needed = self.config.success_threshold.min(inner.concurrency as u32).max(1);
        if inner.consecutive_successes < needed {
            return;
        }

        let ceiling = self
            .limiter
            .concurrency_hint()
            .map(|hint| hint.max(inner.concurrency))
            .unwrap_or(self.config.max_concurrency);
        let doubled = (inner.concurrency * 2).min(self.config.max_concurrency).min(ceiling);
        if doubled > inner.concurrency {
            debug!(from = inner.concurrency, to = doubled, "doubling concurrency after success streak");
            inner.concurrency = doubled;
            inner.consecutive_successes = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::config::LimiterConfig;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use thiserror::Error;

    #[derive(Debug, Error)]
    enum FakeError {
        #[error("transient failure")]
        Transient,
        #[error("authentication rejected")]
        Auth,
        #[error("over limit")]
        RateLimit,
    }

    impl TaskError for FakeError {
        fn is_rate_limit(&self) -> bool {
            matches!(self, FakeError::RateLimit)
        }

        fn is_auth(&self) -> bool {
            matches!(self, FakeError::Auth)
        }
    }

    struct FakeExecutor {
        fail: HashSet<usize>,
        auth_fail: HashSet<usize>,
        calls: AtomicUsize,
    }

    impl FakeExecutor {
        fn succeeding() -> Self {
            Self {
                fail: HashSet::new(),
                auth_fail: HashSet::new(),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing_on(ids: impl IntoIterator<Item = usize>) -> Self {
            Self {
                fail: ids.into_iter().collect(),
                auth_fail: HashSet::new(),
                calls: AtomicUsize::new(0),
            }
        }

        fn auth_failing_on(ids: impl IntoIterator<Item = usize>) -> Self {
            Self {
                fail: HashSet::new(),
                auth_fail: ids.into_iter().collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TaskExecutor for FakeExecutor {
        type Task = usize;
        type Output = usize;
        type Error = FakeError;

        async fn execute(&self, task: &usize) -> Result<usize, FakeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.auth_fail.contains(task) {
                Err(FakeError::Auth)
            } else if self.fail.contains(task) {
                Err(FakeError::Transient)
            } else {
                Ok(*task)
            }
        }
    }

    fn scheduler(
        initial: usize,
        max: usize,
        executor: FakeExecutor,
    ) -> (DynamicScheduler<FakeExecutor>, TerminationFlag) {
        let flag = TerminationFlag::new();
        let scheduler = DynamicScheduler::new(
            SchedulerConfig {
                initial_concurrency: initial,
                max_concurrency: max,
                success_threshold: 5,
            },
            Arc::new(AdaptiveRateLimiter::new(LimiterConfig {
                max_requests_per_window: 1_000,
                ..Default::default()
            })),
            Arc::new(executor),
            flag.clone(),
        );
        (scheduler, flag)
    }

    /// Collects the number of tasks completed in each batch.
    fn batch_width_recorder() -> (Arc<Mutex<Vec<usize>>>, Arc<AtomicUsize>) {
        (Arc::new(Mutex::new(Vec::new())), Arc::new(AtomicUsize::new(0)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_warmup_batch_widths() {
        let tasks: Vec<usize> = (0..10).collect();
        let (scheduler, _flag) = scheduler(1, 8, FakeExecutor::succeeding());
        let (widths, in_batch) = batch_width_recorder();

        let summary = scheduler
            .run(
                &tasks,
                |_, outcome| {
                    assert!(outcome.is_ok());
                    in_batch.fetch_add(1, Ordering::SeqCst);
                },
                || {
                    widths.lock().unwrap().push(in_batch.swap(0, Ordering::SeqCst));
                },
            )
            .await;

        assert_eq!(*widths.lock().unwrap(), vec![1, 2, 4, 3]);
        assert_eq!(summary.dispatched, 10);
        assert_eq!(summary.reason, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_halves_next_batch() {
        let tasks: Vec<usize> = (0..12).collect();
        // Task 0 fails in the first batch of 8.
        let (scheduler, _flag) = scheduler(8, 8, FakeExecutor::failing_on([0]));
        let (widths, in_batch) = batch_width_recorder();

        scheduler
            .run(
                &tasks,
                |_, _| {
                    in_batch.fetch_add(1, Ordering::SeqCst);
                },
                || {
                    widths.lock().unwrap().push(in_batch.swap(0, Ordering::SeqCst));
                },
            )
            .await;

        assert_eq!(*widths.lock().unwrap(), vec![8, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_never_leaves_bounds() {
        let tasks: Vec<usize> = (0..40).collect();
        let (scheduler, _flag) = scheduler(1, 4, FakeExecutor::failing_on([0, 3, 9, 10, 21]));

        scheduler
            .run(
                &tasks,
                |_, _| {
                    let width = scheduler.concurrency();
                    assert!((1..=4).contains(&width));
                },
                || {
                    let width = scheduler.concurrency();
                    assert!((1..=4).contains(&width));
                },
            )
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_five_successes_double_width_up_to_max() {
        let tasks: Vec<usize> = (0..10).collect();
        let (scheduler, _flag) = scheduler(5, 8, FakeExecutor::succeeding());

        scheduler.run(&tasks[..5], |_, _| {}, || {}).await;

        // One clean batch of 5 hits the success threshold; doubling is
        // capped at the configured maximum.
        assert_eq!(scheduler.concurrency(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_finishes_in_flight_batch() {
        let tasks: Vec<usize> = (0..6).collect();
        let (scheduler, flag) = scheduler(2, 2, FakeExecutor::succeeding());
        let done = Arc::new(AtomicUsize::new(0));

        let summary = scheduler
            .run(
                &tasks,
                |_, _| {
                    // Stop after the first completion; the second in-flight
                    // task must still finish and report.
                    done.fetch_add(1, Ordering::SeqCst);
                    flag.terminate(TerminateReason::Requested);
                },
                || {},
            )
            .await;

        assert_eq!(done.load(Ordering::SeqCst), 2);
        assert_eq!(summary.dispatched, 2);
        assert_eq!(summary.reason, Some(TerminateReason::Requested));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_error_stops_run_after_first_batch() {
        let tasks: Vec<usize> = (0..5).collect();
        let (scheduler, flag) = scheduler(1, 8, FakeExecutor::auth_failing_on([0]));
        let mut reported_auth = false;

        let summary = scheduler
            .run(
                &tasks,
                |_, outcome| {
                    if let Err(err) = outcome {
                        if err.is_auth() {
                            reported_auth = true;
                            flag.terminate(TerminateReason::AuthFailure);
                        }
                    }
                },
                || {},
            )
            .await;

        assert!(reported_auth);
        assert_eq!(summary.dispatched, 1);
        assert_eq!(summary.reason, Some(TerminateReason::AuthFailure));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_task_list_completes_immediately() {
        let (scheduler, _flag) = scheduler(1, 8, FakeExecutor::succeeding());
        let mut batches = 0;

        let summary = scheduler.run(&[], |_, _| {}, || batches += 1).await;

        assert_eq!(summary.dispatched, 0);
        assert_eq!(batches, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_count_matches_dispatched() {
        let tasks: Vec<usize> = (0..9).collect();
        let (scheduler, _flag) = scheduler(2, 4, FakeExecutor::failing_on([1, 5]));
        let done = Arc::new(AtomicUsize::new(0));

        let summary = scheduler
            .run(
                &tasks,
                |_, _| {
                    done.fetch_add(1, Ordering::SeqCst);
                },
                || {},
            )
            .await;

        assert_eq!(done.load(Ordering::SeqCst), summary.dispatched);
        assert_eq!(summary.dispatched, 9);
    }

    #[test]
    fn test_termination_flag_first_reason_wins() {
        let flag = TerminationFlag::new();
        assert!(!flag.is_terminated());
        assert_eq!(flag.reason(), None);

        flag.terminate(TerminateReason::RateLimited);
        flag.terminate(TerminateReason::Requested);

        assert!(flag.is_terminated());
        assert_eq!(flag.reason(), Some(TerminateReason::RateLimited));
    }
}
