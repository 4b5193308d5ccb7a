//! Single-thread timer scheduler.
//!
//! Every scheduled job lives in one due-time ordered timer queue served by
//! a dedicated timer thread. When the head is due the thread pops it,
//! re-checks cancellation, runs the job (inline, or on a [`WorkerPool`] when
//! one is configured) and re-queues periodic handles once the run completes.
//!
//! Rescheduling rules:
//! - fixed rate: previous *scheduled* time plus the period, so overruns catch up
//! - fixed delay: *completion* time plus the delay, so it never catches up
//! - cron: the evaluator's next firing after the completion time
//!
//! A handle never runs concurrently with itself; the next run is queued only
//! after the current one finishes.

mod cron;
mod handle;
mod timer;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::core::error::{PoolError, SchedulerError};
use crate::core::lifecycle::{Lifecycle, LifecycleState};
use crate::core::task::{panic_error, ErrorSink, LoggingErrorSink, SinkVerdict, Task, TaskResult};
use crate::core::worker_pool::WorkerPool;
use crate::util::join::{join_with_timeout, JOIN_TIMEOUT};

pub use cron::CronEvaluator;
pub use handle::{CronTaskHandle, HandleState, JobFn, Recurrence, ScheduledTaskHandle};

use timer::TimerQueue;

/// Where due jobs run.
enum Dispatcher {
    /// On the timer thread itself.
    Inline,
    /// On a worker leased from this pool.
    Pool(WorkerPool),
}

/// Snapshot of scheduler activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Handles accepted by the `schedule_*` operations.
    pub scheduled: u64,
    /// Runs started.
    pub runs: u64,
    /// Runs that failed or panicked.
    pub failed_runs: u64,
    /// Entries in the timer queue, including cancelled ones not yet purged.
    pub pending: usize,
}

#[derive(Debug, Default)]
struct SchedulerCounters {
    scheduled: AtomicU64,
    runs: AtomicU64,
    failed_runs: AtomicU64,
}

struct SchedulerShared {
    config: SchedulerConfig,
    queue: TimerQueue,
    lifecycle: Lifecycle,
    cron: Option<Arc<dyn CronEvaluator>>,
    dispatcher: Dispatcher,
    sink: Arc<dyn ErrorSink>,
    counters: SchedulerCounters,
}

impl SchedulerShared {
    fn enqueue(
        &self,
        job: JobFn,
        recurrence: Recurrence,
        first: Instant,
    ) -> Result<ScheduledTaskHandle, SchedulerError> {
        if !self.lifecycle.is_accepting() {
            return Err(SchedulerError::SchedulingRejected);
        }
        let handle = ScheduledTaskHandle::new(job, recurrence, first);
        self.queue.push(handle.clone(), first)?;
        self.counters.scheduled.fetch_add(1, Ordering::Relaxed);
        debug!(
            scheduler = %self.config.name,
            handle = %handle.id(),
            recurrence = ?handle.recurrence(),
            "Handle scheduled"
        );
        Ok(handle)
    }

    /// Run a due handle, or hand it to the pool.
    fn dispatch(self: &Arc<Self>, handle: ScheduledTaskHandle, due: Instant) {
        if !handle.begin_run() {
            return;
        }
        self.counters.runs.fetch_add(1, Ordering::Relaxed);

        match &self.dispatcher {
            Dispatcher::Inline => {
                let outcome = run_job(&handle);
                self.complete(&handle, due, outcome);
            }
            Dispatcher::Pool(pool) => {
                let task = self.pool_task(&handle, due);
                match pool.execute(task) {
                    Ok(()) | Err(PoolError::Cancelled) => {}
                    Err(e) => {
                        warn!(
                            scheduler = %self.config.name,
                            handle = %handle.id(),
                            error = %e,
                            "Dispatch to worker pool failed, cancelling handle"
                        );
                        handle.cancel();
                    }
                }
            }
        }
    }

    /// Wrap a run for a worker. If the worker drops the task unrun, the
    /// handle is cancelled rather than left running.
    fn pool_task(self: &Arc<Self>, handle: &ScheduledTaskHandle, due: Instant) -> Task {
        let run = PooledRun {
            shared: Arc::clone(self),
            handle: handle.clone(),
            due,
            settled: false,
        };
        Task::new(move || {
            run.run();
            Ok(())
        })
        .with_cancellation(handle.token())
    }

    /// Record the outcome of a run and re-queue the handle if it recurs.
    fn complete(&self, handle: &ScheduledTaskHandle, due: Instant, outcome: TaskResult) {
        if let Err(err) = outcome {
            self.counters.failed_runs.fetch_add(1, Ordering::Relaxed);
            if self.sink.report(&self.config.name, &err) == SinkVerdict::Fatal {
                warn!(scheduler = %self.config.name, handle = %handle.id(), "Fatal job failure, cancelling handle");
                handle.cancel();
            }
        }

        let next = match handle.recurrence() {
            Recurrence::Once => None,
            Recurrence::FixedRate(period) => due.checked_add(*period),
            Recurrence::FixedDelay(delay) => Instant::now().checked_add(*delay),
            Recurrence::Cron(expr) => self
                .cron
                .as_deref()
                .and_then(|evaluator| cron::next_instant(evaluator, expr)),
        };

        if let Some(at) = handle.finish_run(next) {
            if let Err(e) = self.queue.push(handle.clone(), at) {
                debug!(scheduler = %self.config.name, handle = %handle.id(), error = %e, "Re-queue rejected");
                handle.cancel();
            }
        } else if handle.state() == HandleState::Completed {
            debug!(scheduler = %self.config.name, handle = %handle.id(), runs = handle.run_count(), "Handle completed");
        }
    }
}

/// A run dispatched to a worker pool.
struct PooledRun {
    shared: Arc<SchedulerShared>,
    handle: ScheduledTaskHandle,
    due: Instant,
    settled: bool,
}

impl PooledRun {
    fn run(mut self) {
        let outcome = run_job(&self.handle);
        self.settled = true;
        self.shared.complete(&self.handle, self.due, outcome);
    }
}

impl Drop for PooledRun {
    fn drop(&mut self) {
        if !self.settled && self.handle.cancel() {
            warn!(
                scheduler = %self.shared.config.name,
                handle = %self.handle.id(),
                "Dispatched run dropped before it started, cancelling handle"
            );
        }
    }
}

fn run_job(handle: &ScheduledTaskHandle) -> TaskResult {
    let job = handle.job();
    Task::new(move || job()).run()
}

fn timer_loop(shared: &Arc<SchedulerShared>) {
    debug!(scheduler = %shared.config.name, "Timer thread started");
    while let Some((handle, due)) = shared.queue.next_due() {
        if handle.is_cancelled() {
            continue;
        }
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| shared.dispatch(handle, due))) {
            let e = panic_error(&*payload);
            error!(scheduler = %shared.config.name, error = %e, "Timer dispatch panicked");
        }
    }
    debug!(scheduler = %shared.config.name, "Timer thread exiting");
}

/// Builder for a [`Scheduler`] with optional collaborators.
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    pool: Option<WorkerPool>,
    cron: Option<Arc<dyn CronEvaluator>>,
    sink: Option<Arc<dyn ErrorSink>>,
}

impl SchedulerBuilder {
    /// Start from `config`; jobs run inline and failures are logged.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            pool: None,
            cron: None,
            sink: None,
        }
    }

    /// Run due jobs on workers leased from `pool` instead of the timer thread.
    #[must_use]
    pub fn worker_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Evaluator consulted by [`Scheduler::schedule_cron`].
    #[must_use]
    pub fn cron_evaluator(mut self, evaluator: impl CronEvaluator + 'static) -> Self {
        self.cron = Some(Arc::new(evaluator));
        self
    }

    /// Like [`cron_evaluator`](Self::cron_evaluator), for an evaluator that is already shared.
    #[must_use]
    pub fn shared_cron_evaluator(mut self, evaluator: Arc<dyn CronEvaluator>) -> Self {
        self.cron = Some(evaluator);
        self
    }

    /// Receiver for job failures.
    #[must_use]
    pub fn error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Validate the configuration and start the timer thread.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidConfig` if the configuration is invalid
    /// - `SchedulerError::Spawn` if the timer thread cannot be created
    pub fn build(self) -> Result<Scheduler, SchedulerError> {
        self.config.validate().map_err(SchedulerError::InvalidConfig)?;

        let dispatcher = self.pool.map_or(Dispatcher::Inline, Dispatcher::Pool);
        let pooled = matches!(dispatcher, Dispatcher::Pool(_));
        let shared = Arc::new(SchedulerShared {
            queue: TimerQueue::new(),
            lifecycle: Lifecycle::new(),
            cron: self.cron,
            dispatcher,
            sink: self.sink.unwrap_or_else(|| Arc::new(LoggingErrorSink)),
            counters: SchedulerCounters::default(),
            config: self.config,
        });

        let mut builder = thread::Builder::new().name(format!("{}-timer", shared.config.name));
        if let Some(size) = shared.config.thread_stack_size {
            builder = builder.stack_size(size);
        }
        let timer_shared = Arc::clone(&shared);
        let timer = builder.spawn(move || timer_loop(&timer_shared))?;
        let _ = shared.lifecycle.transition(LifecycleState::Started);

        info!(
            scheduler = %shared.config.name,
            daemon = shared.config.daemon,
            pooled,
            cron = shared.cron.is_some(),
            "Scheduler started"
        );
        Ok(Scheduler {
            shared,
            timer: Mutex::new(Some(timer)),
        })
    }
}

/// Timer scheduler for one-shot and recurring jobs.
///
/// Stopping (or dropping) the scheduler cancels every pending handle. A
/// configured [`WorkerPool`] is borrowed, not owned: it keeps running.
pub struct Scheduler {
    shared: Arc<SchedulerShared>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Scheduler that runs jobs inline on its timer thread, without cron support.
    ///
    /// # Errors
    ///
    /// See [`SchedulerBuilder::build`].
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        SchedulerBuilder::new(config).build()
    }

    /// Builder for a scheduler with a worker pool, cron evaluator or error sink.
    #[must_use]
    pub fn builder(config: SchedulerConfig) -> SchedulerBuilder {
        SchedulerBuilder::new(config)
    }

    /// Run `job` once after `delay`.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::SchedulingRejected` if the scheduler is stopped
    /// - `SchedulerError::InvalidSchedule` if `delay` overflows the clock
    pub fn schedule_once<F>(&self, job: F, delay: Duration) -> Result<ScheduledTaskHandle, SchedulerError>
    where
        F: Fn() -> TaskResult + Send + Sync + 'static,
    {
        let first = deadline_after(delay)?;
        self.shared.enqueue(Arc::new(job), Recurrence::Once, first)
    }

    /// Run `job` after `initial_delay`, then every `period` measured from the
    /// previous scheduled time.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::SchedulingRejected` if the scheduler is stopped
    /// - `SchedulerError::InvalidSchedule` if `period` is zero or a time overflows
    pub fn schedule_at_fixed_rate<F>(
        &self,
        job: F,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<ScheduledTaskHandle, SchedulerError>
    where
        F: Fn() -> TaskResult + Send + Sync + 'static,
    {
        if period.is_zero() {
            return Err(SchedulerError::InvalidSchedule("period must be greater than 0".into()));
        }
        let first = deadline_after(initial_delay)?;
        self.shared
            .enqueue(Arc::new(job), Recurrence::FixedRate(period), first)
    }

    /// Run `job` after `initial_delay`, then `delay` after each run completes.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::SchedulingRejected` if the scheduler is stopped
    /// - `SchedulerError::InvalidSchedule` if `delay` is zero or a time overflows
    pub fn schedule_with_fixed_delay<F>(
        &self,
        job: F,
        initial_delay: Duration,
        delay: Duration,
    ) -> Result<ScheduledTaskHandle, SchedulerError>
    where
        F: Fn() -> TaskResult + Send + Sync + 'static,
    {
        if delay.is_zero() {
            return Err(SchedulerError::InvalidSchedule("delay must be greater than 0".into()));
        }
        let first = deadline_after(initial_delay)?;
        self.shared
            .enqueue(Arc::new(job), Recurrence::FixedDelay(delay), first)
    }

    /// Run `job` at each firing of `expression`, as computed by the configured
    /// [`CronEvaluator`].
    ///
    /// The handle completes once the evaluator reports no further firing.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::SchedulingRejected` if the scheduler is stopped
    /// - `SchedulerError::MissingCronEvaluator` if no evaluator is configured
    /// - `SchedulerError::NoNextExecution` if the rule never fires
    pub fn schedule_cron<F>(&self, job: F, expression: &str) -> Result<CronTaskHandle, SchedulerError>
    where
        F: Fn() -> TaskResult + Send + Sync + 'static,
    {
        let evaluator = self
            .shared
            .cron
            .as_deref()
            .ok_or(SchedulerError::MissingCronEvaluator)?;
        let first = cron::next_instant(evaluator, expression)
            .ok_or_else(|| SchedulerError::NoNextExecution(expression.to_string()))?;
        self.shared
            .enqueue(Arc::new(job), Recurrence::Cron(expression.to_string()), first)
    }

    /// Cancel `handle`. A run already in progress finishes; no further run starts.
    ///
    /// Returns `false` if the handle was already cancelled or completed.
    pub fn cancel(&self, handle: &ScheduledTaskHandle) -> bool {
        let cancelled = handle.cancel();
        if cancelled {
            debug!(scheduler = %self.shared.config.name, handle = %handle.id(), "Handle cancelled");
        }
        cancelled
    }

    /// Drop cancelled handles from the timer queue. Returns how many were removed.
    pub fn purge(&self) -> usize {
        self.shared.queue.purge()
    }

    /// Entries in the timer queue.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// Current scheduler statistics.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let counters = &self.shared.counters;
        SchedulerStats {
            scheduled: counters.scheduled.load(Ordering::Relaxed),
            runs: counters.runs.load(Ordering::Relaxed),
            failed_runs: counters.failed_runs.load(Ordering::Relaxed),
            pending: self.shared.queue.len(),
        }
    }

    /// Scheduler name from configuration.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Lifecycle phase.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.shared.lifecycle.current()
    }

    /// Stop the scheduler: reject new handles, cancel every pending one and
    /// wait for the timer thread. A job running inline finishes first.
    ///
    /// Calling `stop` more than once is a no-op.
    pub fn stop(&self) {
        let shared = &self.shared;
        if shared.lifecycle.transition(LifecycleState::Stopping).is_err() {
            return;
        }
        info!(scheduler = %shared.config.name, "Stopping scheduler");

        let pending = shared.queue.shutdown();
        for handle in &pending {
            handle.cancel();
        }
        let _ = shared.lifecycle.transition(LifecycleState::Stopped);

        let timer = self.timer.lock().take();
        if let Some(timer) = timer {
            join_with_timeout(timer, JOIN_TIMEOUT);
        }
        let _ = shared.lifecycle.transition(LifecycleState::Destroyed);
        info!(scheduler = %shared.config.name, cancelled = pending.len(), "Scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if !self.shared.lifecycle.is_accepting() {
            return;
        }
        if self.shared.config.daemon {
            for handle in self.shared.queue.shutdown() {
                handle.cancel();
            }
            drop(self.timer.get_mut().take());
            self.shared.lifecycle.advance_to(LifecycleState::Destroyed);
            debug!(scheduler = %self.shared.config.name, "Scheduler dropped, timer thread detached");
        } else {
            self.stop();
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish()
    }
}

fn deadline_after(delay: Duration) -> Result<Instant, SchedulerError> {
    Instant::now()
        .checked_add(delay)
        .ok_or_else(|| SchedulerError::InvalidSchedule(format!("delay {delay:?} overflows the clock")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::TaskError;
    use std::sync::atomic::AtomicUsize;
    use std::time::SystemTime;

    fn config() -> SchedulerConfig {
        SchedulerConfig::new().with_name("unit-sched")
    }

    #[test]
    fn test_zero_period_rejected() {
        let scheduler = Scheduler::new(config()).unwrap();
        let err = scheduler
            .schedule_at_fixed_rate(|| Ok(()), Duration::ZERO, Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule(_)));
        let err = scheduler
            .schedule_with_fixed_delay(|| Ok(()), Duration::ZERO, Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule(_)));
        scheduler.stop();
    }

    #[test]
    fn test_overflowing_delay_rejected() {
        let scheduler = Scheduler::new(config()).unwrap();
        let err = scheduler.schedule_once(|| Ok(()), Duration::MAX).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule(_)));
        scheduler.stop();
    }

    #[test]
    fn test_pooled_run_dropped_unrun_cancels_handle() {
        let pool = WorkerPool::new(
            crate::config::WorkerPoolConfig::new()
                .with_name("unit-sched-pool")
                .with_max_threads(1)
                .with_min_spare_threads(0)
                .with_max_spare_threads(1),
        )
        .unwrap();
        let scheduler = Scheduler::builder(config()).worker_pool(pool.clone()).build().unwrap();
        let period = Duration::from_secs(3600);
        let dropped = scheduler.schedule_at_fixed_rate(|| Ok(()), period, period).unwrap();
        let ran = scheduler.schedule_at_fixed_rate(|| Ok(()), period, period).unwrap();

        let due = Instant::now();
        assert!(dropped.begin_run());
        drop(scheduler.shared.pool_task(&dropped, due));
        assert_eq!(dropped.state(), HandleState::Cancelled);

        assert!(ran.begin_run());
        scheduler.shared.pool_task(&ran, due).run().unwrap();
        assert_eq!(ran.state(), HandleState::Pending);
        assert_eq!(ran.run_count(), 1);

        scheduler.stop();
        pool.stop();
    }

    #[test]
    fn test_cron_requires_evaluator() {
        let scheduler = Scheduler::new(config()).unwrap();
        let err = scheduler.schedule_cron(|| Ok(()), "* * * * *").unwrap_err();
        assert!(matches!(err, SchedulerError::MissingCronEvaluator));
        scheduler.stop();
    }

    #[test]
    fn test_cron_without_next_execution() {
        let scheduler = Scheduler::builder(config())
            .cron_evaluator(|_: &str, _: SystemTime| -> Option<SystemTime> { None })
            .build()
            .unwrap();
        let err = scheduler.schedule_cron(|| Ok(()), "0 0 30 2 *").unwrap_err();
        assert!(matches!(err, SchedulerError::NoNextExecution(ref e) if e == "0 0 30 2 *"));
        scheduler.stop();
    }

    #[test]
    fn test_fatal_failure_cancels_handle() {
        let sink: Arc<dyn ErrorSink> = Arc::new(|_: &str, _: &TaskError| SinkVerdict::Fatal);
        let scheduler = Scheduler::builder(config()).error_sink(sink).build().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let handle = scheduler
            .schedule_with_fixed_delay(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(anyhow::anyhow!("broken").into())
                },
                Duration::ZERO,
                Duration::from_millis(5),
            )
            .unwrap();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(handle.state(), HandleState::Cancelled);
        assert_eq!(scheduler.stats().failed_runs, 1);
        scheduler.stop();
    }

    #[test]
    fn test_stop_cancels_pending_and_rejects() {
        let scheduler = Scheduler::new(config()).unwrap();
        let handle = scheduler
            .schedule_once(|| Ok(()), Duration::from_secs(3600))
            .unwrap();
        assert_eq!(scheduler.pending(), 1);
        scheduler.stop();
        assert!(handle.is_cancelled());
        assert_eq!(scheduler.state(), LifecycleState::Destroyed);
        assert!(matches!(
            scheduler.schedule_once(|| Ok(()), Duration::ZERO),
            Err(SchedulerError::SchedulingRejected)
        ));
    }
}
