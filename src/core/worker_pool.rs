//! Worker pool with leased, reusable worker threads.
//!
//! Workers sit in a bounded idle ring while unused. A caller leases one,
//! hands it a task, and the worker returns itself to the ring when done. The
//! pool grows by `inc_threads` when the ring runs dry (never past
//! `max_threads`), and a monitor thread evicts idle workers above
//! `max_spare_threads`.
//!
//! # Example
//!
//! ```rust,no_run
//! use prometheus_lease_pool::config::WorkerPoolConfig;
//! use prometheus_lease_pool::core::{Task, WorkerPool};
//! use std::time::Duration;
//!
//! let pool = WorkerPool::new(WorkerPoolConfig::new().with_max_threads(4).with_min_spare_threads(1).with_max_spare_threads(2))?;
//! let worker = pool.lease(Some(Duration::from_millis(500)))?;
//! worker.execute(Task::from_fn(|| println!("on a worker")))?;
//! # Ok::<(), prometheus_lease_pool::core::PoolError>(())
//! ```

mod controller;
mod monitor;
pub mod ring;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::config::WorkerPoolConfig;
use crate::core::error::PoolError;
use crate::core::lifecycle::{Lifecycle, LifecycleState};
use crate::core::task::{ErrorSink, LoggingErrorSink, SinkVerdict, Task, TaskResult};
use crate::util::join::JOIN_TIMEOUT;

pub use controller::WorkerController;
pub use ring::IdleRing;

use controller::ControllerInner;
use monitor::PoolMonitor;

/// How long `execute` waits per lease attempt before re-checking cancellation.
const EXECUTE_RETRY_INTERVAL: Duration = Duration::from_millis(250);

/// Snapshot of pool occupancy and throughput.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Live workers, including ones being spawned.
    pub current_threads: usize,
    /// Workers waiting in the idle ring.
    pub idle_threads: usize,
    /// Spawned workers outside the idle ring: leased out, or released but
    /// still finishing handed-off tasks. Excludes workers being spawned.
    pub leased_threads: usize,
    /// Configured upper bound.
    pub max_threads: usize,
    /// Tasks accepted by `execute`.
    pub submitted_tasks: u64,
    /// Tasks that returned `Ok`.
    pub completed_tasks: u64,
    /// Tasks that failed or panicked.
    pub failed_tasks: u64,
    /// Accepted tasks discarded unrun because their worker shut down.
    pub dropped_tasks: u64,
    /// Successful leases.
    pub leases: u64,
    /// Workers evicted by idle shrink.
    pub evicted_workers: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub submitted_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
    pub dropped_tasks: AtomicU64,
    pub leases: AtomicU64,
    pub evicted_workers: AtomicU64,
}

/// Ring, registry and thread count. Guarded by one mutex.
struct PoolState {
    idle: IdleRing<Arc<ControllerInner>>,
    live: HashMap<u64, Arc<ControllerInner>>,
    /// `live.len()` plus workers reserved but still being spawned.
    current_threads: usize,
    /// Reserved slots whose threads are still being spawned.
    spawning: usize,
    stopping: bool,
    waiters: usize,
}

/// State shared by pool handles, workers and the monitor.
pub(crate) struct PoolShared {
    config: WorkerPoolConfig,
    state: Mutex<PoolState>,
    available: Condvar,
    lifecycle: Lifecycle,
    counters: PoolCounters,
    sink: Arc<dyn ErrorSink>,
    next_worker_id: AtomicU64,
    monitor: Mutex<Option<PoolMonitor>>,
}

impl PoolShared {
    /// Spawn up to `count` workers whose slots were already reserved in
    /// `current_threads`, register them, and release unused reservations.
    fn spawn_workers(self: &Arc<Self>, count: usize) -> Result<Vec<Arc<ControllerInner>>, PoolError> {
        let mut spawned = Vec::with_capacity(count);
        let mut failure = None;
        for _ in 0..count {
            let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
            let name = format!("{}-worker-{id}", self.config.name);
            match ControllerInner::spawn(id, name, Arc::downgrade(self), self.config.thread_stack_size) {
                Ok(inner) => spawned.push(inner),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        let mut state = self.state.lock();
        state.spawning -= count;
        if state.stopping {
            state.current_threads -= count;
            drop(state);
            for inner in &spawned {
                inner.shutdown();
                inner.detach();
            }
            return Err(PoolError::PoolStopped);
        }
        state.current_threads -= count - spawned.len();
        for inner in &spawned {
            state.live.insert(inner.id, Arc::clone(inner));
        }
        if spawned.len() < count && state.waiters > 0 {
            self.available.notify_all();
        }
        drop(state);

        match failure {
            Some(e) if spawned.is_empty() => Err(PoolError::Spawn(e)),
            Some(e) => {
                warn!(pool = %self.config.name, requested = count, spawned = spawned.len(), error = %e, "Partial worker growth");
                Ok(spawned)
            }
            None => Ok(spawned),
        }
    }

    /// Give up a lease. The worker goes back to the ring now if it is idle,
    /// otherwise its thread recycles it after the queued tasks finish.
    pub(crate) fn release(&self, inner: Arc<ControllerInner>) {
        if inner.release() {
            self.recycle_inner(inner);
        } else {
            debug!(worker = %inner.name(), outstanding = inner.outstanding(), "Recycle deferred until queued tasks finish");
        }
    }

    /// Put a worker back in the idle ring, or retire it if it cannot go back.
    pub(crate) fn recycle_inner(&self, inner: Arc<ControllerInner>) {
        let mut state = self.state.lock();
        let retire = state.stopping || inner.is_stop_requested() || !state.live.contains_key(&inner.id);
        let rejected = if retire {
            Some(inner)
        } else {
            match state.idle.push(inner) {
                Ok(()) => None,
                Err(inner) => Some(inner),
            }
        };

        if let Some(inner) = rejected {
            if state.live.remove(&inner.id).is_some() {
                state.current_threads -= 1;
            }
            if state.waiters > 0 {
                self.available.notify_one();
            }
            drop(state);
            inner.shutdown();
            return;
        }

        if state.waiters > 0 {
            self.available.notify_one();
        }
    }

    /// Remove a worker that will never return to the ring.
    pub(crate) fn terminate(&self, inner: &ControllerInner) {
        let mut state = self.state.lock();
        if state.live.remove(&inner.id).is_some() {
            state.current_threads -= 1;
            if state.waiters > 0 {
                self.available.notify_one();
            }
        }
        drop(state);
        inner.shutdown();
    }

    pub(crate) fn record_dropped(&self, count: usize) {
        self.counters
            .dropped_tasks
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Count a task outcome and ask the sink what to do with a failure.
    pub(crate) fn record_outcome(&self, worker: &ControllerInner, outcome: TaskResult) -> SinkVerdict {
        match outcome {
            Ok(()) => {
                self.counters.completed_tasks.fetch_add(1, Ordering::Relaxed);
                SinkVerdict::Continue
            }
            Err(err) => {
                self.counters.failed_tasks.fetch_add(1, Ordering::Relaxed);
                self.sink.report(worker.name(), &err)
            }
        }
    }
}

impl Drop for PoolShared {
    fn drop(&mut self) {
        if !self.lifecycle.is_accepting() {
            return;
        }
        let daemon = self.config.daemon;
        if let Some(monitor) = self.monitor.get_mut().take() {
            if daemon {
                monitor.signal_stop();
            } else {
                monitor.stop();
            }
        }
        let state = self.state.get_mut();
        state.stopping = true;
        drop(state.idle.drain());
        let workers: Vec<_> = state.live.drain().map(|(_, w)| w).collect();
        for worker in &workers {
            worker.shutdown();
        }
        for worker in &workers {
            if daemon {
                worker.detach();
            } else {
                worker.join(JOIN_TIMEOUT);
            }
        }
        self.lifecycle.advance_to(LifecycleState::Destroyed);
        debug!(pool = %self.config.name, daemon, "WorkerPool dropped without explicit stop");
    }
}

/// Bounded pool of leasable worker threads.
///
/// Cloning is cheap; all clones share the same workers.
#[derive(Clone)]
pub struct WorkerPool {
    shared: Arc<PoolShared>,
}

impl WorkerPool {
    /// Create a pool that logs task failures and keeps failing workers alive.
    ///
    /// Pre-starts `min_spare_threads` workers and the idle-shrink monitor.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidConfig` if the configuration is invalid
    /// - `PoolError::Spawn` if a thread cannot be created
    pub fn new(config: WorkerPoolConfig) -> Result<Self, PoolError> {
        Self::with_error_sink(config, Arc::new(LoggingErrorSink))
    }

    /// Create a pool reporting task failures to `sink`.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidConfig` if the configuration is invalid
    /// - `PoolError::Spawn` if a thread cannot be created
    pub fn with_error_sink(config: WorkerPoolConfig, sink: Arc<dyn ErrorSink>) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;

        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                idle: IdleRing::with_capacity(config.max_threads),
                live: HashMap::with_capacity(config.max_threads.min(1024)),
                current_threads: 0,
                spawning: 0,
                stopping: false,
                waiters: 0,
            }),
            available: Condvar::new(),
            lifecycle: Lifecycle::new(),
            counters: PoolCounters::default(),
            sink,
            next_worker_id: AtomicU64::new(0),
            monitor: Mutex::new(None),
            config,
        });
        let _ = shared.lifecycle.transition(LifecycleState::Started);
        let pool = Self { shared };

        if let Err(e) = pool.prestart() {
            pool.stop();
            return Err(e);
        }

        let period = Duration::from_millis(pool.shared.config.monitor_period_ms);
        match PoolMonitor::spawn(Arc::downgrade(&pool.shared), period, &pool.shared.config.name) {
            Ok(monitor) => *pool.shared.monitor.lock() = Some(monitor),
            Err(e) => {
                pool.stop();
                return Err(PoolError::Spawn(e));
            }
        }

        let config = &pool.shared.config;
        info!(
            pool = %config.name,
            max_threads = config.max_threads,
            min_spare_threads = config.min_spare_threads,
            max_spare_threads = config.max_spare_threads,
            inc_threads = config.inc_threads,
            "WorkerPool started"
        );
        Ok(pool)
    }

    pub(crate) const fn from_shared(shared: Arc<PoolShared>) -> Self {
        Self { shared }
    }

    fn prestart(&self) -> Result<(), PoolError> {
        let count = self.shared.config.min_spare_threads;
        if count == 0 {
            return Ok(());
        }
        {
            let mut state = self.shared.state.lock();
            state.current_threads += count;
            state.spawning += count;
        }
        let spawned = self.shared.spawn_workers(count)?;
        let mut state = self.shared.state.lock();
        for inner in spawned {
            if let Err(inner) = state.idle.push(inner) {
                state.live.remove(&inner.id);
                state.current_threads -= 1;
                inner.shutdown();
            }
        }
        Ok(())
    }

    /// Lease an idle worker.
    ///
    /// Returns an idle worker immediately if one exists. Otherwise grows the
    /// pool by `min(inc_threads, max_threads - current)` and returns one of the
    /// new workers. At `max_threads` it waits for a recycle until `timeout`
    /// elapses; `None` waits indefinitely and `Some(Duration::ZERO)` never waits.
    ///
    /// # Errors
    ///
    /// - `PoolError::PoolStopped` if the pool is shutting down (also wakes waiters)
    /// - `PoolError::PoolExhausted` if the timeout elapsed
    /// - `PoolError::Spawn` if growth failed to create any thread
    pub fn lease(&self, timeout: Option<Duration>) -> Result<WorkerController, PoolError> {
        let shared = &self.shared;
        let max = shared.config.max_threads;
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        let mut state = shared.state.lock();
        loop {
            if state.stopping {
                return Err(PoolError::PoolStopped);
            }

            if let Some(inner) = state.idle.pop() {
                drop(state);
                shared.counters.leases.fetch_add(1, Ordering::Relaxed);
                return Ok(WorkerController::leased(inner));
            }

            if state.current_threads < max {
                let grow = shared.config.inc_threads.min(max - state.current_threads);
                state.current_threads += grow;
                state.spawning += grow;
                drop(state);
                return self.grow_and_lease(grow);
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(PoolError::PoolExhausted);
            }

            state.waiters += 1;
            match deadline {
                Some(d) => {
                    let _ = shared.available.wait_until(&mut state, d);
                }
                None => shared.available.wait(&mut state),
            }
            state.waiters -= 1;
        }
    }

    fn grow_and_lease(&self, grow: usize) -> Result<WorkerController, PoolError> {
        let shared = &self.shared;
        let mut spawned = shared.spawn_workers(grow)?.into_iter();
        let Some(first) = spawned.next() else {
            return Err(PoolError::Internal("growth produced no workers".into()));
        };

        let extra = spawned.len();
        if extra > 0 {
            let mut state = shared.state.lock();
            for inner in spawned {
                if let Err(inner) = state.idle.push(inner) {
                    state.live.remove(&inner.id);
                    state.current_threads -= 1;
                    inner.shutdown();
                }
            }
            if state.waiters > 0 {
                shared.available.notify_all();
            }
        }

        shared.counters.leases.fetch_add(1, Ordering::Relaxed);
        debug!(pool = %shared.config.name, grown = extra + 1, "Worker pool grew");
        Ok(WorkerController::leased(first))
    }

    /// Lease a worker without blocking the async runtime.
    ///
    /// # Errors
    ///
    /// Same as [`lease`](Self::lease), plus `PoolError::Internal` if the
    /// blocking task could not complete.
    #[cfg(feature = "tokio-runtime")]
    pub async fn lease_async(&self, timeout: Option<Duration>) -> Result<WorkerController, PoolError> {
        let pool = self.clone();
        tokio::task::spawn_blocking(move || pool.lease(timeout))
            .await
            .map_err(|e| PoolError::Internal(format!("lease task failed: {e}")))?
    }

    /// Return a leased worker to the idle ring.
    ///
    /// If the pool is stopping the worker is destroyed instead. A worker still
    /// running handed-off tasks rejoins the ring once they finish. Equivalent
    /// to dropping the controller.
    pub fn recycle(&self, controller: WorkerController) {
        if let Some(inner) = controller.into_inner() {
            self.shared.release(inner);
        }
    }

    /// Run `task` on a leased worker; the worker recycles itself afterwards.
    ///
    /// Keeps retrying while the pool is exhausted, re-checking the task's
    /// cancellation token between attempts.
    ///
    /// # Errors
    ///
    /// - `PoolError::Cancelled` if the task was cancelled before a worker was leased
    /// - `PoolError::PoolStopped` if the pool is shutting down
    /// - `PoolError::Spawn` if growth failed to create any thread
    pub fn execute(&self, mut task: Task) -> Result<(), PoolError> {
        loop {
            if task.is_cancelled() {
                debug!(pool = %self.shared.config.name, "Task cancelled before dispatch");
                return Err(PoolError::Cancelled);
            }
            let worker = match self.lease(Some(EXECUTE_RETRY_INTERVAL)) {
                Ok(worker) => worker,
                Err(PoolError::PoolExhausted) => continue,
                Err(e) => return Err(e),
            };
            let Some(inner) = worker.into_inner() else {
                continue;
            };
            match inner.send(task) {
                Ok(()) => {
                    self.shared.counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);
                    self.shared.release(inner);
                    return Ok(());
                }
                Err(returned) => {
                    warn!(worker = %inner.name(), "Leased worker is gone, retrying");
                    self.shared.terminate(&inner);
                    task = returned;
                }
            }
        }
    }

    /// Evict idle workers above `max_spare_threads`, oldest-idle first.
    ///
    /// Evicts at most `inc_threads` workers per call. Returns the number evicted.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::PoolStopped` if the pool is shutting down.
    pub fn shrink_idle(&self) -> Result<usize, PoolError> {
        let shared = &self.shared;
        let evicted = {
            let mut state = shared.state.lock();
            if state.stopping {
                return Err(PoolError::PoolStopped);
            }
            let mut evicted = Vec::new();
            while state.idle.len() > shared.config.max_spare_threads
                && evicted.len() < shared.config.inc_threads
            {
                let Some(inner) = state.idle.pop() else {
                    break;
                };
                if state.live.remove(&inner.id).is_some() {
                    state.current_threads -= 1;
                }
                evicted.push(inner);
            }
            evicted
        };

        for inner in &evicted {
            inner.shutdown();
        }
        for inner in &evicted {
            inner.join(JOIN_TIMEOUT);
        }
        shared
            .counters
            .evicted_workers
            .fetch_add(evicted.len() as u64, Ordering::Relaxed);
        Ok(evicted.len())
    }

    /// Stop the pool: reject new leases, wake every waiter, and destroy all
    /// workers, idle or leased. Running tasks finish; queued ones are dropped
    /// and counted in [`PoolStats::dropped_tasks`].
    ///
    /// Calling `stop` more than once is a no-op.
    pub fn stop(&self) {
        let shared = &self.shared;
        if shared.lifecycle.transition(LifecycleState::Stopping).is_err() {
            return;
        }
        info!(pool = %shared.config.name, "Stopping worker pool");

        let monitor = shared.monitor.lock().take();
        if let Some(monitor) = monitor {
            monitor.stop();
        }

        let workers: Vec<_> = {
            let mut state = shared.state.lock();
            state.stopping = true;
            drop(state.idle.drain());
            let workers: Vec<_> = state.live.drain().map(|(_, w)| w).collect();
            state.current_threads -= workers.len();
            workers
        };
        shared.available.notify_all();

        for worker in &workers {
            worker.shutdown();
        }
        let _ = shared.lifecycle.transition(LifecycleState::Stopped);
        for worker in &workers {
            worker.join(JOIN_TIMEOUT);
        }
        let _ = shared.lifecycle.transition(LifecycleState::Destroyed);
        info!(pool = %shared.config.name, worker_count = workers.len(), "Worker pool stopped");
    }

    /// Pool name from configuration.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Configuration the pool was built with.
    #[must_use]
    pub fn config(&self) -> &WorkerPoolConfig {
        &self.shared.config
    }

    /// Lifecycle phase.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.shared.lifecycle.current()
    }

    /// Whether `stop` has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.state.lock().stopping
    }

    /// Live workers, including ones being spawned.
    #[must_use]
    pub fn current_thread_count(&self) -> usize {
        self.shared.state.lock().current_threads
    }

    /// Workers waiting in the idle ring.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.shared.state.lock().idle.len()
    }

    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let (current_threads, idle_threads, spawning) = {
            let state = self.shared.state.lock();
            (state.current_threads, state.idle.len(), state.spawning)
        };
        let counters = &self.shared.counters;
        PoolStats {
            current_threads,
            idle_threads,
            leased_threads: current_threads.saturating_sub(idle_threads + spawning),
            max_threads: self.shared.config.max_threads,
            submitted_tasks: counters.submitted_tasks.load(Ordering::Relaxed),
            completed_tasks: counters.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: counters.failed_tasks.load(Ordering::Relaxed),
            dropped_tasks: counters.dropped_tasks.load(Ordering::Relaxed),
            leases: counters.leases.load(Ordering::Relaxed),
            evicted_workers: counters.evicted_workers.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish()
    }
}
