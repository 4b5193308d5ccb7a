//! A worker thread and the lease handle that owns it while checked out.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::error::PoolError;
use crate::core::lifecycle::{Lifecycle, LifecycleState};
use crate::core::task::{SinkVerdict, Task};
use crate::util::join::join_with_timeout;

use super::PoolShared;

/// Bookkeeping for one worker thread, shared between the pool and the thread.
pub(crate) struct ControllerInner {
    pub(crate) id: u64,
    name: String,
    pool: Weak<PoolShared>,
    tx: Mutex<Option<Sender<Task>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
    /// Tasks sent to the thread and not yet finished.
    outstanding: AtomicUsize,
    /// The lease was released while tasks were outstanding; the thread
    /// recycles itself once they drain.
    recycle_on_drain: AtomicBool,
    stop_requested: AtomicBool,
    lifecycle: Lifecycle,
}

impl ControllerInner {
    /// Spawn the worker thread.
    pub(crate) fn spawn(
        id: u64,
        name: String,
        pool: Weak<PoolShared>,
        stack_size: Option<usize>,
    ) -> io::Result<Arc<Self>> {
        let (tx, rx) = unbounded::<Task>();
        let inner = Arc::new(Self {
            id,
            name: name.clone(),
            pool,
            tx: Mutex::new(Some(tx)),
            thread: Mutex::new(None),
            running: AtomicBool::new(false),
            outstanding: AtomicUsize::new(0),
            recycle_on_drain: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            lifecycle: Lifecycle::new(),
        });
        let _ = inner.lifecycle.transition(LifecycleState::Started);

        let mut builder = thread::Builder::new().name(name);
        if let Some(size) = stack_size {
            builder = builder.stack_size(size);
        }
        let worker = Arc::clone(&inner);
        let handle = builder.spawn(move || worker_loop(&worker, &rx))?;
        *inner.thread.lock() = Some(handle);
        Ok(inner)
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    pub(crate) fn state(&self) -> LifecycleState {
        self.lifecycle.current()
    }

    /// Tasks queued or running on this worker.
    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Queue a task on this worker. Hands the task back if the thread is gone.
    pub(crate) fn send(&self, task: Task) -> Result<(), Task> {
        let tx = self.tx.lock();
        let Some(tx) = tx.as_ref() else {
            return Err(task);
        };
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        tx.send(task).map_err(|e| {
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
            e.into_inner()
        })
    }

    /// Mark the lease as released.
    ///
    /// Returns `true` when the caller should recycle the worker now, `false`
    /// when the thread still has work and will recycle itself after it.
    pub(crate) fn release(&self) -> bool {
        self.recycle_on_drain.store(true, Ordering::SeqCst);
        if self.outstanding.load(Ordering::SeqCst) > 0 {
            return false;
        }
        // The thread may have drained and claimed the flag in between.
        self.recycle_on_drain.swap(false, Ordering::SeqCst)
    }

    /// Finish one task. Returns `true` if the thread must recycle itself.
    fn finish_one(&self) -> bool {
        self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1
            && self.recycle_on_drain.swap(false, Ordering::SeqCst)
    }

    /// Ask the thread to exit once its current task (if any) returns.
    ///
    /// Queued but unstarted tasks are dropped and counted by the pool.
    pub(crate) fn shutdown(&self) {
        if self.stop_requested.swap(true, Ordering::AcqRel) {
            return;
        }
        self.lifecycle.advance_to(LifecycleState::Stopping);
        drop(self.tx.lock().take());
        debug!(worker = %self.name, "Worker stop requested");
    }

    /// Join the thread, detaching it if it does not exit within `timeout`.
    pub(crate) fn join(&self, timeout: Duration) {
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            join_with_timeout(handle, timeout);
        }
        self.lifecycle.advance_to(LifecycleState::Destroyed);
    }

    /// Drop the join handle without waiting.
    pub(crate) fn detach(&self) {
        drop(self.thread.lock().take());
        self.lifecycle.advance_to(LifecycleState::Destroyed);
    }
}

impl fmt::Debug for ControllerInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerInner")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Worker loop: block on the channel, run tasks, hand the worker back once
/// the lease is released and nothing is left to run.
///
/// Exits when the channel closes, a stop is requested, the pool is gone, or
/// the error sink classifies a failure as fatal.
fn worker_loop(inner: &Arc<ControllerInner>, rx: &Receiver<Task>) {
    debug!(worker = %inner.name, "Worker thread started");

    while let Ok(task) = rx.recv() {
        if inner.is_stop_requested() {
            discard_queued(inner, rx, Some(task));
            break;
        }

        if task.is_cancelled() {
            debug!(worker = %inner.name, "Skipping cancelled task");
        } else {
            inner.running.store(true, Ordering::Release);
            let outcome = task.run();
            inner.running.store(false, Ordering::Release);

            let Some(pool) = inner.pool.upgrade() else {
                discard_queued(inner, rx, None);
                break;
            };
            if pool.record_outcome(inner, outcome) == SinkVerdict::Fatal {
                warn!(worker = %inner.name, "Fatal task failure, tearing worker down");
                pool.terminate(inner);
                discard_queued(inner, rx, None);
                break;
            }
        }

        if inner.finish_one() {
            let Some(pool) = inner.pool.upgrade() else {
                break;
            };
            pool.recycle_inner(Arc::clone(inner));
        }
    }

    inner.lifecycle.advance_to(LifecycleState::Stopped);
    debug!(worker = %inner.name, "Worker thread exiting");
}

/// Drop tasks that were accepted but will never run, and report them.
fn discard_queued(inner: &ControllerInner, rx: &Receiver<Task>, current: Option<Task>) {
    let mut dropped = usize::from(current.is_some());
    drop(current);
    // The sender is gone once a stop was requested; otherwise take what is queued now.
    for task in rx.try_iter() {
        drop(task);
        dropped += 1;
    }
    inner.outstanding.store(0, Ordering::SeqCst);
    if dropped == 0 {
        return;
    }
    warn!(worker = %inner.name, dropped, "Discarding queued tasks on worker shutdown");
    if let Some(pool) = inner.pool.upgrade() {
        pool.record_dropped(dropped);
    }
}

/// A worker leased from a [`WorkerPool`](super::WorkerPool).
///
/// The lease is exclusive: dropping the controller (or passing it to
/// [`WorkerPool::recycle`](super::WorkerPool::recycle)) returns the worker to
/// the pool exactly once. [`execute`](Self::execute) consumes the lease and
/// the worker returns itself when the task completes. A worker released while
/// tasks queued by [`hand_off`](Self::hand_off) are still pending goes back
/// to the idle ring only after they finish.
pub struct WorkerController {
    inner: Option<Arc<ControllerInner>>,
}

impl WorkerController {
    pub(crate) const fn leased(inner: Arc<ControllerInner>) -> Self {
        Self { inner: Some(inner) }
    }

    pub(crate) fn into_inner(mut self) -> Option<Arc<ControllerInner>> {
        self.inner.take()
    }

    /// Worker thread name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.as_deref().map_or("", ControllerInner::name)
    }

    /// Whether the worker is currently running a task.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.as_deref().is_some_and(ControllerInner::is_running)
    }

    /// Lifecycle phase of the underlying thread.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.inner
            .as_deref()
            .map_or(LifecycleState::Destroyed, ControllerInner::state)
    }

    /// Run `task` on this worker and give up the lease.
    ///
    /// Does not block; the worker recycles itself after the task completes.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::WorkerUnavailable` if the worker thread has exited.
    pub fn execute(mut self, task: Task) -> Result<(), PoolError> {
        let Some(inner) = self.inner.take() else {
            return Err(PoolError::Internal("lease already released".into()));
        };
        let Some(pool) = inner.pool.upgrade() else {
            inner.shutdown();
            return Err(PoolError::PoolStopped);
        };
        if inner.send(task).is_ok() {
            pool.release(inner);
            return Ok(());
        }
        let name = inner.name().to_string();
        pool.terminate(&inner);
        Err(PoolError::WorkerUnavailable(name))
    }

    /// Queue `task` on this worker while keeping the lease.
    ///
    /// The caller stays responsible for recycling the controller. Tasks queued
    /// this way run in order on the worker thread, and the worker is not
    /// offered to other callers until all of them have finished.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::WorkerUnavailable` if the worker thread has exited.
    pub fn hand_off(&self, task: Task) -> Result<(), PoolError> {
        let Some(inner) = self.inner.as_deref() else {
            return Err(PoolError::Internal("lease already released".into()));
        };
        inner
            .send(task)
            .map_err(|_| PoolError::WorkerUnavailable(inner.name().to_string()))
    }
}

impl Drop for WorkerController {
    fn drop(&mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };
        match inner.pool.upgrade() {
            Some(pool) => pool.release(inner),
            None => inner.shutdown(),
        }
    }
}

impl fmt::Debug for WorkerController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerController")
            .field("name", &self.name())
            .field("running", &self.is_running())
            .field("state", &self.state())
            .finish()
    }
}
