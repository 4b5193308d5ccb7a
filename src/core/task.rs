//! Units of work, cooperative cancellation and failure reporting.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::error;

use super::error::TaskError;

/// Outcome of running a unit of work.
pub type TaskResult = Result<(), TaskError>;

/// Shared cancellation flag checked at task boundaries.
///
/// Cancelling never interrupts a running task; it only stops work that has
/// not started yet.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// New, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns `true` if this call flipped the flag.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

type Job = Box<dyn FnOnce() -> TaskResult + Send + 'static>;

/// A one-shot unit of work handed to a worker.
pub struct Task {
    job: Job,
    token: Option<CancellationToken>,
}

impl Task {
    /// Wrap a fallible closure.
    pub fn new<F>(job: F) -> Self
    where
        F: FnOnce() -> TaskResult + Send + 'static,
    {
        Self {
            job: Box::new(job),
            token: None,
        }
    }

    /// Wrap an infallible closure.
    pub fn from_fn<F>(job: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(move || {
            job();
            Ok(())
        })
    }

    /// Bind the task to a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Whether the bound token (if any) has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Run the task, converting a panic into [`TaskError::Panicked`].
    ///
    /// # Errors
    ///
    /// Returns the task's own error, or `Panicked` if it unwound.
    pub fn run(self) -> TaskResult {
        let job = self.job;
        catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|payload| Err(panic_error(&*payload)))
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("cancellable", &self.token.is_some())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Convert a panic payload into a [`TaskError`].
pub(crate) fn panic_error(payload: &(dyn Any + Send)) -> TaskError {
    let msg = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    TaskError::Panicked(msg)
}

/// What a worker should do after a task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkVerdict {
    /// Keep the worker and return it to the pool.
    Continue,
    /// Tear the worker down; it is not returned to the idle ring.
    Fatal,
}

/// Receiver for uncaught task failures.
pub trait ErrorSink: Send + Sync {
    /// Report a failure raised on `source` (a worker or scheduler name).
    fn report(&self, source: &str, error: &TaskError) -> SinkVerdict;
}

impl<F> ErrorSink for F
where
    F: Fn(&str, &TaskError) -> SinkVerdict + Send + Sync,
{
    fn report(&self, source: &str, error: &TaskError) -> SinkVerdict {
        self(source, error)
    }
}

/// Default sink: logs the failure and keeps the worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingErrorSink;

impl ErrorSink for LoggingErrorSink {
    fn report(&self, source: &str, error: &TaskError) -> SinkVerdict {
        error!(source = source, error = %error, "Task failed");
        SinkVerdict::Continue
    }
}
