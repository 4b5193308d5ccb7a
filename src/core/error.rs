//! Error types for pool, scheduler and task operations.

use thiserror::Error;

use super::lifecycle::LifecycleState;

/// Errors produced by the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool has begun shutdown; callers must not retry.
    #[error("pool has been stopped")]
    PoolStopped,
    /// No worker became available before the lease timeout elapsed.
    #[error("no worker available")]
    PoolExhausted,
    /// The task was cancelled before a worker was leased for it.
    #[error("task cancelled before dispatch")]
    Cancelled,
    /// A leased worker's thread is no longer accepting work.
    #[error("worker unavailable: {0}")]
    WorkerUnavailable(String),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
    /// Internal error (join failure, runtime error, etc.).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors produced by the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The scheduler has been stopped and accepts no new handles.
    #[error("scheduling rejected: scheduler stopped")]
    SchedulingRejected,
    /// A cron job was submitted but no evaluator is configured.
    #[error("no cron evaluator configured")]
    MissingCronEvaluator,
    /// The cron evaluator produced no upcoming execution.
    #[error("cron expression `{0}` has no next execution")]
    NoNextExecution(String),
    /// A delay or period cannot be scheduled (zero period, clock overflow).
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The OS refused to spawn the timer thread.
    #[error("failed to spawn timer thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Failure raised by a unit of work.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task returned an error.
    #[error("task failed: {0}")]
    Failed(#[from] anyhow::Error),
    /// The task panicked; the payload message is captured when it is a string.
    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Rejected lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// The transition is not in the lifecycle table.
    #[error("invalid lifecycle transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// State the component was in.
        from: LifecycleState,
        /// State that was requested.
        to: LifecycleState,
    },
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_error_display() {
        assert_eq!(PoolError::PoolStopped.to_string(), "pool has been stopped");
        assert_eq!(PoolError::PoolExhausted.to_string(), "no worker available");
        assert_eq!(
            PoolError::WorkerUnavailable("w-1".into()).to_string(),
            "worker unavailable: w-1"
        );
    }

    #[test]
    fn test_task_error_from_anyhow() {
        let err: TaskError = anyhow::anyhow!("boom").into();
        assert_eq!(err.to_string(), "task failed: boom");
    }

    #[test]
    fn test_lifecycle_error_display() {
        let err = LifecycleError::InvalidTransition {
            from: LifecycleState::Stopped,
            to: LifecycleState::Started,
        };
        assert_eq!(
            err.to_string(),
            "invalid lifecycle transition from Stopped to Started"
        );
    }
}
