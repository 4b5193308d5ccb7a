//! Worker pool, timer scheduler and the pieces they share.

pub mod error;
pub mod lifecycle;
pub mod scheduler;
pub mod task;
pub mod worker_pool;

pub use error::{AppResult, LifecycleError, PoolError, SchedulerError, TaskError};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use scheduler::{
    CronEvaluator, CronTaskHandle, HandleState, JobFn, Recurrence, ScheduledTaskHandle, Scheduler,
    SchedulerBuilder, SchedulerStats,
};
pub use task::{CancellationToken, ErrorSink, LoggingErrorSink, SinkVerdict, Task, TaskResult};
pub use worker_pool::{IdleRing, PoolStats, WorkerController, WorkerPool};
