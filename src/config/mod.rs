//! Configuration models for pools and schedulers.

pub mod pool;

pub use pool::{ExecutionConfig, SchedulerConfig, WorkerPoolConfig, POOL_ENV_PREFIX, SCHEDULER_ENV_PREFIX};
