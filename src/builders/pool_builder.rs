//! Builders to construct worker pools and schedulers from configuration.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::config::{ExecutionConfig, WorkerPoolConfig};
use crate::core::{
    CronEvaluator, ErrorSink, LoggingErrorSink, PoolError, Scheduler, SchedulerError, WorkerPool,
};

/// Named builder for a single [`WorkerPool`].
pub struct PoolBuilder {
    name: String,
    config: WorkerPoolConfig,
    sink: Arc<dyn ErrorSink>,
}

impl PoolBuilder {
    /// Builder for pool `name`. The name overrides `config.name`.
    #[must_use]
    pub fn new(name: impl Into<String>, config: WorkerPoolConfig) -> Self {
        Self {
            name: name.into(),
            config,
            sink: Arc::new(LoggingErrorSink),
        }
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pool configuration as it will be applied.
    #[must_use]
    pub const fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Receiver for task failures on this pool.
    #[must_use]
    pub fn error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Start the pool.
    ///
    /// # Errors
    ///
    /// Same as [`WorkerPool::with_error_sink`].
    pub fn build(self) -> Result<WorkerPool, PoolError> {
        let config = self.config.with_name(self.name);
        WorkerPool::with_error_sink(config, self.sink)
    }
}

/// Start every pool named in `cfg`, keyed by name.
///
/// Pools already started are stopped again if a later one fails.
///
/// # Errors
///
/// - `PoolError::InvalidConfig` if `cfg` does not validate
/// - any error from starting an individual pool
pub fn build_pools(cfg: &ExecutionConfig) -> Result<HashMap<String, WorkerPool>, PoolError> {
    cfg.validate()
        .map_err(|e| PoolError::InvalidConfig(format!("config invalid: {e}")))?;

    let mut pools = HashMap::with_capacity(cfg.pools.len());
    for (name, pool_cfg) in &cfg.pools {
        match PoolBuilder::new(name.clone(), pool_cfg.clone()).build() {
            Ok(pool) => {
                pools.insert(name.clone(), pool);
            }
            Err(e) => {
                for pool in pools.values() {
                    pool.stop();
                }
                return Err(e);
            }
        }
    }
    info!(pool_count = pools.len(), "Worker pools built");
    Ok(pools)
}

/// Start the scheduler described by `cfg`, if any.
///
/// When `pool` is given the scheduler dispatches due jobs to it.
///
/// # Errors
///
/// - `SchedulerError::InvalidConfig` if the scheduler section does not validate
/// - `SchedulerError::Spawn` if the timer thread cannot be created
pub fn build_scheduler(
    cfg: &ExecutionConfig,
    pool: Option<WorkerPool>,
    cron: Option<Arc<dyn CronEvaluator>>,
) -> Result<Option<Scheduler>, SchedulerError> {
    let Some(sched_cfg) = cfg.scheduler.clone() else {
        return Ok(None);
    };
    let mut builder = Scheduler::builder(sched_cfg);
    if let Some(pool) = pool {
        builder = builder.worker_pool(pool);
    }
    if let Some(cron) = cron {
        builder = builder.shared_cron_evaluator(cron);
    }
    builder.build().map(Some)
}
