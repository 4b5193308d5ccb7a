//! Pool and scheduler configuration structures.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Environment prefix for [`WorkerPoolConfig::from_env`].
pub const POOL_ENV_PREFIX: &str = "LEASE_POOL_";
/// Environment prefix for [`SchedulerConfig::from_env`].
pub const SCHEDULER_ENV_PREFIX: &str = "SCHEDULER_";

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Pool name; worker threads are named `{name}-worker-{n}`.
    pub name: String,
    /// Upper bound on live workers.
    pub max_threads: usize,
    /// Workers pre-started at construction.
    pub min_spare_threads: usize,
    /// Idle workers above this mark are evicted by the monitor.
    pub max_spare_threads: usize,
    /// Workers added per growth step and evicted per shrink pass at most.
    pub inc_threads: usize,
    /// Interval between idle-shrink passes, in milliseconds.
    pub monitor_period_ms: u64,
    /// Detach worker threads when the last pool handle drops instead of joining them.
    pub daemon: bool,
    /// Optional worker thread stack size in bytes.
    pub thread_stack_size: Option<usize>,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            name: "lease-pool".into(),
            max_threads: 100,
            min_spare_threads: 10,
            max_spare_threads: 50,
            inc_threads: 10,
            monitor_period_ms: 60_000,
            daemon: true,
            thread_stack_size: None,
        }
    }
}

impl WorkerPoolConfig {
    /// Configuration with the documented defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pool name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the maximum number of live workers.
    #[must_use]
    pub const fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Set the number of pre-started workers.
    #[must_use]
    pub const fn with_min_spare_threads(mut self, min_spare_threads: usize) -> Self {
        self.min_spare_threads = min_spare_threads;
        self
    }

    /// Set the idle high-water mark.
    #[must_use]
    pub const fn with_max_spare_threads(mut self, max_spare_threads: usize) -> Self {
        self.max_spare_threads = max_spare_threads;
        self
    }

    /// Set the growth/eviction step.
    #[must_use]
    pub const fn with_inc_threads(mut self, inc_threads: usize) -> Self {
        self.inc_threads = inc_threads;
        self
    }

    /// Set the idle-shrink interval in milliseconds.
    #[must_use]
    pub const fn with_monitor_period_ms(mut self, monitor_period_ms: u64) -> Self {
        self.monitor_period_ms = monitor_period_ms;
        self
    }

    /// Set whether worker threads are detached on drop.
    #[must_use]
    pub const fn with_daemon(mut self, daemon: bool) -> Self {
        self.daemon = daemon;
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = Some(bytes);
        self
    }

    /// Validate pool configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("name must not be empty".into());
        }
        if self.max_threads == 0 {
            return Err("max_threads must be greater than 0".into());
        }
        if self.inc_threads == 0 {
            return Err("inc_threads must be greater than 0".into());
        }
        if self.min_spare_threads > self.max_spare_threads {
            return Err(format!(
                "min_spare_threads ({}) must not exceed max_spare_threads ({})",
                self.min_spare_threads, self.max_spare_threads
            ));
        }
        if self.max_spare_threads > self.max_threads {
            return Err(format!(
                "max_spare_threads ({}) must not exceed max_threads ({})",
                self.max_spare_threads, self.max_threads
            ));
        }
        if self.monitor_period_ms == 0 {
            return Err("monitor_period_ms must be greater than 0".into());
        }
        if self.thread_stack_size == Some(0) {
            return Err("thread_stack_size must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse pool configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from `LEASE_POOL_*` environment variables.
    ///
    /// A `.env` file is loaded first if present. Unset keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns a message for unparsable values or failed validation.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        if let Some(name) = env_string(POOL_ENV_PREFIX, "NAME") {
            cfg.name = name;
        }
        if let Some(v) = env_parse(POOL_ENV_PREFIX, "MAX_THREADS")? {
            cfg.max_threads = v;
        }
        if let Some(v) = env_parse(POOL_ENV_PREFIX, "MIN_SPARE_THREADS")? {
            cfg.min_spare_threads = v;
        }
        if let Some(v) = env_parse(POOL_ENV_PREFIX, "MAX_SPARE_THREADS")? {
            cfg.max_spare_threads = v;
        }
        if let Some(v) = env_parse(POOL_ENV_PREFIX, "INC_THREADS")? {
            cfg.inc_threads = v;
        }
        if let Some(v) = env_parse(POOL_ENV_PREFIX, "MONITOR_PERIOD_MS")? {
            cfg.monitor_period_ms = v;
        }
        if let Some(v) = env_parse(POOL_ENV_PREFIX, "DAEMON")? {
            cfg.daemon = v;
        }
        if let Some(v) = env_parse(POOL_ENV_PREFIX, "THREAD_STACK_SIZE")? {
            cfg.thread_stack_size = Some(v);
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Timer scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Scheduler name; the timer thread is named `{name}-timer`.
    pub name: String,
    /// Detach the timer thread on drop instead of joining it.
    pub daemon: bool,
    /// Optional timer thread stack size in bytes.
    pub thread_stack_size: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: "scheduler".into(),
            daemon: true,
            thread_stack_size: None,
        }
    }
}

impl SchedulerConfig {
    /// Configuration with the documented defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scheduler name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set whether the timer thread is detached on drop.
    #[must_use]
    pub const fn with_daemon(mut self, daemon: bool) -> Self {
        self.daemon = daemon;
        self
    }

    /// Validate scheduler configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("name must not be empty".into());
        }
        if self.thread_stack_size == Some(0) {
            return Err("thread_stack_size must be greater than 0".into());
        }
        Ok(())
    }

    /// Build configuration from `SCHEDULER_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns a message for unparsable values or failed validation.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        if let Some(name) = env_string(SCHEDULER_ENV_PREFIX, "NAME") {
            cfg.name = name;
        }
        if let Some(v) = env_parse(SCHEDULER_ENV_PREFIX, "DAEMON")? {
            cfg.daemon = v;
        }
        if let Some(v) = env_parse(SCHEDULER_ENV_PREFIX, "THREAD_STACK_SIZE")? {
            cfg.thread_stack_size = Some(v);
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Root configuration: named pools plus an optional scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Map of pool name to configuration.
    pub pools: HashMap<String, WorkerPoolConfig>,
    /// Scheduler configuration, if a scheduler should be built.
    pub scheduler: Option<SchedulerConfig>,
}

impl ExecutionConfig {
    /// Validate all pools and the scheduler; at least one component must exist.
    ///
    /// # Errors
    ///
    /// Returns the first invalid component with its name.
    pub fn validate(&self) -> Result<(), String> {
        if self.pools.is_empty() && self.scheduler.is_none() {
            return Err("at least one pool or a scheduler must be defined".into());
        }
        for (name, pool) in &self.pools {
            pool.validate()
                .map_err(|e| format!("pool `{name}` invalid: {e}"))?;
        }
        if let Some(scheduler) = &self.scheduler {
            scheduler
                .validate()
                .map_err(|e| format!("scheduler invalid: {e}"))?;
        }
        Ok(())
    }

    /// Parse execution configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

fn env_string(prefix: &str, key: &str) -> Option<String> {
    env::var(format!("{prefix}{key}")).ok()
}

fn env_parse<T>(prefix: &str, key: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_string(prefix, key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| format!("{prefix}{key}=`{raw}`: {e}"))
        })
        .transpose()
}
