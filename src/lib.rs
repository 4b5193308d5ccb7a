//! # Prometheus Lease Pool
//!
//! A bounded pool of reusable worker threads that are *leased* to run units of
//! work, plus a single-thread timer scheduler for one-shot, fixed-rate,
//! fixed-delay and cron-driven jobs.
//!
//! ## Core Problem Solved
//!
//! Platform services run a steady trickle of short background jobs and a
//! handful of recurring maintenance jobs. Spawning a thread per job is wasteful
//! and an unbounded pool lets a burst take down the host:
//!
//! - **Bounded concurrency**: never more than `max_threads` live workers
//! - **Grow on demand**: idle footprint stays near `min_spare_threads` under light load
//! - **Idle reclamation**: a monitor evicts workers beyond `max_spare_threads`
//! - **Ordered timers**: one thread serves every scheduled job in due-time order
//!
//! ## WorkerPool - Leased Worker Threads
//!
//! ```rust,no_run
//! use prometheus_lease_pool::config::WorkerPoolConfig;
//! use prometheus_lease_pool::core::{Task, WorkerPool};
//! use std::time::Duration;
//!
//! let pool = WorkerPool::new(
//!     WorkerPoolConfig::new()
//!         .with_max_threads(8)
//!         .with_min_spare_threads(2)
//!         .with_max_spare_threads(4),
//! )?;
//!
//! // Fire and forget: the worker returns itself to the pool when done.
//! pool.execute(Task::from_fn(|| println!("hello from a worker")))?;
//!
//! // Or lease a worker explicitly, waiting at most one second.
//! let worker = pool.lease(Some(Duration::from_secs(1)))?;
//! worker.execute(Task::from_fn(|| println!("leased")))?;
//!
//! pool.stop();
//! # Ok::<(), prometheus_lease_pool::core::PoolError>(())
//! ```
//!
//! ## Scheduler - Timer Dispatch
//!
//! ```rust,no_run
//! use prometheus_lease_pool::config::SchedulerConfig;
//! use prometheus_lease_pool::core::Scheduler;
//! use std::time::Duration;
//!
//! let scheduler = Scheduler::new(SchedulerConfig::new())?;
//! let handle = scheduler.schedule_at_fixed_rate(
//!     || {
//!         println!("tick");
//!         Ok(())
//!     },
//!     Duration::from_millis(100),
//!     Duration::from_secs(1),
//! )?;
//! handle.cancel();
//! scheduler.stop();
//! # Ok::<(), prometheus_lease_pool::core::SchedulerError>(())
//! ```
//!
//! For complete examples, see:
//! - `tests/worker_pool_test.rs` - lease, growth and idle-shrink scenarios
//! - `tests/scheduler_test.rs` - timer ordering, recurrence and cancellation

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Worker pool, scheduler and shared execution abstractions.
pub mod core;
/// Configuration models for pools and schedulers.
pub mod config;
/// Builders to construct pools and schedulers from configuration.
pub mod builders;
/// Shared utilities.
pub mod util;
