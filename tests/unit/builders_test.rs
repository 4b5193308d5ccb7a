//! Tests for builder modules

use prometheus_lease_pool::builders::pool_builder::{build_pools, build_scheduler, PoolBuilder};
use prometheus_lease_pool::config::{ExecutionConfig, SchedulerConfig, WorkerPoolConfig};
use prometheus_lease_pool::core::{CronEvaluator, LifecycleState, PoolError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

fn small_pool() -> WorkerPoolConfig {
    WorkerPoolConfig::new()
        .with_max_threads(2)
        .with_min_spare_threads(1)
        .with_max_spare_threads(2)
        .with_inc_threads(1)
}

#[test]
fn test_pool_builder_defaults() {
    let builder = PoolBuilder::new("pool1", small_pool());
    assert_eq!(builder.name(), "pool1");
    assert_eq!(builder.config().max_threads, 2);
    assert_eq!(builder.config().min_spare_threads, 1);
}

#[test]
fn test_pool_builder_name_wins() {
    let pool = PoolBuilder::new("renamed", small_pool().with_name("ignored"))
        .build()
        .unwrap();
    assert_eq!(pool.name(), "renamed");
    assert_eq!(pool.current_thread_count(), 1);
    pool.stop();
}

#[test]
fn test_build_pools_from_config() {
    let mut pools = HashMap::new();
    pools.insert("io".to_string(), small_pool());
    pools.insert("cpu".to_string(), small_pool().with_min_spare_threads(0));
    let cfg = ExecutionConfig {
        pools,
        scheduler: None,
    };

    let built = build_pools(&cfg).unwrap();
    assert_eq!(built.len(), 2);
    assert_eq!(built["io"].name(), "io");
    assert_eq!(built["io"].idle_count(), 1);
    assert_eq!(built["cpu"].idle_count(), 0);
    for pool in built.values() {
        pool.stop();
    }
}

#[test]
fn test_build_pools_rejects_invalid_config() {
    let err = build_pools(&ExecutionConfig::default()).unwrap_err();
    assert!(matches!(err, PoolError::InvalidConfig(_)));
}

#[test]
fn test_build_scheduler_absent() {
    let mut pools = HashMap::new();
    pools.insert("io".to_string(), small_pool());
    let cfg = ExecutionConfig {
        pools,
        scheduler: None,
    };
    assert!(build_scheduler(&cfg, None, None).unwrap().is_none());
}

#[test]
fn test_build_scheduler_with_cron() {
    let cfg = ExecutionConfig {
        pools: HashMap::new(),
        scheduler: Some(SchedulerConfig::new().with_name("built")),
    };
    let evaluator: Arc<dyn CronEvaluator> =
        Arc::new(|_: &str, reference: SystemTime| reference.checked_add(Duration::from_secs(3600)));
    let scheduler = build_scheduler(&cfg, None, Some(evaluator)).unwrap().unwrap();
    assert_eq!(scheduler.name(), "built");
    assert_eq!(scheduler.state(), LifecycleState::Started);

    let handle = scheduler.schedule_cron(|| Ok(()), "0 * * * *").unwrap();
    assert!(handle.next_execution().is_some());
    scheduler.stop();
    assert!(handle.is_cancelled());
}
