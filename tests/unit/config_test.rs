//! Tests for configuration validation

use prometheus_lease_pool::config::{ExecutionConfig, SchedulerConfig, WorkerPoolConfig};

#[test]
fn test_pool_config_validation() {
    let valid = WorkerPoolConfig::new()
        .with_max_threads(8)
        .with_min_spare_threads(2)
        .with_max_spare_threads(4)
        .with_inc_threads(2);
    assert!(valid.validate().is_ok());
}

#[test]
fn test_pool_config_invalid_max_threads() {
    let invalid = WorkerPoolConfig::new().with_max_threads(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_pool_config_spare_ordering() {
    let invalid = WorkerPoolConfig::new()
        .with_max_threads(10)
        .with_min_spare_threads(6)
        .with_max_spare_threads(4);
    assert!(invalid.validate().is_err());

    let above_max = WorkerPoolConfig::new()
        .with_max_threads(4)
        .with_min_spare_threads(1)
        .with_max_spare_threads(5);
    assert!(above_max.validate().is_err());
}

#[test]
fn test_pool_config_zero_increment() {
    assert!(WorkerPoolConfig::new().with_inc_threads(0).validate().is_err());
}

#[test]
fn test_pool_config_from_json_applies_defaults() {
    let cfg = WorkerPoolConfig::from_json_str(r#"{"name": "ingest", "max_threads": 16, "min_spare_threads": 2, "max_spare_threads": 8}"#)
        .unwrap();
    assert_eq!(cfg.name, "ingest");
    assert_eq!(cfg.max_threads, 16);
    assert_eq!(cfg.max_spare_threads, 8);
    assert_eq!(cfg.min_spare_threads, 2);
    assert_eq!(cfg.monitor_period_ms, 60_000);
    assert_eq!(cfg.inc_threads, 10);
    assert!(cfg.daemon);
}

#[test]
fn test_pool_config_from_json_rejects_invalid() {
    assert!(WorkerPoolConfig::from_json_str(r#"{"max_threads": 0}"#).is_err());
    assert!(WorkerPoolConfig::from_json_str("not json").is_err());
}

#[test]
fn test_scheduler_config_validation() {
    assert!(SchedulerConfig::new().validate().is_ok());
    assert!(SchedulerConfig::new().with_name("").validate().is_err());
}

#[test]
fn test_execution_config_requires_a_component() {
    assert!(ExecutionConfig::default().validate().is_err());
}

#[test]
fn test_execution_config_from_json() {
    let json = r#"{
        "pools": {
            "io": { "max_threads": 4, "min_spare_threads": 1, "max_spare_threads": 2, "inc_threads": 1 },
            "cpu": { "max_threads": 2, "min_spare_threads": 0, "max_spare_threads": 2, "inc_threads": 1 }
        },
        "scheduler": { "name": "maintenance", "daemon": false }
    }"#;
    let cfg = ExecutionConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.pools.len(), 2);
    assert_eq!(cfg.pools["io"].max_threads, 4);
    let scheduler = cfg.scheduler.unwrap();
    assert_eq!(scheduler.name, "maintenance");
    assert!(!scheduler.daemon);
}

#[test]
fn test_execution_config_names_bad_pool() {
    let json = r#"{ "pools": { "broken": { "max_threads": 0 } } }"#;
    let err = ExecutionConfig::from_json_str(json).unwrap_err();
    assert!(err.contains("broken"));
}
