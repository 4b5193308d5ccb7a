//! Tests for error types

use prometheus_lease_pool::core::{
    AppResult, LifecycleError, LifecycleState, PoolError, SchedulerError, TaskError,
};

#[test]
fn test_pool_stopped_error() {
    assert_eq!(format!("{}", PoolError::PoolStopped), "pool has been stopped");
}

#[test]
fn test_pool_exhausted_error() {
    assert_eq!(format!("{}", PoolError::PoolExhausted), "no worker available");
}

#[test]
fn test_spawn_error_from_io() {
    let io = std::io::Error::new(std::io::ErrorKind::OutOfMemory, "no threads left");
    let err: PoolError = io.into();
    assert_eq!(format!("{err}"), "failed to spawn worker thread: no threads left");
}

#[test]
fn test_scheduling_rejected_error() {
    let err = SchedulerError::SchedulingRejected;
    assert_eq!(format!("{err}"), "scheduling rejected: scheduler stopped");
}

#[test]
fn test_no_next_execution_error() {
    let err = SchedulerError::NoNextExecution("0 0 30 2 *".to_string());
    assert_eq!(format!("{err}"), "cron expression `0 0 30 2 *` has no next execution");
}

#[test]
fn test_invalid_schedule_error() {
    let err = SchedulerError::InvalidSchedule("period must be greater than 0".to_string());
    assert_eq!(format!("{err}"), "invalid schedule: period must be greater than 0");
}

#[test]
fn test_task_panicked_error() {
    let err = TaskError::Panicked("index out of bounds".to_string());
    assert_eq!(format!("{err}"), "task panicked: index out of bounds");
}

#[test]
fn test_lifecycle_error_is_comparable() {
    let err = LifecycleError::InvalidTransition {
        from: LifecycleState::Created,
        to: LifecycleState::Destroyed,
    };
    let copy = err;
    assert_eq!(err, copy);
}

#[test]
fn test_app_result_wraps_pool_error() {
    fn lease_or_bail() -> AppResult<()> {
        Err(PoolError::PoolExhausted)?;
        Ok(())
    }
    let err = lease_or_bail().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PoolError>(),
        Some(PoolError::PoolExhausted)
    ));
}
