//! Tests for utility functions

use prometheus_lease_pool::util::{init_tracing, instant_at, now_ms, DEFAULT_LOG_FILTER};
use std::time::{Duration, Instant, SystemTime};

#[test]
fn test_now_ms_is_monotone_enough() {
    let a = now_ms();
    std::thread::sleep(Duration::from_millis(2));
    let b = now_ms();
    assert!(b >= a);
    assert!(a > 1_600_000_000_000);
}

#[test]
fn test_instant_at_past_collapses_to_now() {
    let before = Instant::now();
    let at = instant_at(SystemTime::now() - Duration::from_secs(30));
    assert!(at >= before);
    assert!(at <= Instant::now());
}

#[test]
fn test_instant_at_future_offset() {
    let at = instant_at(SystemTime::now() + Duration::from_millis(500));
    let ahead = at.saturating_duration_since(Instant::now());
    assert!(ahead > Duration::from_millis(400));
    assert!(ahead <= Duration::from_millis(500));
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    assert!(DEFAULT_LOG_FILTER.starts_with("prometheus_lease_pool"));
}
