//! Clock helpers bridging wall-clock and monotonic time.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Map a wall-clock instant onto the monotonic clock.
///
/// Targets in the past collapse to `Instant::now()`, so callers never see a
/// deadline that is already behind the monotonic clock by more than the
/// conversion itself.
#[must_use]
pub fn instant_at(target: SystemTime) -> Instant {
    let mono_now = Instant::now();
    match target.duration_since(SystemTime::now()) {
        Ok(ahead) => mono_now + ahead,
        Err(_) => mono_now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_instant_at_future() {
        let before = Instant::now();
        let at = instant_at(SystemTime::now() + Duration::from_secs(60));
        assert!(at >= before + Duration::from_secs(59));
    }

    #[test]
    fn test_instant_at_past_is_now() {
        let before = Instant::now();
        let at = instant_at(SystemTime::now() - Duration::from_secs(60));
        assert!(at >= before);
        assert!(at <= Instant::now());
    }

    #[test]
    fn test_now_ms_monotone_enough() {
        let a = now_ms();
        let b = now_ms();
        assert!(b >= a);
    }
}
