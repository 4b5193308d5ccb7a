//! Seam to an external cron-rule evaluator.
//!
//! The scheduler never parses cron syntax. It hands the expression and a
//! wall-clock reference to a [`CronEvaluator`] and converts the answer onto
//! the monotonic clock its timer queue runs on.

use std::time::{Instant, SystemTime};

use crate::util::clock::instant_at;

/// Computes the next firing time of a cron expression.
pub trait CronEvaluator: Send + Sync {
    /// Next execution strictly after `reference`, or `None` if the rule has
    /// no further firings (or cannot be evaluated).
    fn next_execution(&self, expression: &str, reference: SystemTime) -> Option<SystemTime>;
}

impl<F> CronEvaluator for F
where
    F: Fn(&str, SystemTime) -> Option<SystemTime> + Send + Sync,
{
    fn next_execution(&self, expression: &str, reference: SystemTime) -> Option<SystemTime> {
        self(expression, reference)
    }
}

/// Next firing of `expression` after now, on the monotonic clock.
pub(crate) fn next_instant(evaluator: &dyn CronEvaluator, expression: &str) -> Option<Instant> {
    evaluator
        .next_execution(expression, SystemTime::now())
        .map(instant_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_closure_evaluator() {
        let every_minute =
            |_: &str, reference: SystemTime| reference.checked_add(Duration::from_secs(60));
        let before = Instant::now();
        let next = next_instant(&every_minute, "* * * * *").unwrap();
        assert!(next >= before + Duration::from_secs(59));
    }

    #[test]
    fn test_exhausted_rule() {
        let never = |_: &str, _: SystemTime| -> Option<SystemTime> { None };
        assert!(next_instant(&never, "0 0 30 2 *").is_none());
    }

    #[test]
    fn test_past_answer_collapses_to_now() {
        let stale = |_: &str, reference: SystemTime| reference.checked_sub(Duration::from_secs(5));
        let next = next_instant(&stale, "* * * * *").unwrap();
        assert!(next <= Instant::now());
    }
}
