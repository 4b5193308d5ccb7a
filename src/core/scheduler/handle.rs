//! Cancellable, time-ordered handles for scheduled jobs.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::core::task::{CancellationToken, TaskResult};

/// Job run by the scheduler, possibly many times.
pub type JobFn = Arc<dyn Fn() -> TaskResult + Send + Sync + 'static>;

/// How a handle is rescheduled after each run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recurrence {
    /// Run once.
    Once,
    /// Next run at previous *scheduled* time plus the period; overruns catch up.
    FixedRate(Duration),
    /// Next run at previous *completion* time plus the delay.
    FixedDelay(Duration),
    /// Next run from the cron evaluator, referenced to the completion time.
    Cron(String),
}

impl Recurrence {
    /// Whether the handle may run more than once.
    #[must_use]
    pub const fn is_periodic(&self) -> bool {
        !matches!(self, Self::Once)
    }
}

/// Phase of a scheduled handle.
///
/// `Pending → (Running → Pending)* → Cancelled | Completed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Waiting in the timer queue.
    Pending,
    /// Its job is executing.
    Running,
    /// Cancelled; it will not run again.
    Cancelled,
    /// Finished its last run (one-shot, or cron rule exhausted).
    Completed,
}

struct Slot {
    state: HandleState,
    next_execution: Option<Instant>,
}

struct HandleInner {
    id: Uuid,
    job: JobFn,
    recurrence: Recurrence,
    slot: Mutex<Slot>,
    runs: AtomicU64,
    token: CancellationToken,
}

/// Handle to a job in the scheduler.
///
/// Clones refer to the same job. Cancelling stops every future run; a run
/// already in progress is not interrupted.
#[derive(Clone)]
pub struct ScheduledTaskHandle {
    inner: Arc<HandleInner>,
}

/// Cron-driven handles are ordinary handles with [`Recurrence::Cron`].
pub type CronTaskHandle = ScheduledTaskHandle;

impl ScheduledTaskHandle {
    pub(crate) fn new(job: JobFn, recurrence: Recurrence, first: Instant) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: Uuid::new_v4(),
                job,
                recurrence,
                slot: Mutex::new(Slot {
                    state: HandleState::Pending,
                    next_execution: Some(first),
                }),
                runs: AtomicU64::new(0),
                token: CancellationToken::new(),
            }),
        }
    }

    /// Unique handle id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Recurrence rule.
    #[must_use]
    pub fn recurrence(&self) -> &Recurrence {
        &self.inner.recurrence
    }

    /// Cron expression, for cron handles.
    #[must_use]
    pub fn cron_expression(&self) -> Option<&str> {
        match &self.inner.recurrence {
            Recurrence::Cron(expr) => Some(expr),
            _ => None,
        }
    }

    /// Current phase.
    #[must_use]
    pub fn state(&self) -> HandleState {
        self.inner.slot.lock().state
    }

    /// When the job is next due; `None` once cancelled or completed.
    #[must_use]
    pub fn next_execution(&self) -> Option<Instant> {
        self.inner.slot.lock().next_execution
    }

    /// Number of runs started so far.
    #[must_use]
    pub fn run_count(&self) -> u64 {
        self.inner.runs.load(Ordering::Acquire)
    }

    /// Whether the handle was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Whether the handle will never run again.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self.state(), HandleState::Cancelled | HandleState::Completed)
    }

    /// Cancel all future runs. Returns `false` if already cancelled or completed.
    pub fn cancel(&self) -> bool {
        let mut slot = self.inner.slot.lock();
        match slot.state {
            HandleState::Pending | HandleState::Running => {
                slot.state = HandleState::Cancelled;
                slot.next_execution = None;
                self.inner.token.cancel();
                true
            }
            HandleState::Cancelled | HandleState::Completed => false,
        }
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    pub(crate) fn job(&self) -> JobFn {
        Arc::clone(&self.inner.job)
    }

    /// `Pending → Running`. Returns `false` if the handle may not run.
    pub(crate) fn begin_run(&self) -> bool {
        let mut slot = self.inner.slot.lock();
        if slot.state != HandleState::Pending {
            return false;
        }
        slot.state = HandleState::Running;
        slot.next_execution = None;
        self.inner.runs.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// End a run. Returns the time to re-queue at, if the handle goes back to
    /// `Pending`; a handle cancelled mid-run stays cancelled.
    pub(crate) fn finish_run(&self, next: Option<Instant>) -> Option<Instant> {
        let mut slot = self.inner.slot.lock();
        if slot.state != HandleState::Running {
            return None;
        }
        match next {
            Some(at) => {
                slot.state = HandleState::Pending;
                slot.next_execution = Some(at);
                Some(at)
            }
            None => {
                slot.state = HandleState::Completed;
                None
            }
        }
    }
}

impl PartialEq for ScheduledTaskHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ScheduledTaskHandle {}

impl fmt::Debug for ScheduledTaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.inner.slot.lock();
        f.debug_struct("ScheduledTaskHandle")
            .field("id", &self.inner.id)
            .field("recurrence", &self.inner.recurrence)
            .field("state", &slot.state)
            .field("next_execution", &slot.next_execution)
            .field("runs", &self.run_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(recurrence: Recurrence) -> ScheduledTaskHandle {
        ScheduledTaskHandle::new(Arc::new(|| Ok(())), recurrence, Instant::now())
    }

    #[test]
    fn test_one_shot_completes() {
        let h = handle(Recurrence::Once);
        assert_eq!(h.state(), HandleState::Pending);
        assert!(h.begin_run());
        assert_eq!(h.state(), HandleState::Running);
        assert_eq!(h.finish_run(None), None);
        assert_eq!(h.state(), HandleState::Completed);
        assert!(!h.begin_run());
        assert!(!h.cancel());
        assert_eq!(h.run_count(), 1);
    }

    #[test]
    fn test_periodic_returns_to_pending() {
        let h = handle(Recurrence::FixedRate(Duration::from_secs(1)));
        let at = Instant::now() + Duration::from_secs(1);
        assert!(h.begin_run());
        assert_eq!(h.finish_run(Some(at)), Some(at));
        assert_eq!(h.state(), HandleState::Pending);
        assert_eq!(h.next_execution(), Some(at));
    }

    #[test]
    fn test_cancel_while_running_suppresses_next_run() {
        let h = handle(Recurrence::FixedDelay(Duration::from_millis(5)));
        assert!(h.begin_run());
        assert!(h.cancel());
        assert!(h.is_cancelled());
        assert_eq!(h.finish_run(Some(Instant::now())), None);
        assert_eq!(h.state(), HandleState::Cancelled);
        assert!(h.is_done());
    }

    #[test]
    fn test_cancel_before_run() {
        let h = handle(Recurrence::Once);
        assert!(h.cancel());
        assert!(!h.cancel());
        assert!(!h.begin_run());
        assert_eq!(h.next_execution(), None);
        assert_eq!(h.run_count(), 0);
    }

    #[test]
    fn test_cron_expression_accessor() {
        let h = handle(Recurrence::Cron("0 * * * *".into()));
        assert_eq!(h.cron_expression(), Some("0 * * * *"));
        assert!(h.recurrence().is_periodic());
        assert_eq!(handle(Recurrence::Once).cron_expression(), None);
    }

    #[test]
    fn test_clones_share_state() {
        let h = handle(Recurrence::Once);
        let other = h.clone();
        assert_eq!(h, other);
        other.cancel();
        assert!(h.is_cancelled());
    }
}
