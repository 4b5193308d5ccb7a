//! Bounded thread joins used during shutdown.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

/// How long shutdown waits for a single thread before detaching it.
pub(crate) const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Join `handle`, giving up after `timeout`.
///
/// Threads that do not exit in time are detached. Joining the calling thread
/// is skipped. Returns `true` only if the thread exited cleanly.
pub(crate) fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let label = handle.thread().name().unwrap_or("unnamed").to_string();
    if handle.thread().id() == thread::current().id() {
        debug!(thread = %label, "Skipping self-join during shutdown");
        return false;
    }
    if handle.is_finished() {
        return report(&label, handle.join().is_ok());
    }

    let (tx, rx) = crossbeam_channel::bounded(1);
    let joiner = thread::Builder::new()
        .name(format!("{label}-join"))
        .spawn(move || {
            let _ = tx.send(handle.join().is_ok());
        });
    if let Err(e) = joiner {
        warn!(thread = %label, error = %e, "Could not spawn joiner - detaching");
        return false;
    }

    match rx.recv_timeout(timeout) {
        Ok(clean) => report(&label, clean),
        Err(_) => {
            warn!(thread = %label, "Thread did not exit within timeout - detaching");
            false
        }
    }
}

fn report(label: &str, clean: bool) -> bool {
    if clean {
        debug!(thread = %label, "Thread joined");
    } else {
        warn!(thread = %label, "Thread panicked");
    }
    clean
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_finished_thread() {
        let handle = thread::spawn(|| {});
        assert!(join_with_timeout(handle, JOIN_TIMEOUT));
    }

    #[test]
    fn test_join_times_out_on_stuck_thread() {
        let (tx, rx) = crossbeam_channel::bounded::<()>(0);
        let handle = thread::spawn(move || {
            let _ = rx.recv();
        });
        assert!(!join_with_timeout(handle, Duration::from_millis(20)));
        drop(tx);
    }

    #[test]
    fn test_join_reports_panic() {
        let handle = thread::spawn(|| panic!("worker blew up"));
        assert!(!join_with_timeout(handle, JOIN_TIMEOUT));
    }
}
