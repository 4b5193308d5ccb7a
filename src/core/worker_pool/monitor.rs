//! Periodic idle-shrink loop.
//!
//! Runs on its own thread, never on a worker leased from the pool it watches.

use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

use crate::core::error::PoolError;
use crate::core::task::panic_error;
use crate::util::join::{join_with_timeout, JOIN_TIMEOUT};

use super::{PoolShared, WorkerPool};

/// Stop flag plus the condvar the monitor sleeps on.
type Signal = Arc<(Mutex<bool>, Condvar)>;

/// Handle to the idle-shrink thread.
#[derive(Debug)]
pub(crate) struct PoolMonitor {
    signal: Signal,
    handle: Option<JoinHandle<()>>,
}

impl PoolMonitor {
    /// Start the monitor for `pool`, calling `shrink_idle` every `period`.
    pub(crate) fn spawn(pool: Weak<PoolShared>, period: Duration, name: &str) -> io::Result<Self> {
        let signal: Signal = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_signal = Arc::clone(&signal);
        let handle = thread::Builder::new()
            .name(format!("{name}-monitor"))
            .spawn(move || monitor_loop(&pool, &thread_signal, period))?;
        Ok(Self {
            signal,
            handle: Some(handle),
        })
    }

    /// Wake the monitor and tell it to exit.
    pub(crate) fn signal_stop(&self) {
        let (lock, cvar) = &*self.signal;
        *lock.lock() = true;
        cvar.notify_all();
    }

    /// Stop the monitor and wait for it.
    pub(crate) fn stop(mut self) {
        self.signal_stop();
        if let Some(handle) = self.handle.take() {
            join_with_timeout(handle, JOIN_TIMEOUT);
        }
    }
}

fn monitor_loop(weak: &Weak<PoolShared>, signal: &Signal, period: Duration) {
    let (lock, cvar) = &**signal;
    loop {
        {
            let deadline = Instant::now().checked_add(period);
            let mut stopped = lock.lock();
            while !*stopped {
                match deadline {
                    Some(deadline) => {
                        if cvar.wait_until(&mut stopped, deadline).timed_out() {
                            break;
                        }
                    }
                    None => cvar.wait(&mut stopped),
                }
            }
            if *stopped {
                break;
            }
        }

        let Some(shared) = weak.upgrade() else {
            break;
        };
        let pool = WorkerPool::from_shared(shared);
        match catch_unwind(AssertUnwindSafe(|| pool.shrink_idle())) {
            Ok(Ok(0)) => {}
            Ok(Ok(evicted)) => debug!(pool = %pool.name(), evicted, "Idle workers evicted"),
            Ok(Err(PoolError::PoolStopped)) => break,
            Ok(Err(e)) => warn!(pool = %pool.name(), error = %e, "Idle shrink failed"),
            Err(payload) => {
                let e = panic_error(&*payload);
                error!(pool = %pool.name(), error = %e, "Idle shrink panicked");
            }
        }
    }
    debug!("Pool monitor exiting");
}
