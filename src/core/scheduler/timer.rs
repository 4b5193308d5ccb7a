//! Due-time ordered queue served by the timer thread.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::core::error::SchedulerError;

use super::handle::ScheduledTaskHandle;

/// Heap entry: earliest `due` first, then insertion order.
struct Entry {
    due: Instant,
    seq: u64,
    handle: ScheduledTaskHandle,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for the max-heap: earlier due wins, then lower seq.
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct QueueState {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
    shutdown: bool,
}

/// Min-heap of pending handles keyed by next execution time.
pub(crate) struct TimerQueue {
    state: Mutex<QueueState>,
    wakeup: Condvar,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_seq: 0,
                shutdown: false,
            }),
            wakeup: Condvar::new(),
        }
    }

    /// Insert `handle` due at `due`. Wakes the timer thread if it becomes the head.
    pub(crate) fn push(&self, handle: ScheduledTaskHandle, due: Instant) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        if state.shutdown {
            return Err(SchedulerError::SchedulingRejected);
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        let new_head = state.heap.peek().is_none_or(|head| due < head.due);
        state.heap.push(Entry { due, seq, handle });
        if new_head {
            self.wakeup.notify_one();
        }
        Ok(())
    }

    /// Block until the head is due, then pop it.
    ///
    /// Cancelled heads are discarded. Returns `None` once the queue is shut down.
    pub(crate) fn next_due(&self) -> Option<(ScheduledTaskHandle, Instant)> {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return None;
            }
            let Some((due, cancelled)) = state
                .heap
                .peek()
                .map(|head| (head.due, head.handle.is_cancelled()))
            else {
                self.wakeup.wait(&mut state);
                continue;
            };
            if cancelled {
                state.heap.pop();
                continue;
            }
            if due <= Instant::now() {
                return state.heap.pop().map(|e| (e.handle, e.due));
            }
            let _ = self.wakeup.wait_until(&mut state, due);
        }
    }

    /// Drop cancelled entries. Returns how many were removed.
    pub(crate) fn purge(&self) -> usize {
        let mut state = self.state.lock();
        let before = state.heap.len();
        state.heap.retain(|e| !e.handle.is_cancelled());
        before - state.heap.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    /// Reject further pushes, wake the timer thread and hand back what was pending.
    pub(crate) fn shutdown(&self) -> Vec<ScheduledTaskHandle> {
        let mut state = self.state.lock();
        state.shutdown = true;
        let pending = state.heap.drain().map(|e| e.handle).collect();
        self.wakeup.notify_all();
        pending
    }
}
