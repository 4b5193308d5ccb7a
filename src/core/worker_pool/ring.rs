//! Fixed-capacity circular buffer of idle workers.
//!
//! One slot is always left empty so `head == tail` means empty and
//! `tail + 1 == head` means full. Consumers only advance `head`, producers only
//! advance `tail`.

/// Bounded FIFO ring with `capacity + 1` slots.
#[derive(Debug)]
pub struct IdleRing<T> {
    slots: Vec<Option<T>>,
    head: usize,
    tail: usize,
}

impl<T> IdleRing<T> {
    /// Ring able to hold `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity + 1);
        slots.resize_with(capacity + 1, || None);
        Self {
            slots,
            head: 0,
            tail: 0,
        }
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len() - 1
    }

    /// Number of entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        let n = self.slots.len();
        (n + self.tail - self.head) % n
    }

    /// Whether the ring holds no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Whether the ring is at capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.next(self.tail) == self.head
    }

    /// Append at the tail. Hands the value back if the ring is full.
    ///
    /// # Errors
    ///
    /// Returns `Err(value)` when no slot is free.
    pub fn push(&mut self, value: T) -> Result<(), T> {
        if self.is_full() {
            return Err(value);
        }
        self.slots[self.tail] = Some(value);
        self.tail = self.next(self.tail);
        Ok(())
    }

    /// Remove the oldest entry from the head.
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let value = self.slots[self.head].take();
        self.head = self.next(self.head);
        value
    }

    /// Remove every entry, oldest first.
    pub fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len());
        while let Some(value) = self.pop() {
            out.push(value);
        }
        out
    }

    fn next(&self, index: usize) -> usize {
        // `slots` is never empty, see `with_capacity`.
        (index + 1) % self.slots.len()
    }
}
