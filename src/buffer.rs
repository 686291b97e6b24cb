//! Bounded FIFO buffers for handing off job outcomes.
//!
//! An [`OutcomeBuffer`] is the delivery surface between in-flight job
//! executions and the embedding application. Publishing never blocks:
//! when the buffer is full the new entry is dropped and a counter is
//! incremented, so a slow or unconsumed buffer can never stall job
//! executions.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Default capacity for queue- and scheduler-level buffers.
pub const DEFAULT_BUFFER_CAPACITY: usize = 10;

/// A bounded FIFO buffer with a non-blocking, drop-on-full publish.
#[derive(Debug)]
pub struct OutcomeBuffer<T> {
    entries: Mutex<VecDeque<T>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl<T> OutcomeBuffer<T> {
    /// Create a buffer holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Publish an entry without blocking.
    ///
    /// Returns `false` when the buffer is full; the entry is dropped
    /// and the drop counter incremented.
    pub fn publish(&self, entry: T) -> bool {
        let mut entries = self.entries.lock().expect("buffer lock poisoned");
        if entries.len() >= self.capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        entries.push_back(entry);
        true
    }

    /// Remove and return the oldest entry, if any.
    pub fn pop(&self) -> Option<T> {
        self.entries
            .lock()
            .expect("buffer lock poisoned")
            .pop_front()
    }

    /// Remove and return all queued entries, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.entries
            .lock()
            .expect("buffer lock poisoned")
            .drain(..)
            .collect()
    }

    /// Number of entries currently queued.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("buffer lock poisoned").len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The fixed capacity of this buffer.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries dropped because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Build a buffer of `capacity` holding as many of `from`'s entries as
/// fit, oldest first. Excess entries are dropped.
pub(crate) fn migrate<T>(from: &OutcomeBuffer<T>, capacity: usize) -> Arc<OutcomeBuffer<T>> {
    let fresh = Arc::new(OutcomeBuffer::new(capacity));
    for entry in from.drain() {
        fresh.publish(entry);
    }
    fresh
}
