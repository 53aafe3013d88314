//! # Single slot drop-oldest mailbox
//!
//! The producer never waits for the consumer. If a value is still pending when a new one arrives,
//! the pending value is replaced and handed back to the producer for release. The consumer always
//! gets the freshest value, possibly skipping intermediate ones.

use std::sync::{Condvar, Mutex, MutexGuard};

pub struct Mailbox<T> {
    slot: Mutex<Slot<T>>,
    cond: Condvar,
}

struct Slot<T> {
    value: Option<T>,
    closed: bool,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                value: None,
                closed: false,
            }),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<Slot<T>> {
        // The slot is always left in a consistent state, thus poisoning is harmless.
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Put a value in, and wake up the consumer.
    ///
    /// Returns the value that was still pending, if any. After the mailbox is closed the new value
    /// is handed straight back.
    pub fn put(&self, value: T) -> Option<T> {
        let mut slot = self.lock();

        if slot.closed {
            return Some(value);
        }

        let old = slot.value.replace(value);
        self.cond.notify_one();

        old
    }

    /// Take the pending value without waiting.
    pub fn try_take(&self) -> Option<T> {
        self.lock().value.take()
    }

    /// Wait until a value is pending and take it.
    ///
    /// Returns `None` once the mailbox gets closed. The lock is released before the value is
    /// returned.
    pub fn take(&self) -> Option<T> {
        let mut slot = self.lock();

        loop {
            if slot.closed {
                return None;
            }

            if let Some(value) = slot.value.take() {
                return Some(value);
            }

            slot = self.cond.wait(slot).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Close the mailbox, waking up any waiting consumer.
    ///
    /// Returns the value that was still pending, if any.
    pub fn close(&self) -> Option<T> {
        let mut slot = self.lock();
        slot.closed = true;
        self.cond.notify_all();
        slot.value.take()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
