//! Single-slot rendezvous channel.
//!
//! A [`Channel`] holds at most one value. `send` fills the slot and wakes a
//! receiver; a second `send` blocks until the slot has been claimed.
//! `receive` blocks until a value is present. Closing wakes every blocked
//! party: sends fail immediately, receives fail once the slot is empty.

use super::DebugError;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

struct Slot<T> {
    value: Option<T>,
    closed: bool,
}

struct Inner<T> {
    slot: Mutex<Slot<T>>,
    /// Signalled when a value is stored or the channel closes.
    readable: Condvar,
    /// Signalled when the slot is emptied or the channel closes.
    writable: Condvar,
}

/// A typed single-slot blocking handoff.
///
/// Cloning yields another handle to the same slot.
pub struct Channel<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.inner.slot.lock();
        f.debug_struct("Channel")
            .field("full", &slot.value.is_some())
            .field("closed", &slot.closed)
            .finish()
    }
}

impl<T> Channel<T> {
    /// Create an open, empty channel.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot {
                    value: None,
                    closed: false,
                }),
                readable: Condvar::new(),
                writable: Condvar::new(),
            }),
        }
    }

    /// Store `value`, blocking while the slot is occupied.
    pub fn send(&self, value: T) -> Result<(), DebugError> {
        self.send_with(value, None)
    }

    /// Like [`send`](Self::send) but gives up after `timeout`.
    pub fn send_timeout(&self, value: T, timeout: Duration) -> Result<(), DebugError> {
        self.send_with(value, Some(timeout))
    }

    /// Send with an optional bound on the wait for a free slot.
    pub fn send_with(&self, value: T, timeout: Option<Duration>) -> Result<(), DebugError> {
        let deadline = timeout.map(|d| Instant::now() + d);
        let mut slot = self.inner.slot.lock();
        loop {
            if slot.closed {
                return Err(DebugError::ChannelClosed);
            }
            if slot.value.is_none() {
                slot.value = Some(value);
                self.inner.readable.notify_one();
                return Ok(());
            }
            trace!("channel full, sender waiting");
            match (deadline, timeout) {
                (Some(deadline), Some(timeout)) => {
                    if self
                        .inner
                        .writable
                        .wait_until(&mut slot, deadline)
                        .timed_out()
                        && slot.value.is_some()
                        && !slot.closed
                    {
                        return Err(DebugError::Timeout(timeout));
                    }
                }
                _ => self.inner.writable.wait(&mut slot),
            }
        }
    }

    /// Take the pending value, blocking until one arrives.
    pub fn receive(&self) -> Result<T, DebugError> {
        self.receive_with(None)
    }

    /// Like [`receive`](Self::receive) but gives up after `timeout`.
    pub fn receive_timeout(&self, timeout: Duration) -> Result<T, DebugError> {
        self.receive_with(Some(timeout))
    }

    /// Receive with an optional bound on the wait.
    pub fn receive_with(&self, timeout: Option<Duration>) -> Result<T, DebugError> {
        let deadline = timeout.map(|d| Instant::now() + d);
        let mut slot = self.inner.slot.lock();
        loop {
            if let Some(value) = slot.value.take() {
                self.inner.writable.notify_one();
                return Ok(value);
            }
            if slot.closed {
                return Err(DebugError::ChannelClosed);
            }
            trace!("channel empty, receiver waiting");
            match (deadline, timeout) {
                (Some(deadline), Some(timeout)) => {
                    if self
                        .inner
                        .readable
                        .wait_until(&mut slot, deadline)
                        .timed_out()
                        && slot.value.is_none()
                        && !slot.closed
                    {
                        return Err(DebugError::Timeout(timeout));
                    }
                }
                _ => self.inner.readable.wait(&mut slot),
            }
        }
    }

    /// Take the pending value without blocking.
    ///
    /// Returns `Ok(None)` when the channel is open and empty.
    pub fn try_receive(&self) -> Result<Option<T>, DebugError> {
        let mut slot = self.inner.slot.lock();
        match slot.value.take() {
            Some(value) => {
                self.inner.writable.notify_one();
                Ok(Some(value))
            }
            None if slot.closed => Err(DebugError::ChannelClosed),
            None => Ok(None),
        }
    }

    /// Close the channel and wake every blocked party.
    ///
    /// A value already in the slot stays deliverable.
    pub fn close(&self) {
        let mut slot = self.inner.slot.lock();
        slot.closed = true;
        self.inner.readable.notify_all();
        self.inner.writable.notify_all();
    }

    /// Close the channel and take whatever value was pending.
    pub fn close_and_drain(&self) -> Option<T> {
        let mut slot = self.inner.slot.lock();
        slot.closed = true;
        let pending = slot.value.take();
        self.inner.readable.notify_all();
        self.inner.writable.notify_all();
        pending
    }

    /// Whether the channel has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.slot.lock().closed
    }

    /// Whether the slot is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.slot.lock().value.is_none()
    }

    /// Whether two handles refer to the same slot.
    pub fn same_channel(&self, other: &Channel<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
