//! One-shot broadcast signal.
//!
//! A [`Gate`] starts open-for-waiting and is closed exactly once. Closing
//! wakes every current waiter, and every later waiter returns immediately.
//! This is the signaling primitive behind throttle cancellation and delay
//! cancellation: a timer thread waits on the gate with a deadline and learns
//! which of the two happened first.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A closable, multi-waiter, one-shot signal.
#[derive(Debug, Default)]
pub struct Gate {
    closed: Mutex<bool>,
    cvar: Condvar,
}

impl Gate {
    /// Creates a gate that has not been closed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Closes the gate and wakes all waiters.
    ///
    /// Returns `true` for the call that actually closed it; later calls are
    /// no-ops that return `false`.
    pub fn close(&self) -> bool {
        let mut closed = self.closed.lock();
        if *closed {
            return false;
        }
        *closed = true;
        self.cvar.notify_all();
        true
    }

    /// Returns true once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    /// Blocks until the gate is closed.
    pub fn wait(&self) {
        let mut closed = self.closed.lock();
        while !*closed {
            self.cvar.wait(&mut closed);
        }
    }

    /// Blocks until the gate is closed or `timeout` elapses.
    ///
    /// Returns `true` if the gate was closed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_deadline(deadline),
            None => {
                self.wait();
                true
            }
        }
    }

    /// Blocks until the gate is closed or `deadline` passes.
    ///
    /// Returns `true` if the gate was closed. Spurious wakeups are absorbed.
    pub fn wait_deadline(&self, deadline: Instant) -> bool {
        let mut closed = self.closed.lock();
        while !*closed {
            if self.cvar.wait_until(&mut closed, deadline).timed_out() {
                return *closed;
            }
        }
        true
    }
}
