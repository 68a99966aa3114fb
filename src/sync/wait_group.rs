//! Counter of outstanding units with a blocking wait-for-zero.

use parking_lot::{Condvar, Mutex};

/// Tracks in-flight units; [`wait`](Self::wait) blocks until the count is zero.
#[derive(Debug, Default)]
pub struct WaitGroup {
    pending: Mutex<usize>,
    cvar: Condvar,
}

impl WaitGroup {
    /// Creates a group with no pending units.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `n` more pending units.
    pub fn add(&self, n: usize) {
        *self.pending.lock() += n;
    }

    /// Marks one unit as finished, waking waiters when the count hits zero.
    ///
    /// # Panics
    ///
    /// Panics if called more times than units were added.
    pub fn done(&self) {
        let mut pending = self.pending.lock();
        assert!(*pending > 0, "WaitGroup::done called with no pending units");
        *pending -= 1;
        if *pending == 0 {
            self.cvar.notify_all();
        }
    }

    /// Registers one unit and returns a guard that finishes it on drop.
    ///
    /// The guard runs `done` during unwinding too, so a panicking unit can
    /// never leave the group stuck.
    #[must_use = "the unit finishes as soon as the guard is dropped"]
    pub fn enter(&self) -> WaitGroupGuard<'_> {
        self.add(1);
        self.guard()
    }

    /// Returns a guard that finishes one unit already registered with
    /// [`add`](Self::add).
    ///
    /// Useful when the unit is counted on one thread and finished on another
    /// that cannot borrow the group until it starts.
    #[must_use = "the unit finishes as soon as the guard is dropped"]
    pub fn guard(&self) -> WaitGroupGuard<'_> {
        WaitGroupGuard { group: self }
    }

    /// Number of units still pending.
    #[must_use]
    pub fn pending(&self) -> usize {
        *self.pending.lock()
    }

    /// Blocks until every registered unit has finished.
    pub fn wait(&self) {
        let mut pending = self.pending.lock();
        while *pending > 0 {
            self.cvar.wait(&mut pending);
        }
    }
}

/// Finishes one [`WaitGroup`] unit when dropped.
#[derive(Debug)]
pub struct WaitGroupGuard<'a> {
    group: &'a WaitGroup,
}

impl Drop for WaitGroupGuard<'_> {
    fn drop(&mut self) {
        self.group.done();
    }
}
