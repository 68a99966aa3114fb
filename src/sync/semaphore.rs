//! Counting semaphore with blocking and non-blocking acquisition.
//!
//! A semaphore admits at most `max_permits` holders at once. Permits can be
//! handled manually ([`Semaphore::acquire`] / [`Semaphore::release`]) or as
//! RAII guards ([`Semaphore::acquire_permit`]) that release on drop.
//!
//! # Wake order
//!
//! Wakeups are unfair: a released permit goes to whichever thread takes the
//! lock first, which may be a fresh `try_acquire` rather than a parked
//! `acquire`. No permit is ever granted twice because the count only moves
//! under the state lock.
//!
//! # Over-release
//!
//! `release` is not guarded against exceeding the capacity. Pairing
//! `acquire` with `release` is the caller's precondition; an unmatched
//! release grows the available count past `max_permits` and is reported with
//! a `warn!` event.
//!
//! # Example
//!
//! ```
//! use lockstep::sync::Semaphore;
//!
//! let sem = Semaphore::new(2);
//! let permit = sem.acquire_permit();
//! assert_eq!(sem.available_permits(), 1);
//! drop(permit);
//! assert_eq!(sem.available_permits(), 2);
//! ```

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::config::{ConfigError, SemaphoreConfig};
use crate::tracing_compat::{trace, warn};

/// A counting semaphore for limiting concurrent access.
#[derive(Debug)]
pub struct Semaphore {
    /// Internal state for permits and waiters.
    state: Mutex<SemaphoreState>,
    /// Signalled once per released permit.
    available: Condvar,
    /// Maximum permits (initial count).
    max_permits: usize,
}

#[derive(Debug)]
struct SemaphoreState {
    /// Number of available permits.
    permits: usize,
    /// Number of threads parked in `acquire`.
    waiters: usize,
}

impl Semaphore {
    /// Creates a new semaphore with the given number of permits.
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self {
            state: Mutex::new(SemaphoreState {
                permits,
                waiters: 0,
            }),
            available: Condvar::new(),
            max_permits: permits,
        }
    }

    /// Creates a semaphore sized from configuration.
    ///
    /// Unlike [`new`](Self::new), a section with zero permits is rejected.
    pub fn from_config(config: &SemaphoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config.permits))
    }

    /// Returns the number of currently available permits.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.state.lock().permits
    }

    /// Returns the maximum number of permits (initial count).
    #[must_use]
    pub fn max_permits(&self) -> usize {
        self.max_permits
    }

    /// Returns the number of threads currently blocked in `acquire`.
    #[must_use]
    pub fn waiters(&self) -> usize {
        self.state.lock().waiters
    }

    /// Takes a permit, blocking until one is available.
    pub fn acquire(&self) {
        let mut state = self.state.lock();
        if state.permits == 0 {
            state.waiters += 1;
            trace!(waiters = state.waiters, "semaphore::acquire parking");
            while state.permits == 0 {
                self.available.wait(&mut state);
            }
            state.waiters -= 1;
        }
        state.permits -= 1;
    }

    /// Takes a permit if one is immediately available.
    ///
    /// Never blocks. Returns `false` when every permit is held.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        if state.permits > 0 {
            state.permits -= 1;
            true
        } else {
            false
        }
    }

    /// Returns a permit, waking one blocked acquirer if there is one.
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.permits += 1;
        if state.permits > self.max_permits {
            warn!(
                permits = state.permits,
                max_permits = self.max_permits,
                "semaphore released more permits than it was created with"
            );
        }
        if state.waiters > 0 {
            self.available.notify_one();
        }
    }

    /// Acquires a permit that is released when the guard drops.
    pub fn acquire_permit(&self) -> SemaphorePermit<'_> {
        self.acquire();
        SemaphorePermit { semaphore: self }
    }

    /// Non-blocking variant of [`acquire_permit`](Self::acquire_permit).
    pub fn try_acquire_permit(&self) -> Option<SemaphorePermit<'_>> {
        self.try_acquire()
            .then(|| SemaphorePermit { semaphore: self })
    }
}

/// A permit borrowed from a semaphore.
#[derive(Debug)]
#[must_use = "permit will be immediately released if not held"]
pub struct SemaphorePermit<'a> {
    semaphore: &'a Semaphore,
}

impl SemaphorePermit<'_> {
    /// Forgets the permit without releasing it back to the semaphore.
    pub fn forget(self) {
        std::mem::forget(self);
    }
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

/// A permit that keeps its semaphore alive, for moving into threads.
#[derive(Debug)]
#[must_use = "permit will be immediately released if not held"]
pub struct OwnedSemaphorePermit {
    semaphore: Arc<Semaphore>,
}

impl OwnedSemaphorePermit {
    /// Acquires an owned permit, blocking until one is available.
    pub fn acquire(semaphore: Arc<Semaphore>) -> Self {
        semaphore.acquire();
        Self { semaphore }
    }

    /// Tries to acquire an owned permit without waiting.
    pub fn try_acquire(semaphore: Arc<Semaphore>) -> Option<Self> {
        semaphore.try_acquire().then(|| Self { semaphore })
    }
}

impl Drop for OwnedSemaphorePermit {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}
