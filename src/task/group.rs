//! Group of concurrent units whose panics are contained and re-raised to the
//! waiter.
//!
//! Each unit passed to [`TaskGroup::run`] runs on its own thread inside
//! `catch_unwind`. A panicking unit does not take the process down; its
//! payload is recorded in a sticky failure cell. [`TaskGroup::wait`] first
//! drains every unit, then reports the first recorded failure together with
//! the number of failed units.
//!
//! ```
//! use lockstep::task::TaskGroup;
//!
//! let group = TaskGroup::new();
//! group.run(|| {}).unwrap();
//! group.run(|| panic!("oopsie")).unwrap();
//!
//! let failure = group.wait().unwrap_err();
//! assert_eq!(failure.payload().message(), "oopsie");
//! assert_eq!(failure.failed(), 1);
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use thiserror::Error;

use crate::config::ThreadConfig;
use crate::error::Result;
use crate::sync::WaitGroup;
use crate::tracing_compat::{debug, trace};
use crate::types::PanicPayload;

/// Failure re-raised by [`TaskGroup::wait`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{failed} supervised unit(s) failed, first with {payload}")]
pub struct SupervisedFailure {
    payload: PanicPayload,
    failed: usize,
}

impl SupervisedFailure {
    /// Creates a failure from the first payload and the failed-unit count.
    #[must_use]
    pub fn new(payload: PanicPayload, failed: usize) -> Self {
        Self { payload, failed }
    }

    /// Payload of the first unit that failed.
    #[must_use]
    pub fn payload(&self) -> &PanicPayload {
        &self.payload
    }

    /// Number of units that failed before the wait returned.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed
    }
}

#[derive(Debug, Default)]
struct FailureCell {
    first: Option<PanicPayload>,
    failed: usize,
}

#[derive(Debug, Default)]
struct GroupInner {
    pending: WaitGroup,
    failure: Mutex<FailureCell>,
}

impl GroupInner {
    fn record(&self, payload: PanicPayload) {
        let mut cell = self.failure.lock();
        cell.failed += 1;
        debug!(failed = cell.failed, message = payload.message(), "task unit failed");
        cell.first.get_or_insert(payload);
    }
}

/// Runs units of work concurrently and surfaces their panics to the waiter.
#[derive(Debug, Default)]
pub struct TaskGroup {
    inner: Arc<GroupInner>,
    threads: ThreadConfig,
}

impl TaskGroup {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty group whose unit threads are named from `threads`.
    #[must_use]
    pub fn with_thread_config(threads: ThreadConfig) -> Self {
        Self {
            inner: Arc::default(),
            threads,
        }
    }

    /// Schedules `work` as an independent unit.
    ///
    /// A panic inside `work` is caught at the unit boundary and recorded.
    /// Fails only if the unit's thread cannot be spawned, in which case the
    /// unit is not counted.
    pub fn run<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.pending.add(1);
        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name(self.threads.thread_name("task"))
            .spawn(move || {
                // Dropped last, so a failure is recorded before `wait` returns.
                let _unit = inner.pending.guard();
                if let Err(payload) = catch_unwind(AssertUnwindSafe(work)) {
                    inner.record(PanicPayload::from_unwind(payload.as_ref()));
                }
            });
        if let Err(err) = spawned {
            drop(self.inner.pending.guard());
            return Err(err.into());
        }
        trace!(in_flight = self.inner.pending.pending(), "task unit scheduled");
        Ok(())
    }

    /// Blocks until every scheduled unit has finished.
    ///
    /// Returns the recorded failure, if any unit panicked. The failure is
    /// sticky: later waits on the same group report it again.
    pub fn wait(&self) -> std::result::Result<(), SupervisedFailure> {
        self.inner.pending.wait();
        let cell = self.inner.failure.lock();
        match &cell.first {
            Some(payload) => Err(SupervisedFailure::new(payload.clone(), cell.failed)),
            None => Ok(()),
        }
    }

    /// Number of units that have not finished yet.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.pending.pending()
    }

    /// Returns true once any unit has panicked.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.inner.failure.lock().failed > 0
    }
}
