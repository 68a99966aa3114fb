//! Restartable background loop.
//!
//! A [`Worker`] calls its function over and over on a background thread until
//! the function returns an error, panics, or [`Worker::stop`] is called.
//!
//! ```text
//!            start             fn error / panic / stop
//!   Idle ───────────► Running ─────────────────────────► Stopped
//!                        ▲                                   │
//!                        └───────────── start ───────────────┘
//! ```
//!
//! Stopping is cooperative: an iteration already executing runs to
//! completion, but no new iteration begins once the worker has left
//! `Running`. Each start opens a new run; a loop thread belonging to an older
//! run exits at its next iteration boundary, and the function is never called
//! by two loops at once.
//!
//! [`Worker::wait`] returns immediately when the worker is not running, so it
//! is safe before the first start and after a stop. Any number of threads may
//! wait concurrently.

use std::fmt::{self, Display};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use parking_lot::{Condvar, Mutex};

use crate::config::ThreadConfig;
use crate::error::Result;
use crate::tracing_compat::{debug, trace};
use crate::types::PanicPayload;

/// Lifecycle phase of a [`Worker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    /// Never started.
    Idle,
    /// The loop is invoking the function.
    Running,
    /// The loop has ended; see [`Worker::stop_reason`].
    Stopped,
}

/// Why the most recent run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// [`Worker::stop`] was called.
    Stopped,
    /// The function returned an error, rendered with `Display`.
    Failed(String),
    /// The function panicked.
    Panicked(PanicPayload),
}

impl Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("stopped"),
            Self::Failed(message) => write!(f, "failed: {message}"),
            Self::Panicked(payload) => write!(f, "{payload}"),
        }
    }
}

#[derive(Debug)]
struct Control {
    state: WorkerState,
    run: u64,
    reason: Option<StopReason>,
}

struct Shared<F> {
    control: Mutex<Control>,
    changed: Condvar,
    work: Mutex<F>,
    iterations: AtomicU64,
}

impl<F> Shared<F> {
    /// Moves `run` to `Stopped` if it is still the current, running one.
    fn finish(&self, run: u64, reason: StopReason) -> bool {
        let mut control = self.control.lock();
        if control.state != WorkerState::Running || control.run != run {
            return false;
        }
        debug!(run, reason = %reason, "worker stopped");
        control.state = WorkerState::Stopped;
        control.reason = Some(reason);
        self.changed.notify_all();
        true
    }

    fn is_current(&self, run: u64) -> bool {
        let control = self.control.lock();
        control.state == WorkerState::Running && control.run == run
    }
}

impl<F, E> Shared<F>
where
    F: FnMut() -> std::result::Result<(), E>,
    E: Display,
{
    fn run_loop(&self, run: u64) {
        loop {
            let outcome = {
                let mut work = self.work.lock();
                // Checked with the function locked so a stale loop can never
                // call it after a newer run has started.
                if !self.is_current(run) {
                    trace!(run, "worker loop exiting");
                    return;
                }
                catch_unwind(AssertUnwindSafe(|| (*work)()))
            };
            self.iterations.fetch_add(1, Ordering::Relaxed);
            let reason = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => StopReason::Failed(err.to_string()),
                Err(payload) => StopReason::Panicked(PanicPayload::from_unwind(payload.as_ref())),
            };
            self.finish(run, reason);
            return;
        }
    }
}

/// Runs a function repeatedly on a background thread.
pub struct Worker<F> {
    shared: Arc<Shared<F>>,
    threads: ThreadConfig,
}

impl<F, E> Worker<F>
where
    F: FnMut() -> std::result::Result<(), E> + Send + 'static,
    E: Display,
{
    /// Creates an idle worker around `work`.
    pub fn new(work: F) -> Self {
        Self::with_thread_config(work, ThreadConfig::default())
    }

    /// Creates an idle worker whose loop threads are named from `threads`.
    pub fn with_thread_config(work: F, threads: ThreadConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                control: Mutex::new(Control {
                    state: WorkerState::Idle,
                    run: 0,
                    reason: None,
                }),
                changed: Condvar::new(),
                work: Mutex::new(work),
                iterations: AtomicU64::new(0),
            }),
            threads,
        }
    }

    /// Starts the loop unless it is already running.
    ///
    /// Returns `Ok(true)` if a new run began and `Ok(false)` if the worker
    /// was already running. A stopped worker can be started again.
    pub fn start(&self) -> Result<bool> {
        let (run, previous) = {
            let mut control = self.shared.control.lock();
            if control.state == WorkerState::Running {
                return Ok(false);
            }
            let previous = control.state;
            control.run += 1;
            control.state = WorkerState::Running;
            control.reason = None;
            (control.run, previous)
        };

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(self.threads.thread_name("worker"))
            .spawn(move || shared.run_loop(run));
        if let Err(err) = spawned {
            let mut control = self.shared.control.lock();
            if control.run == run {
                control.state = previous;
            }
            return Err(err.into());
        }
        debug!(run, "worker started");
        Ok(true)
    }
}

impl<F> Worker<F> {
    /// Stops the loop if it is running.
    ///
    /// Returns `true` if this call stopped it. An iteration in progress is
    /// allowed to finish.
    pub fn stop(&self) -> bool {
        let run = self.shared.control.lock().run;
        self.shared.finish(run, StopReason::Stopped)
    }

    /// Blocks until the current run ends.
    ///
    /// Returns immediately when the worker is idle or stopped.
    pub fn wait(&self) {
        let mut control = self.shared.control.lock();
        let run = control.run;
        while control.state == WorkerState::Running && control.run == run {
            self.shared.changed.wait(&mut control);
        }
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.shared.control.lock().state
    }

    /// Why the last run ended, or `None` if it has not ended.
    #[must_use]
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.shared.control.lock().reason.clone()
    }

    /// Total completed invocations of the function across all runs.
    #[must_use]
    pub fn iterations(&self) -> u64 {
        self.shared.iterations.load(Ordering::Relaxed)
    }
}

impl<F> fmt::Debug for Worker<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let control = self.shared.control.lock();
        f.debug_struct("Worker")
            .field("state", &control.state)
            .field("run", &control.run)
            .field("reason", &control.reason)
            .finish_non_exhaustive()
    }
}

impl<F> Drop for Worker<F> {
    fn drop(&mut self) {
        self.stop();
    }
}
