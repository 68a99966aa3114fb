//! Fixed-window rate limiter guarding a single action.
//!
//! A [`Throttle`] accepts at most `limit` calls to its action per window and
//! rejects the rest with [`ThrottleError::Busy`] without running the action.
//! A background ticker thread, owned by the throttle, resets the window
//! counter once per window.
//!
//! # Cancellation
//!
//! [`Throttle::cancel`] is terminal. It closes a [`Gate`] that the ticker
//! waits on alongside its next deadline, then joins the ticker, so no reset
//! happens after `cancel` returns. Every later [`Throttle::handle`] fails with
//! [`ThrottleError::Cancelled`], never `Busy`. Dropping the throttle cancels
//! it.
//!
//! # Example
//!
//! ```
//! use lockstep::combinator::{Throttle, ThrottleError};
//!
//! let throttle = Throttle::new(2, || "sent").unwrap();
//! assert_eq!(throttle.handle(), Ok("sent"));
//! assert_eq!(throttle.handle(), Ok("sent"));
//! assert_eq!(throttle.handle(), Err(ThrottleError::Busy));
//!
//! throttle.cancel();
//! assert_eq!(throttle.handle(), Err(ThrottleError::Cancelled));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;

use crate::config::{ConfigError, LockstepConfig, ThreadConfig};
use crate::error::Result;
use crate::sync::Gate;
use crate::tracing_compat::{debug, trace};

/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// Reasons a throttled call was not executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ThrottleError {
    /// The current window's quota is exhausted.
    #[error("busy")]
    Busy,
    /// The throttle was cancelled.
    #[error("cancelled")]
    Cancelled,
}

/// Snapshot of throttle counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThrottleMetrics {
    /// Calls that ran the action.
    pub accepted: u64,
    /// Calls rejected because the window was full.
    pub busy: u64,
    /// Calls rejected after cancellation.
    pub rejected_cancelled: u64,
    /// Window resets performed by the ticker.
    pub windows_elapsed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    busy: AtomicU64,
    rejected_cancelled: AtomicU64,
    windows_elapsed: AtomicU64,
}

/// State shared between callers and the ticker thread.
#[derive(Debug)]
struct Window {
    limit: u32,
    length: Duration,
    /// Calls accepted in the current window.
    used: Mutex<u32>,
    cancelled: Gate,
    counters: Counters,
}

impl Window {
    fn reset(&self) {
        *self.used.lock() = 0;
        self.counters.windows_elapsed.fetch_add(1, Ordering::Relaxed);
        trace!("throttle window reset");
    }

    fn run_ticker(&self) {
        let mut next = Instant::now().checked_add(self.length);
        while let Some(deadline) = next {
            if self.cancelled.wait_deadline(deadline) {
                debug!("throttle ticker exiting");
                return;
            }
            self.reset();
            let now = Instant::now();
            // Fell behind; skip missed ticks rather than resetting in a burst.
            next = deadline.checked_add(self.length).and_then(|n| {
                if n <= now {
                    now.checked_add(self.length)
                } else {
                    Some(n)
                }
            });
        }
        // The next reset lies past the end of the clock; only cancel remains.
        trace!("throttle window never elapses");
        self.cancelled.wait();
        debug!("throttle ticker exiting");
    }
}

/// Rate limiter that admits at most `limit` calls to `action` per window.
pub struct Throttle<F> {
    window: Arc<Window>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    action: F,
}

impl<F, R> Throttle<F>
where
    F: Fn() -> R,
{
    /// Creates a throttle admitting `limit` calls per second.
    pub fn new(limit: u32, action: F) -> Result<Self> {
        Self::with_window(limit, DEFAULT_WINDOW, action)
    }

    /// Creates a throttle admitting `limit` calls per `window`.
    ///
    /// Fails with a config error if `window` is zero, or with
    /// [`Error::Spawn`](crate::Error::Spawn) if the ticker cannot start.
    pub fn with_window(limit: u32, window: Duration, action: F) -> Result<Self> {
        Self::build(limit, window, &ThreadConfig::default(), action)
    }

    /// Creates a throttle from the `throttle` and `threads` sections.
    ///
    /// The configuration is validated first, so a zero limit is rejected
    /// here even though [`with_window`](Self::with_window) accepts one.
    pub fn from_config(config: &LockstepConfig, action: F) -> Result<Self> {
        config.validate()?;
        Self::build(
            config.throttle.limit,
            config.throttle.window(),
            &config.threads,
            action,
        )
    }

    fn build(limit: u32, length: Duration, threads: &ThreadConfig, action: F) -> Result<Self> {
        if length.is_zero() {
            return Err(ConfigError::Invalid {
                field: "throttle.window_ms",
                reason: "must be at least 1",
            }
            .into());
        }
        let window = Arc::new(Window {
            limit,
            length,
            used: Mutex::new(0),
            cancelled: Gate::new(),
            counters: Counters::default(),
        });
        let ticker = {
            let window = Arc::clone(&window);
            thread::Builder::new()
                .name(threads.thread_name("throttle"))
                .spawn(move || window.run_ticker())?
        };
        debug!(limit, window_ms = length.as_millis(), "throttle started");
        Ok(Self {
            window,
            ticker: Mutex::new(Some(ticker)),
            action,
        })
    }

    /// Runs the action if the current window still has quota.
    ///
    /// Never blocks on the window. Returns [`ThrottleError::Busy`] when the
    /// quota is used up and [`ThrottleError::Cancelled`] after
    /// [`cancel`](Self::cancel).
    pub fn handle(&self) -> std::result::Result<R, ThrottleError> {
        let window = &*self.window;
        if window.cancelled.is_closed() {
            window
                .counters
                .rejected_cancelled
                .fetch_add(1, Ordering::Relaxed);
            return Err(ThrottleError::Cancelled);
        }
        {
            let mut used = window.used.lock();
            if *used >= window.limit {
                drop(used);
                window.counters.busy.fetch_add(1, Ordering::Relaxed);
                trace!(limit = window.limit, "throttle busy");
                return Err(ThrottleError::Busy);
            }
            *used += 1;
        }
        window.counters.accepted.fetch_add(1, Ordering::Relaxed);
        Ok((self.action)())
    }
}

impl<F> Throttle<F> {
    /// Cancels the throttle and stops its ticker.
    ///
    /// Idempotent and safe to call while other threads are in
    /// [`handle`](Self::handle). When this returns the ticker has exited.
    pub fn cancel(&self) {
        let first = self.window.cancelled.close();
        // Held across the join so a concurrent caller returns only after
        // the ticker has exited.
        let mut ticker = self.ticker.lock();
        if let Some(handle) = ticker.take() {
            let _ = handle.join();
        }
        if !first {
            return;
        }
        debug!(
            windows = self.window.counters.windows_elapsed.load(Ordering::Relaxed),
            "throttle cancelled"
        );
    }

    /// Returns true once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.window.cancelled.is_closed()
    }

    /// Returns true while the background ticker thread is running.
    #[must_use]
    pub fn ticker_active(&self) -> bool {
        self.ticker
            .lock()
            .as_ref()
            .is_some_and(|ticker| !ticker.is_finished())
    }

    /// Per-window quota.
    #[must_use]
    pub fn limit(&self) -> u32 {
        self.window.limit
    }

    /// Window length.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window.length
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn metrics(&self) -> ThrottleMetrics {
        let counters = &self.window.counters;
        ThrottleMetrics {
            accepted: counters.accepted.load(Ordering::Relaxed),
            busy: counters.busy.load(Ordering::Relaxed),
            rejected_cancelled: counters.rejected_cancelled.load(Ordering::Relaxed),
            windows_elapsed: counters.windows_elapsed.load(Ordering::Relaxed),
        }
    }
}

impl<F> std::fmt::Debug for Throttle<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("limit", &self.window.limit)
            .field("window", &self.window.length)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<F> Drop for Throttle<F> {
    fn drop(&mut self) {
        self.cancel();
    }
}
