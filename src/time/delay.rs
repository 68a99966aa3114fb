//! Deferred actions that can be cancelled before they fire.
//!
//! Two forms are provided:
//!
//! - [`delay`] waits on a [`Gate`] with a deadline. Whichever of the deadline
//!   and [`DelayHandle::cancel`] happens first decides the outcome, and the
//!   decision is a single compare-exchange, so the action runs at most once
//!   and never after a successful cancel. Cancelling also wakes the timer
//!   thread so it exits at once.
//! - [`racy_delay`] communicates cancellation through a relaxed flag that the
//!   timer reads after sleeping. The read and the action are not atomic with
//!   respect to `cancel`, so a cancel that lands between them does not stop
//!   the action, and the timer keeps sleeping until its deadline even after
//!   cancel. It is kept as a counter-example and should not be used to guard
//!   real work.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::ThreadConfig;
use crate::error::Result;
use crate::sync::Gate;
use crate::tracing_compat::{debug, trace};
use crate::types::PanicPayload;

const PENDING: u8 = 0;
const FIRING: u8 = 1;
const FIRED: u8 = 2;
const CANCELLED: u8 = 3;
const PANICKED: u8 = 4;

/// How a delayed action ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelayOutcome {
    /// The action ran to completion.
    Fired,
    /// Cancellation won; the action never ran.
    Cancelled,
    /// The action ran and panicked.
    Panicked(PanicPayload),
}

#[derive(Debug)]
struct Timer {
    cancelled: Gate,
    state: AtomicU8,
    panic: Mutex<Option<PanicPayload>>,
}

impl Timer {
    fn cancel(&self) -> bool {
        self.cancelled.close();
        let won = self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            debug!("delay cancelled before firing");
        }
        won
    }

    fn outcome(&self) -> Option<DelayOutcome> {
        match self.state.load(Ordering::Acquire) {
            FIRED => Some(DelayOutcome::Fired),
            CANCELLED => Some(DelayOutcome::Cancelled),
            PANICKED => Some(DelayOutcome::Panicked(
                self.panic
                    .lock()
                    .clone()
                    .unwrap_or_else(|| PanicPayload::new("unknown panic")),
            )),
            _ => None,
        }
    }
}

/// Handle to a pending [`delay`].
///
/// Dropping the handle detaches the timer; the action still fires.
#[derive(Debug)]
pub struct DelayHandle {
    timer: Arc<Timer>,
    thread: JoinHandle<()>,
}

impl DelayHandle {
    /// Prevents the action from running if it has not started.
    ///
    /// Returns `true` if this call suppressed the action. Calling it again,
    /// or after the action has started, returns `false` and has no effect.
    pub fn cancel(&self) -> bool {
        self.timer.cancel()
    }

    /// Returns a cloneable cancel function for use from other threads.
    #[must_use]
    pub fn canceller(&self) -> DelayCanceller {
        DelayCanceller {
            timer: Arc::clone(&self.timer),
        }
    }

    /// Outcome, or `None` while the timer is pending or the action runs.
    #[must_use]
    pub fn outcome(&self) -> Option<DelayOutcome> {
        self.timer.outcome()
    }

    /// Blocks until the timer thread exits and returns the outcome.
    pub fn join(self) -> DelayOutcome {
        // The timer thread catches the action's panic itself.
        let _ = self.thread.join();
        self.timer.outcome().unwrap_or(DelayOutcome::Cancelled)
    }
}

/// Cancel function detached from a [`DelayHandle`].
#[derive(Debug, Clone)]
pub struct DelayCanceller {
    timer: Arc<Timer>,
}

impl DelayCanceller {
    /// Same as [`DelayHandle::cancel`].
    pub fn cancel(&self) -> bool {
        self.timer.cancel()
    }
}

/// Runs `action` after `after` unless cancelled first.
pub fn delay<F>(after: Duration, action: F) -> Result<DelayHandle>
where
    F: FnOnce() + Send + 'static,
{
    delay_with_config(after, &ThreadConfig::default(), action)
}

/// [`delay`] with the timer thread named from `threads`.
pub fn delay_with_config<F>(
    after: Duration,
    threads: &ThreadConfig,
    action: F,
) -> Result<DelayHandle>
where
    F: FnOnce() + Send + 'static,
{
    let timer = Arc::new(Timer {
        cancelled: Gate::new(),
        state: AtomicU8::new(PENDING),
        panic: Mutex::new(None),
    });
    let thread = {
        let timer = Arc::clone(&timer);
        thread::Builder::new()
            .name(threads.thread_name("delay"))
            .spawn(move || {
                if timer.cancelled.wait_timeout(after) {
                    return;
                }
                if timer
                    .state
                    .compare_exchange(PENDING, FIRING, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    return;
                }
                trace!("delay firing");
                let finished = match catch_unwind(AssertUnwindSafe(action)) {
                    Ok(()) => FIRED,
                    Err(payload) => {
                        *timer.panic.lock() = Some(PanicPayload::from_unwind(payload.as_ref()));
                        PANICKED
                    }
                };
                timer.state.store(finished, Ordering::Release);
            })?
    };
    Ok(DelayHandle { timer, thread })
}

/// Handle to a [`racy_delay`].
///
/// `cancel` only sets a flag. It does not wake the timer, and it does not
/// guarantee the action is suppressed.
#[derive(Debug)]
pub struct RacyDelayHandle {
    cancelled: Arc<AtomicBool>,
    thread: JoinHandle<DelayOutcome>,
}

impl RacyDelayHandle {
    /// Sets the cancel flag. May be called any number of times.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Blocks until the timer thread exits, which is never before the
    /// deadline, and returns what it did.
    pub fn join(self) -> DelayOutcome {
        self.thread.join().unwrap_or_else(|payload| {
            DelayOutcome::Panicked(PanicPayload::from_unwind(payload.as_ref()))
        })
    }
}

/// Flag-based delayed action. See the module docs for why it is unsound as a
/// cancellation mechanism.
pub fn racy_delay<F>(after: Duration, action: F) -> Result<RacyDelayHandle>
where
    F: FnOnce() + Send + 'static,
{
    let cancelled = Arc::new(AtomicBool::new(false));
    let thread = {
        let cancelled = Arc::clone(&cancelled);
        thread::Builder::new()
            .name(ThreadConfig::default().thread_name("racy-delay"))
            .spawn(move || {
                thread::sleep(after);
                if cancelled.load(Ordering::Relaxed) {
                    return DelayOutcome::Cancelled;
                }
                // A cancel arriving here is missed.
                match catch_unwind(AssertUnwindSafe(action)) {
                    Ok(()) => DelayOutcome::Fired,
                    Err(payload) => {
                        DelayOutcome::Panicked(PanicPayload::from_unwind(payload.as_ref()))
                    }
                }
            })?
    };
    Ok(RacyDelayHandle { cancelled, thread })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    fn counting() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let fired = Arc::new(AtomicUsize::new(0));
        let action = {
            let fired = Arc::clone(&fired);
            move || {
                fired.fetch_add(1, Ordering::SeqCst);
            }
        };
        (fired, action)
    }

    #[test]
    fn fires_after_deadline() {
        init_test("fires_after_deadline");
        let (fired, action) = counting();
        let start = Instant::now();
        let handle = delay(Duration::from_millis(20), action).expect("spawn timer");
        assert_eq!(handle.outcome(), None);
        assert_eq!(handle.join(), DelayOutcome::Fired);
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        crate::test_complete!("fires_after_deadline");
    }

    #[test]
    fn cancel_before_deadline_suppresses_and_wakes_timer() {
        init_test("cancel_before_deadline_suppresses_and_wakes_timer");
        let (fired, action) = counting();
        let start = Instant::now();
        let handle = delay(Duration::from_secs(30), action).expect("spawn timer");
        let first = handle.cancel();
        let second = handle.cancel();
        crate::assert_with_log!(first, "first cancel suppressed", true, first);
        crate::assert_with_log!(!second, "second cancel is a no-op", false, second);
        assert_eq!(handle.join(), DelayOutcome::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        crate::test_complete!("cancel_before_deadline_suppresses_and_wakes_timer");
    }

    #[test]
    fn cancel_after_fire_reports_false() {
        init_test("cancel_after_fire_reports_false");
        let (fired, action) = counting();
        let handle = delay(Duration::from_millis(1), action).expect("spawn timer");
        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.outcome().is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!handle.cancel());
        assert_eq!(handle.join(), DelayOutcome::Fired);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        crate::test_complete!("cancel_after_fire_reports_false");
    }

    #[test]
    fn panicking_action_is_reported() {
        init_test("panicking_action_is_reported");
        let handle = delay(Duration::from_millis(1), || panic!("late boom")).expect("spawn timer");
        match handle.join() {
            DelayOutcome::Panicked(payload) => assert_eq!(payload.message(), "late boom"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        crate::test_complete!("panicking_action_is_reported");
    }

    #[test]
    fn canceller_races_timer_but_action_runs_at_most_once() {
        init_test("canceller_races_timer_but_action_runs_at_most_once");
        for _ in 0..20 {
            let (fired, action) = counting();
            let handle = delay(Duration::from_millis(2), action).expect("spawn timer");
            let canceller = handle.canceller();
            let racer = thread::spawn(move || {
                thread::sleep(Duration::from_millis(2));
                canceller.cancel()
            });
            let suppressed = racer.join().expect("racer panicked");
            let outcome = handle.join();
            let count = fired.load(Ordering::SeqCst);
            if suppressed {
                assert_eq!(outcome, DelayOutcome::Cancelled);
                assert_eq!(count, 0);
            } else {
                assert_eq!(outcome, DelayOutcome::Fired);
                assert_eq!(count, 1);
            }
        }
        crate::test_complete!("canceller_races_timer_but_action_runs_at_most_once");
    }

    #[test]
    fn racy_cancel_does_not_interrupt_timer() {
        init_test("racy_cancel_does_not_interrupt_timer");
        let (fired, action) = counting();
        let start = Instant::now();
        let handle = racy_delay(Duration::from_millis(30), action).expect("spawn timer");
        handle.cancel();
        handle.cancel();
        let outcome = handle.join();
        let elapsed = start.elapsed();
        crate::assert_with_log!(
            elapsed >= Duration::from_millis(30),
            "timer slept through cancel",
            Duration::from_millis(30),
            elapsed
        );
        // Only "at most once" holds for the flag-based form.
        let count = fired.load(Ordering::SeqCst);
        assert!(count <= 1);
        assert_eq!(count == 1, outcome == DelayOutcome::Fired);
        crate::test_complete!("racy_cancel_does_not_interrupt_timer");
    }

    #[test]
    fn racy_without_cancel_fires() {
        init_test("racy_without_cancel_fires");
        let (fired, action) = counting();
        let handle = racy_delay(Duration::from_millis(5), action).expect("spawn timer");
        assert_eq!(handle.join(), DelayOutcome::Fired);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        crate::test_complete!("racy_without_cancel_fires");
    }
}
