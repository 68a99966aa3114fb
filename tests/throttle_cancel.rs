//! Throttle quota accounting and cancellation teardown.

use lockstep::combinator::{Throttle, ThrottleError};
use lockstep::test_utils::init_test_logging;
use lockstep::{Error, ErrorKind, LockstepConfig, assert_with_log, test_complete, test_phase};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

#[test]
fn burst_gets_exactly_limit_within_one_window() {
    init_test_logging();
    test_phase!("burst_gets_exactly_limit_within_one_window");

    let calls = Arc::new(AtomicUsize::new(0));
    let throttle = {
        let calls = Arc::clone(&calls);
        Arc::new(
            Throttle::with_window(5, Duration::from_secs(30), move || {
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .expect("spawn ticker"),
        )
    };

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let throttle = Arc::clone(&throttle);
            thread::spawn(move || (0..5).map(|_| throttle.handle()).collect::<Vec<_>>())
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .flat_map(|h| h.join().expect("caller panicked"))
        .collect();

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let busy = results
        .iter()
        .filter(|r| **r == Err(ThrottleError::Busy))
        .count();
    assert_with_log!(accepted == 5, "accepted", 5usize, accepted);
    assert_with_log!(busy == 35, "busy", 35usize, busy);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    test_complete!("burst_gets_exactly_limit_within_one_window");
}

#[test]
fn cancel_leaves_no_ticker_behind() {
    init_test_logging();
    test_phase!("cancel_leaves_no_ticker_behind");

    let throttle = Throttle::with_window(1, Duration::from_millis(5), || ()).expect("spawn ticker");
    thread::sleep(Duration::from_millis(30));
    assert!(throttle.metrics().windows_elapsed > 0);
    assert!(throttle.ticker_active());

    throttle.cancel();
    assert!(!throttle.ticker_active());
    let frozen = throttle.metrics().windows_elapsed;
    thread::sleep(Duration::from_millis(30));
    let later = throttle.metrics().windows_elapsed;
    assert_with_log!(frozen == later, "no resets after cancel", frozen, later);

    for _ in 0..3 {
        assert_eq!(throttle.handle(), Err(ThrottleError::Cancelled));
    }
    assert_eq!(throttle.metrics().rejected_cancelled, 3);
    test_complete!("cancel_leaves_no_ticker_behind");
}

#[test]
fn cancel_races_with_callers() {
    init_test_logging();
    test_phase!("cancel_races_with_callers");

    let throttle = Arc::new(
        Throttle::with_window(1_000, Duration::from_millis(1), || ()).expect("spawn ticker"),
    );
    let callers: Vec<_> = (0..4)
        .map(|_| {
            let throttle = Arc::clone(&throttle);
            thread::spawn(move || {
                while throttle.handle() != Err(ThrottleError::Cancelled) {
                    thread::yield_now();
                }
            })
        })
        .collect();
    thread::sleep(Duration::from_millis(10));
    let cancellers: Vec<_> = (0..2)
        .map(|_| {
            let throttle = Arc::clone(&throttle);
            thread::spawn(move || throttle.cancel())
        })
        .collect();
    for handle in cancellers.into_iter().chain(callers) {
        handle.join().expect("thread panicked");
    }
    assert!(throttle.is_cancelled());
    assert!(!throttle.ticker_active());
    test_complete!("cancel_races_with_callers");
}

#[test]
fn config_defaults_give_five_per_second() {
    init_test_logging();
    test_phase!("config_defaults_give_five_per_second");

    let throttle = Throttle::from_config(&LockstepConfig::default(), || ()).expect("spawn ticker");
    let accepted = (0..10).filter(|_| throttle.handle().is_ok()).count();
    assert_with_log!(accepted == 5, "default limit", 5usize, accepted);

    let err: Error = throttle.handle().expect_err("busy").into();
    assert_eq!(err.kind(), ErrorKind::Busy);
    assert!(err.is_recoverable());
    drop(throttle);
    test_complete!("config_defaults_give_five_per_second");
}
