//! Time-based primitives.
//!
//! - [`delay`]: run an action after a duration unless cancelled first
//! - [`racy_delay`]: the flag-based form, kept to show why it is unsound

pub mod delay;

pub use delay::{
    DelayCanceller, DelayHandle, DelayOutcome, RacyDelayHandle, delay, delay_with_config,
    racy_delay,
};
