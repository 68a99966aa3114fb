//! Combinators that wrap a user action with an admission policy.
//!
//! - [`throttle`]: fixed-window rate limiting with terminal cancellation

pub mod throttle;

pub use throttle::{DEFAULT_WINDOW, Throttle, ThrottleError, ThrottleMetrics};
