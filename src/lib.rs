//! Lockstep: blocking synchronization building blocks for threaded Rust.
//!
//! # Overview
//!
//! Lockstep is a small toolkit of coordination primitives. Each one owns its
//! own critical section; nothing in the crate serializes through a global
//! lock, and every background thread belongs to exactly one primitive
//! instance and is torn down by it.
//!
//! # Core Guarantees
//!
//! - **No lost updates**: counters and the compute map apply every mutation
//!   exactly once under their lock
//! - **Bounded concurrency**: a semaphore never admits more holders than its
//!   available permits
//! - **All-before-any**: no barrier party is released before the last arrival
//! - **Terminal cancellation**: a cancelled throttle or delay never runs its
//!   action again and leaves no timer thread behind
//! - **Contained panics**: panics in task-group units, worker iterations and
//!   delayed actions are caught at the unit boundary and reported
//!
//! # Module Structure
//!
//! - [`sync`]: counters, compute map, semaphore, barrier, rendezvous, gate,
//!   wait group
//! - [`combinator`]: the fixed-window [`Throttle`](combinator::Throttle)
//! - [`task`]: [`TaskGroup`](task::TaskGroup) and
//!   [`Worker`](task::Worker)
//! - [`time`]: cancellable [`delay`](time::delay) and its flag-based
//!   counter-example
//! - [`types`]: shared value types such as [`PanicPayload`]
//! - [`config`]: [`LockstepConfig`] and its loader
//! - [`error`](mod@error): the crate-level [`Error`]
//! - [`tracing_compat`]: optional tracing integration (requires
//!   `tracing-integration` feature)

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_inception)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]

pub mod combinator;
pub mod config;
pub mod error;
pub mod sync;
pub mod task;
pub mod time;
pub mod tracing_compat;
pub mod types;

// ── Test-only modules ───────────────────────────────────────────────────
#[cfg(any(test, feature = "test-internals"))]
pub mod test_utils;

// Re-exports for convenient access to core types
pub use combinator::{Throttle, ThrottleError, ThrottleMetrics};
pub use config::{ConfigError, ConfigLoader, LockstepConfig};
pub use error::{Error, ErrorKind, Recoverability, Result};
pub use sync::{
    Barrier, ComputeMap, Counter, Gate, RacyCounter, Rendezvous, RwCounter, Semaphore, Tally,
    WaitGroup,
};
pub use task::{StopReason, SupervisedFailure, TaskGroup, Worker, WorkerState};
pub use time::{DelayHandle, DelayOutcome, delay};
pub use types::PanicPayload;
