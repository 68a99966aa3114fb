//! Lifecycles for background work.
//!
//! - [`TaskGroup`]: fan out units, contain their panics, re-raise on wait
//! - [`Worker`]: a restartable loop with cooperative stop

pub mod group;
pub mod worker;

pub use group::{SupervisedFailure, TaskGroup};
pub use worker::{StopReason, Worker, WorkerState};
