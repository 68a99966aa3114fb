//! Blocking synchronization primitives.
//!
//! # Primitives
//!
//! - [`Counter`] / [`RwCounter`]: frequency counters under an exclusive or a
//!   reader/writer lock, sharing the [`Tally`] contract
//! - [`RacyCounter`]: counter whose split load/store increment loses
//!   updates; kept as a counter-example
//! - [`ComputeMap`]: key/value map with atomic `set_if_absent` and `compute`
//! - [`Semaphore`]: counting semaphore with blocking and non-blocking acquire
//! - [`Barrier`]: N-way rendezvous with leader election
//! - [`Rendezvous`]: two-party barrier
//! - [`Gate`]: one-shot broadcast signal
//! - [`WaitGroup`]: in-flight unit counter with wait-for-zero
//!
//! # Locking
//!
//! Every primitive owns its lock; none is exposed to callers. Locks are
//! `parking_lot` locks, so a panic while holding one does not poison it.
//! A panic inside a user callback that runs under a lock
//! ([`ComputeMap::compute`], [`Tally::for_each`]) unwinds through the guard
//! and releases the lock.

mod barrier;
mod compute_map;
mod counter;
mod gate;
mod racy_counter;
mod semaphore;
mod wait_group;

pub use barrier::{Barrier, BarrierWaitResult, Rendezvous};
pub use compute_map::ComputeMap;
pub use counter::{Counter, RwCounter, Tally};
pub use gate::Gate;
pub use racy_counter::RacyCounter;
pub use semaphore::{OwnedSemaphorePermit, Semaphore, SemaphorePermit};
pub use wait_group::{WaitGroup, WaitGroupGuard};
