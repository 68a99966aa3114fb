//! Barrier for N-way rendezvous, and its two-party form.
//!
//! The barrier trips when `parties` callers have arrived. Every arrival
//! happens-before every release: all parties of a generation leave
//! [`Barrier::touch`] only after the last one arrived. Exactly one caller
//! observes `is_leader = true` per generation (the one that tripped it).
//!
//! After tripping the barrier re-arms for a new generation, so a single
//! instance can be reused for successive rounds.

use parking_lot::{Condvar, Mutex};

use crate::tracing_compat::{debug, trace};

#[derive(Debug)]
struct BarrierState {
    arrived: usize,
    generation: u64,
}

/// Barrier for N-way rendezvous.
#[derive(Debug)]
pub struct Barrier {
    parties: usize,
    state: Mutex<BarrierState>,
    cvar: Condvar,
}

impl Barrier {
    /// Creates a new barrier that trips when `parties` have arrived.
    ///
    /// # Panics
    /// Panics if `parties == 0`.
    #[must_use]
    pub fn new(parties: usize) -> Self {
        assert!(parties > 0, "barrier requires at least 1 party");
        Self {
            parties,
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
            }),
            cvar: Condvar::new(),
        }
    }

    /// Returns the number of parties required to trip the barrier.
    #[must_use]
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Returns how many parties are waiting in the current generation.
    #[must_use]
    pub fn arrived(&self) -> usize {
        self.state.lock().arrived
    }

    /// Records the caller's arrival and blocks until all parties have arrived.
    pub fn touch(&self) -> BarrierWaitResult {
        let mut state = self.state.lock();
        let local_gen = state.generation;
        state.arrived += 1;
        trace!(
            arrived = state.arrived,
            parties = self.parties,
            "barrier::touch arrival"
        );

        if state.arrived == self.parties {
            // Trip the barrier and advance the generation.
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.cvar.notify_all();
            debug!(generation = local_gen, "barrier tripped");
            return BarrierWaitResult { is_leader: true };
        }

        while state.generation == local_gen {
            self.cvar.wait(&mut state);
        }
        BarrierWaitResult { is_leader: false }
    }
}

/// Result of a barrier wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWaitResult {
    is_leader: bool,
}

impl BarrierWaitResult {
    /// Returns true for exactly one party (the leader) each generation.
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.is_leader
    }
}

/// Meeting point for exactly two threads.
#[derive(Debug)]
pub struct Rendezvous {
    barrier: Barrier,
}

impl Rendezvous {
    /// Creates a new rendezvous.
    #[must_use]
    pub fn new() -> Self {
        Self {
            barrier: Barrier::new(2),
        }
    }

    /// Records arrival and blocks until the other party arrives too.
    pub fn ready(&self) -> BarrierWaitResult {
        self.barrier.touch()
    }
}

impl Default for Rendezvous {
    fn default() -> Self {
        Self::new()
    }
}
