//! Counter that locks its reads and writes separately, and loses updates.
//!
//! [`RacyCounter::increment`] reads the current count under the lock,
//! releases it, then stores `count + 1` under a second acquisition. Every
//! single access is synchronized, so there is no data race, but the
//! read-modify-write is not atomic:
//!
//! ```text
//! A: read 4        B: read 4
//! A: store 5       B: store 5     // one increment lost
//! ```
//!
//! The final count after `n` concurrent increments is anywhere between 1 and
//! `n`. This type exists as a counter-example next to [`Counter`], which
//! holds one lock across the whole update. Do not use it to count anything.
//!
//! [`Counter`]: super::Counter

use std::borrow::Borrow;
use std::hash::Hash;

use hashbrown::HashMap;
use parking_lot::Mutex;

/// Per-key counter with a split load-then-store increment.
#[derive(Debug)]
pub struct RacyCounter<K = String> {
    entries: Mutex<HashMap<K, u64>>,
}

impl<K: Hash + Eq> RacyCounter<K> {
    /// Creates an empty counter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Loads the count for `key` (storing 0 if absent), then stores it plus one.
    ///
    /// Concurrent calls for the same key can overwrite each other.
    pub fn increment(&self, key: K)
    where
        K: Clone,
    {
        let seen = *self.entries.lock().entry(key.clone()).or_insert(0);
        self.entries.lock().insert(key, seen + 1);
    }

    /// Returns the stored count for `key`, or 0 if absent.
    #[must_use]
    pub fn value<Q>(&self, key: &Q) -> u64
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.lock().get(key).copied().unwrap_or(0)
    }
}

impl<K: Hash + Eq> Default for RacyCounter<K> {
    fn default() -> Self {
        Self::new()
    }
}
