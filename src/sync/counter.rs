//! Frequency counters safe for concurrent increment, read and iteration.
//!
//! Two lock disciplines share the [`Tally`] contract:
//!
//! - [`Counter`]: a single exclusive lock. Reads and writes are all mutually
//!   exclusive.
//! - [`RwCounter`]: a reader/writer lock. Any number of `value`/`for_each`
//!   readers may run together; `increment` still excludes everyone.
//!
//! # Iteration policy
//!
//! `for_each` holds the lock for the whole iteration. The callback never sees
//! a map mutated mid-iteration, at the price of blocking writers until it
//! returns. The callback must not call back into the same counter's
//! `increment` (for either variant) or it will deadlock.

use std::borrow::Borrow;
use std::hash::Hash;

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};

/// Shared contract of the counter variants.
pub trait Tally<K> {
    /// Increments the count for `key`, creating it at 1 if absent.
    fn increment(&self, key: K);

    /// Returns the current count for `key`, or 0 if it was never incremented.
    fn value<Q>(&self, key: &Q) -> u64
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized;

    /// Calls `f` for every entry while holding the lock.
    fn for_each<F>(&self, f: F)
    where
        F: FnMut(&K, u64);
}

/// Counter guarded by a single exclusive lock.
#[derive(Debug)]
pub struct Counter<K = String> {
    entries: Mutex<HashMap<K, u64>>,
}

impl<K: Hash + Eq> Counter<K> {
    /// Creates an empty counter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing has been counted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Copies the current counts out under the lock.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<K, u64>
    where
        K: Clone,
    {
        self.entries.lock().clone()
    }
}

impl<K: Hash + Eq> Default for Counter<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq> Tally<K> for Counter<K> {
    fn increment(&self, key: K) {
        *self.entries.lock().entry(key).or_insert(0) += 1;
    }

    fn value<Q>(&self, key: &Q) -> u64
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.lock().get(key).copied().unwrap_or(0)
    }

    fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&K, u64),
    {
        let entries = self.entries.lock();
        for (key, count) in entries.iter() {
            f(key, *count);
        }
    }
}

/// Counter guarded by a reader/writer lock.
#[derive(Debug)]
pub struct RwCounter<K = String> {
    entries: RwLock<HashMap<K, u64>>,
}

impl<K: Hash + Eq> RwCounter<K> {
    /// Creates an empty counter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing has been counted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copies the current counts out under a read lock.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<K, u64>
    where
        K: Clone,
    {
        self.entries.read().clone()
    }
}

impl<K: Hash + Eq> Default for RwCounter<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq> Tally<K> for RwCounter<K> {
    fn increment(&self, key: K) {
        *self.entries.write().entry(key).or_insert(0) += 1;
    }

    fn value<Q>(&self, key: &Q) -> u64
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.read().get(key).copied().unwrap_or(0)
    }

    fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&K, u64),
    {
        let entries = self.entries.read();
        for (key, count) in entries.iter() {
            f(key, *count);
        }
    }
}
