//! Key/value map with atomic check-then-act and read-modify-write.
//!
//! Every operation, including [`ComputeMap::compute`], runs inside one
//! critical section shared by all keys. Two `compute` bodies never
//! interleave, and `set_if_absent` checks and inserts without releasing the
//! lock in between.
//!
//! # Warning
//!
//! The closure passed to `compute` runs while the map is locked. Keep it
//! short and non-blocking, and never touch the same map from inside it: the
//! lock is not reentrant and the call would deadlock.

use std::borrow::Borrow;
use std::hash::Hash;

use hashbrown::HashMap;
use parking_lot::Mutex;

/// Concurrent map where absent keys read as `V::default()`.
#[derive(Debug)]
pub struct ComputeMap<K, V> {
    items: Mutex<HashMap<K, V>>,
}

impl<K, V> ComputeMap<K, V>
where
    K: Hash + Eq,
    V: Clone + Default,
{
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the value for `key`, or `V::default()` when absent.
    pub fn get<Q>(&self, key: &Q) -> V
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.items.lock().get(key).cloned().unwrap_or_default()
    }

    /// Returns true if `key` has been stored.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.items.lock().contains_key(key)
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set(&self, key: K, value: V) {
        self.items.lock().insert(key, value);
    }

    /// Stores `value` only if `key` is absent.
    ///
    /// Returns the value now associated with `key`: the existing one if it was
    /// present, otherwise `value`.
    pub fn set_if_absent(&self, key: K, value: V) -> V {
        self.items.lock().entry(key).or_insert(value).clone()
    }

    /// Replaces the value for `key` with `f(current)` and returns the result.
    ///
    /// `current` is `V::default()` for an absent key. The read, the call to
    /// `f` and the write happen under one lock acquisition. If `f` panics the
    /// stored value is left as it was.
    pub fn compute<F>(&self, key: K, f: F) -> V
    where
        F: FnOnce(V) -> V,
    {
        let mut items = self.items.lock();
        let current = items.get(&key).cloned().unwrap_or_default();
        let next = f(current);
        items.insert(key, next.clone());
        next
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns true if no key has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Copies the current contents out under the lock.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<K, V>
    where
        K: Clone,
    {
        self.items.lock().clone()
    }
}

impl<K, V> Default for ComputeMap<K, V>
where
    K: Hash + Eq,
    V: Clone + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn absent_key_reads_default() {
        init_test("absent_key_reads_default");
        let map: ComputeMap<String, i32> = ComputeMap::new();
        assert_eq!(map.get("hello"), 0);
        assert!(!map.contains_key("hello"));
        assert!(map.is_empty());
        crate::test_complete!("absent_key_reads_default");
    }

    #[test]
    fn concurrent_set_keeps_one_value() {
        init_test("concurrent_set_keeps_one_value");
        let map = Arc::new(ComputeMap::<String, i32>::new());
        let handles: Vec<_> = [17, 71]
            .into_iter()
            .map(|value| {
                let map = Arc::clone(&map);
                thread::spawn(move || map.set("hello".to_string(), value))
            })
            .collect();
        for handle in handles {
            handle.join().expect("setter panicked");
        }
        let value = map.get("hello");
        assert!(value == 17 || value == 71, "unexpected value {value}");
        crate::test_complete!("concurrent_set_keeps_one_value");
    }

    #[test]
    fn set_if_absent_first_writer_wins() {
        init_test("set_if_absent_first_writer_wins");
        let map = Arc::new(ComputeMap::<String, i32>::new());

        let early = {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(5));
                map.set_if_absent("hello".to_string(), 42)
            })
        };
        let late = {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                map.set_if_absent("hello".to_string(), 84)
            })
        };

        let early = early.join().expect("early panicked");
        let late = late.join().expect("late panicked");
        crate::assert_with_log!(early == 42, "early sees its own value", 42, early);
        crate::assert_with_log!(late == 42, "late sees existing value", 42, late);
        assert_eq!(map.get("hello"), 42);
        crate::test_complete!("set_if_absent_first_writer_wins");
    }

    #[test]
    fn set_if_absent_is_not_torn_under_contention() {
        init_test("set_if_absent_is_not_torn_under_contention");
        let map = Arc::new(ComputeMap::<u32, u32>::new());
        let handles: Vec<_> = (1..=8u32)
            .map(|id| {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    (0..100)
                        .map(|key| map.set_if_absent(key, id))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let results: Vec<Vec<u32>> = handles
            .into_iter()
            .map(|h| h.join().expect("worker panicked"))
            .collect();
        // Every thread must agree on the single winner of each key.
        for key in 0..100usize {
            let winner = map.get(&(key as u32));
            for seen in &results {
                assert_eq!(seen[key], winner, "key {key} torn");
            }
        }
        crate::test_complete!("set_if_absent_is_not_torn_under_contention");
    }

    #[test]
    fn compute_counts_without_lost_updates() {
        init_test("compute_counts_without_lost_updates");
        let map = Arc::new(ComputeMap::<String, i32>::new());
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    for _ in 0..100 {
                        map.compute("hello".to_string(), |v| v + 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("computer panicked");
        }
        let value = map.get("hello");
        crate::assert_with_log!(value == 200, "hello", 200, value);
        crate::test_complete!("compute_counts_without_lost_updates");
    }

    #[test]
    fn compute_returns_new_value() {
        init_test("compute_returns_new_value");
        let map: ComputeMap<&str, Vec<u8>> = ComputeMap::new();
        let first = map.compute("k", |mut v| {
            v.push(1);
            v
        });
        let second = map.compute("k", |mut v| {
            v.push(2);
            v
        });
        assert_eq!(first, vec![1]);
        assert_eq!(second, vec![1, 2]);
        assert_eq!(map.len(), 1);
        crate::test_complete!("compute_returns_new_value");
    }

    #[test]
    fn panicking_compute_leaves_absent_key_absent() {
        init_test("panicking_compute_leaves_absent_key_absent");
        let map: ComputeMap<&str, i32> = ComputeMap::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            map.compute("k", |_| panic!("compute body failed"))
        }));
        assert!(result.is_err());
        let present = map.contains_key("k");
        crate::assert_with_log!(!present, "key left absent", false, present);
        assert!(map.is_empty());

        let stored = map.set_if_absent("k", 42);
        crate::assert_with_log!(stored == 42, "set_if_absent stores value", 42, stored);

        let kept = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            map.compute("k", |_| panic!("compute body failed"))
        }));
        assert!(kept.is_err());
        assert_eq!(map.get("k"), 42);
        crate::test_complete!("panicking_compute_leaves_absent_key_absent");
    }
}
