//! # Thread-safe keyed store.
//!
//! [`KeyedStore`] is the only shared map in the pipeline: the polling engine keeps
//! per-cluster [`Instance`](crate::engine::Instance)s and per-region capability sets
//! in it, the watcher keeps descriptors and secrets in it.
//!
//! ## Rules
//! - The map itself is never exposed; callers get clones or run closures under the lock.
//! - [`KeyedStore::update`] never resurrects a key that was deleted concurrently.
//! - Closures run under a synchronous lock and must not block or await.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Map keyed by string id with internal synchronization.
#[derive(Debug)]
pub struct KeyedStore<V> {
    items: RwLock<HashMap<String, V>>,
}

impl<V> Default for KeyedStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> KeyedStore<V> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts or replaces the value stored under `key`.
    pub fn put(&self, key: impl Into<String>, value: V) {
        self.items.write().insert(key.into(), value);
    }

    /// Removes `key`, returning the previous value. Absent keys are not an error.
    pub fn delete(&self, key: &str) -> Option<V> {
        self.items.write().remove(key)
    }

    /// Returns true if `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.items.read().contains_key(key)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Sorted list of keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.items.read().keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// Mutates the value under `key` if present and returns the closure's result.
    pub fn update<R>(&self, key: &str, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        self.items.write().get_mut(key).map(f)
    }

    /// Atomically merges a new value with the existing one (if any).
    ///
    /// `f` receives the current value and returns the value to store.
    /// Returns whether a value was present, observed under the same lock.
    pub fn upsert(&self, key: impl Into<String>, f: impl FnOnce(Option<V>) -> V) -> bool {
        let mut items = self.items.write();
        let key = key.into();
        let current = items.remove(&key);
        let existed = current.is_some();
        items.insert(key, f(current));
        existed
    }
}

impl<V: Clone> KeyedStore<V> {
    /// Returns a clone of the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<V> {
        self.items.read().get(key).cloned()
    }

    /// Returns clones of all values, sorted by key.
    pub fn list(&self) -> Vec<V> {
        let items = self.items.read();
        let mut entries: Vec<(&String, &V)> = items.iter().collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        entries.into_iter().map(|(_, v)| v.clone()).collect()
    }

    /// Returns clones of all values matching `pred`, sorted by key.
    pub fn filter(&self, mut pred: impl FnMut(&V) -> bool) -> Vec<V> {
        self.list().into_iter().filter(|v| pred(v)).collect()
    }
}
