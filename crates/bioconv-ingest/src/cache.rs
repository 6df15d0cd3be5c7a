//! Entity cache
//!
//! Maps a natural key to the value created for it on first encounter.
//! The creation function runs at most once per key for the lifetime of the
//! cache, and a creation that produced nothing is remembered as well, so an
//! unresolvable key is neither retried nor reported twice. Entries are never
//! evicted.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct EntityCache<V> {
    entries: HashMap<String, Option<V>>,
}

impl<V: Clone> EntityCache<V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Return the cached value for `key`, or run `create` once and cache it
    pub fn resolve<F>(&mut self, key: &str, create: F) -> Option<V>
    where
        F: FnOnce() -> Option<V>,
    {
        if let Some(cached) = self.entries.get(key) {
            return cached.clone();
        }
        let value = create();
        self.entries.insert(key.to_string(), value.clone());
        value
    }

    /// Like [`resolve`](Self::resolve) for creations that always succeed.
    /// A remembered miss for `key` is replaced by the new value.
    pub fn get_or_create<F>(&mut self, key: &str, create: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(Some(cached)) = self.entries.get(key) {
            return cached.clone();
        }
        let value = create();
        self.entries.insert(key.to_string(), Some(value.clone()));
        value
    }

    /// Cached value, without creating anything
    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key).and_then(Option::as_ref)
    }

    /// Whether `key` has been resolved before, successfully or not
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> Default for EntityCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
