//! Bounded LRU cache for query embeddings and search results.
//!
//! Capacity is small (default 128 entries), so eviction does a linear
//! scan for the stalest slot instead of maintaining a linked list.

use std::collections::HashMap;

/// String-keyed LRU cache with a hard entry bound.
#[derive(Debug)]
pub struct LruCache<V> {
    entries: HashMap<String, (u64, V)>,
    clock: u64,
    capacity: usize,
}

impl<V> LruCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            clock: 0,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fetch and mark as most recently used.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        self.clock += 1;
        let clock = self.clock;
        let entry = self.entries.get_mut(key)?;
        entry.0 = clock;
        Some(&entry.1)
    }

    /// Insert or replace, evicting the least recently used entry when the
    /// bound is exceeded.
    pub fn insert(&mut self, key: String, value: V) {
        if self.capacity == 0 {
            return;
        }
        self.clock += 1;
        self.entries.insert(key, (self.clock, value));
        if self.entries.len() > self.capacity {
            if let Some(stalest) = self
                .entries
                .iter()
                .min_by_key(|(_, (used, _))| *used)
                .map(|(k, _)| k.clone())
            {
                self.entries.remove(&stalest);
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
