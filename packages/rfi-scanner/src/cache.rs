//! Bounded caches.
//!
//! [`BoundedCache`] is a fixed-capacity map that evicts the oldest insertion
//! first (FIFO). Lookups do not refresh an entry's position; this is not an
//! LRU. [`ResultCache`] memoizes cascade outcomes on top of it.

use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use crate::types::classification::ClassificationResult;

/// Fixed-capacity map with FIFO eviction.
#[derive(Debug, Clone)]
pub struct BoundedCache<K, V> {
    capacity: usize,
    entries: HashMap<K, V>,
    order: VecDeque<K>,
}

impl<K: Eq + Hash + Clone, V> BoundedCache<K, V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert a value, evicting the oldest entry when full.
    ///
    /// Re-inserting an existing key replaces its value in place; the key
    /// keeps its original eviction position. Returns the evicted entry.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(existing) = self.entries.get_mut(&key) {
            *existing = value;
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.order
                .pop_front()
                .and_then(|oldest| self.entries.remove(&oldest).map(|v| (oldest, v)))
        } else {
            None
        };

        self.order.push_back(key.clone());
        self.entries.insert(key, value);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

/// Memoized cascade outcomes keyed by document identity.
#[derive(Debug, Clone)]
pub struct ResultCache {
    inner: BoundedCache<String, ClassificationResult>,
    prefix_chars: usize,
}

impl ResultCache {
    pub fn new(capacity: usize, prefix_chars: usize) -> Self {
        Self {
            inner: BoundedCache::new(capacity),
            prefix_chars,
        }
    }

    /// Stable key over `(file_name, category, normalized text prefix)`.
    ///
    /// Text is lowercased and whitespace-collapsed before the prefix is
    /// taken, so two OCR passes over the same document that differ only in
    /// spacing or case share a key.
    pub fn key(&self, file_name: &str, category: &str, text: &str) -> String {
        let prefix: String = normalize(text).chars().take(self.prefix_chars).collect();

        let mut hasher = Sha256::new();
        hasher.update(file_name.as_bytes());
        hasher.update([0u8]);
        hasher.update(category.to_lowercase().as_bytes());
        hasher.update([0u8]);
        hasher.update(prefix.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Cached result for the key, tagged as cached.
    pub fn get(&self, key: &str) -> Option<ClassificationResult> {
        self.inner.get(&key.to_string()).map(|r| r.as_cached())
    }

    pub fn insert(&mut self, key: String, result: ClassificationResult) {
        self.inner.insert(key, result);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
