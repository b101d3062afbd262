//! Bounded stream cache used by content providers.
//!
//! Entries are evicted strictly in insertion order. Looking an entry up does
//! not refresh it.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Number of entries a provider keeps.
pub const STREAM_CACHE_CAPACITY: usize = 16;

/// FIFO cache keyed by file path.
#[derive(Debug, Clone)]
pub struct StreamCache<V> {
    entries: VecDeque<(PathBuf, V)>,
    capacity: usize,
}

impl<V> Default for StreamCache<V> {
    fn default() -> Self {
        Self::new(STREAM_CACHE_CAPACITY)
    }
}

impl<V> StreamCache<V> {
    /// Create a cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Get a cached value without touching eviction order.
    pub fn get(&self, key: &Path) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    #[inline]
    pub fn contains(&self, key: &Path) -> bool {
        self.get(key).is_some()
    }

    /// Insert unless `key` is already present. When full, the oldest entry
    /// is dropped first. Returns false if the key was already cached.
    pub fn insert(&mut self, key: PathBuf, value: V) -> bool {
        if self.contains(&key) {
            return false;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((key, value));
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached keys, oldest first.
    pub fn keys(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|(k, _)| k.as_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: usize) -> PathBuf {
        PathBuf::from(format!("models/m{i}.pmdl"))
    }

    #[test]
    fn test_fifo_eviction() {
        let mut cache = StreamCache::default();
        for i in 0..17 {
            assert!(cache.insert(key(i), i));
        }
        assert_eq!(cache.len(), STREAM_CACHE_CAPACITY);
        assert!(!cache.contains(&key(0)));
        assert_eq!(cache.get(&key(1)), Some(&1));
        assert_eq!(cache.get(&key(16)), Some(&16));
    }

    #[test]
    fn test_lookup_does_not_refresh() {
        let mut cache = StreamCache::new(2);
        cache.insert(key(0), 0);
        cache.insert(key(1), 1);
        assert!(cache.get(&key(0)).is_some());
        cache.insert(key(2), 2);
        assert!(!cache.contains(&key(0)));
        assert_eq!(cache.keys().collect::<Vec<_>>(), [key(1).as_path(), key(2).as_path()]);
    }

    #[test]
    fn test_insert_existing_is_noop() {
        let mut cache = StreamCache::new(2);
        assert!(cache.insert(key(0), "first"));
        assert!(!cache.insert(key(0), "second"));
        assert_eq!(cache.get(&key(0)), Some(&"first"));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
