//! TTL cache with explicit eviction
//!
//! Entries store `(value, computed_at)`. Reads ignore stale entries but do
//! not remove them; [`TtlCache::sweep`] is the only eviction path.

use crate::values::Timestamp;
use chrono::Duration;
use dashmap::DashMap;
use std::hash::Hash;

/// Cached value plus the time it was computed
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub computed_at: Timestamp,
}

/// Keyed cache whose entries expire after a fixed TTL
#[derive(Debug)]
pub struct TtlCache<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Fresh value for `key`, if any
    pub fn get(&self, key: &K, now: Timestamp) -> Option<V> {
        self.entries.get(key).and_then(|entry| {
            if now - entry.computed_at < self.ttl {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }

    pub fn insert(&self, key: K, value: V, now: Timestamp) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                computed_at: now,
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Remove every expired entry, returning how many were evicted
    pub fn sweep(&self, now: Timestamp) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now - entry.computed_at < self.ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
