//! Per-node result cache.
//!
//! LRU map from evaluation key (`path#slot?overrides`) to a cooked result.
//! Each entry remembers the base query values the cook read; an entry is
//! only a hit while every one of those values is unchanged.
//!
//! Results whose kinds include `PARENT_VALUE` are never inserted here.

use std::num::NonZeroUsize;
use std::sync::Arc;

use log::trace;
use lru::LruCache;

use super::dependency::{DependencyKinds, QueryMap};
use crate::geometry::ElementCollection;

/// Hit/miss counters for node result caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn record(&mut self, hit: bool) {
        if hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

/// One cached evaluation.
#[derive(Debug, Clone)]
pub struct CachedResult {
    pub collection: Arc<ElementCollection>,
    pub kinds: DependencyKinds,
    /// Base query values read while cooking (name → value at cook time)
    pub base_reads: QueryMap,
}

impl CachedResult {
    /// Still valid when every recorded base read matches `base`.
    pub fn is_fresh(&self, base: &QueryMap) -> bool {
        self.base_reads
            .iter()
            .all(|(name, value)| base.get(name) == Some(value))
    }
}

#[derive(Debug)]
pub struct ResultCache {
    entries: LruCache<String, CachedResult>,
    stats: CacheStats,
}

impl ResultCache {
    /// Capacity below one is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            stats: CacheStats::default(),
        }
    }

    /// Fresh entry for `key` under the current base query.
    pub fn get(&mut self, key: &str, base: &QueryMap) -> Option<CachedResult> {
        let hit = match self.entries.get(key) {
            Some(entry) if entry.is_fresh(base) => Some(entry.clone()),
            Some(_) => {
                trace!("cache entry {} is stale", key);
                self.entries.pop(key);
                None
            }
            None => None,
        };
        self.stats.record(hit.is_some());
        hit
    }

    /// Insert unless the result depends on injected parent values.
    pub fn insert(&mut self, key: String, result: CachedResult) -> bool {
        if result.kinds.contains(DependencyKinds::PARENT_VALUE) {
            return false;
        }
        self.entries.put(key, result);
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn resize(&mut self, capacity: usize) {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        self.entries.resize(capacity);
    }

    /// Lookups since the node was created; `clear` keeps them.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
