//! Cache of restricted schemas.
//!
//! Restricting a schema to an `only` subset clones every kept field. The
//! cache keys restricted schemas by the order-independent set of requested
//! names so repeated partial loads share one instance. It is a pure
//! performance cache: a miss rebuilds an equivalent schema.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::Schema;

/// Default number of restricted schemas kept per entity type.
pub const DEFAULT_SCHEMA_CACHE_CAPACITY: usize = 32;

type SubsetKey = BTreeSet<String>;

/// Statistics for a schema cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of evictions.
    pub evictions: u64,
}

impl CacheStats {
    /// Returns the cache hit rate as a percentage (0.0 - 100.0).
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let rate = (self.hits as f64 / total as f64) * 100.0;
            rate
        }
    }
}

/// LRU cache of restricted schemas, keyed by field-name subset.
///
/// Thread-safe implementation using `parking_lot::RwLock`.
pub struct SchemaCache {
    entries: RwLock<FxHashMap<SubsetKey, Arc<Schema>>>,
    /// LRU order: front = oldest, back = newest
    order: RwLock<VecDeque<SubsetKey>>,
    capacity: AtomicUsize,
    stats: RwLock<CacheStats>,
}

impl SchemaCache {
    /// Creates a cache holding at most `capacity` schemas (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            order: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity: AtomicUsize::new(capacity.max(1)),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    /// Returns the schema restricted to `only`, building it on a miss.
    pub fn restricted<S: AsRef<str>>(&self, full: &Schema, only: &[S]) -> Arc<Schema> {
        let key: SubsetKey = only.iter().map(|s| s.as_ref().to_string()).collect();

        {
            let entries = self.entries.read();
            if let Some(cached) = entries.get(&key) {
                self.stats.write().hits += 1;
                tracing::trace!(schema = full.name(), fields = ?key, "schema cache hit");
                return Arc::clone(cached);
            }
        }

        let built = Arc::new(full.restrict(only));

        let mut entries = self.entries.write();
        let mut order = self.order.write();
        let mut stats = self.stats.write();

        stats.misses += 1;
        if let Some(raced) = entries.get(&key) {
            return Arc::clone(raced);
        }

        let capacity = self.capacity.load(Ordering::Relaxed);
        while entries.len() >= capacity {
            match order.pop_front() {
                Some(oldest) => {
                    entries.remove(&oldest);
                    stats.evictions += 1;
                }
                None => break,
            }
        }

        entries.insert(key.clone(), Arc::clone(&built));
        order.push_back(key);
        built
    }

    /// Changes the capacity, evicting the oldest entries if needed.
    pub fn set_capacity(&self, capacity: usize) {
        let capacity = capacity.max(1);
        self.capacity.store(capacity, Ordering::Relaxed);

        let mut entries = self.entries.write();
        let mut order = self.order.write();
        let mut stats = self.stats.write();
        while entries.len() > capacity {
            match order.pop_front() {
                Some(oldest) => {
                    entries.remove(&oldest);
                    stats.evictions += 1;
                }
                None => break,
            }
        }
    }

    /// Returns the maximum number of cached schemas.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Returns current cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        *self.stats.read()
    }

    /// Returns the number of cached schemas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Clears all cached schemas and resets statistics.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        let mut order = self.order.write();
        let mut stats = self.stats.write();

        entries.clear();
        order.clear();
        *stats = CacheStats::default();
    }
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new(DEFAULT_SCHEMA_CACHE_CAPACITY)
    }
}

impl std::fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("stats", &self.stats())
            .finish()
    }
}
