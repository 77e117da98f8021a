//! Shared cache for the category tree.
//!
//! Holds two things: the parent → children adjacency map, and an LRU of
//! per-id category records. Both are dropped together by [`TreeCache::purge`].
//!
//! Rebuilds run without holding any lock, so two readers may rebuild at the
//! same time; the last one to publish wins. A rebuild that started before a
//! purge carries an older generation and is discarded instead of published.
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::storage::CategoryRecord;

/// Parent id → direct child ids in sort order. Key `0` lists top-level
/// categories; every category has an entry, possibly empty.
pub type Adjacency = HashMap<i64, Vec<i64>>;

/// Default number of category records kept in memory.
pub const DEFAULT_RECORD_CAPACITY: usize = 512;

pub struct TreeCache {
    generation: AtomicU64,
    all_ids: Mutex<Option<Arc<Adjacency>>>,
    records: Mutex<LruCache<i64, Arc<CategoryRecord>>>,
}

impl TreeCache {
    pub fn new(record_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(record_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            generation: AtomicU64::new(0),
            all_ids: Mutex::new(None),
            records: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Current generation. Capture before reading the database so the result
    /// can be published with [`store_all_ids`](Self::store_all_ids) or
    /// [`store_record`](Self::store_record).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn all_ids(&self) -> Option<Arc<Adjacency>> {
        lock(&self.all_ids).clone()
    }

    /// Publish a rebuilt adjacency map. Returns false if a purge happened
    /// since `generation` was captured.
    pub fn store_all_ids(&self, generation: u64, map: Arc<Adjacency>) -> bool {
        let mut slot = lock(&self.all_ids);
        if self.generation() != generation {
            return false;
        }
        *slot = Some(map);
        true
    }

    pub fn record(&self, id: i64) -> Option<Arc<CategoryRecord>> {
        lock(&self.records).get(&id).cloned()
    }

    pub fn store_record(&self, generation: u64, record: Arc<CategoryRecord>) -> bool {
        let mut records = lock(&self.records);
        if self.generation() != generation {
            return false;
        }
        records.put(record.id, record);
        true
    }

    /// Drop everything. Writers call this before returning to their caller.
    pub fn purge(&self) {
        {
            let mut slot = lock(&self.all_ids);
            self.generation.fetch_add(1, Ordering::AcqRel);
            *slot = None;
        }
        lock(&self.records).clear();
        tracing::debug!(generation = self.generation(), "Category cache purged");
    }
}

impl Default for TreeCache {
    fn default() -> Self {
        Self::new(DEFAULT_RECORD_CAPACITY)
    }
}

impl std::fmt::Debug for TreeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeCache")
            .field("generation", &self.generation())
            .field("all_ids_cached", &lock(&self.all_ids).is_some())
            .field("records", &lock(&self.records).len())
            .finish()
    }
}

/// A panic while holding the lock cannot leave the cache half-written in a
/// way that matters: worst case an entry is missing and gets rebuilt.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64) -> Arc<CategoryRecord> {
        Arc::new(CategoryRecord {
            id,
            name: format!("Cat {id}"),
            idnumber: None,
            description: None,
            descriptionformat: 0,
            parent: 0,
            sortorder: 1,
            visible: true,
            visibleold: true,
            depth: 1,
            path: format!("/{id}"),
            timemodified: 0,
        })
    }

    #[test]
    fn test_store_and_read_back() {
        let cache = TreeCache::new(4);
        let generation = cache.generation();

        let mut map = Adjacency::new();
        map.insert(0, vec![1]);
        assert!(cache.store_all_ids(generation, Arc::new(map)));
        assert!(cache.store_record(generation, record(1)));

        assert_eq!(cache.all_ids().unwrap()[&0], vec![1]);
        assert_eq!(cache.record(1).unwrap().name, "Cat 1");
    }

    #[test]
    fn test_purge_clears_everything() {
        let cache = TreeCache::new(4);
        let generation = cache.generation();
        cache.store_all_ids(generation, Arc::new(Adjacency::new()));
        cache.store_record(generation, record(1));

        cache.purge();

        assert!(cache.all_ids().is_none());
        assert!(cache.record(1).is_none());
    }

    #[test]
    fn test_stale_rebuild_is_discarded() {
        let cache = TreeCache::new(4);
        let before = cache.generation();

        cache.purge();

        assert!(!cache.store_all_ids(before, Arc::new(Adjacency::new())));
        assert!(!cache.store_record(before, record(1)));
        assert!(cache.all_ids().is_none());
        assert!(cache.record(1).is_none());
    }

    #[test]
    fn test_records_are_bounded() {
        let cache = TreeCache::new(2);
        let generation = cache.generation();
        for id in 1..=3 {
            cache.store_record(generation, record(id));
        }
        assert!(cache.record(1).is_none());
        assert!(cache.record(3).is_some());
    }

    #[test]
    fn test_zero_capacity_still_works() {
        let cache = TreeCache::new(0);
        let generation = cache.generation();
        cache.store_record(generation, record(1));
        assert!(cache.record(1).is_some());
    }
}
