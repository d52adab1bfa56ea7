//! FIFO-evicting, function-scoped lookup caches.
//!
//! Both caches here are constructed fresh per report-processing call and
//! dropped at the end of it. There is no `static`/global cache shared
//! across invocations. Stats tracking follows the teacher's
//! `SyncStats`/`RouterStats`/`MembershipStats` convention: a small `Copy`
//! counters struct read once at the end of the call.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use exposure_core::types::{Interaction, User};
use exposure_store::{Store, StoreError};

/// Hit/miss/size counters for a single cache instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

struct FifoCache<K, V> {
    capacity: usize,
    order: VecDeque<K>,
    entries: HashMap<K, V>,
    stats: CacheStats,
}

impl<K: Eq + Hash + Clone, V: Clone> FifoCache<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            entries: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    fn get(&mut self, key: &K) -> Option<V> {
        match self.entries.get(key) {
            Some(v) => {
                self.stats.hits += 1;
                Some(v.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    fn insert(&mut self, key: K, value: V) {
        if self.entries.contains_key(&key) {
            self.entries.insert(key, value);
            return;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, value);
        self.stats.size = self.entries.len();
    }
}

/// Default `InteractionQueryCache` capacity.
pub const DEFAULT_INTERACTION_CACHE_CAPACITY: usize = 1000;

/// Default `UserLookupCache` capacity.
pub const DEFAULT_USER_CACHE_CAPACITY: usize = 500;

/// Caches `Store::query_interactions_by_partner_window` results for one
/// report-processing call, keyed on the exact `(partner_id, window_start,
/// window_end)` the propagator queried with.
pub struct InteractionQueryCache {
    inner: FifoCache<(String, i64, i64), Vec<Interaction>>,
}

impl InteractionQueryCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INTERACTION_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: FifoCache::new(capacity),
        }
    }

    /// Fetch interactions discovered for `partner_id` within
    /// `[window_start, window_end]`, querying the store only on a miss.
    pub fn query(
        &mut self,
        store: &dyn Store,
        partner_id: &str,
        window_start: i64,
        window_end: i64,
    ) -> Result<Vec<Interaction>, StoreError> {
        let key = (partner_id.to_string(), window_start, window_end);
        if let Some(hit) = self.inner.get(&key) {
            return Ok(hit);
        }
        let result = store.query_interactions_by_partner_window(partner_id, window_start, window_end)?;
        self.inner.insert(key, result.clone());
        Ok(result)
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats
    }
}

impl Default for InteractionQueryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Caches user lookups for one report-processing call. One instance keys on
/// `uid` directly; a propagator instead keys on `H_I(uid)` via
/// [`UserLookupCache::get_by_hashed_interaction_id`]. Callers use a
/// separate instance per key shape, as with the teacher's per-concern stats
/// structs.
pub struct UserLookupCache {
    inner: FifoCache<String, Option<User>>,
}

impl UserLookupCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_USER_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: FifoCache::new(capacity),
        }
    }

    pub fn get(&mut self, store: &dyn Store, uid: &str) -> Result<Option<User>, StoreError> {
        if let Some(hit) = self.inner.get(&uid.to_string()) {
            return Ok(hit);
        }
        let result = store.get_user(uid)?;
        self.inner.insert(uid.to_string(), result.clone());
        Ok(result)
    }

    /// Look up a user by `H_I(uid)`, the key the chain propagator actually
    /// has on hand while walking the graph.
    pub fn get_by_hashed_interaction_id(
        &mut self,
        store: &dyn Store,
        hashed_interaction_id: &str,
    ) -> Result<Option<User>, StoreError> {
        if let Some(hit) = self.inner.get(&hashed_interaction_id.to_string()) {
            return Ok(hit);
        }
        let result = store.get_user_by_hashed_interaction_id(hashed_interaction_id)?;
        self.inner.insert(hashed_interaction_id.to_string(), result.clone());
        Ok(result)
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats
    }
}

impl Default for UserLookupCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exposure_core::hashing::{hash_interaction, hash_notification};
    use exposure_store::MemStore;

    fn sample_user(uid: &str) -> User {
        User {
            uid: uid.to_string(),
            anonymous_id: hash_interaction(uid).to_hex(),
            username: None,
            created_at: 0,
            fcm_token: None,
            hashed_interaction_id: hash_interaction(uid).to_hex(),
            hashed_notification_id: hash_notification(uid).to_hex(),
        }
    }

    #[test]
    fn user_lookup_cache_hits_on_second_call() {
        let store = MemStore::new();
        store.put_user(&sample_user("alice")).unwrap();
        let mut cache = UserLookupCache::new();

        cache.get(store.as_ref(), "alice").unwrap();
        cache.get(store.as_ref(), "alice").unwrap();

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn interaction_query_cache_evicts_fifo_beyond_capacity() {
        let store = MemStore::new();
        store
            .put_interaction(&Interaction {
                owner_id: "owner".into(),
                partner_anonymous_id: "p1".into(),
                partner_username_snapshot: None,
                recorded_at: 10,
            })
            .unwrap();
        let mut cache = InteractionQueryCache::with_capacity(1);

        cache.query(store.as_ref(), "p1", 0, 100).unwrap();
        cache.query(store.as_ref(), "p2", 0, 100).unwrap(); // evicts p1 entry
        cache.query(store.as_ref(), "p1", 0, 100).unwrap(); // miss again

        let stats = cache.stats();
        assert_eq!(stats.misses, 3);
        assert_eq!(stats.hits, 0);
    }
}
