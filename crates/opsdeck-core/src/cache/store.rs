//! Query result cache.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::policy::EvictionPolicy;
use crate::config::CacheConfig;

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    hits: u64,
    /// Tick of the last insert or read, for LRU.
    last_access: u64,
    /// Insertion sequence, for FIFO.
    insert_seq: u64,
}

struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<V> Default for CacheState<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            tick: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }
}

impl<V> CacheState<V> {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Current number of entries.
    pub size: usize,
    /// `hits / (hits + misses)`, 0.0 before the first lookup.
    pub hit_rate: f64,
    /// Lookups served from the cache.
    pub total_hits: u64,
    /// Lookups that missed or found an expired entry.
    pub misses: u64,
    /// Entries evicted at capacity.
    pub evictions: u64,
    /// Mean age of current entries in milliseconds.
    pub average_age_ms: u64,
}

/// Bounded key-value cache with TTL expiry and a pluggable eviction policy.
///
/// All operations take an exclusive lock since reads update recency.
pub struct QueryCache<V = serde_json::Value> {
    state: Mutex<CacheState<V>>,
    max_size: usize,
    ttl: Duration,
    policy: EvictionPolicy,
}

impl<V: Clone> QueryCache<V> {
    /// Create a cache from configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            max_size: config.max_size,
            ttl: config.ttl,
            policy: config.policy,
        }
    }

    /// The active eviction policy.
    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Look up a key.
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub(crate) fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let tick = state.next_tick();

        let expired = match state.entries.get_mut(key) {
            None => {
                state.misses += 1;
                return None;
            }
            Some(entry) if now.saturating_duration_since(entry.inserted_at) > self.ttl => true,
            Some(entry) => {
                entry.hits += 1;
                entry.last_access = tick;
                let value = entry.value.clone();
                state.hits += 1;
                return Some(value);
            }
        };

        if expired {
            state.entries.remove(key);
            state.misses += 1;
            debug!(key, "cache entry expired");
        }
        None
    }

    /// Insert or replace a value.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_at(key.into(), value, Instant::now());
    }

    pub(crate) fn set_at(&self, key: String, value: V, now: Instant) {
        if self.max_size == 0 {
            return;
        }

        let mut state = self.state.lock();
        if state.entries.len() >= self.max_size && !state.entries.contains_key(&key) {
            // Expired entries go first so a live entry is never evicted in their place.
            self.drop_expired(&mut state, now);
            if state.entries.len() >= self.max_size {
                self.evict_one(&mut state);
            }
        }

        let tick = state.next_tick();
        state.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
                hits: 0,
                last_access: tick,
                insert_seq: tick,
            },
        );
    }

    /// Remove a key, returning whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.state.lock().entries.remove(key).is_some()
    }

    /// Remove every entry and reset counters.
    pub fn clear(&self) {
        *self.state.lock() = CacheState::default();
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub(crate) fn purge_expired_at(&self, now: Instant) -> usize {
        let mut state = self.state.lock();
        self.drop_expired(&mut state, now)
    }

    fn drop_expired(&self, state: &mut CacheState<V>, now: Instant) -> usize {
        let before = state.entries.len();
        state
            .entries
            .retain(|_, e| now.saturating_duration_since(e.inserted_at) <= self.ttl);
        before - state.entries.len()
    }

    /// Keys with the most hits, highest first.
    pub fn hot_keys(&self, limit: usize) -> Vec<(String, u64)> {
        let state = self.state.lock();
        let mut keys: Vec<(String, u64)> = state
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.hits))
            .collect();
        keys.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        keys.truncate(limit);
        keys
    }

    /// Number of entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let state = self.state.lock();

        let lookups = state.hits + state.misses;
        let hit_rate = if lookups > 0 {
            state.hits as f64 / lookups as f64
        } else {
            0.0
        };

        let average_age_ms = if state.entries.is_empty() {
            0
        } else {
            let total: u128 = state
                .entries
                .values()
                .map(|e| now.saturating_duration_since(e.inserted_at).as_millis())
                .sum();
            (total / state.entries.len() as u128) as u64
        };

        CacheStats {
            size: state.entries.len(),
            hit_rate,
            total_hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            average_age_ms,
        }
    }

    fn evict_one(&self, state: &mut CacheState<V>) {
        let victim = match self.policy {
            EvictionPolicy::Lru => state
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Fifo => state
                .entries
                .iter()
                .min_by_key(|(_, e)| e.insert_seq)
                .map(|(k, _)| k.clone()),
            EvictionPolicy::TtlOldest => state
                .entries
                .iter()
                .min_by_key(|(_, e)| (e.inserted_at, e.insert_seq))
                .map(|(k, _)| k.clone()),
        };

        if let Some(key) = victim {
            state.entries.remove(&key);
            state.evictions += 1;
            debug!(key = %key, policy = %self.policy, "cache entry evicted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(max_size: usize, policy: EvictionPolicy) -> QueryCache<i32> {
        QueryCache::new(&CacheConfig {
            max_size,
            ttl: Duration::from_secs(60),
            policy,
        })
    }

    #[test]
    fn test_fifo_evicts_oldest_insert() {
        let cache = cache(2, EvictionPolicy::Fifo);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.get("a");
        cache.set("c", 3);

        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_lru_respects_reads() {
        let cache = cache(2, EvictionPolicy::Lru);
        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.get("a"), Some(1));
        cache.set("c", 3);

        assert_eq!(cache.get("a"), Some(1));
        assert!(cache.get("b").is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_ttl_oldest_evicts_earliest_insert_time() {
        let cache = cache(2, EvictionPolicy::TtlOldest);
        let base = Instant::now();
        cache.set_at("late".to_string(), 1, base + Duration::from_secs(5));
        cache.set_at("early".to_string(), 2, base);
        cache.set("new", 3);

        assert_eq!(cache.len(), 2);
        assert!(cache.remove("late"));
        assert!(!cache.remove("early"));
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = cache(2, EvictionPolicy::Fifo);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("a", 10);
        assert_eq!(cache.get("a"), Some(10));
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_expired_entry_is_miss_and_removed() {
        let cache = cache(4, EvictionPolicy::Lru);
        cache.set("a", 1);
        let later = Instant::now() + Duration::from_secs(61);

        assert!(cache.get_at("a", later).is_none());
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_hit_rate_uses_misses() {
        let cache = cache(4, EvictionPolicy::Lru);
        cache.set("a", 1);
        cache.get("a");
        cache.get("a");
        cache.get("a");
        cache.get("missing");

        let stats = cache.stats();
        assert_eq!(cache.hot_keys(1), vec![("a".to_string(), 3)]);
        assert_eq!(stats.total_hits, 3);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clear_resets() {
        let cache = cache(4, EvictionPolicy::Lru);
        cache.set("a", 1);
        cache.get("a");
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_purge_expired_keeps_fresh() {
        let cache = cache(4, EvictionPolicy::Lru);
        let base = Instant::now();
        cache.set_at("old".to_string(), 1, base);
        cache.set_at("fresh".to_string(), 2, base + Duration::from_secs(100));

        assert_eq!(cache.purge_expired_at(base + Duration::from_secs(120)), 1);
        assert!(!cache.remove("old"));
        assert!(cache.remove("fresh"));
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let cache = cache(0, EvictionPolicy::Lru);
        cache.set("a", 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entries_purged_before_eviction() {
        for policy in [EvictionPolicy::Lru, EvictionPolicy::Fifo, EvictionPolicy::TtlOldest] {
            let cache = cache(2, policy);
            let base = Instant::now();
            cache.set_at("stale".to_string(), 1, base);
            cache.set_at("live".to_string(), 2, base + Duration::from_secs(50));
            cache.set_at("new".to_string(), 3, base + Duration::from_secs(70));

            let at = base + Duration::from_secs(70);
            assert_eq!(cache.stats().evictions, 0, "{policy}");
            assert_eq!(cache.get_at("live", at), Some(2), "{policy}");
            assert_eq!(cache.get_at("new", at), Some(3), "{policy}");
            assert!(cache.get_at("stale", at).is_none(), "{policy}");
        }
    }

    #[test]
    fn test_capacity_holds_under_mixed_workload() {
        // Fixed-seed LCG so failures reproduce.
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move |bound: u64| {
            seed = seed
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (seed >> 33) % bound
        };

        for policy in [EvictionPolicy::Lru, EvictionPolicy::Fifo, EvictionPolicy::TtlOldest] {
            let cache = cache(8, policy);
            let mut now = Instant::now();

            for step in 0..5_000 {
                now += Duration::from_millis(next(2_000));
                let key = format!("k{}", next(24));
                match next(3) {
                    0 => {
                        cache.get_at(&key, now);
                    }
                    1 => {
                        cache.remove(&key);
                    }
                    _ => {
                        cache.set_at(key.clone(), step, now);
                        assert_eq!(cache.get_at(&key, now), Some(step), "{policy}");
                    }
                }
                assert!(cache.len() <= 8, "{policy}: {} entries", cache.len());
            }

            let stats = cache.stats();
            assert!(stats.total_hits > 0, "{policy}");
            assert!(stats.evictions > 0, "{policy}");
        }
    }
}
