//! Three independent caches: recall results, entity normalization, and
//! config. All share one generic, capacity- and TTL-bound implementation
//! backed by `dashmap` so reads on one shard never block writes on another;
//! every cache exposes hit/miss counters.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// Generic TTL + capacity-bound cache. Eviction is approximate LRU: when
/// over capacity, the oldest-inserted entries are dropped first. Good
/// enough for caches whose entries expire on their own TTL well before
/// capacity pressure matters in practice.
pub struct TtlCache<K, V> {
    entries: DashMap<K, Entry<V>>,
    capacity: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        if let Some(entry) = self.entries.get(key) {
            if entry.inserted_at.elapsed() <= self.ttl {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn insert(&self, key: K, value: V) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            self.evict_oldest();
        }
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    fn evict_oldest(&self) {
        if let Some(oldest_key) = self
            .entries
            .iter()
            .min_by_key(|e| e.inserted_at)
            .map(|e| e.key().clone())
        {
            self.entries.remove(&oldest_key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drops every entry. Used by the recall cache, which is invalidated
    /// whenever any memory is written.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

/// Key for the recall result cache: normalized prompt plus a hash of the
/// recall parameters that affect the result set.
pub fn recall_cache_key(prompt: &str, limit: usize, min_importance: f32, strategy: &str, format: &str) -> String {
    let normalized_prompt = prompt.trim().to_lowercase();
    format!("{normalized_prompt}|{limit}|{min_importance}|{strategy}|{format}")
}

pub struct EngineCaches<RecallValue, EntityValue, ConfigValue> {
    pub recall: TtlCache<String, RecallValue>,
    pub entity_normalization: TtlCache<String, EntityValue>,
    pub config: TtlCache<&'static str, ConfigValue>,
}

impl<RecallValue, EntityValue, ConfigValue> EngineCaches<RecallValue, EntityValue, ConfigValue>
where
    RecallValue: Clone,
    EntityValue: Clone,
    ConfigValue: Clone,
{
    pub fn new() -> Self {
        Self {
            recall: TtlCache::new(500, Duration::from_secs(5 * 60)),
            entity_normalization: TtlCache::new(5000, Duration::from_secs(24 * 60 * 60)),
            config: TtlCache::new(1, Duration::from_secs(u64::MAX / 2)),
        }
    }

    /// Invalidated whenever any memory is written (SPEC_FULL.md §4.10).
    pub fn invalidate_recall(&self) {
        self.recall.clear();
    }
}

impl<RecallValue, EntityValue, ConfigValue> Default for EngineCaches<RecallValue, EntityValue, ConfigValue>
where
    RecallValue: Clone,
    EntityValue: Clone,
    ConfigValue: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
