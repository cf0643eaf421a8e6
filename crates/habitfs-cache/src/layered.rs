use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use habitfs_types::Timestamp;
use lru::LruCache;

/// Configuration for a two-level cache.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Maximum entries in the in-process L1 (LRU-evicted).
    pub l1_capacity: usize,
    /// L1 entry time-to-live in milliseconds.
    pub l1_ttl_ms: u64,
    /// Maximum entries in the L2 map (insert-bypassed when full).
    pub l2_capacity: usize,
    /// L2 entry time-to-live in milliseconds.
    pub l2_ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_capacity: 1_024,
            l1_ttl_ms: 10_000,
            l2_capacity: 16_384,
            l2_ttl_ms: 60_000,
        }
    }
}

/// A cached value with its insertion time and TTL.
#[derive(Clone, Debug)]
struct TimedEntry<V> {
    value: V,
    inserted_at: Timestamp,
    ttl_ms: u64,
}

impl<V> TimedEntry<V> {
    fn new(value: V, ttl_ms: u64) -> Self {
        Self {
            value,
            inserted_at: Timestamp::now(),
            ttl_ms,
        }
    }

    fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.inserted_at.plus_ms(self.ttl_ms)
    }
}

/// Snapshot of cache counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub evictions: u64,
    /// Inserts skipped because L2 was full (graceful degradation).
    pub bypasses: u64,
}

impl CacheStats {
    /// Hits over total lookups; zero when nothing was looked up.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

/// Two-level read cache: bounded LRU L1 in front of a TTL-expiring L2.
///
/// Both levels hold owned clones; values should be cheap to clone (small
/// structs or digests). All counters are atomic, so a shared `Arc` of the
/// cache can be read and written from any thread.
pub struct LayeredCache<K, V> {
    l1: Mutex<LruCache<K, TimedEntry<V>>>,
    l2: RwLock<HashMap<K, TimedEntry<V>>>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    evictions: AtomicU64,
    bypasses: AtomicU64,
}

impl<K, V> LayeredCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        let capacity =
            NonZeroUsize::new(config.l1_capacity).unwrap_or(NonZeroUsize::new(1_024).unwrap());
        Self {
            l1: Mutex::new(LruCache::new(capacity)),
            l2: RwLock::new(HashMap::new()),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            l1_hits: AtomicU64::new(0),
            l2_hits: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            bypasses: AtomicU64::new(0),
        }
    }

    /// Look up a key, checking L1 then L2.
    ///
    /// An L2 hit is promoted into L1. Expired entries count as misses and
    /// are dropped.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Timestamp::now();

        {
            let mut l1 = self.l1.lock().expect("lock poisoned");
            // Owned snapshot first: Some(Some(v)) live hit, Some(None)
            // expired, None absent.
            let found = l1.get(key).map(|entry| {
                if entry.is_expired(now) {
                    None
                } else {
                    Some(entry.value.clone())
                }
            });
            match found {
                Some(Some(value)) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    self.l1_hits.fetch_add(1, Ordering::Relaxed);
                    return Some(value);
                }
                Some(None) => {
                    l1.pop(key);
                }
                None => {}
            }
        }

        let from_l2 = {
            let l2 = self.l2.read().expect("lock poisoned");
            match l2.get(key) {
                Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
                _ => None,
            }
        };

        match from_l2 {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.l2_hits.fetch_add(1, Ordering::Relaxed);
                self.promote(key.clone(), value.clone());
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a value into both levels (an origin hit on the way back, or
    /// a fresh write by the local writer).
    ///
    /// L1 evicts its least-recently-used entry when full. A full L2 skips
    /// the insert instead of failing.
    pub fn insert(&self, key: K, value: V) {
        self.promote(key.clone(), value.clone());

        let mut l2 = self.l2.write().expect("lock poisoned");
        if l2.len() >= self.config.l2_capacity && !l2.contains_key(&key) {
            self.bypasses.fetch_add(1, Ordering::Relaxed);
            return;
        }
        l2.insert(key, TimedEntry::new(value, self.config.l2_ttl_ms));
    }

    /// Remove a key from both levels. Returns `true` if either level held
    /// it.
    pub fn evict(&self, key: &K) -> bool {
        let from_l1 = self.l1.lock().expect("lock poisoned").pop(key).is_some();
        let from_l2 = self
            .l2
            .write()
            .expect("lock poisoned")
            .remove(key)
            .is_some();
        from_l1 || from_l2
    }

    /// Remove a key from L1 only.
    ///
    /// Remote invalidation evicts the fast level; the L2 entry ages out
    /// through its TTL, so the next lookup is served from L2/origin.
    pub fn evict_l1(&self, key: &K) -> bool {
        self.l1.lock().expect("lock poisoned").pop(key).is_some()
    }

    /// Drop expired L2 entries and expired L1 entries. Returns how many
    /// entries were removed. Runs on the background maintenance schedule.
    pub fn purge_expired(&self) -> usize {
        let now = Timestamp::now();
        let mut removed = 0;

        {
            let mut l1 = self.l1.lock().expect("lock poisoned");
            let expired: Vec<K> = l1
                .iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .map(|(k, _)| k.clone())
                .collect();
            for key in expired {
                l1.pop(&key);
                removed += 1;
            }
        }

        let mut l2 = self.l2.write().expect("lock poisoned");
        let before = l2.len();
        l2.retain(|_, entry| !entry.is_expired(now));
        removed += before - l2.len();
        removed
    }

    /// Remove everything from both levels.
    pub fn clear(&self) {
        self.l1.lock().expect("lock poisoned").clear();
        self.l2.write().expect("lock poisoned").clear();
    }

    /// Current entry counts as (l1, l2).
    pub fn len(&self) -> (usize, usize) {
        let l1 = self.l1.lock().expect("lock poisoned").len();
        let l2 = self.l2.read().expect("lock poisoned").len();
        (l1, l2)
    }

    /// Returns `true` if both levels are empty.
    pub fn is_empty(&self) -> bool {
        self.len() == (0, 0)
    }

    /// Snapshot the counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            l1_hits: self.l1_hits.load(Ordering::Relaxed),
            l2_hits: self.l2_hits.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            bypasses: self.bypasses.load(Ordering::Relaxed),
        }
    }

    /// Push into L1, counting a capacity eviction if one happens.
    fn promote(&self, key: K, value: V) {
        let mut l1 = self.l1.lock().expect("lock poisoned");
        let at_capacity = l1.len() == usize::from(l1.cap());
        let contained = l1.contains(&key);
        l1.push(key, TimedEntry::new(value, self.config.l1_ttl_ms));
        if at_capacity && !contained {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl<K, V> std::fmt::Debug for LayeredCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (l1, l2) = self.len();
        f.debug_struct("LayeredCache")
            .field("l1_entries", &l1)
            .field("l2_entries", &l2)
            .finish()
    }
}
