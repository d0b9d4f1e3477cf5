//! Response cache with per-entry TTL and LRU eviction

use crate::config::CacheConfig;
use crate::types::{RequestContext, normalize_text};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Cache key for an agent's answer to `text` grounded on `context`.
///
/// Text is normalized first so that casing and spacing variants of the same
/// question share an entry. Documents and session attributes are part of the
/// key; history is not.
pub fn cache_key(agent: &str, text: &str, context: &RequestContext) -> String {
    let mut hasher = Sha256::new();
    hasher.update(agent.as_bytes());
    hasher.update([0u8]);
    hasher.update(normalize_text(text).as_bytes());
    for document in &context.documents {
        hasher.update([1u8]);
        hasher.update(document.as_bytes());
    }
    // sorted so that map iteration order never changes the key
    let attributes: BTreeMap<&String, &String> = context.attributes.iter().collect();
    for (name, value) in attributes {
        hasher.update([2u8]);
        hasher.update(name.as_bytes());
        hasher.update([3u8]);
        hasher.update(value.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub created_at: Instant,
    pub ttl: Duration,
    pub last_accessed_at: Instant,
    pub hit_count: u64,
}

impl<V> CacheEntry<V> {
    fn new(key: String, value: V, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            key,
            value,
            created_at: now,
            ttl,
            last_accessed_at: now,
            hit_count: 0,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) > self.ttl
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub capacity: usize,
    pub evictions: u64,
    pub expirations: u64,
    pub hit_rate: f64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

struct Store<V> {
    entries: LruCache<String, CacheEntry<V>>,
    counters: Counters,
}

/// Bounded TTL cache, safe to share between tasks
pub struct ResponseCache<V> {
    store: Mutex<Store<V>>,
    capacity: usize,
    default_ttl: Duration,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        let capacity = capacity.max(1);
        let bound = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            store: Mutex::new(Store {
                entries: LruCache::new(bound),
                counters: Counters::default(),
            }),
            capacity,
            default_ttl,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity, Duration::from_millis(config.default_ttl_ms))
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up `key`. Expired entries are removed and reported as misses.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut guard = self.store.lock();
        let store = &mut *guard;

        let expired = match store.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.hit_count += 1;
                entry.last_accessed_at = now;
                let value = entry.value.clone();
                store.counters.hits += 1;
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            store.entries.pop(key);
            store.counters.expirations += 1;
            debug!(key, "cache entry expired");
        }
        store.counters.misses += 1;
        None
    }

    /// Inspect an entry without counting a hit or refreshing its recency
    pub fn peek(&self, key: &str) -> Option<CacheEntry<V>> {
        self.store.lock().entries.peek(key).cloned()
    }

    pub fn put(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let entry = CacheEntry::new(key.clone(), value, ttl);
        let mut store = self.store.lock();
        if let Some((evicted, _)) = store.entries.push(key.clone(), entry) {
            if evicted != key {
                store.counters.evictions += 1;
                debug!(key = %evicted, "evicted least recently used cache entry");
            }
        }
    }

    /// Insert with the cache's default TTL
    pub fn put_default(&self, key: impl Into<String>, value: V) {
        self.put(key, value, self.default_ttl);
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.store.lock().entries.pop(key).is_some()
    }

    pub fn clear(&self) {
        self.store.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.store.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let store = self.store.lock();
        let lookups = store.counters.hits + store.counters.misses;
        CacheStats {
            hits: store.counters.hits,
            misses: store.counters.misses,
            size: store.entries.len(),
            capacity: self.capacity,
            evictions: store.counters.evictions,
            expirations: store.counters.expirations,
            hit_rate: if lookups > 0 {
                store.counters.hits as f64 / lookups as f64
            } else {
                0.0
            },
        }
    }
}
