//! Key-value store contract and an in-process LRU implementation.
//!
//! The gateway only ever talks to [`KeyValueCache`]. Production hosts plug in
//! their shared store (Redis, memcached, ...); [`InMemoryLruCache`] covers
//! tests, the CLI and single-process deployments. Entries expire after their
//! TTL and are evicted least-recently-used when the store reaches capacity.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::StoreError;

/// Options accepted by [`KeyValueCache::set`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheSetOptions {
    /// Time-to-live. `None`, or a TTL too large to represent as a deadline,
    /// keeps the entry until it is evicted.
    pub ttl: Option<Duration>,
}

impl CacheSetOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl) }
    }
}

/// External key-value store holding serialized payloads.
///
/// Implementations must be safe for concurrent `get`/`set`; callers add no
/// locking of their own.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// Look up `key`. Missing and expired keys both return `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous entry.
    async fn set(&self, key: &str, value: String, options: CacheSetOptions)
        -> Result<(), StoreError>;
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
    /// Logical access clock; smallest is least recently used.
    accessed: u64,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    clock: u64,
    hits: u64,
    misses: u64,
}

impl Inner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// In-process key-value store with TTL expiry and LRU eviction.
#[derive(Debug)]
pub struct InMemoryLruCache {
    inner: Mutex<Inner>,
    max_entries: usize,
}

impl InMemoryLruCache {
    /// Create a store holding at most `max_entries` entries.
    ///
    /// `max_entries` is clamped to a minimum of 1 so eviction always terminates.
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Number of entries currently held, including not-yet-collected expired ones.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    /// Remove all entries. Hit/miss counters are kept.
    pub async fn clear(&self) {
        self.inner.lock().await.entries.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().await;
        CacheStats {
            total_entries: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
        }
    }

    fn evict_expired(inner: &mut Inner, now: Instant) {
        inner.entries.retain(|_, e| !e.is_expired(now));
    }

    fn evict_lru(inner: &mut Inner) {
        if let Some(lru_key) = inner
            .entries
            .iter()
            .min_by_key(|(_, e)| e.accessed)
            .map(|(k, _)| k.clone())
        {
            debug!(key = %lru_key, "Evicting LRU cache entry");
            inner.entries.remove(&lru_key);
        }
    }
}

impl Default for InMemoryLruCache {
    fn default() -> Self {
        Self::new(crate::config::CacheConfig::default().max_entries)
    }
}

#[async_trait]
impl KeyValueCache for InMemoryLruCache {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let expired = inner.entries.get(key).map(|e| e.is_expired(now));
        match expired {
            Some(true) => {
                debug!(key, "Cache entry expired, removing");
                inner.entries.remove(key);
                inner.misses += 1;
                Ok(None)
            }
            Some(false) => {
                let tick = inner.tick();
                inner.hits += 1;
                Ok(inner.entries.get_mut(key).map(|entry| {
                    entry.accessed = tick;
                    entry.value.clone()
                }))
            }
            None => {
                inner.misses += 1;
                Ok(None)
            }
        }
    }

    async fn set(
        &self,
        key: &str,
        value: String,
        options: CacheSetOptions,
    ) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        Self::evict_expired(&mut inner, now);
        if !inner.entries.contains_key(key) {
            while inner.entries.len() >= self.max_entries {
                Self::evict_lru(&mut inner);
            }
        }
        let accessed = inner.tick();
        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                // A TTL past the clock's range never expires.
                expires_at: options.ttl.and_then(|ttl| now.checked_add(ttl)),
                accessed,
            },
        );
        Ok(())
    }
}

/// Aggregate store statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries currently in the store.
    pub total_entries: usize,
    /// Lookups answered from the store.
    pub hits: u64,
    /// Lookups for absent or expired keys.
    pub misses: u64,
}
