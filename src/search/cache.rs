//! Bounded TTL cache for query results.
//!
//! Entries expire after their TTL. When the cache is full, expired entries
//! are pruned first; if that frees nothing, the least recently used entry
//! is evicted.

use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use tokio::time::Instant;

use crate::error::Result;
use crate::search::backend::CacheStore;

/// Cached value with its expiry.
#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-process cache with per-entry expiry and a size bound.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: LruCache<String, Entry<V>>,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// Live value for `key`; an expired entry is dropped on access.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                self.entries.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let ttl = self.ttl;
        self.insert_with_ttl(key, value, ttl);
    }

    pub fn insert_with_ttl(&mut self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        if !self.entries.contains(&key) && self.entries.len() >= self.capacity() {
            self.prune_expired();
        }
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        if let Some((evicted, _)) = self.entries.push(key.clone(), entry) {
            if evicted != key {
                log::debug!("Cache full, evicted '{}'", evicted);
            }
        }
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn prune_expired(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.entries.pop(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// [`CacheStore`] over a shared [`TtlCache`].
///
/// Lets one cache instance back several services in the same process.
pub struct MemoryCacheStore {
    inner: Mutex<TtlCache<String>>,
}

impl MemoryCacheStore {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(TtlCache::new(ttl, max_entries)),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    fn name(&self) -> &str {
        "memory-cache"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.lock().unwrap_or_else(PoisonError::into_inner).get(key))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert_with_ttl(key, value, ttl);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).clear();
        Ok(())
    }
}
