//! Search index service.
//!
//! A facade over up to three tiers, chosen by probing:
//!
//! | Tier              | When                                         |
//! |-------------------|----------------------------------------------|
//! | `HEALTHY_PRIMARY` | primary engine answers its ping              |
//! | `DEGRADED_CACHE`  | primary down, external cache store reachable |
//! | `DEGRADED_MEMORY` | neither reachable                            |
//!
//! The in-memory index mirrors every indexed document whatever the tier, so
//! fallback queries always have data. Documents indexed while the primary is
//! unreachable are queued and replayed to it before it serves again. Query results are cached with a TTL
//! and are not invalidated when documents are re-indexed.
//!
//! Backend failures never reach callers of `search`, `get_suggestions` or
//! `index_items`; they trigger a re-probe and the call is answered from the
//! next tier down.

pub mod analyzer;
pub mod backend;
pub mod cache;
pub mod elastic;
pub mod memory;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{ContentRecord, ContentType, ScoredRecord, SearchConfig, SearchDocument, SearchOptions};

pub use backend::{CacheStore, IndexResult, SearchBackend};
pub use cache::{MemoryCacheStore, TtlCache};
pub use elastic::ElasticBackend;
pub use memory::{IndexSnapshot, MemoryBackend, MemoryIndex};

/// Minimum prefix length answered by [`SearchIndexService::get_suggestions`].
pub const MIN_SUGGEST_PREFIX: usize = 2;

/// Operating tier of the service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    HealthyPrimary,
    DegradedCache,
    DegradedMemory,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HealthyPrimary => "HEALTHY_PRIMARY",
            Self::DegradedCache => "DEGRADED_CACHE",
            Self::DegradedMemory => "DEGRADED_MEMORY",
        }
    }

    pub fn is_degraded(self) -> bool {
        self != Self::HealthyPrimary
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`SearchIndexService::health_check`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IndexHealth {
    pub tier: Tier,
    pub last_probe: Option<DateTime<Utc>>,
    pub approx_size: usize,
    pub last_update: Option<DateTime<Utc>>,
}

/// Result of [`SearchIndexService::get_index_stats`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub success: bool,
    /// Backend answering: `elasticsearch`, `cache` or `memory`
    pub index_type: String,
    pub total_items: usize,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
struct HealthState {
    tier: Tier,
    last_probe: Option<DateTime<Utc>>,
    last_update: Option<DateTime<Utc>>,
}

/// Cache key for a query: its JSON form, so equal requests share an entry.
fn cache_key(query: &str, content_type: Option<ContentType>, options: &SearchOptions) -> String {
    serde_json::to_string(&(query, content_type, options))
        .unwrap_or_else(|_| format!("{query}|{content_type:?}|{options:?}"))
}

/// Tiered search facade.
pub struct SearchIndexService {
    primary: Option<Arc<dyn SearchBackend>>,
    cache_store: Option<Arc<dyn CacheStore>>,
    memory: Arc<MemoryBackend>,
    results: Option<Mutex<TtlCache<Vec<ScoredRecord>>>>,
    state: Mutex<HealthState>,
    /// Ids stored in memory that the primary has not received
    pending: Mutex<BTreeSet<String>>,
    indexing: tokio::sync::Mutex<()>,
    probe_timeout: Duration,
    cache_ttl: Duration,
    default_size: usize,
}

impl SearchIndexService {
    /// Build the service from configuration without probing.
    ///
    /// A `[search.primary]` section without credentials is a
    /// [`AppError::Config`].
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let primary = match &config.primary {
            Some(primary) => {
                let backend = ElasticBackend::new(primary, &config.index_name)?;
                Some(Arc::new(backend) as Arc<dyn SearchBackend>)
            }
            None => None,
        };

        let cache_ttl = Duration::from_secs(config.cache_ttl_secs);
        let results = config
            .cache_enabled
            .then(|| Mutex::new(TtlCache::new(cache_ttl, config.cache_max_entries)));

        Ok(Self {
            primary,
            cache_store: None,
            memory: Arc::new(MemoryBackend::new()),
            results,
            state: Mutex::new(HealthState {
                tier: Tier::DegradedMemory,
                last_probe: None,
                last_update: None,
            }),
            pending: Mutex::new(BTreeSet::new()),
            indexing: tokio::sync::Mutex::new(()),
            probe_timeout: Duration::from_millis(config.probe_timeout_ms.max(1)),
            cache_ttl,
            default_size: config.default_size.max(1),
        })
    }

    /// Build from configuration and probe once.
    pub async fn connect(config: &SearchConfig) -> Result<Self> {
        let service = Self::new(config)?;
        service.probe().await;
        Ok(service)
    }

    /// Replace the primary engine.
    pub fn with_primary(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.primary = Some(backend);
        self
    }

    /// Add an external cache store as the middle tier.
    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    /// Seed the memory tier, and the primary's replay queue, from a snapshot.
    pub fn with_snapshot(mut self, mut snapshot: IndexSnapshot) -> Self {
        let last_update = snapshot.updated_at;
        *self.pending.get_mut().unwrap_or_else(PoisonError::into_inner) =
            std::mem::take(&mut snapshot.pending);
        self.memory = Arc::new(MemoryBackend::from_snapshot(snapshot));
        self.lock_state().last_update = last_update;
        self
    }

    /// Snapshot of the memory tier for persistence.
    pub fn snapshot(&self) -> IndexSnapshot {
        let mut snapshot = self.memory.read(MemoryIndex::snapshot);
        snapshot.pending = self.lock_pending().clone();
        snapshot
    }

    /// Number of documents waiting to be replayed to the primary.
    pub fn pending_replay(&self) -> usize {
        self.lock_pending().len()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, HealthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `ids` for the primary; a no-op when none is configured.
    fn queue_for_primary<'a>(&self, ids: impl IntoIterator<Item = &'a str>) {
        if self.primary.is_some() {
            self.lock_pending().extend(ids.into_iter().map(str::to_string));
        }
    }

    /// Currently selected tier, as of the last probe.
    pub fn tier(&self) -> Tier {
        self.lock_state().tier
    }

    async fn ping_within<F>(&self, name: &str, ping: F) -> bool
    where
        F: std::future::Future<Output = Result<()>>,
    {
        match tokio::time::timeout(self.probe_timeout, ping).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                log::debug!("Probe of '{}' failed: {}", name, e);
                false
            }
            Err(_) => {
                log::debug!("Probe of '{}' timed out after {:?}", name, self.probe_timeout);
                false
            }
        }
    }

    /// Ping backends top-down and select the tier.
    ///
    /// A reachable primary is only selected once it has received every
    /// queued document.
    pub async fn probe(&self) -> Tier {
        let mut tier = Tier::DegradedMemory;
        if let Some(primary) = &self.primary {
            if self.ping_within(primary.name(), primary.ping()).await
                && self.replay_pending(primary.as_ref()).await
            {
                tier = Tier::HealthyPrimary;
            }
        }
        if tier != Tier::HealthyPrimary {
            if let Some(store) = &self.cache_store {
                if self.ping_within(store.name(), store.ping()).await {
                    tier = Tier::DegradedCache;
                }
            }
        }

        let previous = {
            let mut state = self.lock_state();
            let previous = state.tier;
            state.tier = tier;
            state.last_probe = Some(Utc::now());
            previous
        };
        if previous != tier && tier.is_degraded() {
            log::warn!("Search tier changed: {} -> {}", previous, tier);
        } else if previous != tier {
            log::info!("Search tier changed: {} -> {}", previous, tier);
        }
        tier
    }

    /// Send queued documents to `primary`. False if the replay failed.
    async fn replay_pending(&self, primary: &dyn SearchBackend) -> bool {
        let ids: Vec<String> = self.lock_pending().iter().cloned().collect();
        if ids.is_empty() {
            return true;
        }
        let docs: Vec<SearchDocument> = self.memory.read(|index| {
            ids.iter()
                .filter_map(|id| index.get(id).cloned())
                .collect()
        });

        let result = if docs.is_empty() {
            IndexResult::default()
        } else {
            match primary.bulk_upsert(&docs).await {
                Ok(result) => result,
                Err(e) => {
                    log::warn!(
                        "Replaying {} document(s) to '{}' failed: {}",
                        docs.len(),
                        primary.name(),
                        e
                    );
                    return false;
                }
            }
        };

        // Ids no longer in memory were deleted meanwhile and are dropped too.
        let mut pending = self.lock_pending();
        for id in &ids {
            if !result.failed_ids.contains(id) {
                pending.remove(id);
            }
        }
        log::info!(
            "Replayed {} document(s) to '{}', {} still queued",
            result.successful,
            primary.name(),
            pending.len()
        );
        true
    }

    /// Primary engine, if the current tier allows using it.
    fn active_primary(&self) -> Option<&Arc<dyn SearchBackend>> {
        self.primary
            .as_ref()
            .filter(|_| self.tier() == Tier::HealthyPrimary)
    }

    /// External cache store, if the current tier allows using it.
    fn active_cache_store(&self) -> Option<&Arc<dyn CacheStore>> {
        self.cache_store
            .as_ref()
            .filter(|_| self.tier() != Tier::DegradedMemory)
    }

    async fn degrade(&self, operation: &str, error: &AppError) {
        log::warn!("Primary search backend failed during {}: {}", operation, error);
        self.probe().await;
    }

    /// Create the index. Idempotent; fallback tiers reset the memory index.
    pub async fn create_index(&self) -> bool {
        if let Some(primary) = self.active_primary() {
            match primary.create_index().await {
                Ok(()) => return true,
                Err(e) => self.degrade("create_index", &e).await,
            }
        }
        self.memory.create_index().await.is_ok()
    }

    /// Drop the index everywhere and forget cached results.
    pub async fn delete_index(&self) -> bool {
        let mut ok = true;
        if let Some(primary) = self.active_primary() {
            if let Err(e) = primary.delete_index().await {
                ok = false;
                self.degrade("delete_index", &e).await;
            }
        }
        self.clear_cache().await;
        self.lock_pending().clear();
        self.memory.delete_index().await.is_ok() && ok
    }

    /// Forget all cached query results.
    pub async fn clear_cache(&self) {
        if let Some(results) = &self.results {
            results.lock().unwrap_or_else(PoisonError::into_inner).clear();
        }
        if let Some(store) = self.active_cache_store() {
            if let Err(e) = store.clear().await {
                log::warn!("Failed to clear cache store '{}': {}", store.name(), e);
            }
        }
    }

    /// Upsert `items` by id.
    ///
    /// Only one batch runs at a time; a batch arriving while another is in
    /// flight is rejected whole.
    pub async fn index_items(&self, items: &[ContentRecord]) -> IndexResult {
        let Ok(_guard) = self.indexing.try_lock() else {
            log::warn!("Indexing batch of {} rejected: another batch is in flight", items.len());
            return IndexResult::rejected(items.len());
        };
        if items.is_empty() {
            return IndexResult::default();
        }

        let docs: Vec<SearchDocument> = items.iter().map(SearchDocument::from).collect();
        let mirrored = match self.memory.bulk_upsert(&docs).await {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Memory index upsert failed: {}", e);
                IndexResult::rejected(docs.len())
            }
        };

        let ids = || docs.iter().map(|doc| doc.id.as_str());
        let result = match self.active_primary() {
            Some(primary) => match self.upsert_with_retry(primary.as_ref(), &docs).await {
                Ok(stored) => {
                    let mut pending = self.lock_pending();
                    for id in ids().filter(|id| stored.stored_id(id)) {
                        pending.remove(id);
                    }
                    drop(pending);
                    self.queue_for_primary(stored.failed_ids.iter().map(String::as_str));
                    stored
                }
                Err(e) => {
                    self.queue_for_primary(ids());
                    self.degrade("index_items", &e).await;
                    log::warn!(
                        "Indexed {} document(s) into the memory tier only, queued for the primary",
                        mirrored.successful
                    );
                    mirrored
                }
            },
            None => {
                self.queue_for_primary(ids());
                mirrored
            }
        };

        if result.successful > 0 {
            self.lock_state().last_update = Some(Utc::now());
        }
        log::info!(
            "Indexed batch: {} successful, {} failed ({})",
            result.successful,
            result.failed,
            self.tier()
        );
        result
    }

    async fn upsert_with_retry(
        &self,
        primary: &dyn SearchBackend,
        docs: &[SearchDocument],
    ) -> Result<IndexResult> {
        match primary.bulk_upsert(docs).await {
            Ok(result) => Ok(result),
            Err(e) => {
                log::warn!("Bulk upsert to '{}' failed, retrying once: {}", primary.name(), e);
                primary.bulk_upsert(docs).await
            }
        }
    }

    /// Search for `query`.
    ///
    /// A missing or blank query returns no results. Never fails.
    pub async fn search(
        &self,
        query: Option<&str>,
        content_type: Option<ContentType>,
        options: &SearchOptions,
    ) -> Vec<ScoredRecord> {
        let Some(query) = query.map(str::trim).filter(|q| !q.is_empty()) else {
            return Vec::new();
        };
        let size = options.size.filter(|s| *s > 0).unwrap_or(self.default_size);
        let key = cache_key(query, content_type, options);

        if let Some(hit) = self.cached(&key).await {
            log::debug!("Cache hit for '{}'", query);
            return hit.into_iter().take(size).collect();
        }

        let mut results = None;
        if let Some(primary) = self.active_primary() {
            match primary.query(query, content_type, options, size).await {
                Ok(found) => results = Some(found),
                Err(e) => self.degrade("search", &e).await,
            }
        }
        let mut results = match results {
            Some(found) => found,
            None => self
                .memory
                .query(query, content_type, options, size)
                .await
                .unwrap_or_default(),
        };
        results.truncate(size);

        self.store(&key, &results).await;
        results
    }

    async fn cached(&self, key: &str) -> Option<Vec<ScoredRecord>> {
        if let Some(results) = &self.results {
            let hit = results.lock().unwrap_or_else(PoisonError::into_inner).get(key);
            if hit.is_some() {
                return hit;
            }
        }

        let store = self.active_cache_store()?;
        match store.get(key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).ok(),
            Ok(None) => None,
            Err(e) => {
                log::warn!("Cache store '{}' read failed: {}", store.name(), e);
                self.probe().await;
                None
            }
        }
    }

    async fn store(&self, key: &str, results: &[ScoredRecord]) {
        if let Some(cache) = &self.results {
            cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key, results.to_vec());
        }

        let Some(store) = self.active_cache_store() else {
            return;
        };
        let Ok(raw) = serde_json::to_string(results) else {
            return;
        };
        if let Err(e) = store.set(key, raw, self.cache_ttl).await {
            log::warn!("Cache store '{}' write failed: {}", store.name(), e);
            self.probe().await;
        }
    }

    /// Title completions for `prefix`; prefixes shorter than two characters
    /// get none.
    pub async fn get_suggestions(&self, prefix: &str, size: usize) -> Vec<String> {
        let prefix = prefix.trim();
        if prefix.chars().count() < MIN_SUGGEST_PREFIX || size == 0 {
            return Vec::new();
        }

        if let Some(primary) = self.active_primary() {
            match primary.suggest(prefix, size).await {
                Ok(mut found) => {
                    found.truncate(size);
                    return found;
                }
                Err(e) => self.degrade("get_suggestions", &e).await,
            }
        }
        let mut found = self.memory.suggest(prefix, size).await.unwrap_or_default();
        found.truncate(size);
        found
    }

    async fn size_and_backend(&self) -> (usize, &str) {
        if let Some(primary) = self.active_primary() {
            match primary.count().await {
                Ok(count) => return (count, primary.name()),
                Err(e) => self.degrade("count", &e).await,
            }
        }
        let backend = if self.tier() == Tier::DegradedCache {
            "cache"
        } else {
            self.memory.name()
        };
        (self.memory.len(), backend)
    }

    /// Re-probe backends and report the selected tier.
    pub async fn health_check(&self) -> IndexHealth {
        let tier = self.probe().await;
        let (approx_size, _) = self.size_and_backend().await;
        let state = *self.lock_state();
        IndexHealth {
            tier,
            last_probe: state.last_probe,
            approx_size,
            last_update: state.last_update.or_else(|| self.memory.read(MemoryIndex::updated_at)),
        }
    }

    /// Document count and last update of the active backend.
    pub async fn get_index_stats(&self) -> IndexStats {
        let (total_items, backend) = self.size_and_backend().await;
        let last_update = self.lock_state().last_update;
        IndexStats {
            success: true,
            index_type: backend.to_string(),
            total_items,
            last_update: last_update.or_else(|| self.memory.read(MemoryIndex::updated_at)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    /// Primary engine whose availability can be toggled.
    struct FakePrimary {
        up: AtomicBool,
        refuse_writes: AtomicBool,
        upserts: AtomicUsize,
        inner: MemoryBackend,
    }

    impl FakePrimary {
        fn new(up: bool) -> Arc<Self> {
            Arc::new(Self {
                up: AtomicBool::new(up),
                refuse_writes: AtomicBool::new(false),
                upserts: AtomicUsize::new(0),
                inner: MemoryBackend::new(),
            })
        }

        fn check(&self) -> Result<()> {
            if self.up.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(AppError::backend("fake", "connection refused"))
            }
        }
    }

    #[async_trait]
    impl SearchBackend for FakePrimary {
        fn name(&self) -> &str {
            "fake"
        }
        async fn ping(&self) -> Result<()> {
            self.check()
        }
        async fn create_index(&self) -> Result<()> {
            self.check()
        }
        async fn delete_index(&self) -> Result<()> {
            self.check()?;
            self.inner.delete_index().await
        }
        async fn bulk_upsert(&self, docs: &[SearchDocument]) -> Result<IndexResult> {
            self.upserts.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            if self.refuse_writes.load(Ordering::SeqCst) {
                return Err(AppError::backend("fake", "index is read-only"));
            }
            self.inner.bulk_upsert(docs).await
        }
        async fn query(
            &self,
            query: &str,
            content_type: Option<ContentType>,
            options: &SearchOptions,
            size: usize,
        ) -> Result<Vec<ScoredRecord>> {
            self.check()?;
            self.inner.query(query, content_type, options, size).await
        }
        async fn suggest(&self, prefix: &str, size: usize) -> Result<Vec<String>> {
            self.check()?;
            self.inner.suggest(prefix, size).await
        }
        async fn count(&self) -> Result<usize> {
            self.check()?;
            self.inner.count().await
        }
    }

    /// Primary engine that never answers a ping.
    struct HangingPrimary;

    #[async_trait]
    impl SearchBackend for HangingPrimary {
        fn name(&self) -> &str {
            "hanging"
        }
        async fn ping(&self) -> Result<()> {
            futures::future::pending().await
        }
        async fn create_index(&self) -> Result<()> {
            futures::future::pending().await
        }
        async fn delete_index(&self) -> Result<()> {
            futures::future::pending().await
        }
        async fn bulk_upsert(&self, _docs: &[SearchDocument]) -> Result<IndexResult> {
            futures::future::pending().await
        }
        async fn query(
            &self,
            _query: &str,
            _content_type: Option<ContentType>,
            _options: &SearchOptions,
            _size: usize,
        ) -> Result<Vec<ScoredRecord>> {
            futures::future::pending().await
        }
        async fn suggest(&self, _prefix: &str, _size: usize) -> Result<Vec<String>> {
            futures::future::pending().await
        }
        async fn count(&self) -> Result<usize> {
            futures::future::pending().await
        }
    }

    fn record(id: &str, title: &str) -> ContentRecord {
        ContentRecord {
            id: id.to_string(),
            title: title.to_string(),
            source_url: format!("https://coflix.example/{id}"),
            poster: format!("https://coflix.example/{id}.jpg"),
            content_type: ContentType::Movie,
            rating: 4.0,
            year: Some(2020),
            source: "coflix".into(),
            description: String::new(),
            genres: Vec::new(),
            country: None,
            episodes_available: None,
            synthetic: false,
        }
    }

    fn service() -> SearchIndexService {
        SearchIndexService::new(&SearchConfig::default()).unwrap()
    }

    #[test]
    fn test_configured_primary_without_credentials_is_fatal() {
        let mut config = SearchConfig::default();
        config.primary = Some(crate::models::PrimaryEngineConfig {
            endpoint: "http://localhost:9200".into(),
            api_key: None,
            username: None,
            password: None,
        });
        assert!(matches!(SearchIndexService::new(&config), Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_memory_only_service() {
        let service = service();
        assert_eq!(service.probe().await, Tier::DegradedMemory);

        let result = service.index_items(&[record("a", "Dune"), record("b", "Dune Part Two")]).await;
        assert_eq!(result, IndexResult::stored(2));

        let hits = service.search(Some("dune"), None, &SearchOptions::default()).await;
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.score > 0.0));
    }

    #[tokio::test]
    async fn test_index_items_is_idempotent() {
        let service = service();
        let items = vec![record("a", "Dune")];

        service.index_items(&items).await;
        service.index_items(&items).await;

        let stats = service.get_index_stats().await;
        assert!(stats.success);
        assert_eq!(stats.total_items, 1);
        assert_eq!(stats.index_type, "memory");
        assert!(stats.last_update.is_some());
    }

    #[tokio::test]
    async fn test_empty_query_returns_nothing() {
        let service = service();
        service.index_items(&[record("a", "Dune")]).await;

        assert!(service.search(Some(""), None, &SearchOptions::default()).await.is_empty());
        assert!(service.search(Some("   "), None, &SearchOptions::default()).await.is_empty());
        assert!(service.search(None, None, &SearchOptions::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_suggestion_limits() {
        let service = service();
        service
            .index_items(&[
                record("a", "Atlantics"),
                record("b", "Attack on Titan"),
                record("c", "Atonement"),
            ])
            .await;

        assert!(service.get_suggestions("a", 5).await.is_empty());
        assert_eq!(service.get_suggestions("at", 2).await.len(), 2);
        assert!(service.get_suggestions("at", 5).await.len() <= 5);
    }

    #[tokio::test]
    async fn test_results_are_capped_and_cached() {
        let service = service();
        let items: Vec<_> = (0..30).map(|i| record(&format!("m{i}"), &format!("Movie {i}"))).collect();
        service.index_items(&items).await;

        let hits = service.search(Some("movie"), None, &SearchOptions::default()).await;
        assert_eq!(hits.len(), 20);

        let options = SearchOptions {
            size: Some(5),
            ..SearchOptions::default()
        };
        assert_eq!(service.search(Some("movie"), None, &options).await.len(), 5);

        // Cached results survive re-indexing until their TTL expires.
        service.delete_index().await;
        service.index_items(&items).await;
        service.index_items(&[record("x", "Movie extra")]).await;
        let before = service.search(Some("movie"), None, &options).await;
        service.index_items(&[record("y", "Movie extra two")]).await;
        let after = service.search(Some("movie"), None, &options).await;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_unreachable_primary_falls_back_to_memory() {
        let primary = FakePrimary::new(false);
        let service = service().with_primary(primary.clone());
        assert_eq!(service.probe().await, Tier::DegradedMemory);

        let result = service.index_items(&[record("a", "Dune")]).await;
        assert_eq!(result.successful, 1);
        assert_eq!(primary.upserts.load(Ordering::SeqCst), 0);

        let hits = service.search(Some("dune"), None, &SearchOptions::default()).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(service.health_check().await.tier, Tier::DegradedMemory);
    }

    #[tokio::test]
    async fn test_primary_failure_mid_run_degrades() {
        let primary = FakePrimary::new(true);
        let service = service().with_primary(primary.clone());
        assert_eq!(service.probe().await, Tier::HealthyPrimary);

        service.index_items(&[record("a", "Dune")]).await;
        assert_eq!(primary.inner.len(), 1);
        assert_eq!(service.get_index_stats().await.index_type, "fake");

        primary.up.store(false, Ordering::SeqCst);
        let result = service.index_items(&[record("b", "Arrival")]).await;
        assert_eq!(result, IndexResult::stored(1));
        // first attempt plus one retry
        assert_eq!(primary.upserts.load(Ordering::SeqCst), 3);
        assert_eq!(service.tier(), Tier::DegradedMemory);

        let hits = service.search(Some("arrival"), None, &SearchOptions::default()).await;
        assert_eq!(hits.len(), 1);

        primary.up.store(true, Ordering::SeqCst);
        assert_eq!(service.health_check().await.tier, Tier::HealthyPrimary);
        assert_eq!(primary.inner.len(), 2);
    }

    #[tokio::test]
    async fn test_recovered_primary_receives_documents_indexed_while_down() {
        let primary = FakePrimary::new(false);
        let service = service().with_primary(primary.clone());
        assert_eq!(service.probe().await, Tier::DegradedMemory);

        let result = service.index_items(&[record("a", "Dune")]).await;
        assert_eq!(result, IndexResult::stored(1));
        assert_eq!(service.pending_replay(), 1);

        primary.up.store(true, Ordering::SeqCst);
        assert_eq!(service.health_check().await.tier, Tier::HealthyPrimary);
        assert_eq!(service.pending_replay(), 0);
        assert_eq!(primary.inner.len(), 1);

        let hits = service.search(Some("dune"), None, &SearchOptions::default()).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(service.get_index_stats().await.index_type, "fake");
    }

    #[tokio::test]
    async fn test_failed_replay_keeps_primary_out_of_service() {
        let primary = FakePrimary::new(false);
        let service = service().with_primary(primary.clone());
        service.index_items(&[record("a", "Dune")]).await;

        // Ping succeeds but the replay upsert is refused.
        primary.up.store(true, Ordering::SeqCst);
        primary.refuse_writes.store(true, Ordering::SeqCst);
        assert_eq!(service.probe().await, Tier::DegradedMemory);
        assert_eq!(service.pending_replay(), 1);

        primary.refuse_writes.store(false, Ordering::SeqCst);
        assert_eq!(service.probe().await, Tier::HealthyPrimary);
        assert_eq!(primary.inner.len(), 1);
    }

    #[tokio::test]
    async fn test_replay_queue_survives_snapshot() {
        let primary = FakePrimary::new(false);
        let service = service().with_primary(primary.clone());
        service.index_items(&[record("a", "Dune")]).await;
        let snapshot = service.snapshot();
        assert_eq!(snapshot.pending.len(), 1);

        primary.up.store(true, Ordering::SeqCst);
        let restored = SearchIndexService::new(&SearchConfig::default())
            .unwrap()
            .with_primary(primary.clone())
            .with_snapshot(snapshot);
        assert_eq!(restored.probe().await, Tier::HealthyPrimary);
        assert_eq!(primary.inner.len(), 1);
        assert!(restored.snapshot().pending.is_empty());
    }

    #[tokio::test]
    async fn test_memory_only_service_queues_nothing() {
        let service = service();
        service.index_items(&[record("a", "Dune")]).await;
        assert_eq!(service.pending_replay(), 0);
    }

    #[tokio::test]
    async fn test_cache_store_tier() {
        let store = Arc::new(MemoryCacheStore::new(Duration::from_secs(60), 10));
        let service = service()
            .with_primary(FakePrimary::new(false))
            .with_cache_store(store.clone());

        assert_eq!(service.health_check().await.tier, Tier::DegradedCache);
        service.index_items(&[record("a", "Dune")]).await;
        service.search(Some("dune"), None, &SearchOptions::default()).await;
        assert_eq!(store.len(), 1);
        assert_eq!(service.get_index_stats().await.index_type, "cache");
    }

    #[tokio::test]
    async fn test_hanging_primary_probe_times_out() {
        let config = SearchConfig {
            probe_timeout_ms: 20,
            ..SearchConfig::default()
        };
        let service = SearchIndexService::new(&config)
            .unwrap()
            .with_primary(Arc::new(HangingPrimary));

        assert_eq!(service.probe().await, Tier::DegradedMemory);
        service.index_items(&[record("a", "Dune")]).await;
        assert_eq!(service.search(Some("dune"), None, &SearchOptions::default()).await.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_batch_is_rejected() {
        let service = service();
        let guard = service.indexing.lock().await;

        let result = service.index_items(&[record("a", "Dune"), record("b", "Arrival")]).await;
        assert_eq!(result, IndexResult::rejected(2));

        drop(guard);
        let result = service.index_items(&[record("a", "Dune")]).await;
        assert_eq!(result.successful, 1);
    }

    #[tokio::test]
    async fn test_snapshot_restores_memory_tier() {
        let service = service();
        service.index_items(&[record("a", "Dune")]).await;

        let restored = SearchIndexService::new(&SearchConfig::default())
            .unwrap()
            .with_snapshot(service.snapshot());
        assert_eq!(restored.get_index_stats().await.total_items, 1);
        assert_eq!(restored.search(Some("dune"), None, &SearchOptions::default()).await.len(), 1);
    }
}
