//! End-to-end ingestion: extraction, dedup and indexing across two runs.

use std::sync::Arc;

use async_trait::async_trait;
use catalog_crawler::error::{AppError, Result};
use catalog_crawler::models::{
    Config, ContentType, ExtractionConfig, ScoredRecord, SearchConfig, SearchDocument,
    SearchOptions, SourceConfig,
};
use catalog_crawler::pipeline::Orchestrator;
use catalog_crawler::search::{IndexResult, SearchBackend, SearchIndexService, Tier};
use catalog_crawler::services::{DedupTracker, ExtractionEngine};
use catalog_crawler::utils::http::StaticFetcher;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const FIXTURE: &str = r#"
<html><body>
  <main>
    <div class="items">
      <article class="item">
        <a href="/watch/blade-runner-2049"><img data-src="/posters/br2049.jpg" alt="Blade Runner 2049"></a>
        <h3 class="title">Blade Runner 2049</h3>
        <span class="year">2017</span>
        <span class="rating">8.0</span>
      </article>
      <article class="item">
        <a href="/watch/arrival"><img src="/posters/arrival.jpg"></a>
        <h3 class="title">Arrival</h3>
        <span class="year">2016</span>
        <span class="rating">79</span>
      </article>
      <article class="item">
        <a href="/watch/the-lighthouse"><h3 class="title">The Lighthouse</h3></a>
        <span class="year">2019</span>
        <span class="rating">3.7</span>
      </article>
    </div>
  </main>
</body></html>
"#;

/// Primary engine that refuses every connection.
struct UnreachablePrimary;

fn refused() -> AppError {
    AppError::backend("unreachable", "connection refused")
}

#[async_trait]
impl SearchBackend for UnreachablePrimary {
    fn name(&self) -> &str {
        "unreachable"
    }
    async fn ping(&self) -> Result<()> {
        Err(refused())
    }
    async fn create_index(&self) -> Result<()> {
        Err(refused())
    }
    async fn delete_index(&self) -> Result<()> {
        Err(refused())
    }
    async fn bulk_upsert(&self, _docs: &[SearchDocument]) -> Result<IndexResult> {
        Err(refused())
    }
    async fn query(
        &self,
        _query: &str,
        _content_type: Option<ContentType>,
        _options: &SearchOptions,
        _size: usize,
    ) -> Result<Vec<ScoredRecord>> {
        Err(refused())
    }
    async fn suggest(&self, _prefix: &str, _size: usize) -> Result<Vec<String>> {
        Err(refused())
    }
    async fn count(&self) -> Result<usize> {
        Err(refused())
    }
}

fn source() -> SourceConfig {
    let mut source = SourceConfig::new("src", "https://src.example/");
    source.content_type = ContentType::Movie;
    source
}

fn engine() -> ExtractionEngine {
    let config = ExtractionConfig {
        rating_seed: Some(42),
        ..ExtractionConfig::default()
    };
    ExtractionEngine::new(&config).unwrap()
}

#[tokio::test]
async fn test_extract_dedup_index_twice() {
    let engine = engine();
    let records = engine.extract(Some(FIXTURE), &source(), 10, false).unwrap();

    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| (0.0..=5.0).contains(&r.rating)));
    assert!(records.iter().all(|r| !r.title.is_empty() && !r.synthetic));
    let lighthouse = records.iter().find(|r| r.title == "The Lighthouse").unwrap();
    assert_eq!(lighthouse.poster, ExtractionConfig::default().placeholder_image);

    let mut tracker = DedupTracker::new();
    assert!(records.iter().all(|r| tracker.is_new(r)));

    let search = SearchIndexService::new(&SearchConfig::default()).unwrap();
    let result = search.index_items(&records).await;
    assert_eq!(result.successful, 3);
    tracker.record_ingested(&records);
    assert_eq!(search.get_index_stats().await.total_items, 3);

    // Same page, fresh engine: identical ids, nothing new.
    let again = crate::engine().extract(Some(FIXTURE), &source(), 10, false).unwrap();
    assert!(again.iter().all(|r| !tracker.is_new(r)));
    search.index_items(&again).await;
    assert_eq!(search.get_index_stats().await.total_items, 3);
}

#[tokio::test]
async fn test_unreachable_primary_serves_from_memory() {
    let search = SearchIndexService::new(&SearchConfig::default())
        .unwrap()
        .with_primary(Arc::new(UnreachablePrimary));
    search.probe().await;

    let records = engine().extract(Some(FIXTURE), &source(), 10, false).unwrap();
    let result = search.index_items(&records).await;
    assert_eq!(result.successful, 3);

    let hits = search.search(Some("arrival"), None, &SearchOptions::default()).await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.title, "Arrival");

    assert!(search.search(Some(""), None, &SearchOptions::default()).await.is_empty());
    assert!(search.search(None, None, &SearchOptions::default()).await.is_empty());
    assert!(search.get_suggestions("a", 5).await.is_empty());
    assert!(search.get_suggestions("ar", 5).await.len() <= 5);

    assert_eq!(search.health_check().await.tier, Tier::DegradedMemory);
}

#[tokio::test]
async fn test_orchestrated_passes_persist_tracker() {
    let tmp = TempDir::new().unwrap();
    let tracker_path = tmp.path().join("cache.json");

    let mut config = Config::default();
    config.extraction.rating_seed = Some(7);
    let fetcher = Arc::new(StaticFetcher::new().with_page("https://src.example/", FIXTURE));
    let search = Arc::new(SearchIndexService::new(&config.search).unwrap());

    let mut first = Orchestrator::new(
        &config,
        fetcher.clone(),
        Arc::clone(&search),
        DedupTracker::load(&tracker_path).await,
    )
    .unwrap()
    .with_tracker_path(&tracker_path);
    let summary = first
        .update_all(&[source()], 20, &CancellationToken::new())
        .await;
    assert_eq!(summary.total_new, 3);
    assert!(summary.tracker_saved);

    // A new process picks the tracker up from disk.
    let mut second = Orchestrator::new(
        &config,
        fetcher,
        Arc::clone(&search),
        DedupTracker::load(&tracker_path).await,
    )
    .unwrap()
    .with_tracker_path(&tracker_path);
    let summary = second
        .update_all(&[source()], 20, &CancellationToken::new())
        .await;
    assert_eq!(summary.total_new, 0);
    assert_eq!(summary.sources[0].extracted, 3);
    assert_eq!(search.get_index_stats().await.total_items, 3);
}
