// src/pipeline/orchestrator.rs

//! Ingestion orchestrator.
//!
//! Drives every source through fetch → extract → categorize → dedup →
//! index → record. Pages are fetched and extracted concurrently; filtering,
//! indexing and recording run one source at a time so the tracker and the
//! search index only ever see a single writer.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{Config, ContentRecord, SourceConfig};
use crate::pipeline::categorize::categorize;
use crate::search::{SearchIndexService, Tier};
use crate::services::{DedupTracker, ExtractionEngine};
use crate::utils::http::PageFetcher;

/// Per-source counters for one pass.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceOutcome {
    pub source: String,
    /// Records requested from the extractor
    pub target: usize,
    pub extracted: usize,
    pub synthetic: usize,
    pub new_items: usize,
    pub indexed: usize,
    pub index_failed: usize,
    pub error: Option<String>,
}

impl SourceOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of [`Orchestrator::update_all`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceOutcome>,
    pub succeeded: usize,
    pub failed: usize,
    pub total_new: usize,
    pub total_indexed: usize,
    pub cancelled: bool,
    pub tracker_saved: bool,
    /// Search tier after the pass
    pub search_tier: Tier,
}

/// Ingestion driver owning the dedup tracker.
pub struct Orchestrator {
    fetcher: Arc<dyn PageFetcher>,
    extractor: ExtractionEngine,
    tracker: DedupTracker,
    tracker_path: Option<PathBuf>,
    search: Arc<SearchIndexService>,
    growth_per_pass: usize,
    concurrency: usize,
    index_synthetic: bool,
    debug: bool,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        fetcher: Arc<dyn PageFetcher>,
        search: Arc<SearchIndexService>,
        tracker: DedupTracker,
    ) -> Result<Self> {
        Ok(Self {
            fetcher,
            extractor: ExtractionEngine::new(&config.extraction)?,
            tracker,
            tracker_path: None,
            search,
            growth_per_pass: config.ingest.growth_per_pass,
            concurrency: config.fetch.max_concurrent.max(1),
            index_synthetic: config.ingest.index_synthetic,
            debug: config.ingest.debug_extraction,
        })
    }

    /// Persist tracker state to `path` at the end of every pass.
    pub fn with_tracker_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.tracker_path = Some(path.into());
        self
    }

    pub fn with_extractor(mut self, extractor: ExtractionEngine) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn tracker(&self) -> &DedupTracker {
        &self.tracker
    }

    pub fn search(&self) -> &Arc<SearchIndexService> {
        &self.search
    }

    /// Records requested from a source this pass.
    pub fn target_for(&self, source: &SourceConfig, min_items: usize) -> usize {
        let existing = self.tracker.known_count_for_source(&source.id);
        min_items.max(existing + self.growth_per_pass)
    }

    /// Run one ingestion pass over `sources`.
    ///
    /// Never fails: per-source errors are logged and counted. Cancellation
    /// is checked before each fetch starts: fetches already in flight finish,
    /// but their records are not ingested.
    pub async fn update_all(
        &mut self,
        sources: &[SourceConfig],
        min_items: usize,
        cancel: &CancellationToken,
    ) -> UpdateSummary {
        let started_at = Utc::now();
        log::info!("Starting ingestion pass over {} source(s)", sources.len());

        let jobs: Vec<(&SourceConfig, usize)> = sources
            .iter()
            .map(|source| (source, self.target_for(source, min_items)))
            .collect();

        let fetcher = &self.fetcher;
        let extractor = &self.extractor;
        let debug = self.debug;
        let mut pages = stream::iter(jobs)
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(|(source, target)| async move {
                let result = async {
                    let html = fetcher.fetch(source.listing_url()).await?;
                    extractor.extract(Some(&html), source, target, debug)
                }
                .await;
                (source, target, result)
            })
            .buffered(self.concurrency);

        let mut outcomes = Vec::new();

        while let Some((source, target, result)) = pages.next().await {
            if cancel.is_cancelled() {
                log::warn!("Ingestion cancelled, discarding fetched source '{}'", source.id);
                continue;
            }

            let mut outcome = SourceOutcome {
                source: source.id.clone(),
                target,
                ..SourceOutcome::default()
            };
            match result {
                Ok(records) => {
                    ingest_source(
                        &mut self.tracker,
                        &self.search,
                        source,
                        records,
                        self.index_synthetic,
                        &mut outcome,
                    )
                    .await
                }
                Err(e) => {
                    log::warn!("Source '{}' failed: {}", source.id, e);
                    outcome.error = Some(e.to_string());
                }
            }
            outcomes.push(outcome);
        }
        drop(pages);

        let cancelled = outcomes.len() < sources.len();
        if cancelled {
            log::warn!(
                "Ingestion cancelled after {} of {} source(s)",
                outcomes.len(),
                sources.len()
            );
        }

        let tracker_saved = match &self.tracker_path {
            Some(path) => self.tracker.save(path).await,
            None => false,
        };

        let health = self.search.health_check().await;
        if health.tier.is_degraded() {
            log::warn!(
                "Search index degraded after ingestion: {} ({} document(s))",
                health.tier,
                health.approx_size
            );
        }

        let succeeded = outcomes.iter().filter(|o| o.succeeded()).count();
        let summary = UpdateSummary {
            started_at,
            finished_at: Utc::now(),
            succeeded,
            failed: outcomes.len() - succeeded,
            total_new: outcomes.iter().map(|o| o.new_items).sum(),
            total_indexed: outcomes.iter().map(|o| o.indexed).sum(),
            sources: outcomes,
            cancelled,
            tracker_saved,
            search_tier: health.tier,
        };
        log::info!(
            "Ingestion pass finished: {} source(s) ok, {} failed, {} new, {} indexed",
            summary.succeeded,
            summary.failed,
            summary.total_new,
            summary.total_indexed
        );
        summary
    }
}

/// Filter, index and record one source's records.
async fn ingest_source(
    tracker: &mut DedupTracker,
    search: &SearchIndexService,
    source: &SourceConfig,
    mut records: Vec<ContentRecord>,
    index_synthetic: bool,
    outcome: &mut SourceOutcome,
) {
    outcome.extracted = records.len();
    outcome.synthetic = records.iter().filter(|r| r.synthetic).count();

    for record in &mut records {
        categorize(record, source);
    }

    let fresh: Vec<ContentRecord> = records
        .into_iter()
        .filter(|r| index_synthetic || !r.synthetic)
        .filter(|r| tracker.is_new(r))
        .collect();
    outcome.new_items = fresh.len();

    if fresh.is_empty() {
        log::info!("Source '{}': nothing new ({} extracted)", source.id, outcome.extracted);
        return;
    }

    let result = search.index_items(&fresh).await;
    outcome.indexed = result.successful;
    outcome.index_failed = result.failed;

    // Records the index did not store stay new so the next pass retries them.
    let stored: Vec<ContentRecord> = fresh
        .into_iter()
        .filter(|r| result.stored_id(&r.id))
        .collect();
    tracker.record_ingested(&stored);

    log::info!(
        "Source '{}': {} extracted, {} new, {} indexed, {} failed",
        source.id,
        outcome.extracted,
        outcome.new_items,
        outcome.indexed,
        outcome.index_failed
    );
}
