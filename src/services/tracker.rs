// src/services/tracker.rs

//! Dedup/cache tracker.
//!
//! Remembers which content and episode ids earlier passes already ingested,
//! so each pass only forwards what is new. State only ever grows; the sole
//! way to forget an id is [`DedupTracker::clear`].
//!
//! Persisted layout:
//!
//! ```json
//! {
//!   "lastUpdate": "2026-01-01T00:00:00Z",
//!   "contentIds": ["coflix_ab12cd34ef56"],
//!   "episodeIds": {"animesama_0123456789ab": ["animesama_0123456789ab-ep1"]},
//!   "updatedSeries": []
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ContentRecord;
use crate::storage::{read_json_file, write_json_file};
use crate::utils::is_content_id_of;

/// Persisted tracker state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheState {
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content_ids: BTreeSet<String>,
    #[serde(default)]
    pub episode_ids: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub updated_series: BTreeSet<String>,
}

/// Counters reported by [`DedupTracker::stats`].
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStats {
    pub content_count: usize,
    pub series_count: usize,
    pub episode_count: usize,
    pub updated_series: usize,
}

/// Episode id for the `k`-th episode of a series.
pub fn episode_id(series_id: &str, k: u32) -> String {
    format!("{series_id}-ep{k}")
}

/// Tracks previously ingested ids.
#[derive(Debug, Clone, Default)]
pub struct DedupTracker {
    state: CacheState,
}

impl DedupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: CacheState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &CacheState {
        &self.state
    }

    /// Load state from `path`.
    ///
    /// A missing or unreadable file yields an empty tracker and a warning.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match read_json_file::<CacheState>(path).await {
            Ok(Some(state)) => {
                log::info!(
                    "Loaded tracker state from {} ({} content id(s))",
                    path.display(),
                    state.content_ids.len()
                );
                Self { state }
            }
            Ok(None) => {
                log::warn!("No tracker state at {}, starting empty", path.display());
                Self::new()
            }
            Err(e) => {
                log::warn!(
                    "Failed to read tracker state at {}: {}; starting empty",
                    path.display(),
                    e
                );
                Self::new()
            }
        }
    }

    /// Persist state to `path`, stamping `lastUpdate`.
    ///
    /// Returns whether the write succeeded; failures are logged and the
    /// in-memory state stays authoritative.
    pub async fn save(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        self.state.last_update = Some(Utc::now());
        match write_json_file(path, &self.state).await {
            Ok(()) => {
                log::info!("Tracker state saved to {}", path.display());
                true
            }
            Err(e) => {
                log::warn!("Failed to persist tracker state: {}", e);
                false
            }
        }
    }

    /// Whether `item` should be ingested.
    ///
    /// True for unseen ids, and for series whose advertised episode count
    /// exceeds the episodes already recorded. Never mutates state.
    pub fn is_new(&self, item: &ContentRecord) -> bool {
        if !self.state.content_ids.contains(&item.id) {
            return true;
        }
        item.is_series() && self.has_new_episodes(item)
    }

    fn has_new_episodes(&self, item: &ContentRecord) -> bool {
        let available = item.episodes_available.unwrap_or(0) as usize;
        available > self.known_episodes(&item.id)
    }

    pub fn known_episodes(&self, series_id: &str) -> usize {
        self.state
            .episode_ids
            .get(series_id)
            .map_or(0, BTreeSet::len)
    }

    /// Record `items` as ingested.
    ///
    /// Series that already existed and gained episodes are added to
    /// `updatedSeries`.
    pub fn record_ingested(&mut self, items: &[ContentRecord]) {
        for item in items {
            let known = self.state.content_ids.contains(&item.id);
            if known && item.is_series() && self.has_new_episodes(item) {
                self.state.updated_series.insert(item.id.clone());
            }
            self.state.content_ids.insert(item.id.clone());

            if !item.is_series() {
                continue;
            }
            if let Some(episodes) = item.episodes_available.filter(|n| *n > 0) {
                let ids = self.state.episode_ids.entry(item.id.clone()).or_default();
                ids.extend((1..=episodes).map(|k| episode_id(&item.id, k)));
            }
        }
    }

    /// Ids of known content minted for `source`.
    pub fn known_count_for_source(&self, source: &str) -> usize {
        self.state
            .content_ids
            .iter()
            .filter(|id| is_content_id_of(id, source))
            .count()
    }

    pub fn updated_series(&self) -> impl Iterator<Item = &str> {
        self.state.updated_series.iter().map(String::as_str)
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            content_count: self.state.content_ids.len(),
            series_count: self.state.episode_ids.len(),
            episode_count: self.state.episode_ids.values().map(BTreeSet::len).sum(),
            updated_series: self.state.updated_series.len(),
        }
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.state = CacheState::default();
    }
}
