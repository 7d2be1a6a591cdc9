//! Capability traits the search service is assembled from.
//!
//! Backends are injected at construction; the service never discovers them
//! on its own.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{ContentType, ScoredRecord, SearchDocument, SearchOptions};

/// Outcome of a batch upsert.
///
/// `failed_ids` names the documents a backend reported as failed. A batch
/// rejected as a whole counts every document in `failed` and lists none.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IndexResult {
    pub successful: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_ids: Vec<String>,
}

impl IndexResult {
    /// Every one of `count` documents stored.
    pub fn stored(count: usize) -> Self {
        Self {
            successful: count,
            ..Self::default()
        }
    }

    pub fn rejected(count: usize) -> Self {
        Self {
            failed: count,
            ..Self::default()
        }
    }

    /// `total` documents sent, of which `failed_ids` were not stored.
    pub fn partial(total: usize, failed_ids: Vec<String>) -> Self {
        Self {
            successful: total.saturating_sub(failed_ids.len()),
            failed: failed_ids.len(),
            failed_ids,
        }
    }

    /// Whether the document `id` was stored.
    pub fn stored_id(&self, id: &str) -> bool {
        self.successful > 0 && !self.failed_ids.iter().any(|failed| failed == id)
    }
}

/// A full-text index: the primary engine or the in-memory fallback.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Cheap reachability check.
    async fn ping(&self) -> Result<()>;

    /// Create the index if it does not exist yet.
    async fn create_index(&self) -> Result<()>;

    /// Drop the index; a missing index is not an error.
    async fn delete_index(&self) -> Result<()>;

    /// Insert or replace documents by id.
    async fn bulk_upsert(&self, docs: &[SearchDocument]) -> Result<IndexResult>;

    /// Ranked matches for `query`, at most `size`.
    async fn query(
        &self,
        query: &str,
        content_type: Option<ContentType>,
        options: &SearchOptions,
        size: usize,
    ) -> Result<Vec<ScoredRecord>>;

    /// Title completions for `prefix`, at most `size`.
    async fn suggest(&self, prefix: &str, size: usize) -> Result<Vec<String>>;

    /// Number of indexed documents.
    async fn count(&self) -> Result<usize>;
}

/// Key/value store with per-entry expiry, used for query results.
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn name(&self) -> &str;

    async fn ping(&self) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}
