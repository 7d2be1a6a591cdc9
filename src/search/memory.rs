//! In-memory inverted index, the last-resort search tier.
//!
//! Maps normalized keywords to document ids. Queries match by token, by
//! title/description substring, or by exact title, then pass the same
//! post-filters as the primary engine.

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{ContentType, ScoredRecord, SearchDocument, SearchOptions};
use crate::search::analyzer::{normalize, tokenize};
use crate::search::backend::{IndexResult, SearchBackend};

const EXACT_TITLE_SCORE: f64 = 10.0;
const TITLE_SUBSTRING_SCORE: f64 = 5.0;
const TITLE_TOKEN_SCORE: f64 = 3.0;
const DESCRIPTION_SUBSTRING_SCORE: f64 = 1.5;
const OTHER_TOKEN_SCORE: f64 = 1.0;

/// Serializable contents of a [`MemoryIndex`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSnapshot {
    /// Version for cache busting
    pub version: u32,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub documents: Vec<SearchDocument>,
    /// Ids the primary engine has not received yet
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub pending: BTreeSet<String>,
}

/// Inverted index over [`SearchDocument`]s.
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    documents: HashMap<String, SearchDocument>,
    /// keyword -> ids
    postings: HashMap<String, BTreeSet<String>>,
    updated_at: Option<DateTime<Utc>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: IndexSnapshot) -> Self {
        let mut index = Self::new();
        index.upsert_all(snapshot.documents);
        index.updated_at = snapshot.updated_at;
        index
    }

    pub fn snapshot(&self) -> IndexSnapshot {
        let mut documents: Vec<SearchDocument> = self.documents.values().cloned().collect();
        documents.sort_by(|a, b| a.id.cmp(&b.id));
        IndexSnapshot {
            version: 1,
            updated_at: self.updated_at,
            documents,
            pending: BTreeSet::new(),
        }
    }

    /// Tokens a document is findable by.
    fn document_tokens(doc: &SearchDocument) -> BTreeSet<String> {
        let mut tokens: BTreeSet<String> = tokenize(&doc.title).into_iter().collect();
        tokens.extend(tokenize(&doc.description));
        tokens.extend(doc.genres.iter().flat_map(|g| tokenize(g)));
        tokens.extend(doc.country.iter().flat_map(|c| tokenize(c)));
        tokens
    }

    /// Insert or replace a document by id.
    pub fn upsert(&mut self, doc: SearchDocument) {
        self.remove(&doc.id);
        for token in Self::document_tokens(&doc) {
            self.postings.entry(token).or_default().insert(doc.id.clone());
        }
        self.documents.insert(doc.id.clone(), doc);
        self.updated_at = Some(Utc::now());
    }

    pub fn upsert_all(&mut self, docs: impl IntoIterator<Item = SearchDocument>) {
        for doc in docs {
            self.upsert(doc);
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<SearchDocument> {
        let old = self.documents.remove(id)?;
        for token in Self::document_tokens(&old) {
            if let Some(ids) = self.postings.get_mut(&token) {
                ids.remove(id);
                if ids.is_empty() {
                    self.postings.remove(&token);
                }
            }
        }
        Some(old)
    }

    pub fn get(&self, id: &str) -> Option<&SearchDocument> {
        self.documents.get(id)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn token_count(&self) -> usize {
        self.postings.len()
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn clear(&mut self) {
        self.documents.clear();
        self.postings.clear();
        self.updated_at = None;
    }

    /// Ranked matches for `query`, at most `size`.
    pub fn search(
        &self,
        query: &str,
        content_type: Option<ContentType>,
        options: &SearchOptions,
        size: usize,
    ) -> Vec<ScoredRecord> {
        let needle = normalize(query);
        if needle.is_empty() || size == 0 {
            return Vec::new();
        }
        let query_tokens = tokenize(query);

        let mut candidates: BTreeSet<&str> = query_tokens
            .iter()
            .filter_map(|t| self.postings.get(t))
            .flatten()
            .map(String::as_str)
            .collect();
        candidates.extend(
            self.documents
                .values()
                .filter(|doc| {
                    normalize(&doc.title).contains(&needle)
                        || normalize(&doc.description).contains(&needle)
                })
                .map(|doc| doc.id.as_str()),
        );

        let mut hits: Vec<(f64, &SearchDocument)> = candidates
            .into_iter()
            .filter_map(|id| self.documents.get(id))
            .filter(|doc| content_type.is_none_or(|t| doc.content_type == t))
            .filter(|doc| options.accepts(doc))
            .map(|doc| (Self::score(doc, &needle, &query_tokens), doc))
            .filter(|(score, _)| *score > 0.0)
            .collect();

        hits.sort_by(|(sa, a), (sb, b)| {
            sb.total_cmp(sa)
                .then_with(|| b.rating.total_cmp(&a.rating))
                .then_with(|| a.title.cmp(&b.title))
        });

        hits.into_iter()
            .take(size)
            .map(|(score, doc)| ScoredRecord {
                record: doc.clone().into(),
                score,
            })
            .collect()
    }

    fn score(doc: &SearchDocument, needle: &str, query_tokens: &[String]) -> f64 {
        let title = normalize(&doc.title);
        let mut score = 0.0;

        if title == needle {
            score += EXACT_TITLE_SCORE;
        } else if title.contains(needle) {
            score += TITLE_SUBSTRING_SCORE;
        }
        if normalize(&doc.description).contains(needle) {
            score += DESCRIPTION_SUBSTRING_SCORE;
        }

        let title_tokens = tokenize(&doc.title);
        let doc_tokens = Self::document_tokens(doc);
        for token in query_tokens {
            if title_tokens.contains(token) {
                score += TITLE_TOKEN_SCORE;
            } else if doc_tokens.contains(token) {
                score += OTHER_TOKEN_SCORE;
            }
        }
        score
    }

    /// Titles starting with `prefix`, or containing a word that does.
    pub fn suggest(&self, prefix: &str, size: usize) -> Vec<String> {
        let prefix = normalize(prefix);
        if prefix.is_empty() {
            return Vec::new();
        }

        let mut matches: Vec<(bool, &str)> = self
            .documents
            .values()
            .filter_map(|doc| {
                let title = normalize(&doc.title);
                if title.starts_with(&prefix) {
                    Some((true, doc.title.as_str()))
                } else if title.split(' ').any(|w| w.starts_with(&prefix)) {
                    Some((false, doc.title.as_str()))
                } else {
                    None
                }
            })
            .collect();

        // Whole-title prefix matches first, then alphabetical.
        matches.sort_by(|(pa, a), (pb, b)| pb.cmp(pa).then_with(|| a.cmp(b)));
        matches.dedup_by(|(_, a), (_, b)| a == b);
        matches
            .into_iter()
            .take(size)
            .map(|(_, title)| title.to_string())
            .collect()
    }
}

/// [`SearchBackend`] over a shared [`MemoryIndex`].
#[derive(Debug, Default)]
pub struct MemoryBackend {
    index: RwLock<MemoryIndex>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: IndexSnapshot) -> Self {
        Self {
            index: RwLock::new(MemoryIndex::from_snapshot(snapshot)),
        }
    }

    pub fn read<T>(&self, f: impl FnOnce(&MemoryIndex) -> T) -> T {
        f(&self.index.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn write<T>(&self, f: impl FnOnce(&mut MemoryIndex) -> T) -> T {
        f(&mut self.index.write().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.read(MemoryIndex::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn create_index(&self) -> Result<()> {
        self.write(MemoryIndex::clear);
        Ok(())
    }

    async fn delete_index(&self) -> Result<()> {
        self.write(MemoryIndex::clear);
        Ok(())
    }

    async fn bulk_upsert(&self, docs: &[SearchDocument]) -> Result<IndexResult> {
        self.write(|index| index.upsert_all(docs.iter().cloned()));
        Ok(IndexResult::stored(docs.len()))
    }

    async fn query(
        &self,
        query: &str,
        content_type: Option<ContentType>,
        options: &SearchOptions,
        size: usize,
    ) -> Result<Vec<ScoredRecord>> {
        Ok(self.read(|index| index.search(query, content_type, options, size)))
    }

    async fn suggest(&self, prefix: &str, size: usize) -> Result<Vec<String>> {
        Ok(self.read(|index| index.suggest(prefix, size)))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.len())
    }
}
