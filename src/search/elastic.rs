// src/search/elastic.rs

//! Primary search engine adapter for Elasticsearch-compatible REST APIs.
//!
//! The index schema uses a custom analyzer (lowercase, ASCII folding,
//! stopwords, stemming) on text fields and a `suggest` completion field fed
//! from each title.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{AppError, Result};
use crate::models::{ContentType, PrimaryEngineConfig, ScoredRecord, SearchDocument, SearchOptions};
use crate::search::analyzer::tokenize;
use crate::search::backend::{IndexResult, SearchBackend};

const BACKEND: &str = "elasticsearch";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
enum Auth {
    ApiKey(String),
    Basic { username: String, password: String },
}

/// `reqwest`-backed client for one index.
pub struct ElasticBackend {
    client: reqwest::Client,
    endpoint: String,
    index: String,
    auth: Auth,
}

impl ElasticBackend {
    /// Build an adapter; fails on missing credentials.
    pub fn new(config: &PrimaryEngineConfig, index: &str) -> Result<Self> {
        config.validate()?;

        let auth = match (&config.api_key, &config.username, &config.password) {
            (Some(key), _, _) if !key.trim().is_empty() => Auth::ApiKey(key.clone()),
            (_, Some(username), Some(password)) => Auth::Basic {
                username: username.clone(),
                password: password.clone(),
            },
            _ => {
                return Err(AppError::config(format!(
                    "no usable credentials for {}",
                    config.endpoint
                )));
            }
        };

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            index: index.to_string(),
            auth,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Auth::ApiKey(key) => request.header("Authorization", format!("ApiKey {key}")),
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        self.authorize(request)
            .send()
            .await
            .map_err(|e| AppError::backend(BACKEND, e))
    }

    async fn expect_json<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::backend(BACKEND, format!("HTTP {status}: {body}")));
        }
        response
            .json()
            .await
            .map_err(|e| AppError::backend(BACKEND, e))
    }
}

/// Index settings and mappings.
pub fn index_schema() -> Value {
    json!({
        "settings": {
            "analysis": {
                "filter": {
                    "content_stop": { "type": "stop", "stopwords": ["_english_", "_french_"] },
                    "content_stemmer": { "type": "stemmer", "language": "light_english" }
                },
                "analyzer": {
                    "content_analyzer": {
                        "type": "custom",
                        "tokenizer": "standard",
                        "filter": ["lowercase", "asciifolding", "content_stop", "content_stemmer"]
                    }
                }
            }
        },
        "mappings": {
            "properties": {
                "id": { "type": "keyword" },
                "title": {
                    "type": "text",
                    "analyzer": "content_analyzer",
                    "fields": { "raw": { "type": "keyword" } }
                },
                "description": { "type": "text", "analyzer": "content_analyzer" },
                "type": { "type": "keyword" },
                "genres": { "type": "keyword", "normalizer": "lowercase" },
                "country": { "type": "keyword", "normalizer": "lowercase" },
                "year": { "type": "integer" },
                "rating": { "type": "float" },
                "image": { "type": "keyword", "index": false },
                "source": { "type": "keyword" },
                "source_url": { "type": "keyword", "index": false },
                "episodes_available": { "type": "integer" },
                "synthetic": { "type": "boolean" },
                "suggest": { "type": "completion", "analyzer": "simple" }
            }
        }
    })
}

/// Document body with completion inputs: the full title plus each word.
pub fn document_body(doc: &SearchDocument) -> Result<Value> {
    let mut body = serde_json::to_value(doc)?;
    let mut inputs = vec![doc.title.clone()];
    inputs.extend(tokenize(&doc.title));
    if let Value::Object(map) = &mut body {
        map.insert("suggest".to_string(), json!({ "input": inputs }));
    }
    Ok(body)
}

/// NDJSON `_bulk` payload upserting `docs` into `index`.
pub fn bulk_body(index: &str, docs: &[SearchDocument]) -> Result<String> {
    let mut body = String::new();
    for doc in docs {
        let action = json!({ "index": { "_index": index, "_id": doc.id } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&document_body(doc)?)?);
        body.push('\n');
    }
    Ok(body)
}

/// Fuzzy multi-field query weighting title over description, plus filters.
pub fn query_body(
    query: &str,
    content_type: Option<ContentType>,
    options: &SearchOptions,
    size: usize,
) -> Value {
    let mut filters = Vec::new();
    if let Some(t) = content_type {
        filters.push(json!({ "term": { "type": t.as_str() } }));
    }
    if let Some(genre) = &options.genre {
        filters.push(json!({ "term": { "genres": genre.to_lowercase() } }));
    }
    if let Some(country) = &options.country {
        filters.push(json!({ "term": { "country": country.to_lowercase() } }));
    }
    if let Some(year) = options.year {
        filters.push(json!({ "term": { "year": year } }));
    }
    if let Some(min) = options.min_rating {
        filters.push(json!({ "range": { "rating": { "gte": min } } }));
    }

    json!({
        "size": size,
        "query": {
            "bool": {
                "must": [{
                    "multi_match": {
                        "query": query,
                        "fields": ["title^3", "description"],
                        "fuzziness": "AUTO"
                    }
                }],
                "filter": filters
            }
        }
    })
}

/// Completion suggester request for `prefix`.
pub fn suggest_body(prefix: &str, size: usize) -> Value {
    json!({
        "_source": false,
        "suggest": {
            "title_suggest": {
                "prefix": prefix,
                "completion": {
                    "field": "suggest",
                    "size": size,
                    "skip_duplicates": true,
                    "fuzzy": { "fuzziness": 1 }
                }
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Option<Hits>,
    #[serde(default)]
    suggest: Option<SuggestSection>,
}

#[derive(Debug, Deserialize)]
struct Hits {
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_score", default)]
    score: Option<f64>,
    #[serde(rename = "_source")]
    source: SearchDocument,
}

#[derive(Debug, Deserialize)]
struct SuggestSection {
    #[serde(default)]
    title_suggest: Vec<SuggestEntry>,
}

#[derive(Debug, Deserialize)]
struct SuggestEntry {
    options: Vec<SuggestOption>,
}

#[derive(Debug, Deserialize)]
struct SuggestOption {
    text: String,
    #[serde(rename = "_source", default)]
    source: Option<SearchDocument>,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    items: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: usize,
}

fn parse_hits(response: SearchResponse) -> Vec<ScoredRecord> {
    response
        .hits
        .map(|h| h.hits)
        .unwrap_or_default()
        .into_iter()
        .map(|hit| ScoredRecord {
            record: hit.source.into(),
            score: hit.score.unwrap_or(0.0),
        })
        .collect()
}

fn parse_suggestions(response: SearchResponse, size: usize) -> Vec<String> {
    let mut titles: Vec<String> = Vec::new();
    let options = response
        .suggest
        .map(|s| s.title_suggest)
        .unwrap_or_default()
        .into_iter()
        .flat_map(|entry| entry.options);
    for option in options {
        let title = option.source.map(|doc| doc.title).unwrap_or(option.text);
        if !titles.contains(&title) {
            titles.push(title);
        }
    }
    titles.truncate(size);
    titles
}

/// Per-document outcome of a `_bulk` call.
///
/// A document counts as stored only when its action reports a 2xx status;
/// documents missing from `items` are failures.
fn bulk_outcome(response: &BulkResponse, docs: &[SearchDocument]) -> IndexResult {
    let stored: HashSet<&str> = response
        .items
        .iter()
        .filter_map(|item| {
            let action = item.as_object()?.values().next()?;
            let status = action.get("status")?.as_u64()?;
            if !(200..300).contains(&status) {
                return None;
            }
            action.get("_id")?.as_str()
        })
        .collect();

    let failed_ids = docs
        .iter()
        .filter(|doc| !stored.contains(doc.id.as_str()))
        .map(|doc| doc.id.clone())
        .collect();
    IndexResult::partial(docs.len(), failed_ids)
}

#[async_trait]
impl SearchBackend for ElasticBackend {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn ping(&self) -> Result<()> {
        let response = self.send(self.client.get(self.url("/"))).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(AppError::backend(BACKEND, format!("ping returned {}", response.status())))
        }
    }

    async fn create_index(&self) -> Result<()> {
        let exists = self.send(self.client.head(self.url(&self.index))).await?;
        if exists.status().is_success() {
            log::debug!("Index '{}' already exists", self.index);
            return Ok(());
        }

        let response = self
            .send(self.client.put(self.url(&self.index)).json(&index_schema()))
            .await?;
        let _: Value = Self::expect_json(response).await?;
        log::info!("Created index '{}'", self.index);
        Ok(())
    }

    async fn delete_index(&self) -> Result<()> {
        let response = self.send(self.client.delete(self.url(&self.index))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let _: Value = Self::expect_json(response).await?;
        log::info!("Deleted index '{}'", self.index);
        Ok(())
    }

    async fn bulk_upsert(&self, docs: &[SearchDocument]) -> Result<IndexResult> {
        if docs.is_empty() {
            return Ok(IndexResult::default());
        }
        let request = self
            .client
            .post(self.url("_bulk?refresh=wait_for"))
            .header("Content-Type", "application/x-ndjson")
            .body(bulk_body(&self.index, docs)?);
        let response: BulkResponse = Self::expect_json(self.send(request).await?).await?;

        let result = bulk_outcome(&response, docs);
        if !result.failed_ids.is_empty() {
            log::warn!(
                "Bulk upsert stored {} of {} document(s); failed: {:?}",
                result.successful,
                docs.len(),
                result.failed_ids
            );
        }
        Ok(result)
    }

    async fn query(
        &self,
        query: &str,
        content_type: Option<ContentType>,
        options: &SearchOptions,
        size: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let request = self
            .client
            .post(self.url(&format!("{}/_search", self.index)))
            .json(&query_body(query, content_type, options, size));
        let response: SearchResponse = Self::expect_json(self.send(request).await?).await?;
        Ok(parse_hits(response))
    }

    async fn suggest(&self, prefix: &str, size: usize) -> Result<Vec<String>> {
        let request = self
            .client
            .post(self.url(&format!("{}/_search", self.index)))
            .json(&suggest_body(prefix, size));
        let response: SearchResponse = Self::expect_json(self.send(request).await?).await?;
        Ok(parse_suggestions(response, size))
    }

    async fn count(&self) -> Result<usize> {
        let request = self.client.get(self.url(&format!("{}/_count", self.index)));
        let response: CountResponse = Self::expect_json(self.send(request).await?).await?;
        Ok(response.count)
    }
}
