//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::ContentType;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP fetch behavior
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Extraction engine settings
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Search index service settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Dedup tracker persistence
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Ingestion pass volume
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Catalog sites to ingest
    #[serde(default = "defaults::default_sources")]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetch.user_agent is empty"));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(AppError::validation("fetch.timeout_secs must be > 0"));
        }
        if self.fetch.max_concurrent == 0 {
            return Err(AppError::validation("fetch.max_concurrent must be > 0"));
        }
        if self.extraction.min_fallback_rating > self.extraction.max_fallback_rating {
            return Err(AppError::validation(
                "extraction.min_fallback_rating exceeds max_fallback_rating",
            ));
        }
        if self.search.index_name.trim().is_empty() {
            return Err(AppError::validation("search.index_name is empty"));
        }
        if self.search.cache_max_entries == 0 {
            return Err(AppError::validation("search.cache_max_entries must be > 0"));
        }
        if let Some(primary) = &self.search.primary {
            primary.validate()?;
        }
        if self.sources.is_empty() {
            return Err(AppError::validation("No sources defined"));
        }
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return Err(AppError::validation("source with empty id"));
            }
            url::Url::parse(&source.base_url).map_err(|e| {
                AppError::validation(format!("source '{}' base_url: {e}", source.id))
            })?;
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            extraction: ExtractionConfig::default(),
            search: SearchConfig::default(),
            tracker: TrackerConfig::default(),
            ingest: IngestConfig::default(),
            sources: defaults::default_sources(),
        }
    }
}

/// HTTP client and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Retries after the first failed attempt
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Backoff unit; attempt `n` waits `n * retry_backoff_ms`
    #[serde(default = "defaults::retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Sources fetched concurrently
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_retries: defaults::max_retries(),
            retry_backoff_ms: defaults::retry_backoff(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Extraction engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Records requested when the caller gives no limit
    #[serde(default = "defaults::default_limit")]
    pub default_limit: usize,

    /// Poster used when no image can be resolved
    #[serde(default = "defaults::placeholder_image")]
    pub placeholder_image: String,

    /// Seed for fallback ratings; unseeded runs use OS entropy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_seed: Option<u64>,

    #[serde(default = "defaults::min_fallback_rating")]
    pub min_fallback_rating: f64,

    #[serde(default = "defaults::max_fallback_rating")]
    pub max_fallback_rating: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            default_limit: defaults::default_limit(),
            placeholder_image: defaults::placeholder_image(),
            rating_seed: None,
            min_fallback_rating: defaults::min_fallback_rating(),
            max_fallback_rating: defaults::max_fallback_rating(),
        }
    }
}

/// Search index service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "defaults::index_name")]
    pub index_name: String,

    /// Upper bound for a backend health probe
    #[serde(default = "defaults::probe_timeout")]
    pub probe_timeout_ms: u64,

    #[serde(default = "defaults::cache_ttl")]
    pub cache_ttl_secs: u64,

    #[serde(default = "defaults::cache_max_entries")]
    pub cache_max_entries: usize,

    /// Result cap when a query gives no size
    #[serde(default = "defaults::search_size")]
    pub default_size: usize,

    /// Disable the query-result cache tier entirely
    #[serde(default = "defaults::enabled")]
    pub cache_enabled: bool,

    /// Primary full-text engine; absent means fallback tiers only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<PrimaryEngineConfig>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            index_name: defaults::index_name(),
            probe_timeout_ms: defaults::probe_timeout(),
            cache_ttl_secs: defaults::cache_ttl(),
            cache_max_entries: defaults::cache_max_entries(),
            default_size: defaults::search_size(),
            cache_enabled: true,
            primary: None,
        }
    }
}

/// Connection settings for an Elasticsearch-compatible engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryEngineConfig {
    pub endpoint: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl PrimaryEngineConfig {
    /// An explicitly configured endpoint must come with credentials.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(AppError::config("search.primary.endpoint is empty"));
        }
        url::Url::parse(&self.endpoint)
            .map_err(|e| AppError::config(format!("search.primary.endpoint: {e}")))?;

        let has_key = self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty());
        let has_basic = self.username.as_deref().is_some_and(|u| !u.trim().is_empty())
            && self.password.is_some();
        if !has_key && !has_basic {
            return Err(AppError::config(format!(
                "search.primary.endpoint {} requires api_key or username/password",
                self.endpoint
            )));
        }
        Ok(())
    }
}

/// Dedup tracker persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Tracker state file, relative to the storage directory
    #[serde(default = "defaults::cache_file")]
    pub cache_file: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            cache_file: defaults::cache_file(),
        }
    }
}

/// Ingestion pass volume settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "defaults::min_items_per_source")]
    pub min_items_per_source: usize,

    /// Extra records requested beyond what a source already has
    #[serde(default = "defaults::growth_per_pass")]
    pub growth_per_pass: usize,

    /// Push synthetic placeholder records into the search index
    #[serde(default)]
    pub index_synthetic: bool,

    /// Log locator decisions at info level
    #[serde(default)]
    pub debug_extraction: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_items_per_source: defaults::min_items_per_source(),
            growth_per_pass: defaults::growth_per_pass(),
            index_synthetic: false,
            debug_extraction: false,
        }
    }
}

/// A catalog site to ingest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    /// Short identifier used as the record id prefix
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Site root, used to resolve relative links
    pub base_url: String,

    /// Catalog listing page; defaults to `base_url`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_url: Option<String>,

    /// Type assumed for records the page does not classify
    #[serde(default)]
    pub content_type: ContentType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl SourceConfig {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            base_url: base_url.into(),
            list_url: None,
            content_type: ContentType::Unknown,
            country: None,
        }
    }

    /// Page fetched for this source.
    pub fn listing_url(&self) -> &str {
        self.list_url.as_deref().unwrap_or(&self.base_url)
    }
}

mod defaults {
    use super::SourceConfig;
    use crate::models::ContentType;

    // Fetch defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; CatalogCrawler/1.0)".into()
    }
    pub fn timeout() -> u64 {
        10
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn retry_backoff() -> u64 {
        1000
    }
    pub fn max_concurrent() -> usize {
        4
    }

    // Extraction defaults
    pub fn default_limit() -> usize {
        20
    }
    pub fn placeholder_image() -> String {
        "https://via.placeholder.com/300x450?text=No+Image".into()
    }
    pub fn min_fallback_rating() -> f64 {
        3.5
    }
    pub fn max_fallback_rating() -> f64 {
        5.0
    }

    // Search defaults
    pub fn index_name() -> String {
        "content".into()
    }
    pub fn probe_timeout() -> u64 {
        2000
    }
    pub fn cache_ttl() -> u64 {
        3600
    }
    pub fn cache_max_entries() -> usize {
        1000
    }
    pub fn search_size() -> usize {
        20
    }
    pub fn enabled() -> bool {
        true
    }

    // Tracker defaults
    pub fn cache_file() -> String {
        "cache.json".into()
    }

    // Ingest defaults
    pub fn min_items_per_source() -> usize {
        20
    }
    pub fn growth_per_pass() -> usize {
        50
    }

    pub fn default_sources() -> Vec<SourceConfig> {
        vec![
            SourceConfig {
                id: "coflix".into(),
                name: "Coflix".into(),
                base_url: "https://coflix.example/".into(),
                list_url: Some("https://coflix.example/films/".into()),
                content_type: ContentType::Movie,
                country: None,
            },
            SourceConfig {
                id: "dramacool".into(),
                name: "DramaCool".into(),
                base_url: "https://dramacool.example/".into(),
                list_url: Some("https://dramacool.example/recently-added".into()),
                content_type: ContentType::Drama,
                country: Some("Korea".into()),
            },
            SourceConfig {
                id: "animesama".into(),
                name: "Anime-Sama".into(),
                base_url: "https://anime-sama.example/".into(),
                list_url: Some("https://anime-sama.example/catalogue/".into()),
                content_type: ContentType::Anime,
                country: Some("Japan".into()),
            },
        ]
    }
}
