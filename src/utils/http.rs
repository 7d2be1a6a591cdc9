// src/utils/http.rs

//! HTTP client utilities.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::FetchConfig;

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &FetchConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Anything that can turn a URL into page markup.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// `reqwest`-backed fetcher with linear retry backoff.
pub struct HttpFetcher {
    client: reqwest::Client,
    attempts: u32,
    backoff: Duration,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
            attempts: config.max_retries.max(1),
            backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::TransientNetwork {
                url: url.to_string(),
                attempts: 1,
                message: format!("HTTP status {status}"),
            });
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        retry_with_backoff(self.attempts, self.backoff, url, || self.fetch_once(url)).await
    }
}

/// Serves pages from memory; for offline runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    pages: HashMap<String, String>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.insert(url, html);
        self
    }

    pub fn insert(&mut self, url: impl Into<String>, html: impl Into<String>) {
        self.pages.insert(url.into(), html.into());
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::TransientNetwork {
                url: url.to_string(),
                attempts: 1,
                message: "no page registered".to_string(),
            })
    }
}

/// Run `op` up to `attempts` times, sleeping `backoff * attempt` between tries.
///
/// Errors that are not transient are returned at once.
pub async fn retry_with_backoff<T, F, Fut>(
    attempts: u32,
    backoff: Duration,
    url: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                last_error = e.to_string();
                log::warn!("Fetch attempt {}/{} for {} failed: {}", attempt, attempts, url, e);
                if attempt < attempts {
                    tokio::time::sleep(backoff * attempt).await;
                }
            }
        }
    }

    Err(AppError::TransientNetwork {
        url: url.to_string(),
        attempts,
        message: last_error,
    })
}
