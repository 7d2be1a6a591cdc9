//! Local filesystem storage implementation.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── config.toml           # Crawler configuration
//! ├── cache.json            # Dedup tracker state
//! └── index.json            # In-memory search index snapshot
//! ```
//!
//! Every write goes to a sibling `.tmp` file first and is then renamed over
//! the target, so readers never observe a half-written JSON document.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::search::IndexSnapshot;

/// File holding the memory index snapshot.
pub const INDEX_FILE: &str = "index.json";

/// File holding the crawler configuration.
pub const CONFIG_FILE: &str = "config.toml";

/// Write bytes atomically (write to temp, then rename).
pub async fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Read bytes, returning None if the file doesn't exist.
pub async fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::Io(e)),
    }
}

/// Serialize `value` as pretty JSON and write it atomically.
pub async fn write_json_file<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_bytes_atomic(path, &bytes)
        .await
        .map_err(|e| AppError::persistence(path.display(), e))
}

/// Read a JSON document, returning None if the file doesn't exist.
pub async fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match read_bytes(path).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    pub fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    pub fn config_path(&self) -> PathBuf {
        self.path(CONFIG_FILE)
    }

    pub async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        write_json_file(&self.path(key), value).await
    }

    pub async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        read_json_file(&self.path(key)).await
    }

    pub async fn load_index(&self) -> Result<Option<IndexSnapshot>> {
        self.read_json(INDEX_FILE).await
    }

    pub async fn save_index(&self, snapshot: &IndexSnapshot) -> Result<()> {
        self.write_json(INDEX_FILE, snapshot).await?;
        log::info!(
            "Index snapshot: {} document(s) written to {}",
            snapshot.documents.len(),
            INDEX_FILE
        );
        Ok(())
    }
}
