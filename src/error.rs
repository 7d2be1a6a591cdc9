// src/error.rs

//! Unified error handling for the catalog crawler.

use std::fmt;

use thiserror::Error;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Fetch kept failing after all retries
    #[error("Network error for {url} after {attempts} attempt(s): {message}")]
    TransientNetwork {
        url: String,
        attempts: u32,
        message: String,
    },

    /// Markup could not be turned into records
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// No markup at all was supplied
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Search engine or cache unreachable
    #[error("Backend '{backend}' unavailable: {message}")]
    BackendUnavailable { backend: String, message: String },

    /// Reading or writing persisted state failed
    #[error("Persistence error for {path}: {message}")]
    Persistence { path: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a backend-unavailable error.
    pub fn backend(backend: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            message: message.to_string(),
        }
    }

    /// Create a persistence error.
    pub fn persistence(path: impl fmt::Display, message: impl fmt::Display) -> Self {
        Self::Persistence {
            path: path.to_string(),
            message: message.to_string(),
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::TransientNetwork { .. } | Self::BackendUnavailable { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_is_transient() {
        assert!(AppError::backend("elastic", "connection refused").is_transient());
        assert!(!AppError::config("missing api key").is_transient());
    }

    #[test]
    fn test_display_includes_context() {
        let err = AppError::persistence("cache.json", "disk full");
        assert_eq!(
            err.to_string(),
            "Persistence error for cache.json: disk full"
        );
    }
}
