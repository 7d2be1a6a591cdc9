// src/models/mod.rs

//! Domain models for the catalog crawler.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod record;

// Re-export all public types
pub use config::{
    Config, ExtractionConfig, FetchConfig, IngestConfig, PrimaryEngineConfig, SearchConfig,
    SourceConfig, TrackerConfig,
};
pub use record::{ContentRecord, ContentType, ScoredRecord, SearchDocument, SearchOptions};
