//! Service layer for the crawler application.
//!
//! This module contains the business logic for:
//! - HTML extraction (`ExtractionEngine`) and its locator cascades
//! - Rating normalization
//! - Cross-run deduplication (`DedupTracker`)

mod extractor;
pub mod locators;
pub mod rating;
mod tracker;

pub use extractor::ExtractionEngine;
pub use locators::{CssLocator, ImageCardLocator, Locator, LocatorChain};
pub use tracker::{CacheState, DedupTracker, TrackerStats, episode_id};
