// src/lib.rs

//! Catalog Crawler Library
//!
//! Ingests media catalog pages, deduplicates records across runs and serves
//! them through a search facade that degrades gracefully when its primary
//! engine is unavailable.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod search;
pub mod services;
pub mod storage;
pub mod utils;
