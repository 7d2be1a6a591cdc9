//! Pipeline entry points for ingestion.
//!
//! - `Orchestrator::update_all`: Ingest every source into the search index
//! - `categorize`: Fill fields extraction left empty

pub mod categorize;
pub mod orchestrator;

pub use categorize::{categorize, genres_for};
pub use orchestrator::{Orchestrator, SourceOutcome, UpdateSummary};
