//! Storage for crawler state.
//!
//! Everything the crawler persists between runs is a JSON document on the
//! local filesystem: the dedup tracker state and the memory index snapshot.

pub mod local;

// Re-export for convenience
pub use local::{LocalStorage, read_json_file, write_json_file};
