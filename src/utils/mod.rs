//! Utility functions and helpers.

pub mod http;

use sha2::{Digest, Sha256};
use url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Collapse runs of whitespace into single spaces.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase ASCII slug (`"Attack on Titan!"` → `"attack-on-titan"`).
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Turn the last path segment of a link back into a readable title.
pub fn title_from_link(link: &str) -> Option<String> {
    let parsed = Url::parse(link).ok()?;
    let segment = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()?
        .to_string();

    let stem = segment
        .rsplit_once('.')
        .map(|(stem, _)| stem.to_string())
        .unwrap_or(segment);

    let words: Vec<String> = stem
        .split(['-', '_', '+'])
        .filter(|w| !w.is_empty() && !w.chars().all(|c| c.is_ascii_digit()))
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();

    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

/// Hex digits after the `<source>_` prefix of a content id.
pub const CONTENT_HASH_LEN: usize = 12;

/// Content-addressed record id: `<source>_<12 hex chars>`.
///
/// Stable across runs for the same source, title and year.
pub fn content_id(source: &str, title: &str, year: Option<i32>) -> String {
    let normalized = format!(
        "{}|{}|{}",
        source.trim().to_lowercase(),
        normalize_whitespace(title).to_lowercase(),
        year.map(|y| y.to_string()).unwrap_or_default()
    );
    let digest = Sha256::digest(normalized.as_bytes());
    let hash = hex::encode(digest);
    format!("{}_{}", source.trim().to_lowercase(), &hash[..CONTENT_HASH_LEN])
}

/// Whether `id` is a content id minted for `source`.
pub fn is_content_id_of(id: &str, source: &str) -> bool {
    id.strip_prefix(source.trim().to_lowercase().as_str())
        .and_then(|rest| rest.strip_prefix('_'))
        .is_some_and(|hash| {
            hash.len() == CONTENT_HASH_LEN && hash.bytes().all(|b| b.is_ascii_hexdigit())
        })
}
