//! Record categorization.
//!
//! Fills the fields extraction could not determine: content type and
//! country fall back to the source's declared values, and genres are tagged
//! from keywords in the title and description.

use std::collections::BTreeSet;

use crate::models::{ContentRecord, ContentType, SourceConfig};
use crate::search::analyzer::tokenize;

/// Genre -> keywords that imply it.
const GENRE_KEYWORDS: &[(&str, &[&str])] = &[
    ("Action", &["action", "fight", "battle", "war", "combat", "mission"]),
    ("Comedy", &["comedy", "comédie", "funny", "humour", "humor"]),
    ("Romance", &["love", "romance", "amour", "romantic", "wedding"]),
    ("Horror", &["horror", "horreur", "ghost", "zombie", "haunted"]),
    ("Thriller", &["thriller", "murder", "crime", "detective", "killer", "heist"]),
    ("Science Fiction", &["space", "alien", "robot", "cyborg", "galaxy", "future"]),
    ("Fantasy", &["magic", "dragon", "wizard", "fantasy", "demon", "sorcerer"]),
    ("Drama", &["drama", "drame", "family", "tragedy"]),
    ("Sports", &["football", "basketball", "volleyball", "baseball", "tournament"]),
];

/// Genres implied by keywords in `text`, in table order.
pub fn genres_for(text: &str) -> Vec<String> {
    let tokens: BTreeSet<String> = tokenize(text).into_iter().collect();
    GENRE_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| tokens.contains(*k)))
        .map(|(genre, _)| genre.to_string())
        .collect()
}

/// Fill missing fields of `record` from `source` and keyword tagging.
pub fn categorize(record: &mut ContentRecord, source: &SourceConfig) {
    if record.content_type == ContentType::Unknown {
        record.content_type = source.content_type;
    }
    if record.country.is_none() {
        record.country = source.country.clone();
    }
    if record.genres.is_empty() {
        record.genres = genres_for(&format!("{} {}", record.title, record.description));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str, description: &str) -> ContentRecord {
        ContentRecord {
            id: "src_1".into(),
            title: title.into(),
            source_url: "https://src.example/1".into(),
            poster: "https://src.example/1.jpg".into(),
            content_type: ContentType::Unknown,
            rating: 4.0,
            year: None,
            source: "src".into(),
            description: description.into(),
            genres: Vec::new(),
            country: None,
            episodes_available: None,
            synthetic: false,
        }
    }

    #[test]
    fn test_genres_from_keywords() {
        assert_eq!(
            genres_for("A detective hunts a killer through haunted halls"),
            vec!["Horror", "Thriller"]
        );
        assert!(genres_for("Past Lives").is_empty());
    }

    #[test]
    fn test_categorize_fills_from_source() {
        let mut source = SourceConfig::new("dramacool", "https://dramacool.example/");
        source.content_type = ContentType::Drama;
        source.country = Some("Korea".into());

        let mut r = record("Crash Landing on You", "A love story across the border");
        categorize(&mut r, &source);

        assert_eq!(r.content_type, ContentType::Drama);
        assert_eq!(r.country.as_deref(), Some("Korea"));
        assert_eq!(r.genres, vec!["Romance"]);
    }

    #[test]
    fn test_categorize_keeps_extracted_values() {
        let mut source = SourceConfig::new("coflix", "https://coflix.example/");
        source.content_type = ContentType::Movie;

        let mut r = record("Frieren", "magic");
        r.content_type = ContentType::Anime;
        r.genres = vec!["Adventure".into()];
        r.country = Some("Japan".into());
        categorize(&mut r, &source);

        assert_eq!(r.content_type, ContentType::Anime);
        assert_eq!(r.genres, vec!["Adventure"]);
        assert_eq!(r.country.as_deref(), Some("Japan"));
    }
}
