//! Content records and their indexed projection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Kind of media item a record describes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Movie,
    Drama,
    Anime,
    #[serde(alias = "tv", alias = "tv_show")]
    TvShow,
    #[default]
    Unknown,
}

impl ContentType {
    /// Series carry episodes and are re-ingested when new episodes appear.
    pub fn is_series(self) -> bool {
        matches!(self, Self::Drama | Self::Anime | Self::TvShow)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Drama => "drama",
            Self::Anime => "anime",
            Self::TvShow => "tvshow",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "movie" | "film" => Ok(Self::Movie),
            "drama" => Ok(Self::Drama),
            "anime" => Ok(Self::Anime),
            "tvshow" | "tv" | "tv_show" | "series" => Ok(Self::TvShow),
            "unknown" | "" => Ok(Self::Unknown),
            other => Err(AppError::validation(format!("unknown content type '{other}'"))),
        }
    }
}

/// One discoverable media item, normalized from a catalog page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentRecord {
    /// `<source>_<hash>` identifier
    pub id: String,

    pub title: String,

    /// Absolute link to the item on the source site
    pub source_url: String,

    /// Poster image URL (placeholder when none was found)
    pub poster: String,

    #[serde(default)]
    pub content_type: ContentType,

    /// Always within `[0, 5]`
    pub rating: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    /// Source identifier the record was extracted from
    pub source: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    /// Episodes currently published, for series
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episodes_available: Option<u32>,

    /// Placeholder generated because nothing could be extracted
    #[serde(default)]
    pub synthetic: bool,
}

impl ContentRecord {
    /// Whether dedup should track episodes for this record.
    pub fn is_series(&self) -> bool {
        self.content_type.is_series()
    }
}

/// Indexed projection of a [`ContentRecord`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchDocument {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    pub rating: f64,
    pub image: String,
    pub source: String,
    pub source_url: String,
    #[serde(default)]
    pub episodes_available: Option<u32>,
    #[serde(default)]
    pub synthetic: bool,
}

impl From<&ContentRecord> for SearchDocument {
    fn from(record: &ContentRecord) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            description: record.description.clone(),
            content_type: record.content_type,
            genres: record.genres.clone(),
            country: record.country.clone(),
            year: record.year,
            rating: record.rating,
            image: record.poster.clone(),
            source: record.source.clone(),
            source_url: record.source_url.clone(),
            episodes_available: record.episodes_available,
            synthetic: record.synthetic,
        }
    }
}

impl From<SearchDocument> for ContentRecord {
    fn from(doc: SearchDocument) -> Self {
        Self {
            id: doc.id,
            title: doc.title,
            source_url: doc.source_url,
            poster: doc.image,
            content_type: doc.content_type,
            rating: doc.rating,
            year: doc.year,
            source: doc.source,
            description: doc.description,
            genres: doc.genres,
            country: doc.country,
            episodes_available: doc.episodes_available,
            synthetic: doc.synthetic,
        }
    }
}

/// Search post-filters and paging.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchOptions {
    /// Maximum results; the service default applies when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_rating: Option<f64>,
}

impl SearchOptions {
    /// Whether a document passes the genre/country/year/rating filters.
    pub fn accepts(&self, doc: &SearchDocument) -> bool {
        if let Some(genre) = &self.genre {
            if !doc.genres.iter().any(|g| g.eq_ignore_ascii_case(genre)) {
                return false;
            }
        }
        if let Some(country) = &self.country {
            match &doc.country {
                Some(c) if c.eq_ignore_ascii_case(country) => {}
                _ => return false,
            }
        }
        if let Some(year) = self.year {
            if doc.year != Some(year) {
                return false;
            }
        }
        if let Some(min) = self.min_rating {
            if doc.rating < min {
                return false;
            }
        }
        true
    }
}

/// A search hit: the record plus its ranking score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredRecord {
    #[serde(flatten)]
    pub record: ContentRecord,
    #[serde(rename = "_score")]
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_doc() -> SearchDocument {
        SearchDocument {
            id: "coflix_ab12".into(),
            title: "Attack on Titan".into(),
            description: "Humanity fights giants".into(),
            content_type: ContentType::Anime,
            genres: vec!["Action".into()],
            country: Some("Japan".into()),
            year: Some(2013),
            rating: 4.6,
            image: "https://img.example.com/aot.jpg".into(),
            source: "coflix".into(),
            source_url: "https://coflix.example.com/aot".into(),
            episodes_available: Some(25),
            synthetic: false,
        }
    }

    #[test]
    fn test_content_type_parsing() {
        assert_eq!("TV".parse::<ContentType>().unwrap(), ContentType::TvShow);
        assert_eq!("anime".parse::<ContentType>().unwrap(), ContentType::Anime);
        assert!("podcast".parse::<ContentType>().is_err());
        assert!(ContentType::Drama.is_series());
        assert!(!ContentType::Movie.is_series());
    }

    #[test]
    fn test_options_filters() {
        let doc = sample_doc();
        let mut options = SearchOptions {
            genre: Some("action".into()),
            country: Some("japan".into()),
            year: Some(2013),
            min_rating: Some(4.0),
            ..SearchOptions::default()
        };
        assert!(options.accepts(&doc));

        options.min_rating = Some(4.8);
        assert!(!options.accepts(&doc));
    }

    #[test]
    fn test_scored_record_serializes_score_field() {
        let hit = ScoredRecord {
            record: ContentRecord::from(sample_doc()),
            score: 1.5,
        };
        let json = serde_json::to_value(&hit).unwrap();
        assert_eq!(json["_score"], 1.5);
        assert_eq!(json["title"], "Attack on Titan");
        assert_eq!(json["content_type"], "anime");
    }
}
