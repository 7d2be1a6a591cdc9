//! Text analysis shared by the memory index.
//!
//! Lowercases, splits on Unicode word boundaries, drops short tokens and
//! stopwords. The primary engine does its own analysis server-side.

use unicode_segmentation::UnicodeSegmentation;

/// Minimum token length kept by [`tokenize`].
pub const MIN_TOKEN_LENGTH: usize = 2;

/// Tokenize a string into normalized keywords.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = text.to_lowercase();

    normalized
        .unicode_words()
        .filter(|word| word.chars().count() >= MIN_TOKEN_LENGTH)
        .filter(|word| !is_stopword(word))
        .map(String::from)
        .collect()
}

/// Lowercased, whitespace-collapsed form used for substring matching.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Check if a word is a common stopword (English/French).
pub fn is_stopword(word: &str) -> bool {
    const STOPWORDS: &[&str] = &[
        // English common words
        "the", "a", "an", "is", "are", "was", "were", "be", "been", "have", "has", "had", "do",
        "does", "did", "will", "would", "can", "of", "to", "in", "for", "on", "with", "at", "by",
        "from", "as", "or", "and", "but", "if", "then", "so", "than", "it", "its",
        // French articles and particles
        "le", "la", "les", "un", "une", "des", "du", "de", "et", "en", "au", "aux", "vf", "vostfr",
        // Common URL/HTML artifacts
        "http", "https", "www", "com", "html", "php",
    ];
    STOPWORDS.contains(&word)
}
