//! Rating parsing and normalization onto a 0-5 scale.

use std::sync::OnceLock;

use rand::Rng;
use regex::Regex;

pub const MAX_RATING: f64 = 5.0;

fn number_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\d+(?:[.,]\d+)?").ok())
        .as_ref()
}

/// First numeric token in `text`, accepting `,` as decimal separator.
pub fn parse_first_number(text: &str) -> Option<f64> {
    number_pattern()?
        .find(text)
        .and_then(|m| m.as_str().replace(',', ".").parse().ok())
}

/// Map a raw score onto `[0, 5]`.
///
/// Scores above 10 are treated as out of 100 (÷10); scores above 5 as out
/// of 10 (÷2). The result is clamped.
pub fn normalize_rating(raw: f64) -> f64 {
    if !raw.is_finite() {
        return 0.0;
    }
    let scaled = if raw > 10.0 {
        raw / 10.0
    } else if raw > 5.0 {
        raw / 2.0
    } else {
        raw
    };
    scaled.clamp(0.0, MAX_RATING)
}

/// Parse and normalize a rating from free text.
pub fn parse_rating(text: &str) -> Option<f64> {
    parse_first_number(text).map(normalize_rating)
}

/// Fallback rating drawn uniformly from `[min, max]`, rounded to one decimal.
pub fn sample_rating<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> f64 {
    let (lo, hi) = (min.clamp(0.0, MAX_RATING), max.clamp(0.0, MAX_RATING));
    let value = if hi > lo { rng.gen_range(lo..=hi) } else { lo };
    ((value * 10.0).round() / 10.0).clamp(0.0, MAX_RATING)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_parse_first_number() {
        assert_eq!(parse_first_number("IMDb: 7.8/10"), Some(7.8));
        assert_eq!(parse_first_number("note 4,5"), Some(4.5));
        assert_eq!(parse_first_number("no digits"), None);
    }

    #[test]
    fn test_normalize_rating_scales() {
        assert_eq!(normalize_rating(4.2), 4.2);
        assert_eq!(normalize_rating(8.0), 4.0);
        assert_eq!(normalize_rating(45.0), 4.5);
        assert_eq!(normalize_rating(85.0), 5.0);
        // out of 100 is only divided once
        assert_eq!(normalize_rating(78.0), 5.0);
        assert_eq!(normalize_rating(f64::NAN), 0.0);
    }

    #[test]
    fn test_sample_rating_is_seedable_and_bounded() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let x = sample_rating(&mut a, 3.5, 5.0);
            assert_eq!(x, sample_rating(&mut b, 3.5, 5.0));
            assert!((3.5..=5.0).contains(&x));
        }
    }
}
