// src/services/extractor.rs

//! Extraction engine.
//!
//! Turns one catalog page into content records. Containers and items are
//! found through [`LocatorChain`]s; each field then resolves through its own
//! cascade where the first hit wins. Pages that yield nothing degrade to
//! synthetic records so later stages never stall.

use std::collections::HashSet;
use std::iter;
use std::sync::{Mutex, OnceLock, PoisonError};

use log::Level;
use rand::SeedableRng;
use rand::rngs::StdRng;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{ContentRecord, ContentType, ExtractionConfig, SourceConfig};
use crate::services::locators::{self, CssLocator, ImageCardLocator, Locator, LocatorChain};
use crate::services::rating::{parse_first_number, parse_rating, sample_rating};
use crate::utils::{content_id, normalize_whitespace, resolve_url, slugify, title_from_link};

/// Lazy image attributes, checked before `src`.
const IMAGE_ATTRS: &[&str] = &["data-src", "data-lazy-src", "srcset", "src"];

fn year_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").ok())
        .as_ref()
}

fn background_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r#"background(?:-image)?\s*:[^;]*url\(\s*['"]?([^'")]+)['"]?\s*\)"#).ok()
        })
        .as_ref()
}

fn episode_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)(\d+)\s*(?:episodes?|eps?|épisodes?)\b|\bep(?:isode)?\.?\s*(\d+)").ok()
        })
        .as_ref()
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

fn element_text(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<String>())
}

/// Cascading HTML-to-record extractor.
pub struct ExtractionEngine {
    containers: LocatorChain,
    items: LocatorChain,
    heuristic: Box<dyn Locator>,
    titles: LocatorChain,
    ratings: LocatorChain,
    years: LocatorChain,
    descriptions: LocatorChain,
    genres: LocatorChain,
    episodes: LocatorChain,
    types: LocatorChain,
    links: Selector,
    images: Selector,
    titled: Selector,
    styled: Selector,
    default_limit: usize,
    placeholder_image: String,
    min_rating: f64,
    max_rating: f64,
    rng: Mutex<StdRng>,
}

impl ExtractionEngine {
    /// Create an engine with the built-in locator cascades.
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        let rng = match config.rating_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            containers: LocatorChain::css(locators::CONTAINER_SELECTORS),
            items: LocatorChain::css(locators::ITEM_SELECTORS),
            heuristic: Box::new(ImageCardLocator::new()?),
            titles: LocatorChain::css(locators::TITLE_SELECTORS),
            ratings: LocatorChain::css(locators::RATING_SELECTORS),
            years: LocatorChain::css(locators::YEAR_SELECTORS),
            descriptions: LocatorChain::css(locators::DESCRIPTION_SELECTORS),
            genres: LocatorChain::css(locators::GENRE_SELECTORS),
            episodes: LocatorChain::css(locators::EPISODE_SELECTORS),
            types: LocatorChain::css(locators::TYPE_SELECTORS),
            links: parse_selector("a[href]")?,
            images: parse_selector("img")?,
            titled: parse_selector("[title]")?,
            styled: parse_selector("[style]")?,
            default_limit: config.default_limit.max(1),
            placeholder_image: config.placeholder_image.clone(),
            min_rating: config.min_fallback_rating,
            max_rating: config.max_fallback_rating,
            rng: Mutex::new(rng),
        })
    }

    /// Try `selector` before the built-in item locators.
    pub fn with_item_selector(mut self, selector: &str) -> Result<Self> {
        self.items.prepend(Box::new(CssLocator::new(selector)?));
        Ok(self)
    }

    /// Try `selector` before the built-in container locators.
    pub fn with_container_selector(mut self, selector: &str) -> Result<Self> {
        self.containers.prepend(Box::new(CssLocator::new(selector)?));
        Ok(self)
    }

    /// Extract up to `limit` records from `html`.
    ///
    /// Only missing or blank markup is an error; anything else that yields
    /// no records degrades to synthetic output flagged `synthetic = true`.
    pub fn extract(
        &self,
        html: Option<&str>,
        source: &SourceConfig,
        limit: usize,
        debug: bool,
    ) -> Result<Vec<ContentRecord>> {
        let html = html.filter(|h| !h.trim().is_empty()).ok_or_else(|| {
            AppError::EmptyInput(format!("no markup supplied for source '{}'", source.id))
        })?;
        let limit = if limit == 0 { self.default_limit } else { limit };
        let level = if debug { Level::Info } else { Level::Debug };

        let document = Html::parse_document(html);
        let base = Url::parse(&source.base_url).ok();
        let items = self.locate_items(document.root_element(), level);

        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for (index, item) in items.into_iter().enumerate() {
            if records.len() >= limit {
                break;
            }
            let record = self.build_record(item, index, source, base.as_ref(), &mut rng);
            if seen.insert(record.id.clone()) {
                records.push(record);
            }
        }

        if records.is_empty() {
            let reason = AppError::MalformedInput(format!(
                "no catalog items found for source '{}'",
                source.id
            ));
            log::warn!("{}; generating {} synthetic record(s)", reason, limit);
            records = self.synthesize(source, base.as_ref(), limit, &mut rng);
        }

        log::log!(
            level,
            "Extracted {} record(s) from '{}' ({} synthetic)",
            records.len(),
            source.id,
            records.iter().filter(|r| r.synthetic).count()
        );
        Ok(records)
    }

    fn locate_items<'a>(&self, root: ElementRef<'a>, level: Level) -> Vec<ElementRef<'a>> {
        let scope = match self.containers.first_match(root) {
            Some((name, found)) => {
                log::log!(level, "Container locator '{}' matched", name);
                found[0]
            }
            None => root,
        };

        let mut scopes = vec![scope];
        if scope.id() != root.id() {
            scopes.push(root);
        }

        for scope in scopes {
            if let Some((name, found)) = self.items.first_match(scope) {
                log::log!(level, "Item locator '{}' matched {} element(s)", name, found.len());
                return found;
            }
            let found = self.heuristic.locate_all(scope);
            if !found.is_empty() {
                log::log!(
                    level,
                    "Item locator '{}' matched {} element(s)",
                    self.heuristic.name(),
                    found.len()
                );
                return found;
            }
        }

        log::log!(level, "No item locator matched");
        Vec::new()
    }

    fn build_record(
        &self,
        item: ElementRef<'_>,
        index: usize,
        source: &SourceConfig,
        base: Option<&Url>,
        rng: &mut StdRng,
    ) -> ContentRecord {
        let href = self.resolve_href(item, base);
        let title = self.resolve_title(item, href.as_deref(), source, index);
        let year = self.resolve_year(item, &title);
        let source_url = href.unwrap_or_else(|| synthesize_link(base, source, &title));
        let poster = self
            .resolve_image(item, base)
            .unwrap_or_else(|| self.placeholder_image.clone());
        let rating = self
            .resolve_rating(item)
            .unwrap_or_else(|| sample_rating(rng, self.min_rating, self.max_rating));

        ContentRecord {
            id: content_id(&source.id, &title, year),
            title,
            source_url,
            poster,
            content_type: self.resolve_type(item),
            rating,
            year,
            source: source.id.clone(),
            description: self
                .descriptions
                .first(item)
                .map(element_text)
                .unwrap_or_default(),
            genres: self.resolve_genres(item),
            country: None,
            episodes_available: self.resolve_episodes(item),
            synthetic: false,
        }
    }

    /// Title node text, then `title`/`alt` attributes, then link slug, then `<source> <n>`.
    fn resolve_title(
        &self,
        item: ElementRef<'_>,
        href: Option<&str>,
        source: &SourceConfig,
        index: usize,
    ) -> String {
        let from_node = self
            .titles
            .first(item)
            .map(element_text)
            .filter(|t| !t.is_empty());

        let from_attr = || {
            iter::once(item)
                .chain(item.select(&self.titled))
                .filter_map(|el| el.value().attr("title"))
                .chain(item.select(&self.images).filter_map(|img| img.value().attr("alt")))
                .map(normalize_whitespace)
                .find(|t| !t.is_empty())
        };

        from_node
            .or_else(from_attr)
            .or_else(|| href.and_then(title_from_link))
            .unwrap_or_else(|| format!("{} {}", source_label(source), index + 1))
    }

    fn resolve_href(&self, item: ElementRef<'_>, base: Option<&Url>) -> Option<String> {
        let anchor = if item.value().name() == "a" && item.value().attr("href").is_some() {
            Some(item)
        } else {
            item.select(&self.links).next()
        };
        let href = anchor?.value().attr("href")?.trim();
        if href.is_empty() || href == "#" || href.starts_with("javascript:") {
            return None;
        }
        Some(match base {
            Some(base) => resolve_url(base, href),
            None => href.to_string(),
        })
    }

    /// Lazy-load attributes, then `src`, then CSS `background-image`.
    fn resolve_image(&self, item: ElementRef<'_>, base: Option<&Url>) -> Option<String> {
        let img = if item.value().name() == "img" {
            Some(item)
        } else {
            item.select(&self.images).next()
        };

        let from_img = img.and_then(|img| {
            IMAGE_ATTRS.iter().find_map(|attr| {
                let value = img.value().attr(attr)?.trim();
                let value = if *attr == "srcset" {
                    value.split(',').next()?.split_whitespace().next()?
                } else {
                    value
                };
                (!value.is_empty() && !value.starts_with("data:")).then(|| value.to_string())
            })
        });

        let from_style = || {
            let pattern = background_pattern()?;
            iter::once(item)
                .chain(item.select(&self.styled))
                .filter_map(|el| el.value().attr("style"))
                .find_map(|style| {
                    let url = pattern.captures(style)?.get(1)?;
                    Some(url.as_str().trim().to_string())
                })
        };

        let raw = from_img.or_else(from_style)?;
        Some(match base {
            Some(base) => resolve_url(base, &raw),
            None => raw,
        })
    }

    fn resolve_rating(&self, item: ElementRef<'_>) -> Option<f64> {
        self.ratings
            .first(item)
            .and_then(|el| {
                el.value()
                    .attr("data-rating")
                    .and_then(parse_rating)
                    .or_else(|| parse_rating(&element_text(el)))
            })
            .or_else(|| item.value().attr("data-rating").and_then(parse_rating))
    }

    fn resolve_year(&self, item: ElementRef<'_>, title: &str) -> Option<i32> {
        let pattern = year_pattern()?;
        let find = |text: &str| {
            pattern
                .captures(text)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse().ok())
        };

        self.years
            .first(item)
            .and_then(|el| find(&element_text(el)))
            .or_else(|| item.value().attr("data-year").and_then(find))
            .or_else(|| find(title))
    }

    fn resolve_genres(&self, item: ElementRef<'_>) -> Vec<String> {
        let Some((_, nodes)) = self.genres.first_match(item) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        nodes
            .into_iter()
            .flat_map(|el| {
                element_text(el)
                    .split([',', '/', '|'])
                    .map(|g| g.trim().to_string())
                    .collect::<Vec<_>>()
            })
            .filter(|g| !g.is_empty() && seen.insert(g.to_lowercase()))
            .collect()
    }

    fn resolve_episodes(&self, item: ElementRef<'_>) -> Option<u32> {
        let as_count = |value: f64| (value >= 0.0).then_some(value as u32);

        if let Some(el) = self.episodes.first(item) {
            let from_attr = el
                .value()
                .attr("data-episodes")
                .and_then(parse_first_number)
                .and_then(as_count);
            let from_text = || parse_first_number(&element_text(el)).and_then(as_count);
            if let Some(count) = from_attr.or_else(from_text) {
                return Some(count);
            }
        }

        let text = element_text(item);
        let caps = episode_pattern()?.captures(&text)?;
        caps.get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| m.as_str().parse().ok())
    }

    fn resolve_type(&self, item: ElementRef<'_>) -> ContentType {
        iter::once(item)
            .chain(self.types.first(item))
            .find_map(|el| {
                el.value()
                    .attr("data-type")
                    .and_then(|t| t.parse::<ContentType>().ok())
                    .or_else(|| {
                        (el.id() != item.id())
                            .then(|| element_text(el).parse::<ContentType>().ok())
                            .flatten()
                    })
            })
            .unwrap_or_default()
    }

    fn synthesize(
        &self,
        source: &SourceConfig,
        base: Option<&Url>,
        limit: usize,
        rng: &mut StdRng,
    ) -> Vec<ContentRecord> {
        let label = source_label(source);
        (0..limit)
            .map(|i| {
                let title = format!("{} {}", label, i + 1);
                ContentRecord {
                    id: content_id(&source.id, &title, None),
                    source_url: synthesize_link(base, source, &title),
                    poster: self.placeholder_image.clone(),
                    content_type: source.content_type,
                    rating: sample_rating(rng, self.min_rating, self.max_rating),
                    year: None,
                    source: source.id.clone(),
                    description: String::new(),
                    genres: Vec::new(),
                    country: source.country.clone(),
                    episodes_available: None,
                    synthetic: true,
                    title,
                }
            })
            .collect()
    }
}

fn source_label(source: &SourceConfig) -> &str {
    if source.name.trim().is_empty() {
        &source.id
    } else {
        &source.name
    }
}

/// Link under the source's base domain derived from the title slug.
fn synthesize_link(base: Option<&Url>, source: &SourceConfig, title: &str) -> String {
    let slug = slugify(title);
    match base {
        Some(base) => resolve_url(base, &slug),
        None => format!("{}/{}", source.base_url.trim_end_matches('/'), slug),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"
        <html><body>
          <div class="items">
            <div class="item">
              <a href="/films/dune-part-two"><img data-src="/img/dune.jpg" src="data:image/gif;base64,AAA"></a>
              <h3 class="title">Dune: Part Two</h3>
              <span class="rating">8.6</span>
              <span class="year">2024</span>
            </div>
            <div class="item">
              <a href="https://cdn.example/films/oppenheimer"><img src="/img/opp.jpg" alt="Oppenheimer"></a>
              <span class="rating">4.1</span>
            </div>
            <div class="item">
              <a href="/films/past-lives"><span class="title">Past Lives</span></a>
              <span class="score">78</span>
            </div>
          </div>
        </body></html>
    "#;

    fn engine() -> ExtractionEngine {
        let config = ExtractionConfig {
            rating_seed: Some(42),
            ..ExtractionConfig::default()
        };
        ExtractionEngine::new(&config).unwrap()
    }

    fn source() -> SourceConfig {
        SourceConfig::new("src", "https://src.example/")
    }

    #[test]
    fn test_extracts_fixture_items() {
        let records = engine().extract(Some(FIXTURE), &source(), 10, false).unwrap();

        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| !r.synthetic));

        let dune = &records[0];
        assert_eq!(dune.title, "Dune: Part Two");
        assert_eq!(dune.source_url, "https://src.example/films/dune-part-two");
        assert_eq!(dune.poster, "https://src.example/img/dune.jpg");
        assert_eq!(dune.rating, 4.3);
        assert_eq!(dune.year, Some(2024));

        let opp = &records[1];
        assert_eq!(opp.title, "Oppenheimer");
        assert_eq!(opp.source_url, "https://cdn.example/films/oppenheimer");

        let past_lives = &records[2];
        assert_eq!(past_lives.title, "Past Lives");
        assert_eq!(past_lives.poster, ExtractionConfig::default().placeholder_image);
        assert_eq!(past_lives.rating, 5.0);
    }

    #[test]
    fn test_ids_are_stable_across_runs() {
        let first = engine().extract(Some(FIXTURE), &source(), 10, false).unwrap();
        let second = engine().extract(Some(FIXTURE), &source(), 10, true).unwrap();
        let ids = |rs: &[ContentRecord]| rs.iter().map(|r| r.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn test_limit_caps_output() {
        let records = engine().extract(Some(FIXTURE), &source(), 2, false).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_missing_html_is_error() {
        assert!(matches!(
            engine().extract(None, &source(), 5, false),
            Err(AppError::EmptyInput(_))
        ));
        assert!(engine().extract(Some("   "), &source(), 5, false).is_err());
    }

    #[test]
    fn test_unparsable_markup_degrades_to_synthetic() {
        let records = engine()
            .extract(Some("<<<not really html>>> <div"), &source(), 4, false)
            .unwrap();

        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.synthetic));
        assert!(records.iter().all(|r| (0.0..=5.0).contains(&r.rating)));
        assert_eq!(records[0].title, "src 1");
        assert_eq!(records[0].source_url, "https://src.example/src-1");
    }

    #[test]
    fn test_heuristic_fallback_and_background_image() {
        let html = r#"
            <section>
              <div class="tile"><a href="/watch/spirited-away-2001"><img src="/p/sa.jpg"></a><span>HD</span></div>
              <div class="tile" style="background-image: url('/p/tt.jpg')">
                <a href="/watch/totoro"><img alt="My Neighbor Totoro"></a>
              </div>
            </section>
        "#;
        let records = engine().extract(Some(html), &source(), 10, false).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Spirited Away");
        assert_eq!(records[0].year, None);
        assert_eq!(records[1].title, "My Neighbor Totoro");
        assert_eq!(records[1].poster, "https://src.example/p/tt.jpg");
    }

    #[test]
    fn test_series_fields() {
        let html = r#"
            <ul><li class="item" data-type="anime">
              <a href="/a/frieren"><img src="f.jpg"></a>
              <h2>Frieren</h2>
              <div class="genres"><a>Fantasy</a><a>Adventure</a></div>
              <span class="episodes">28 episodes</span>
            </li></ul>
        "#;
        let records = engine().extract(Some(html), &source(), 10, false).unwrap();
        let frieren = &records[0];

        assert_eq!(frieren.content_type, ContentType::Anime);
        assert_eq!(frieren.episodes_available, Some(28));
        assert_eq!(frieren.genres, vec!["Fantasy", "Adventure"]);
    }

    #[test]
    fn test_custom_item_selector_takes_priority() {
        let html = r#"<div class="item"><h3>Ignored</h3></div><div class="tile"><h3>Picked</h3></div>"#;
        let engine = engine().with_item_selector(".tile").unwrap();
        let records = engine.extract(Some(html), &source(), 10, false).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Picked");
    }

    #[test]
    fn test_custom_container_scopes_items() {
        let html = r#"<div class="sidebar"><div class="item"><h3>Trending</h3></div></div>
            <section class="latest"><div class="item"><h3>Latest</h3></div></section>"#;
        let engine = engine().with_container_selector("section.latest").unwrap();
        let records = engine.extract(Some(html), &source(), 10, false).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Latest");
    }
}
