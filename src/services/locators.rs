//! Element locators for the extraction cascade.
//!
//! A [`Locator`] finds the elements fulfilling one role (container, item,
//! title, image, ...) inside a scope. Locators are tried in priority order
//! through a [`LocatorChain`] until one returns a non-empty match.

use scraper::{ElementRef, Selector};

use crate::error::{AppError, Result};

/// A single extraction heuristic.
pub trait Locator: Send + Sync {
    /// Human-readable name used in debug logs.
    fn name(&self) -> &str;

    /// All matching elements under `scope`, in document order.
    fn locate_all<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>>;

    /// First matching element under `scope`.
    fn locate<'a>(&self, scope: ElementRef<'a>) -> Option<ElementRef<'a>> {
        self.locate_all(scope).into_iter().next()
    }
}

/// Locator backed by a CSS selector.
pub struct CssLocator {
    source: String,
    selector: Selector,
}

impl CssLocator {
    pub fn new(selector: &str) -> Result<Self> {
        let parsed = Selector::parse(selector)
            .map_err(|e| AppError::selector(selector, format!("{e:?}")))?;
        Ok(Self {
            source: selector.to_string(),
            selector: parsed,
        })
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }
}

impl Locator for CssLocator {
    fn name(&self) -> &str {
        &self.source
    }

    fn locate_all<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        scope.select(&self.selector).collect()
    }
}

/// Any element holding exactly one image plus some title-like text.
///
/// Keeps the outermost such element so a card wins over the link inside it.
pub struct ImageCardLocator {
    candidates: Selector,
    images: Selector,
}

impl ImageCardLocator {
    pub fn new() -> Result<Self> {
        let candidates = "article, li, div, figure, a";
        let images = "img";
        Ok(Self {
            candidates: Selector::parse(candidates)
                .map_err(|e| AppError::selector(candidates, format!("{e:?}")))?,
            images: Selector::parse(images)
                .map_err(|e| AppError::selector(images, format!("{e:?}")))?,
        })
    }

    fn is_card(&self, element: ElementRef<'_>) -> bool {
        let mut images = element.select(&self.images);
        let Some(image) = images.next() else {
            return false;
        };
        if images.next().is_some() {
            return false;
        }

        let has_text = element.text().any(|t| t.trim().chars().count() >= 2);
        let has_alt = image
            .value()
            .attr("alt")
            .is_some_and(|alt| !alt.trim().is_empty());
        let has_title = element.value().attr("title").is_some();
        has_text || has_alt || has_title
    }
}

impl Locator for ImageCardLocator {
    fn name(&self) -> &str {
        "heuristic:image+title"
    }

    fn locate_all<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        let cards: Vec<ElementRef<'a>> = scope
            .select(&self.candidates)
            .filter(|el| self.is_card(*el))
            .collect();

        cards
            .iter()
            .filter(|card| {
                !card
                    .ancestors()
                    .any(|ancestor| cards.iter().any(|other| other.id() == ancestor.id()))
            })
            .copied()
            .collect()
    }
}

/// Ordered list of locators evaluated until one matches.
pub struct LocatorChain {
    locators: Vec<Box<dyn Locator>>,
}

impl LocatorChain {
    pub fn new(locators: Vec<Box<dyn Locator>>) -> Self {
        Self { locators }
    }

    /// Build a chain of CSS locators, skipping (and logging) invalid selectors.
    pub fn css(selectors: &[&str]) -> Self {
        let locators = selectors
            .iter()
            .filter_map(|s| match CssLocator::new(s) {
                Ok(locator) => Some(Box::new(locator) as Box<dyn Locator>),
                Err(e) => {
                    log::warn!("Skipping locator: {}", e);
                    None
                }
            })
            .collect();
        Self { locators }
    }

    /// Add a locator at the lowest priority.
    pub fn push(&mut self, locator: Box<dyn Locator>) {
        self.locators.push(locator);
    }

    /// Add a locator at the highest priority.
    pub fn prepend(&mut self, locator: Box<dyn Locator>) {
        self.locators.insert(0, locator);
    }

    pub fn len(&self) -> usize {
        self.locators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locators.is_empty()
    }

    /// First locator yielding a non-empty set, with its name.
    pub fn first_match<'a>(&self, scope: ElementRef<'a>) -> Option<(&str, Vec<ElementRef<'a>>)> {
        self.locators.iter().find_map(|locator| {
            let found = locator.locate_all(scope);
            if found.is_empty() {
                None
            } else {
                Some((locator.name(), found))
            }
        })
    }

    /// First element found by any locator.
    pub fn first<'a>(&self, scope: ElementRef<'a>) -> Option<ElementRef<'a>> {
        self.locators.iter().find_map(|locator| locator.locate(scope))
    }
}

/// Catalog grid containers, most specific first.
pub const CONTAINER_SELECTORS: &[&str] = &[
    "[role=main] .items",
    ".movies-list",
    ".film-list",
    ".film_list-wrap",
    ".anime-list",
    ".catalog",
    ".items",
    ".listing",
    ".grid",
    "[role=main]",
    "main",
    "#content",
    ".content",
];

/// Individual catalog entries.
pub const ITEM_SELECTORS: &[&str] = &[
    ".item",
    ".movie-item",
    ".ml-item",
    ".flw-item",
    ".film-poster",
    ".anime-card",
    ".cardListAnime",
    ".card",
    ".post",
    "article",
    "li.item",
];

pub const TITLE_SELECTORS: &[&str] = &[
    ".title",
    ".name",
    ".film-name",
    ".card-title",
    "[itemprop=name]",
    "h2",
    "h3",
    "h4",
];

pub const RATING_SELECTORS: &[&str] = &[
    ".rating",
    ".score",
    ".imdb",
    ".rate",
    ".note",
    "[itemprop=ratingValue]",
];

pub const YEAR_SELECTORS: &[&str] = &[".year", ".release", ".date", "time"];

pub const DESCRIPTION_SELECTORS: &[&str] = &[".description", ".synopsis", ".summary", "p"];

pub const GENRE_SELECTORS: &[&str] = &[".genres a", ".genre a", ".genres", ".genre"];

pub const EPISODE_SELECTORS: &[&str] = &[".episodes", ".eps", ".ep", "[data-episodes]"];

pub const TYPE_SELECTORS: &[&str] = &["[data-type]", ".type", ".badge-type"];

#[cfg(test)]
mod tests {
    use scraper::Html;

    use super::*;

    #[test]
    fn test_css_locator_valid_and_invalid() {
        assert!(CssLocator::new("div.item").is_ok());
        assert!(CssLocator::new("[[invalid").is_err());
    }

    #[test]
    fn test_chain_skips_invalid_selectors() {
        let chain = LocatorChain::css(&["[[invalid", ".ok"]);
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_chain_first_match_in_priority_order() {
        let doc = Html::parse_document(
            r#"<div class="b">one</div><div class="a">two</div><div class="a">three</div>"#,
        );
        let chain = LocatorChain::css(&[".missing", ".a", ".b"]);
        let (name, found) = chain.first_match(doc.root_element()).unwrap();
        assert_eq!(name, ".a");
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_image_card_locator_keeps_outermost_card() {
        let doc = Html::parse_document(
            r#"<section>
                 <div class="tile"><a href="/a"><img src="a.jpg"> Alpha</a><span>4.5</span></div>
                 <div class="tile"><a href="/b"><img src="b.jpg"> Beta</a></div>
                 <div class="banner">No image here</div>
               </section>"#,
        );
        let locator = ImageCardLocator::new().unwrap();
        let cards = locator.locate_all(doc.root_element());

        assert_eq!(cards.len(), 2);
        assert!(cards.iter().all(|c| c.value().name() == "div"));
    }
}
