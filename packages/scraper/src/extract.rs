//! Listing item extraction.
//!
//! Locates feed items on a result page via a fixed structural marker and
//! pulls each item's fields out with CSS selectors. Secondary fields that
//! fail to extract become empty strings; the derived floor / rooms / area
//! fields are parsed from the structure line with fixed natural-language
//! patterns and are `None` when no pattern matches. Extraction failure on
//! secondary fields is never an error.

use adwatch_models::AdRecord;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::PageExtractor;

/// Base URL used to absolutize relative ad links.
const DEFAULT_SITE_BASE: &str = "https://www.yad2.co.il";

/// Extracts [`AdRecord`]s from listing result pages.
#[derive(Debug, Clone)]
pub struct ListingExtractor {
    site_base: String,
    item: Selector,
    image: Selector,
    heading: Selector,
    info_line: Selector,
    price: Selector,
    link: Selector,
    floor_pattern: Regex,
    rooms_pattern: Regex,
    area_pattern: Regex,
}

impl ListingExtractor {
    /// Creates an extractor for the listing site's current markup.
    ///
    /// # Panics
    ///
    /// Panics if a built-in selector or pattern fails to compile; these
    /// are fixed literals, so a failure is a programming error.
    #[must_use]
    pub fn new() -> Self {
        Self {
            site_base: DEFAULT_SITE_BASE.to_owned(),
            item: selector("[data-testid='item-basic']"),
            image: selector("img[data-testid='image']"),
            heading: selector("[class^='item-data-content_heading']"),
            info_line: selector("[class^='item-data-content_itemInfoLine']"),
            price: selector("span[data-testid='price']"),
            link: selector("a[class^='item-layout_itemLink']"),
            floor_pattern: pattern(r"קומה\s*(\d+)"),
            rooms_pattern: pattern(r"(\d+(?:\.5)?)\s*חדרים"),
            area_pattern: pattern("(\\d+)\\s*מ\"ר"),
        }
    }

    /// Overrides the base URL used to absolutize relative ad links.
    #[must_use]
    pub fn with_site_base(mut self, base_url: &str) -> Self {
        base_url.clone_into(&mut self.site_base);
        self
    }

    /// Extracts one record from a feed item element.
    fn extract_item(&self, item: ElementRef<'_>) -> AdRecord {
        let image_url = item
            .select(&self.image)
            .next()
            .and_then(|el| el.value().attr("src"))
            .unwrap_or_default()
            .to_string();

        // The first heading is the ad title; the second is the address.
        let address = item
            .select(&self.heading)
            .nth(1)
            .map(element_text)
            .unwrap_or_default();

        let mut info_lines = item.select(&self.info_line);
        let description = info_lines.next().map(element_text).unwrap_or_default();
        let structure_line = info_lines.next().map(element_text).unwrap_or_default();

        let price = item
            .select(&self.price)
            .next()
            .map(element_text)
            .unwrap_or_default();

        let link = item
            .select(&self.link)
            .next()
            .and_then(|el| el.value().attr("href"))
            .map(|href| self.absolutize(href))
            .unwrap_or_default();

        AdRecord {
            image_url,
            link,
            address,
            description,
            floor: capture(&self.floor_pattern, &structure_line),
            rooms: capture(&self.rooms_pattern, &structure_line),
            area: capture(&self.area_pattern, &structure_line),
            price,
            structure_line,
        }
    }

    /// Resolves a possibly-relative ad link against the site base.
    fn absolutize(&self, href: &str) -> String {
        if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{}{href}", self.site_base)
        }
    }
}

impl Default for ListingExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PageExtractor for ListingExtractor {
    fn extract(&self, html: &str) -> Vec<AdRecord> {
        let document = Html::parse_document(html);
        let records: Vec<AdRecord> = document
            .select(&self.item)
            .map(|item| self.extract_item(item))
            .collect();

        if records.is_empty() {
            log::debug!("no feed item markers found in page");
        }
        records
    }
}

/// Collects and trims an element's text content.
fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join("").trim().to_owned()
}

/// Returns the first capture group of `re` in `text`, if any.
fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Parses a fixed selector literal.
fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector '{css}': {e}"))
}

/// Compiles a fixed pattern literal.
fn pattern(re: &str) -> Regex {
    Regex::new(re).unwrap_or_else(|e| panic!("invalid built-in pattern '{re}': {e}"))
}
