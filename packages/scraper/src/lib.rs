#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Listing-page scraping: record extraction and pagination walking.
//!
//! A listing search spreads its results over numbered pages. The
//! [`walk_listing_pages`] loop fetches page 1, 2, 3, ... through a
//! [`PageSource`] and feeds each body to a [`PageExtractor`], stopping at
//! the first page that yields no records. Downstream new-item detection
//! needs the complete result set, so the walk is eager rather than
//! streamed.

pub mod extract;

use adwatch_fetch::{FetchError, ListingFetcher};
use adwatch_models::AdRecord;

pub use extract::ListingExtractor;

/// Source of raw listing-page bodies.
///
/// The production implementation is [`ListingFetcher`]; tests substitute
/// scripted sources.
pub trait PageSource {
    /// Fetches the body of a single listing page.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the page could not be retrieved.
    fn fetch_page(&self, url: &str) -> impl Future<Output = Result<String, FetchError>> + Send;
}

impl PageSource for ListingFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        self.fetch(url).await
    }
}

/// Extracts ad records from a fetched page body.
///
/// Extraction is infallible by design: a page without the expected item
/// markers simply produces zero records, which the walker reads as the
/// end of the result set.
pub trait PageExtractor {
    /// Extracts zero or more records from a page body, in page order.
    fn extract(&self, html: &str) -> Vec<AdRecord>;
}

/// Builds the URL for a numbered result page.
///
/// Appends a `page` query parameter, choosing `?` or `&` depending on
/// whether the base URL already carries a query string.
#[must_use]
pub fn page_url(base_url: &str, page: u32) -> String {
    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!("{base_url}{separator}page={page}")
}

/// Fetches every result page of a listing search and returns the
/// concatenated records in page order.
///
/// Pages are fetched strictly sequentially: the end condition is only
/// knowable after seeing a page's extraction result. An empty page is a
/// normal termination, even on page 1 (the topic currently has no ads).
///
/// # Errors
///
/// Returns [`FetchError`] if any page fetch fails; records accumulated
/// from earlier pages are discarded with the error.
pub async fn walk_listing_pages<S, E>(
    source: &S,
    extractor: &E,
    base_url: &str,
) -> Result<Vec<AdRecord>, FetchError>
where
    S: PageSource,
    E: PageExtractor,
{
    let mut all_records = Vec::new();
    let mut page: u32 = 1;

    loop {
        let url = page_url(base_url, page);
        log::debug!("scraping page {page}: {url}");

        let body = source.fetch_page(&url).await?;
        let records = extractor.extract(&body);

        if records.is_empty() {
            log::info!("no ads found on page {page}, reached end of listings");
            break;
        }

        log::debug!("page {page}: extracted {} records", records.len());
        all_records.extend(records);
        page += 1;
    }

    log::info!("walk complete: {} records from {base_url}", all_records.len());
    Ok(all_records)
}
