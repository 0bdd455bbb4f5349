#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Core data types shared across the adwatch packages.
//!
//! An [`AdRecord`] is one listing item extracted from a result page; a
//! [`Topic`] is one configured listing search; a [`RunResult`] is the
//! outcome of scraping one topic in one run.

use serde::{Deserialize, Serialize};

/// A single classified-ad listing item.
///
/// The `image_url` doubles as the record's identity for new-item
/// detection: listing pages reshuffle ordering and rewrite relative links
/// between visits, but the canonical image URL stays stable per ad. All
/// display fields default to empty strings when the markup lacks them:
/// a listing with missing secondary fields is still a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdRecord {
    /// Canonical image URL; the deduplication identifier.
    pub image_url: String,
    /// Absolute link to the ad's detail page.
    pub link: String,
    /// Street address line.
    pub address: String,
    /// Free-form description line.
    pub description: String,
    /// Floor number parsed from the structure line, when present.
    pub floor: Option<String>,
    /// Room count parsed from the structure line (may carry a half step,
    /// e.g. `"3.5"`), when present.
    pub rooms: Option<String>,
    /// Area in square meters parsed from the structure line, when present.
    pub area: Option<String>,
    /// Displayed price text.
    pub price: String,
    /// The raw structure line the derived fields were parsed from.
    pub structure_line: String,
}

impl AdRecord {
    /// Returns the deduplication identifier for this record.
    ///
    /// May be empty when the listing had no extractable image.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.image_url
    }
}

/// One configured listing search for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    /// Unique name within the owning user's topic list. Also names the
    /// per-topic state file and export files.
    pub name: String,
    /// Listing search URL to paginate over.
    pub url: String,
    /// Disabled topics are skipped by the scheduler.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

const fn default_enabled() -> bool {
    true
}

/// Result of scraping a single topic in one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// Name of the topic that was scraped.
    pub topic: String,
    /// Records not present in the topic's seen set before this run, in
    /// page order.
    pub new_records: Vec<AdRecord>,
}

impl RunResult {
    /// Returns `true` if this run surfaced at least one unseen record.
    #[must_use]
    pub fn has_new_records(&self) -> bool {
        !self.new_records.is_empty()
    }
}
