#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Spreadsheet export of newly observed ads.
//!
//! Writes one CSV file per topic per day into the export directory. The
//! filename carries the topic and the current UTC date at day
//! granularity, so multiple runs on the same day overwrite the file
//! instead of accumulating near-duplicates.

use std::fs;
use std::path::{Path, PathBuf};

use adwatch_models::AdRecord;
use chrono::Utc;

/// Errors that can occur while exporting records.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The export directory or file could not be created or written.
    #[error("export I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Column headers, matching [`AdRecord`]'s fields.
const HEADERS: [&str; 9] = [
    "image_url",
    "link",
    "address",
    "description",
    "floor",
    "rooms",
    "area",
    "price",
    "structure_line",
];

/// Writes `records` to `<export_dir>/<topic>_<YYYY-MM-DD>.csv`, creating
/// the directory if needed, and returns the file path.
///
/// # Errors
///
/// Returns [`ExportError`] if the directory or file cannot be written.
pub fn write_new_records(
    export_dir: &Path,
    topic: &str,
    records: &[AdRecord],
) -> Result<PathBuf, ExportError> {
    fs::create_dir_all(export_dir)?;

    let date = Utc::now().format("%Y-%m-%d");
    let path = export_dir.join(format!("{topic}_{date}.csv"));

    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(HEADERS)?;
    for record in records {
        writer.write_record([
            record.image_url.as_str(),
            record.link.as_str(),
            record.address.as_str(),
            record.description.as_str(),
            record.floor.as_deref().unwrap_or(""),
            record.rooms.as_deref().unwrap_or(""),
            record.area.as_deref().unwrap_or(""),
            record.price.as_str(),
            record.structure_line.as_str(),
        ])?;
    }
    writer.flush()?;

    log::info!(
        "exported {} record(s) for topic {topic} to {}",
        records.len(),
        path.display()
    );
    Ok(path)
}
