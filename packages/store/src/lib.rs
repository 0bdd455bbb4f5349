#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Durable per-topic seen-identifier store.
//!
//! Each topic owns one JSON file holding the identifiers of every ad ever
//! observed for it, as an ordered array. [`reconcile`] partitions a run's
//! candidate records into new vs already-seen against that file and
//! persists the union before any downstream export happens, so a crash
//! after persistence can at worst suppress a notification, never
//! duplicate one.
//!
//! A corrupt state file is backed up under a sibling `.backup` path and
//! replaced with an empty set: losing dedup history for one topic is
//! recoverable noise, aborting the whole run is not.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use adwatch_models::AdRecord;

/// Errors that can occur while reading or writing topic state.
///
/// Note that a *corrupt* state file is not an error: it is repaired in
/// place (backup + reset) and only logged.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The state directory or file could not be read, created, or written.
    #[error("state I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The updated identifier set could not be serialized.
    #[error("state serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The set of ad identifiers previously observed for one topic.
///
/// Keeps insertion order for the on-disk representation while answering
/// membership queries through a hash index. The empty string is a legal
/// member: records without an extractable image URL share one dedup
/// bucket, matching the historical state-file format.
#[derive(Debug, Default)]
pub struct SeenSet {
    ids: Vec<String>,
    index: HashSet<String>,
}

impl SeenSet {
    /// Builds a set from a persisted identifier array, dropping any
    /// duplicates while keeping first-occurrence order.
    #[must_use]
    pub fn from_ids(ids: Vec<String>) -> Self {
        let mut set = Self::default();
        for id in ids {
            set.insert(id);
        }
        set
    }

    /// Returns `true` if the identifier has been observed before.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Inserts an identifier, returning `true` if it was not yet a member.
    pub fn insert(&mut self, id: String) -> bool {
        if self.index.insert(id.clone()) {
            self.ids.push(id);
            true
        } else {
            false
        }
    }

    /// Returns the identifiers in insertion order.
    #[must_use]
    pub fn identifiers(&self) -> &[String] {
        &self.ids
    }

    /// Number of distinct identifiers in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if no identifiers have been observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Path of a topic's state file inside the state directory.
#[must_use]
pub fn state_path(state_dir: &Path, topic: &str) -> PathBuf {
    state_dir.join(format!("{topic}.json"))
}

/// Sibling path a corrupt state file is preserved under.
fn backup_path(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.backup", path.display()))
}

/// Loads a topic's seen set from disk.
///
/// An absent file is initialized to an empty array (creating the state
/// directory if needed). An unparseable file is backed up to
/// `<path>.backup` and treated as empty.
///
/// # Errors
///
/// Returns [`StoreError::Io`] if the directory or file cannot be read,
/// created, or backed up.
pub fn load_seen_set(state_dir: &Path, topic: &str) -> Result<SeenSet, StoreError> {
    let path = state_path(state_dir, topic);

    if !path.exists() {
        log::info!(
            "no state file for topic {topic}, creating {}",
            path.display()
        );
        fs::create_dir_all(state_dir)?;
        fs::write(&path, "[]")?;
        return Ok(SeenSet::default());
    }

    let raw = fs::read_to_string(&path)?;
    match serde_json::from_str::<Vec<String>>(&raw) {
        Ok(ids) => {
            log::debug!("loaded {} seen identifiers for topic {topic}", ids.len());
            Ok(SeenSet::from_ids(ids))
        }
        Err(e) => {
            let backup = backup_path(&path);
            fs::write(&backup, raw.as_bytes())?;
            log::error!(
                "corrupt state for topic {topic} ({e}), raw bytes preserved at {}, continuing with an empty set",
                backup.display()
            );
            Ok(SeenSet::default())
        }
    }
}

/// Writes a topic's seen set back to disk as one whole-file overwrite.
///
/// # Errors
///
/// Returns [`StoreError`] if serialization or the write fails.
pub fn persist_seen_set(state_dir: &Path, topic: &str, set: &SeenSet) -> Result<(), StoreError> {
    let path = state_path(state_dir, topic);
    let json = serde_json::to_string_pretty(set.identifiers())?;
    fs::write(&path, json)?;
    log::debug!("persisted {} identifiers for topic {topic}", set.len());
    Ok(())
}

/// Partitions `candidates` into new vs already-seen for `topic`,
/// persisting the updated set when anything new was found.
///
/// A candidate is new iff its identifier is not a member of the *loaded*
/// set; candidate order is preserved in the returned records. With zero
/// new records the state file is left untouched.
///
/// # Errors
///
/// Returns [`StoreError`] if state cannot be loaded or persisted.
pub fn reconcile(
    state_dir: &Path,
    topic: &str,
    candidates: &[AdRecord],
) -> Result<Vec<AdRecord>, StoreError> {
    let mut seen = load_seen_set(state_dir, topic)?;

    let new_records: Vec<AdRecord> = candidates
        .iter()
        .filter(|record| !seen.contains(record.identifier()))
        .cloned()
        .collect();

    log::info!(
        "topic {topic}: {} new of {} candidates",
        new_records.len(),
        candidates.len()
    );

    if !new_records.is_empty() {
        for record in &new_records {
            seen.insert(record.identifier().to_string());
        }
        persist_seen_set(state_dir, topic, &seen)?;
    }

    Ok(new_records)
}
