//! Watcher configuration.
//!
//! One TOML file defines, per user, an ordered list of listing topics:
//!
//! ```toml
//! [users.default_user]
//! topics = [
//!   { name = "neot_rachel_sales", url = "https://www.yad2.co.il/realestate/forsale?area=5" },
//!   { name = "old_north_rentals", url = "https://www.yad2.co.il/realestate/rent?area=3", enabled = false },
//! ]
//! ```
//!
//! The config is loaded once in `main` and passed by value into the
//! scheduler; there is no process-wide configuration state.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use adwatch_models::Topic;
use serde::Deserialize;

use crate::ScanError;

/// The full watcher configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    /// Topic lists keyed by user id.
    pub users: BTreeMap<String, UserConfig>,
}

/// One user's configured topics.
#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    /// Listing searches to watch, in configuration order.
    pub topics: Vec<Topic>,
}

/// Loads and parses the configuration file.
///
/// # Errors
///
/// Returns [`ScanError::Config`] if the file cannot be read or parsed;
/// running without configuration is a fatal startup condition.
pub fn load_config(path: &Path) -> Result<WatchConfig, ScanError> {
    let raw = fs::read_to_string(path).map_err(|e| ScanError::Config {
        message: format!("cannot read config file {}: {e}", path.display()),
    })?;

    let config: WatchConfig = toml::de::from_str(&raw).map_err(|e| ScanError::Config {
        message: format!("malformed config file {}: {e}", path.display()),
    })?;

    log::debug!("loaded configuration for {} user(s)", config.users.len());
    Ok(config)
}
