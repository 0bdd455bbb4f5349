#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Topic scheduling and the per-topic scrape pipeline.
//!
//! [`run_user`] resolves which topics to scrape, drives each through
//! walk → reconcile → export, and bounds how many topics are in flight
//! at once. The bound exists because the listing site's bot detection is
//! sensitive to request volume; it is a throughput/risk tradeoff, not a
//! correctness requirement. Topic failures are isolated: one topic's
//! fetch failure is logged and never cancels its siblings.

pub mod config;

use std::fs;
use std::path::{Path, PathBuf};

use adwatch_export::ExportError;
use adwatch_fetch::{FetchError, ListingFetcher, RetryPolicy};
use adwatch_models::{RunResult, Topic};
use adwatch_scraper::{ListingExtractor, PageExtractor, PageSource, walk_listing_pages};
use adwatch_store::StoreError;
use futures::StreamExt as _;

pub use config::{UserConfig, WatchConfig, load_config};

/// Maximum number of topic scrapes in flight at once.
pub const MAX_CONCURRENT_TOPICS: usize = 3;

/// Errors that can occur while running a scan.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// Missing or invalid configuration, unknown user, or an unknown or
    /// disabled requested topic. Fatal to the whole run.
    #[error("configuration error: {message}")]
    Config {
        /// What was wrong with the configuration.
        message: String,
    },

    /// A page fetch failed after exhausting retries. Fatal to the
    /// containing topic only.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Topic state could not be read or written. Fatal to the topic.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Exporting new records failed. Fatal to the topic.
    #[error(transparent)]
    Export(#[from] ExportError),

    /// The signal file could not be written. Fatal to the topic.
    #[error("signal file error: {0}")]
    Signal(#[source] std::io::Error),
}

/// Filesystem locations a scan reads and writes.
#[derive(Debug, Clone)]
pub struct ScanPaths {
    /// Directory holding per-topic seen-set files.
    pub state_dir: PathBuf,
    /// Directory receiving per-topic CSV exports.
    pub export_dir: PathBuf,
    /// Content-free marker file written when any topic has new ads; an
    /// external pipeline keys publication off its existence.
    pub signal_file: PathBuf,
}

/// Resolves the topics to scrape for `user`.
///
/// With a `topic_filter`, exactly that topic is returned; it must exist
/// and be enabled. Without one, every enabled topic is returned in
/// configuration order.
///
/// # Errors
///
/// Returns [`ScanError::Config`] for an unknown user, an unknown
/// requested topic, or a disabled requested topic.
pub fn resolve_topics(
    config: &WatchConfig,
    user: &str,
    topic_filter: Option<&str>,
) -> Result<Vec<Topic>, ScanError> {
    let user_config = config.users.get(user).ok_or_else(|| ScanError::Config {
        message: format!("user {user} not found in configuration"),
    })?;

    let Some(name) = topic_filter else {
        return Ok(user_config
            .topics
            .iter()
            .filter(|topic| topic.enabled)
            .cloned()
            .collect());
    };

    let topic = user_config
        .topics
        .iter()
        .find(|topic| topic.name == name)
        .ok_or_else(|| ScanError::Config {
            message: format!("topic {name} not found for user {user}"),
        })?;

    if !topic.enabled {
        return Err(ScanError::Config {
            message: format!("topic {name} is disabled"),
        });
    }

    Ok(vec![topic.clone()])
}

/// Scrapes one topic end to end: walk all pages, diff against the seen
/// set, and on any new records export them and raise the signal file.
///
/// # Errors
///
/// Returns [`ScanError`] if fetching, state persistence, export, or the
/// signal write fails. The caller treats this as fatal to the topic only.
pub async fn scrape_topic<S, E>(
    source: &S,
    extractor: &E,
    topic: &Topic,
    paths: &ScanPaths,
) -> Result<RunResult, ScanError>
where
    S: PageSource,
    E: PageExtractor,
{
    log::info!("starting scrape for topic {}", topic.name);

    let candidates = walk_listing_pages(source, extractor, &topic.url).await?;
    log::info!("topic {}: scraped {} ads", topic.name, candidates.len());

    let new_records = adwatch_store::reconcile(&paths.state_dir, &topic.name, &candidates)?;

    if new_records.is_empty() {
        log::info!("no new items for topic {}", topic.name);
    } else {
        adwatch_export::write_new_records(&paths.export_dir, &topic.name, &new_records)?;
        write_signal_file(&paths.signal_file)?;
    }

    Ok(RunResult {
        topic: topic.name.clone(),
        new_records,
    })
}

/// Writes the content-free marker telling the downstream pipeline that
/// new data is ready to publish.
fn write_signal_file(path: &Path) -> Result<(), ScanError> {
    log::info!("writing signal file {}", path.display());
    fs::write(path, "").map_err(ScanError::Signal)
}

/// Runs `topics` with at most [`MAX_CONCURRENT_TOPICS`] in flight and
/// returns each topic's outcome.
///
/// Every topic future resolves to an outcome value rather than
/// propagating its error, so one failure never cancels sibling topics.
pub async fn run_topics<S, E>(
    source: &S,
    extractor: &E,
    topics: &[Topic],
    paths: &ScanPaths,
) -> Vec<(String, Result<RunResult, ScanError>)>
where
    S: PageSource,
    E: PageExtractor,
{
    futures::stream::iter(topics.iter().map(|topic| async move {
        let outcome = scrape_topic(source, extractor, topic, paths).await;
        (topic.name.clone(), outcome)
    }))
    .buffer_unordered(MAX_CONCURRENT_TOPICS)
    .collect()
    .await
}

/// Resolves topics for `user` and scrapes them all, logging per-topic
/// outcomes.
///
/// # Errors
///
/// Returns [`ScanError::Config`] for configuration-level failures and
/// [`ScanError::Fetch`] if the HTTP client cannot be constructed.
/// Per-topic scrape failures are logged, not returned.
pub async fn run_user(
    config: &WatchConfig,
    paths: &ScanPaths,
    user: &str,
    topic_filter: Option<&str>,
) -> Result<(), ScanError> {
    let topics = resolve_topics(config, user, topic_filter)?;
    if topics.is_empty() {
        log::warn!("no enabled topics for user {user}");
        return Ok(());
    }

    log::info!(
        "scraping {} topic(s) for user {user}: {}",
        topics.len(),
        topics
            .iter()
            .map(|topic| topic.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let fetcher = ListingFetcher::new(RetryPolicy::default())?;
    let extractor = ListingExtractor::new();

    let outcomes = run_topics(&fetcher, &extractor, &topics, paths).await;
    for (name, outcome) in outcomes {
        match outcome {
            Ok(result) if result.has_new_records() => {
                log::info!("topic {name}: {} new ad(s)", result.new_records.len());
            }
            Ok(_) => log::info!("topic {name}: no new ads"),
            Err(e) => log::error!("topic {name} failed: {e}"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use adwatch_models::AdRecord;
    use adwatch_store::load_seen_set;

    use super::*;

    fn listing_page(ids: &[&str]) -> String {
        let items: Vec<String> = ids
            .iter()
            .map(|id| {
                format!(
                    r#"<div data-testid="item-basic"><img data-testid="image" src="{id}"></div>"#
                )
            })
            .collect();
        format!("<html><body>{}</body></html>", items.join(""))
    }

    /// Serves one scripted body per page number; pages past the script
    /// are empty, ending the walk.
    struct ScriptedSource {
        pages: Vec<String>,
    }

    impl PageSource for ScriptedSource {
        async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
            let page: usize = url
                .rsplit("page=")
                .next()
                .and_then(|n| n.parse().ok())
                .expect("page parameter in url");
            Ok(self
                .pages
                .get(page - 1)
                .cloned()
                .unwrap_or_else(|| "<html></html>".to_string()))
        }
    }

    /// Fails topics whose URL contains "broken", serves one empty page
    /// otherwise. Tracks how many fetches are in flight at once.
    struct GatedSource {
        in_flight: AtomicU32,
        high_water: AtomicU32,
    }

    impl GatedSource {
        fn new() -> Self {
            Self {
                in_flight: AtomicU32::new(0),
                high_water: AtomicU32::new(0),
            }
        }
    }

    impl PageSource for GatedSource {
        async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.high_water.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if url.contains("broken") {
                Err(FetchError::Status {
                    status: reqwest::StatusCode::BAD_GATEWAY,
                })
            } else {
                Ok("<html></html>".to_string())
            }
        }
    }

    fn sample_config() -> WatchConfig {
        toml::de::from_str(
            r#"
            [users.default_user]
            topics = [
              { name = "rentals", url = "https://example.com/rent" },
              { name = "sales", url = "https://example.com/forsale" },
              { name = "offices", url = "https://example.com/offices", enabled = false },
            ]
            "#,
        )
        .unwrap()
    }

    fn paths_in(dir: &Path) -> ScanPaths {
        ScanPaths {
            state_dir: dir.join("state"),
            export_dir: dir.join("exports"),
            signal_file: dir.join("push_me"),
        }
    }

    fn topic(name: &str, url: &str) -> Topic {
        Topic {
            name: name.to_string(),
            url: url.to_string(),
            enabled: true,
        }
    }

    #[test]
    fn resolves_all_enabled_topics_by_default() {
        let config = sample_config();
        let topics = resolve_topics(&config, "default_user", None).unwrap();
        let names: Vec<&str> = topics.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["rentals", "sales"]);
    }

    #[test]
    fn unknown_user_is_a_config_error() {
        let config = sample_config();
        let result = resolve_topics(&config, "nobody", None);
        assert!(matches!(result, Err(ScanError::Config { .. })));
    }

    #[test]
    fn unknown_topic_is_a_config_error() {
        let config = sample_config();
        let result = resolve_topics(&config, "default_user", Some("parking"));
        assert!(matches!(result, Err(ScanError::Config { .. })));
    }

    #[test]
    fn disabled_topic_cannot_be_requested() {
        let config = sample_config();
        let result = resolve_topics(&config, "default_user", Some("offices"));
        assert!(matches!(result, Err(ScanError::Config { .. })));
    }

    #[test]
    fn named_topic_resolves_alone() {
        let config = sample_config();
        let topics = resolve_topics(&config, "default_user", Some("sales")).unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].name, "sales");
    }

    #[tokio::test]
    async fn first_run_reports_everything_and_raises_signal() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        let source = ScriptedSource {
            pages: vec![listing_page(&["a", "b"])],
        };

        let result = scrape_topic(
            &source,
            &ListingExtractor::new(),
            &topic("rentals", "https://example.com/rent"),
            &paths,
        )
        .await
        .unwrap();

        let ids: Vec<&str> = result.new_records.iter().map(AdRecord::identifier).collect();
        assert_eq!(ids, ["a", "b"]);

        let set = load_seen_set(&paths.state_dir, "rentals").unwrap();
        assert_eq!(set.identifiers(), ["a", "b"]);
        assert!(paths.signal_file.exists());
        assert!(paths.export_dir.read_dir().unwrap().count() == 1);
    }

    #[tokio::test]
    async fn second_run_reports_only_unseen_records() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        let rentals = topic("rentals", "https://example.com/rent");
        let extractor = ListingExtractor::new();

        let first = ScriptedSource {
            pages: vec![listing_page(&["a", "b"])],
        };
        scrape_topic(&first, &extractor, &rentals, &paths)
            .await
            .unwrap();

        let second = ScriptedSource {
            pages: vec![listing_page(&["a", "c"])],
        };
        let result = scrape_topic(&second, &extractor, &rentals, &paths)
            .await
            .unwrap();

        let ids: Vec<&str> = result.new_records.iter().map(AdRecord::identifier).collect();
        assert_eq!(ids, ["c"]);

        let set = load_seen_set(&paths.state_dir, "rentals").unwrap();
        assert_eq!(set.identifiers(), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn no_new_records_means_no_signal_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        let source = ScriptedSource { pages: vec![] };

        let result = scrape_topic(
            &source,
            &ListingExtractor::new(),
            &topic("rentals", "https://example.com/rent"),
            &paths,
        )
        .await
        .unwrap();

        assert!(!result.has_new_records());
        assert!(!paths.signal_file.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn at_most_three_topics_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        let source = GatedSource::new();
        let topics: Vec<Topic> = (0..10)
            .map(|i| topic(&format!("topic_{i}"), &format!("https://example.com/{i}")))
            .collect();

        let outcomes = run_topics(&source, &ListingExtractor::new(), &topics, &paths).await;

        assert_eq!(outcomes.len(), 10);
        assert_eq!(source.high_water.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn one_failing_topic_does_not_cancel_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        let source = GatedSource::new();
        let topics = vec![
            topic("good", "https://example.com/rent"),
            topic("bad", "https://example.com/broken"),
            topic("also_good", "https://example.com/forsale"),
        ];

        let outcomes = run_topics(&source, &ListingExtractor::new(), &topics, &paths).await;

        assert_eq!(outcomes.len(), 3);
        let failed: Vec<&str> = outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_err())
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(failed, ["bad"]);
    }
}
