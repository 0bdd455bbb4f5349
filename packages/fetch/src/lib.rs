#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Resilient fetching of classified-ad listing pages.
//!
//! The listing site fronts its results with aggressive bot detection: a
//! flagged request gets an interstitial challenge page instead of
//! listings, and transient 5xx responses are common under load. Every
//! logical fetch therefore runs a bounded retry loop with exponential
//! backoff, a wall-clock budget, and a fresh randomized [`RequestProfile`]
//! per attempt.

pub mod profile;

use std::time::Duration;

use scraper::{Html, Selector};

pub use profile::RequestProfile;

/// Title of the interstitial page the site serves when it suspects a bot.
///
/// The challenge arrives with a 200 status, so it has to be recognized by
/// content rather than by status code.
pub const BOT_CHALLENGE_TITLE: &str = "ShieldSquare Captcha";

/// Errors that can occur while fetching a listing page.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transport-level HTTP failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status code.
    #[error("request returned status {status}")]
    Status {
        /// The status code the server returned.
        status: reqwest::StatusCode,
    },

    /// The server served a bot-challenge page instead of listings.
    #[error("bot challenge served instead of listings (agent: {user_agent})")]
    BotChallenge {
        /// The user agent that was flagged.
        user_agent: String,
    },

    /// The wall-clock budget for the whole fetch was exhausted.
    #[error("fetch aborted after exceeding the {budget:?} time budget")]
    TimedOut {
        /// The configured budget that was exceeded.
        budget: Duration,
    },
}

/// Retry behavior for one logical page fetch.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts before the last error is returned.
    pub max_attempts: u32,
    /// Wall-clock budget across all attempts and backoff sleeps. Checked
    /// before each attempt; exceeding it wins over remaining retries.
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            max_elapsed: Duration::from_secs(60),
        }
    }
}

/// Runs `attempt` under the given retry policy, sleeping `2^k` seconds
/// after the k-th failure.
///
/// The sleep suspends only the calling task, so sibling topic scrapes
/// keep progressing during backoff. Each invocation of `attempt` is
/// expected to build a fresh request identity.
///
/// # Errors
///
/// Returns [`FetchError::TimedOut`] when the time budget is exceeded
/// before an attempt starts, or the last attempt's error once
/// `max_attempts` failures have accumulated.
pub async fn fetch_with_retry<F, Fut>(
    policy: &RetryPolicy,
    mut attempt: F,
) -> Result<String, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, FetchError>>,
{
    let started = tokio::time::Instant::now();
    let mut failures: u32 = 0;

    loop {
        if started.elapsed() > policy.max_elapsed {
            log::error!(
                "time budget exceeded after {failures} failed attempt(s), aborting retries"
            );
            return Err(FetchError::TimedOut {
                budget: policy.max_elapsed,
            });
        }

        match attempt().await {
            Ok(body) => return Ok(body),
            Err(err) => {
                failures += 1;
                if failures >= policy.max_attempts {
                    return Err(err);
                }

                // Bot challenges mean the request identity was flagged,
                // not that the server is down. Same retry treatment,
                // distinct log line.
                match &err {
                    FetchError::BotChallenge { user_agent } => {
                        log::warn!("bot detection encountered, agent used: {user_agent}");
                    }
                    other => log::warn!("fetch attempt failed: {other}"),
                }

                let delay = Duration::from_secs(1u64 << failures);
                log::info!(
                    "retrying ({} attempts left, waiting {delay:?})",
                    policy.max_attempts - failures
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Fetches listing pages with retries and randomized request profiles.
#[derive(Debug, Clone)]
pub struct ListingFetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl ListingFetcher {
    /// Creates a fetcher with the given retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the HTTP client cannot be built.
    pub fn new(policy: RetryPolicy) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, policy })
    }

    /// Performs one logical page fetch: bounded retries, exponential
    /// backoff, and bot-challenge detection.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] once retries or the time budget are
    /// exhausted.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        log::debug!("fetching {url}");
        fetch_with_retry(&self.policy, || fetch_once(&self.client, url)).await
    }
}

/// A single fetch attempt with a fresh request profile.
async fn fetch_once(client: &reqwest::Client, url: &str) -> Result<String, FetchError> {
    let fetch_profile = RequestProfile::random();
    let response = fetch_profile.apply(client.get(url)).send().await?;

    let status = response.status();
    if !status.is_success() {
        log::error!("fetch failed with status {status} for {url}");
        return Err(FetchError::Status { status });
    }

    let body = response.text().await?;
    if is_bot_challenge(&body) {
        return Err(FetchError::BotChallenge {
            user_agent: fetch_profile.user_agent.to_string(),
        });
    }

    Ok(body)
}

/// Returns `true` if the document's `<title>` matches the known
/// bot-challenge marker page.
#[must_use]
pub fn is_bot_challenge(html: &str) -> bool {
    page_title(html).is_some_and(|title| title == BOT_CHALLENGE_TITLE)
}

/// Extracts the trimmed text of the first `<title>` element, if any.
fn page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    let title = document.select(&selector).next()?;
    Some(title.text().collect::<String>().trim().to_string())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn failing_status() -> FetchError {
        FetchError::Status {
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_without_retrying() {
        let started = tokio::time::Instant::now();
        let policy = RetryPolicy::default();

        let result = fetch_with_retry(&policy, || async { Ok("body".to_string()) }).await;

        assert_eq!(result.unwrap(), "body");
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn backs_off_two_then_four_seconds() {
        let started = tokio::time::Instant::now();
        let attempts = Cell::new(0u32);
        let policy = RetryPolicy::default();

        let result = fetch_with_retry(&policy, || {
            attempts.set(attempts.get() + 1);
            let n = attempts.get();
            async move {
                if n <= 2 {
                    Err(failing_status())
                } else {
                    Ok("listings".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "listings");
        assert_eq!(attempts.get(), 3);
        // 2s after the first failure, 4s after the second.
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_wins_over_remaining_retries() {
        let attempts = Cell::new(0u32);
        let policy = RetryPolicy {
            max_attempts: 4,
            max_elapsed: Duration::from_secs(5),
        };

        let result = fetch_with_retry(&policy, || {
            attempts.set(attempts.get() + 1);
            async { Err(failing_status()) }
        })
        .await;

        // Attempts at t=0 and t=2; the backoff to t=6 overruns the 5s
        // budget, so the third attempt never happens.
        assert!(matches!(result, Err(FetchError::TimedOut { .. })));
        assert_eq!(attempts.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_return_last_error() {
        let attempts = Cell::new(0u32);
        let policy = RetryPolicy {
            max_attempts: 3,
            max_elapsed: Duration::from_secs(60),
        };

        let result = fetch_with_retry(&policy, || {
            attempts.set(attempts.get() + 1);
            let n = attempts.get();
            async move {
                if n == 3 {
                    Err(FetchError::BotChallenge {
                        user_agent: "test-agent".to_string(),
                    })
                } else {
                    Err(failing_status())
                }
            }
        })
        .await;

        assert_eq!(attempts.get(), 3);
        assert!(matches!(result, Err(FetchError::BotChallenge { .. })));
    }

    #[test]
    fn recognizes_bot_challenge_title() {
        let html = "<html><head><title>ShieldSquare Captcha</title></head><body></body></html>";
        assert!(is_bot_challenge(html));
    }

    #[test]
    fn ignores_ordinary_titles() {
        let html = "<html><head><title>Apartments for sale</title></head><body></body></html>";
        assert!(!is_bot_challenge(html));
    }

    #[test]
    fn missing_title_is_not_a_challenge() {
        assert!(!is_bot_challenge("<html><body>no head</body></html>"));
    }
}
