//! Randomized outbound request identities.
//!
//! Every fetch attempt presents itself as a plausible browser session:
//! a user agent drawn from a fixed pool plus a fixed set of navigation
//! headers and session cookies. A fresh profile is generated per attempt
//! and discarded afterwards; there is no rotation state to correlate
//! across requests.

use std::time::SystemTime;

/// Browser user agents the fetcher impersonates.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/92.0.4515.107 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 14_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
];

/// Navigation headers sent with every request, regardless of user agent.
const NAVIGATION_HEADERS: &[(&str, &str)] = &[
    ("Referer", "https://www.yad2.co.il/"),
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
    ),
    ("Accept-Language", "en-US,en;q=0.9,he;q=0.8"),
    ("Cache-Control", "max-age=0"),
    ("Connection", "keep-alive"),
    ("DNT", "1"),
    ("Sec-Fetch-Dest", "document"),
    ("Sec-Fetch-Mode", "navigate"),
];

/// Session cookies expected by the listing site's frontend.
const SESSION_COOKIES: &[(&str, &str)] = &[
    ("__ssds", "3"),
    ("y2018-2-cohort", "88"),
    ("use_elastic_search", "1"),
    ("abTestKey", "2"),
    ("cohortGroup", "D"),
];

/// One outbound request identity. Immutable once generated; build a new
/// one for each attempt.
#[derive(Debug, Clone)]
pub struct RequestProfile {
    /// The user agent presented for this attempt.
    pub user_agent: &'static str,
}

impl RequestProfile {
    /// Generates a profile with a user agent chosen at random from the
    /// pool. Selection is independent per call.
    #[must_use]
    pub fn random() -> Self {
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos() as usize)
            .unwrap_or(0);
        Self {
            user_agent: USER_AGENTS[nanos % USER_AGENTS.len()],
        }
    }

    /// Applies this profile's user agent, navigation headers, and session
    /// cookies to a request builder.
    #[must_use]
    pub fn apply(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request = request.header("User-Agent", self.user_agent);
        for (name, value) in NAVIGATION_HEADERS {
            request = request.header(*name, *value);
        }
        request.header("Cookie", cookie_header())
    }
}

/// Renders the fixed session cookies as a `Cookie` header value.
fn cookie_header() -> String {
    SESSION_COOKIES
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}
