//! Per-request fingerprint randomization.
//!
//! Static fingerprints are the primary signal anti-bot systems use to
//! cluster automated traffic, so every request draws a fresh profile:
//! a realistic desktop User-Agent, a plausible Accept-Language, and most of
//! the time a referer from a pool of credible upstream sources.

use std::collections::HashMap;

/// Current desktop browser user agents (updated Aug 2025).
pub const USER_AGENTS: &[&str] = &[
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/139.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36",
    // Chrome on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/139.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36",
    // Firefox on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:141.0) Gecko/20100101 Firefox/141.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:140.0) Gecko/20100101 Firefox/140.0",
    // Firefox on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:141.0) Gecko/20100101 Firefox/141.0",
    // Safari on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.5 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
    // Edge on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/139.0.0.0 Safari/537.36 Edg/139.0.0.0",
];

pub const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-GB,en;q=0.9",
    "en-US,en;q=0.8,de;q=0.5",
    "de-DE,de;q=0.9,en;q=0.7",
    "en-US,en;q=0.9,es;q=0.6",
];

/// Plausible upstream sources: search result pages and similar.
pub const DEFAULT_REFERERS: &[&str] = &[
    "https://www.google.com/",
    "https://www.google.com/search?q=match+results",
    "https://www.bing.com/search?q=league+results",
    "https://duckduckgo.com/",
];

/// One randomized header profile for a single request.
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintProfile {
    pub user_agent: String,
    pub accept_language: String,
    pub referer: Option<String>,
}

impl FingerprintProfile {
    /// Draw a fresh profile. `extra_referers` lets callers add the target
    /// site's own pages to the referer pool; `referer_probability` is the
    /// chance a referer is sent at all.
    pub fn randomized(extra_referers: &[String], referer_probability: f64) -> Self {
        let user_agent = USER_AGENTS[fastrand::usize(..USER_AGENTS.len())].to_string();
        let accept_language =
            ACCEPT_LANGUAGES[fastrand::usize(..ACCEPT_LANGUAGES.len())].to_string();

        let referer = if fastrand::f64() < referer_probability {
            let pool_len = DEFAULT_REFERERS.len() + extra_referers.len();
            let idx = fastrand::usize(..pool_len);
            let chosen = if idx < DEFAULT_REFERERS.len() {
                DEFAULT_REFERERS[idx].to_string()
            } else {
                extra_referers[idx - DEFAULT_REFERERS.len()].clone()
            };
            Some(chosen)
        } else {
            None
        };

        Self {
            user_agent,
            accept_language,
            referer,
        }
    }

    /// Header map as recorded on the fetch attempt.
    pub fn as_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("User-Agent".to_string(), self.user_agent.clone());
        headers.insert("Accept-Language".to_string(), self.accept_language.clone());
        if let Some(referer) = &self.referer {
            headers.insert("Referer".to_string(), referer.clone());
        }
        headers
    }
}
