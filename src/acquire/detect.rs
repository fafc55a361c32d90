//! Block and challenge detection.
//!
//! Status codes alone under-detect: many anti-bot systems answer HTTP 200
//! with an interstitial or a decoy page. Classification therefore also
//! inspects body length, known challenge signatures and the presence of
//! content markers a genuine page of this type must carry.

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{AcquireError, FetchOutcome};

/// Challenge-page signatures seen across common anti-bot vendors.
const DEFAULT_CHALLENGE_MARKERS: &[&str] = &[
    r"(?i)checking your browser",
    r"(?i)verify(ing)? you are (a )?human",
    r"(?i)cf-challenge",
    r"(?i)captcha",
    r"(?i)attention required",
    r"(?i)enable javascript and cookies to continue",
    r"(?i)ddos[- ]?protection",
];

/// Detector configuration. Thresholds are policy, not load-bearing logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Bodies shorter than this are treated as soft blocks.
    pub min_content_length: usize,
    /// Regex patterns identifying challenge interstitials.
    pub challenge_markers: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_content_length: 600,
            challenge_markers: DEFAULT_CHALLENGE_MARKERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Classifies fetch results as clean, challenged or blocked.
#[derive(Debug)]
pub struct BlockDetector {
    min_content_length: usize,
    challenge_patterns: Vec<Regex>,
}

impl BlockDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self, AcquireError> {
        let mut challenge_patterns = Vec::with_capacity(config.challenge_markers.len());
        for pattern in &config.challenge_markers {
            let compiled = Regex::new(pattern).map_err(|e| {
                AcquireError::Config(format!("invalid challenge marker {pattern:?}: {e}"))
            })?;
            challenge_patterns.push(compiled);
        }
        Ok(Self {
            min_content_length: config.min_content_length,
            challenge_patterns,
        })
    }

    /// Classify a completed HTTP exchange.
    ///
    /// Rules, in order: hard-block status codes; suspiciously short body;
    /// challenge signature; missing content markers (decoy page); else ok.
    pub fn classify(
        &self,
        http_status: Option<u16>,
        body: &str,
        required_markers: &[String],
    ) -> FetchOutcome {
        match http_status {
            Some(403) | Some(429) => return FetchOutcome::Blocked,
            Some(status) if (400..500).contains(&status) => return FetchOutcome::Blocked,
            // Server errors are transport trouble, not block pressure.
            Some(status) if status >= 500 => return FetchOutcome::NetworkError,
            None => return FetchOutcome::NetworkError,
            _ => {}
        }

        if body.len() < self.min_content_length {
            // Empty and stub pages are a common soft-block signature.
            return FetchOutcome::Blocked;
        }

        if self.challenge_patterns.iter().any(|p| p.is_match(body)) {
            return FetchOutcome::Challenged;
        }

        // A 200 that does not look like a genuine page of this type is a
        // decoy; treat it exactly like a hard block.
        if !required_markers.is_empty() {
            let all_present = required_markers.iter().all(|m| body.contains(m.as_str()));
            if !all_present {
                return FetchOutcome::Blocked;
            }
        }

        FetchOutcome::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> BlockDetector {
        BlockDetector::new(&DetectorConfig::default()).unwrap()
    }

    fn genuine_body() -> String {
        let mut body = String::from("<html><body><table class=\"results\">");
        for i in 0..40 {
            body.push_str(&format!("<tr><td>match {i}</td></tr>"));
        }
        body.push_str("</table></body></html>");
        body
    }

    #[test]
    fn test_hard_block_status() {
        let d = detector();
        assert_eq!(
            d.classify(Some(403), &genuine_body(), &[]),
            FetchOutcome::Blocked
        );
        assert_eq!(
            d.classify(Some(429), &genuine_body(), &[]),
            FetchOutcome::Blocked
        );
    }

    #[test]
    fn test_short_body_is_blocked_despite_200() {
        let d = detector();
        let body = "x".repeat(200);
        assert_eq!(d.classify(Some(200), &body, &[]), FetchOutcome::Blocked);
    }

    #[test]
    fn test_challenge_marker() {
        let d = detector();
        let mut body = genuine_body();
        body.push_str("Checking your browser before accessing");
        assert_eq!(d.classify(Some(200), &body, &[]), FetchOutcome::Challenged);
    }

    #[test]
    fn test_missing_required_marker_is_blocked() {
        let d = detector();
        let markers = vec!["class=\"standings\"".to_string()];
        assert_eq!(
            d.classify(Some(200), &genuine_body(), &markers),
            FetchOutcome::Blocked
        );
    }

    #[test]
    fn test_genuine_page_is_ok() {
        let d = detector();
        let markers = vec!["class=\"results\"".to_string()];
        assert_eq!(
            d.classify(Some(200), &genuine_body(), &markers),
            FetchOutcome::Ok
        );
    }

    #[test]
    fn test_missing_status_is_network_error() {
        let d = detector();
        assert_eq!(d.classify(None, "", &[]), FetchOutcome::NetworkError);
    }
}
