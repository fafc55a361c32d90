//! Single-fetch execution through an egress point.
//!
//! One `reqwest::Client` per egress point, built lazily and dropped at
//! session boundaries so cookie jars and connection state do not accumulate
//! into a fingerprint of their own.

mod fingerprint;

pub use fingerprint::{FingerprintProfile, ACCEPT_LANGUAGES, DEFAULT_REFERERS, USER_AGENTS};

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AcquireError, FetchAttempt, FetchOutcome};
use crate::models::EgressHandle;

/// Fetch-executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Hard per-call timeout, independent of retry backoff.
    pub timeout_secs: u64,
    /// Floor delay bounds applied after every request (anti timing
    /// fingerprint). Uniform random in `[min, max]`.
    pub floor_delay_min_ms: u64,
    pub floor_delay_max_ms: u64,
    /// Probability that a request carries a Referer header.
    pub referer_probability: f64,
    /// Site-local pages added to the referer pool.
    #[serde(default)]
    pub extra_referers: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 35,
            floor_delay_min_ms: 2000,
            floor_delay_max_ms: 6000,
            referer_probability: 0.8,
            extra_referers: Vec::new(),
        }
    }
}

/// Result of one fetch: the attempt record plus the body when one arrived.
#[derive(Debug)]
pub struct FetchResult {
    pub attempt: FetchAttempt,
    pub body: Option<String>,
}

/// Issues HTTP fetches with a randomized fingerprint per call.
///
/// All mutable acquisition state lives in the caller-supplied pool; the
/// executor only caches the per-point clients.
#[derive(Debug)]
pub struct FetchExecutor {
    config: FetchConfig,
    clients: HashMap<String, Client>,
}

impl FetchExecutor {
    pub fn new(config: FetchConfig) -> Self {
        Self {
            config,
            clients: HashMap::new(),
        }
    }

    /// Build (or reuse) the client bound to an egress point's proxy.
    fn client_for(&mut self, point: &EgressHandle) -> Result<&Client, AcquireError> {
        if !self.clients.contains_key(&point.id) {
            let mut proxy = reqwest::Proxy::all(&point.proxy_url)
                .map_err(|e| AcquireError::Config(format!("bad proxy url {}: {e}", point.proxy_url)))?;
            if let (Some(user), Some(pass)) = (&point.username, &point.password) {
                proxy = proxy.basic_auth(user, pass);
            }
            let client = Client::builder()
                .proxy(proxy)
                .timeout(Duration::from_secs(self.config.timeout_secs))
                .cookie_store(true)
                .gzip(true)
                .brotli(true)
                .build()
                .map_err(|e| AcquireError::Config(format!("failed to build http client: {e}")))?;
            self.clients.insert(point.id.clone(), client);
        }
        Ok(&self.clients[&point.id])
    }

    /// Issue a single GET through the given egress point.
    ///
    /// Never returns a transport error: network failures and timeouts are
    /// recorded as the attempt's outcome for the retry controller to act on.
    /// The configured floor delay is applied before returning control.
    pub async fn fetch(&mut self, url: &str, point: &EgressHandle) -> Result<FetchResult, AcquireError> {
        let profile =
            FingerprintProfile::randomized(&self.config.extra_referers, self.config.referer_probability);
        let headers_used = profile.as_headers();

        let mut attempt = FetchAttempt {
            url: url.to_string(),
            egress_point_id: point.id.clone(),
            headers_used,
            started_at: Utc::now(),
            duration: Duration::ZERO,
            http_status: None,
            byte_length: 0,
            outcome: FetchOutcome::NetworkError,
        };

        let mut request = self
            .client_for(point)?
            .get(url)
            .header(reqwest::header::USER_AGENT, &profile.user_agent)
            .header(reqwest::header::ACCEPT_LANGUAGE, &profile.accept_language);
        if let Some(referer) = &profile.referer {
            request = request.header(reqwest::header::REFERER, referer);
        }

        let start = Instant::now();
        let mut result = match request.send().await {
            Ok(response) => {
                attempt.http_status = Some(response.status().as_u16());
                match response.text().await {
                    Ok(body) => {
                        attempt.byte_length = body.len();
                        attempt.outcome = FetchOutcome::Ok;
                        FetchResult {
                            attempt: attempt.clone(),
                            body: Some(body),
                        }
                    }
                    Err(e) => {
                        attempt.outcome = classify_transport_error(&e);
                        debug!(url, error = %e, "failed reading response body");
                        FetchResult {
                            attempt: attempt.clone(),
                            body: None,
                        }
                    }
                }
            }
            Err(e) => {
                attempt.outcome = classify_transport_error(&e);
                debug!(url, point = %point.id, error = %e, "fetch failed");
                FetchResult {
                    attempt: attempt.clone(),
                    body: None,
                }
            }
        };
        result.attempt.duration = start.elapsed();

        self.floor_delay().await;

        Ok(result)
    }

    /// Lightweight recovery probe: success means the egress point can still
    /// reach the network at all, regardless of body content.
    pub async fn probe(&mut self, url: &str, point: &EgressHandle) -> bool {
        match self.fetch(url, point).await {
            Ok(result) => matches!(
                result.attempt.http_status,
                Some(status) if (200..400).contains(&status)
            ),
            Err(_) => false,
        }
    }

    /// Uniform random delay before returning control, so inter-request
    /// timing does not form a fingerprint.
    async fn floor_delay(&self) {
        let min = self.config.floor_delay_min_ms;
        let max = self.config.floor_delay_max_ms.max(min);
        if max == 0 {
            return;
        }
        let delay = Duration::from_millis(fastrand::u64(min..=max));
        tokio::time::sleep(delay).await;
    }

    /// Drop all cached clients: full session boundary, not a retry.
    pub fn reset_sessions(&mut self) {
        self.clients.clear();
    }
}

/// Timeouts feed the same machinery as other transport failures but keep
/// their own classification.
fn classify_transport_error(error: &reqwest::Error) -> FetchOutcome {
    if error.is_timeout() {
        FetchOutcome::Timeout
    } else {
        FetchOutcome::NetworkError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> EgressHandle {
        EgressHandle {
            id: "proxy.example.net:8080".to_string(),
            proxy_url: "http://proxy.example.net:8080".to_string(),
            username: None,
            password: None,
        }
    }

    #[test]
    fn test_client_cache_reused_and_reset() {
        let mut executor = FetchExecutor::new(FetchConfig::default());
        let point = handle();
        executor.client_for(&point).unwrap();
        assert_eq!(executor.clients.len(), 1);
        executor.client_for(&point).unwrap();
        assert_eq!(executor.clients.len(), 1);
        executor.reset_sessions();
        assert!(executor.clients.is_empty());
    }

    #[test]
    fn test_bad_proxy_url_is_config_error() {
        let mut executor = FetchExecutor::new(FetchConfig::default());
        let point = EgressHandle {
            id: "bad".to_string(),
            proxy_url: "not a url".to_string(),
            username: None,
            password: None,
        };
        assert!(matches!(
            executor.client_for(&point),
            Err(AcquireError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_against_unreachable_proxy_reports_outcome() {
        let config = FetchConfig {
            timeout_secs: 1,
            floor_delay_min_ms: 0,
            floor_delay_max_ms: 0,
            ..Default::default()
        };
        let mut executor = FetchExecutor::new(config);
        let point = EgressHandle {
            id: "127.0.0.1:1".to_string(),
            proxy_url: "http://127.0.0.1:1".to_string(),
            username: None,
            password: None,
        };
        let result = executor
            .fetch("http://example.com/", &point)
            .await
            .unwrap();
        assert!(result.body.is_none());
        assert!(matches!(
            result.attempt.outcome,
            FetchOutcome::NetworkError | FetchOutcome::Timeout
        ));
        assert_eq!(result.attempt.egress_point_id, point.id);
        assert!(result.attempt.headers_used.contains_key("User-Agent"));
    }
}
