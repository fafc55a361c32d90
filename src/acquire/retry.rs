//! Retry and backoff control around single-page fetches.
//!
//! An explicit state machine per call: acquire a point, fetch, classify,
//! release, then either return the body or back off and go again. Errors
//! are reserved for conditions the loop cannot recover from: an exhausted
//! pool is a hard stop, not a retryable outcome.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::detect::BlockDetector;
use super::fetch::FetchExecutor;
use super::pool::EgressPool;
use super::throttle::AdaptiveThrottle;
use super::{AcquireError, FetchOutcome};
use crate::models::PoolHealthSummary;
use crate::state::StateStore;

/// Seam between run orchestration and the acquisition stack: anything that
/// can fetch one page with retries and manage its session.
#[async_trait]
pub trait PageFetcher: Send {
    async fn fetch_with_retry(
        &mut self,
        url: &str,
        required_markers: &[String],
    ) -> Result<String, AcquireError>;

    /// Full session boundary, not a retry.
    fn restart_session(&mut self);

    /// Pool health snapshot for reports.
    fn pool_summary(&self) -> PoolHealthSummary;

    /// Persist pool health to the state store.
    fn persist_pool(&self, store: &StateStore) -> Result<(), AcquireError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Base for exponential backoff: `base * 2^attempt` plus jitter.
    pub base_delay_ms: u64,
    /// Jitter bounds added on top of the exponential term.
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    /// Target for lightweight recovery probes against dead points.
    pub probe_url: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            jitter_min_ms: 1000,
            jitter_max_ms: 5000,
            probe_url: "https://www.gstatic.com/generate_204".to_string(),
        }
    }
}

/// Exponential term of the backoff, before jitter. Non-decreasing in the
/// attempt number.
pub fn backoff_base(config: &RetryConfig, attempt: u32) -> Duration {
    Duration::from_millis(config.base_delay_ms.saturating_mul(1u64 << attempt.min(16)))
}

/// Drives repeated fetches of one URL until a clean body arrives or the
/// retry budget runs out.
#[derive(Debug)]
pub struct RetryController {
    pool: EgressPool,
    executor: FetchExecutor,
    detector: BlockDetector,
    throttle: AdaptiveThrottle,
    config: RetryConfig,
}

impl RetryController {
    pub fn new(
        pool: EgressPool,
        executor: FetchExecutor,
        detector: BlockDetector,
        throttle: AdaptiveThrottle,
        config: RetryConfig,
    ) -> Self {
        Self {
            pool,
            executor,
            detector,
            throttle,
            config,
        }
    }

    /// Periodic recovery pass: probe dead points on the pool's cadence so
    /// capacity is not wasted probing known-bad points on every request.
    async fn maybe_recover(&mut self) {
        if !self.pool.recovery_due() {
            return;
        }
        let probe_url = self.config.probe_url.clone();
        for handle in self.pool.dead_points() {
            let revived = self.executor.probe(&probe_url, &handle).await;
            self.pool.record_probe(&handle.id, revived);
            if revived {
                info!(point = %handle.id, "egress point recovered");
            }
        }
    }

    pub fn pool(&self) -> &EgressPool {
        &self.pool
    }
}

#[async_trait]
impl PageFetcher for RetryController {
    /// Fetch one URL with retries, backoff and adaptive throttling.
    ///
    /// `required_markers` are the content signatures a genuine page of this
    /// type must carry; their absence is treated as a block.
    async fn fetch_with_retry(
        &mut self,
        url: &str,
        required_markers: &[String],
    ) -> Result<String, AcquireError> {
        let mut attempt: u32 = 0;
        let mut last = FetchOutcome::NetworkError;

        while attempt < self.config.max_attempts {
            // Session-level pressure delay, decoupled from per-call backoff.
            if let Some(delay) = self.throttle.pressure_delay() {
                tokio::time::sleep(delay).await;
            }

            self.maybe_recover().await;

            let point = self.pool.acquire()?;
            let result = self.executor.fetch(url, &point).await?;

            let outcome = match &result.body {
                Some(body) => {
                    self.detector
                        .classify(result.attempt.http_status, body, required_markers)
                }
                None => result.attempt.outcome,
            };
            self.throttle.record(outcome);

            if outcome.is_ok() {
                self.pool.release(&point.id, true);
                debug!(url, point = %point.id, bytes = result.attempt.byte_length, "fetch ok");
                // Classification guarantees a body here.
                if let Some(body) = result.body {
                    return Ok(body);
                }
                return Err(AcquireError::Network("empty body on ok outcome".to_string()));
            }

            self.pool.release(&point.id, false);
            last = outcome;

            let delay = backoff_base(&self.config, attempt)
                + Duration::from_millis(fastrand::u64(
                    self.config.jitter_min_ms..=self.config.jitter_max_ms.max(self.config.jitter_min_ms),
                ));
            warn!(
                url,
                attempt = attempt + 1,
                outcome = %outcome,
                backoff = ?delay,
                "fetch attempt failed"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }

        Err(AcquireError::FetchFailed {
            attempts: self.config.max_attempts,
            last,
        })
    }

    /// Full session boundary: drop per-point clients and session counters.
    fn restart_session(&mut self) {
        debug!("restarting acquisition session");
        self.executor.reset_sessions();
        self.pool.reset_session();
    }

    fn pool_summary(&self) -> PoolHealthSummary {
        self.pool.summary()
    }

    fn persist_pool(&self, store: &StateStore) -> Result<(), AcquireError> {
        store.save_pool_state(&self.pool).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::detect::DetectorConfig;
    use crate::acquire::fetch::FetchConfig;
    use crate::acquire::pool::PoolConfig;
    use crate::acquire::throttle::ThrottleConfig;

    #[tokio::test]
    async fn test_exhausted_pool_is_hard_stop() {
        let pool = EgressPool::new(Vec::new(), PoolConfig::default());
        let executor = FetchExecutor::new(FetchConfig::default());
        let detector = BlockDetector::new(&DetectorConfig::default()).unwrap();
        let throttle = AdaptiveThrottle::new(ThrottleConfig::default());
        let mut controller =
            RetryController::new(pool, executor, detector, throttle, RetryConfig::default());

        let result = controller
            .fetch_with_retry("https://results.example.com/", &[])
            .await;
        assert!(matches!(result, Err(AcquireError::PoolExhausted)));
    }

    #[test]
    fn test_backoff_monotonic_before_jitter() {
        let config = RetryConfig::default();
        let mut previous = Duration::ZERO;
        for attempt in 0..8 {
            let delay = backoff_base(&config, attempt);
            assert!(delay >= previous, "backoff must be non-decreasing");
            previous = delay;
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let config = RetryConfig {
            base_delay_ms: 1000,
            ..Default::default()
        };
        assert_eq!(backoff_base(&config, 0), Duration::from_millis(1000));
        assert_eq!(backoff_base(&config, 1), Duration::from_millis(2000));
        assert_eq!(backoff_base(&config, 2), Duration::from_millis(4000));
    }

    #[test]
    fn test_backoff_saturates_instead_of_overflowing() {
        let config = RetryConfig {
            base_delay_ms: u64::MAX / 2,
            ..Default::default()
        };
        // Must not panic.
        let _ = backoff_base(&config, 60);
    }
}
