//! Session-wide adaptive throttling.
//!
//! Per-call backoff reacts to one failing request; this layer watches a
//! slower-moving signal, the block/challenge rate over a trailing window,
//! and injects an extra delay before the next call once the whole session
//! is under pressure. Keeps the controller from hammering a site that has
//! started rate-limiting everything.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::FetchOutcome;

/// Throttle tier: at or above `min_block_rate`, delay uniformly within
/// `[delay_min_ms, delay_max_ms]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThrottleTier {
    pub min_block_rate: f64,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Maximum attempts kept in the trailing window.
    pub window_size: usize,
    /// Attempts older than this fall out of the window.
    pub window_secs: u64,
    /// Minimum attempts in the window before throttling engages.
    pub min_samples: usize,
    /// Tiers in ascending block-rate order; the highest matching tier wins.
    pub tiers: Vec<ThrottleTier>,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            window_secs: 3600,
            min_samples: 5,
            tiers: vec![
                ThrottleTier {
                    min_block_rate: 0.10,
                    delay_min_ms: 5_000,
                    delay_max_ms: 10_000,
                },
                ThrottleTier {
                    min_block_rate: 0.20,
                    delay_min_ms: 10_000,
                    delay_max_ms: 20_000,
                },
                ThrottleTier {
                    min_block_rate: 0.30,
                    delay_min_ms: 20_000,
                    delay_max_ms: 40_000,
                },
                ThrottleTier {
                    min_block_rate: 0.50,
                    delay_min_ms: 45_000,
                    delay_max_ms: 75_000,
                },
            ],
        }
    }
}

/// Trailing window of attempt outcomes driving session-level delays.
#[derive(Debug)]
pub struct AdaptiveThrottle {
    config: ThrottleConfig,
    /// (when, was block/challenge), newest last.
    window: VecDeque<(Instant, bool)>,
}

impl AdaptiveThrottle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            window: VecDeque::new(),
        }
    }

    /// Record an attempt outcome into the window.
    pub fn record(&mut self, outcome: FetchOutcome) {
        self.window.push_back((Instant::now(), outcome.is_pressure()));
        while self.window.len() > self.config.window_size {
            self.window.pop_front();
        }
    }

    fn evict_stale(&mut self) {
        let horizon = Duration::from_secs(self.config.window_secs);
        while let Some((when, _)) = self.window.front() {
            if when.elapsed() > horizon {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Block/challenge rate over the live window.
    pub fn block_rate(&mut self) -> f64 {
        self.evict_stale();
        if self.window.is_empty() {
            return 0.0;
        }
        let blocked = self.window.iter().filter(|(_, b)| *b).count();
        blocked as f64 / self.window.len() as f64
    }

    /// Extra delay to apply before the next call, if the session is under
    /// pressure. Jittered within the matching tier's bounds.
    pub fn pressure_delay(&mut self) -> Option<Duration> {
        self.evict_stale();
        if self.window.len() < self.config.min_samples {
            return None;
        }
        let rate = self.block_rate();
        let tier = self
            .config
            .tiers
            .iter()
            .filter(|t| rate >= t.min_block_rate)
            .last()?;
        let delay = Duration::from_millis(fastrand::u64(tier.delay_min_ms..=tier.delay_max_ms));
        debug!(block_rate = rate, ?delay, "session under pressure, throttling");
        Some(delay)
    }

    /// Number of attempts currently in the window.
    pub fn samples(&mut self) -> usize {
        self.evict_stale();
        self.window.len()
    }
}
