//! Endpoint health tracking.
//!
//! Updates per-point counters and status after every fetch attempt. Status
//! transitions: `Dead` only after a configured run of consecutive failures,
//! `Degraded` when the trailing-window success rate drops below threshold.
//! Dead points are only revived by a successful recovery probe.

use serde::{Deserialize, Serialize};

use crate::models::{EgressPoint, EgressStatus};

/// Health-transition thresholds. Tunable policy, not load-bearing logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Consecutive failures before a point is marked dead.
    pub failure_threshold: u32,
    /// Trailing-window success rate below which a point is degraded.
    pub degraded_threshold: f64,
    /// Trailing window size in attempts.
    pub window_size: usize,
    /// Minimum samples in the window before the degraded rule applies.
    pub min_samples: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            degraded_threshold: 0.5,
            window_size: 20,
            min_samples: 5,
        }
    }
}

/// Tracks liveness and success rate of egress points.
///
/// No side effects beyond point state; never raises. A failed recovery
/// probe is itself just an outcome.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    config: HealthConfig,
}

impl HealthTracker {
    pub fn new(config: HealthConfig) -> Self {
        Self { config }
    }

    /// Record the outcome of a regular fetch attempt on a point.
    pub fn record_outcome(&self, point: &mut EgressPoint, success: bool) {
        point.total_count += 1;
        if success {
            point.success_count += 1;
            point.consecutive_failures = 0;
        } else {
            point.consecutive_failures += 1;
        }

        point.recent.push_back(success);
        while point.recent.len() > self.config.window_size {
            point.recent.pop_front();
        }

        if point.consecutive_failures >= self.config.failure_threshold {
            point.status = EgressStatus::Dead;
            return;
        }

        // Dead points only recover through a probe.
        if point.status == EgressStatus::Dead {
            return;
        }

        if point.recent.len() >= self.config.min_samples {
            if point.window_success_rate() < self.config.degraded_threshold {
                point.status = EgressStatus::Degraded;
            } else {
                point.status = EgressStatus::Healthy;
            }
        }
    }

    /// Record the outcome of a lightweight recovery probe against a dead
    /// point. Returns the point's usability afterwards.
    pub fn record_probe(&self, point: &mut EgressPoint, success: bool) -> bool {
        if success {
            point.status = EgressStatus::Healthy;
            point.consecutive_failures = 0;
            point.recent.clear();
            true
        } else {
            point.status = EgressStatus::Dead;
            false
        }
    }

    /// Whether the point may be selected at all. Degraded points remain
    /// usable; capped points are filtered by the pool.
    pub fn is_usable(&self, point: &EgressPoint) -> bool {
        point.status != EgressStatus::Dead
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EgressCredentials, EgressScheme};

    fn point() -> EgressPoint {
        EgressPoint::new(EgressCredentials {
            host: "proxy.example.net".to_string(),
            port: 1080,
            scheme: EgressScheme::Socks5,
            username: None,
            password: None,
        })
    }

    fn tracker() -> HealthTracker {
        HealthTracker::new(HealthConfig::default())
    }

    #[test]
    fn test_dead_after_three_consecutive_failures() {
        let t = tracker();
        let mut p = point();
        for _ in 0..3 {
            t.record_outcome(&mut p, false);
        }
        assert_eq!(p.status, EgressStatus::Dead);
        assert!(!t.is_usable(&p));
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let t = tracker();
        let mut p = point();
        t.record_outcome(&mut p, false);
        t.record_outcome(&mut p, false);
        assert_eq!(p.consecutive_failures, 2);
        t.record_outcome(&mut p, true);
        assert_eq!(p.consecutive_failures, 0);
        assert_ne!(p.status, EgressStatus::Dead);
    }

    #[test]
    fn test_interleaved_failures_do_not_kill() {
        let t = tracker();
        let mut p = point();
        for _ in 0..5 {
            t.record_outcome(&mut p, false);
            t.record_outcome(&mut p, false);
            t.record_outcome(&mut p, true);
        }
        assert_ne!(p.status, EgressStatus::Dead);
    }

    #[test]
    fn test_degraded_on_low_window_rate() {
        let t = tracker();
        let mut p = point();
        // 2 successes, then alternating failures: rate drops below 50%
        // without ever reaching 3 consecutive failures.
        t.record_outcome(&mut p, true);
        for _ in 0..4 {
            t.record_outcome(&mut p, false);
            t.record_outcome(&mut p, true);
            t.record_outcome(&mut p, false);
        }
        assert_eq!(p.status, EgressStatus::Degraded);
        assert!(t.is_usable(&p));
    }

    #[test]
    fn test_recovers_to_healthy_on_sustained_success() {
        let t = tracker();
        let mut p = point();
        t.record_outcome(&mut p, false);
        t.record_outcome(&mut p, true);
        for _ in 0..20 {
            t.record_outcome(&mut p, true);
        }
        assert_eq!(p.status, EgressStatus::Healthy);
    }

    #[test]
    fn test_probe_revives_dead_point() {
        let t = tracker();
        let mut p = point();
        for _ in 0..3 {
            t.record_outcome(&mut p, false);
        }
        assert_eq!(p.status, EgressStatus::Dead);

        assert!(!t.record_probe(&mut p, false));
        assert_eq!(p.status, EgressStatus::Dead);

        assert!(t.record_probe(&mut p, true));
        assert_eq!(p.status, EgressStatus::Healthy);
        assert_eq!(p.consecutive_failures, 0);
    }

    #[test]
    fn test_dead_point_not_revived_by_regular_success() {
        let t = tracker();
        let mut p = point();
        for _ in 0..3 {
            t.record_outcome(&mut p, false);
        }
        t.record_outcome(&mut p, true);
        assert_eq!(p.status, EgressStatus::Dead);
        assert_eq!(p.consecutive_failures, 0);
    }
}
