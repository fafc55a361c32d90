//! Egress pool management: rotation, usage caps and exhaustion.
//!
//! The pool is the only shared mutable resource in a partition run and is
//! owned exclusively by that run, so access is plain `&mut` with no locks.

mod health;

pub use health::{HealthConfig, HealthTracker};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::AcquireError;
use crate::models::{
    EgressCredentials, EgressHandle, EgressPoint, EgressStatus, PointHealth, PoolHealthSummary,
};

/// Rotation and usage-cap policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Requests per point before proactive rotation.
    pub rotate_every: u32,
    /// Hard per-point request ceiling per session.
    pub usage_cap: u32,
    /// Session age after which a point's session counters reset.
    pub session_duration_limit_secs: u64,
    /// Rotate on every acquire when fewer than this fraction of points is
    /// usable (proactive rotation under stress).
    pub min_usable_fraction: f64,
    /// Attempt recovery of dead points every this many acquires.
    pub recovery_interval: u32,
    #[serde(default)]
    pub health: HealthConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            rotate_every: 15,
            usage_cap: 120,
            session_duration_limit_secs: 1800,
            min_usable_fraction: 0.3,
            recovery_interval: 25,
            health: HealthConfig::default(),
        }
    }
}

/// Ordered collection of egress points plus rotation state.
#[derive(Debug)]
pub struct EgressPool {
    points: Vec<EgressPoint>,
    current: usize,
    config: PoolConfig,
    tracker: HealthTracker,
    acquires_since_recovery: u32,
}

impl EgressPool {
    pub fn new(credentials: Vec<EgressCredentials>, config: PoolConfig) -> Self {
        let points = credentials.into_iter().map(EgressPoint::new).collect();
        let tracker = HealthTracker::new(config.health.clone());
        Self {
            points,
            current: 0,
            config,
            tracker,
            acquires_since_recovery: 0,
        }
    }

    /// A point is selectable when alive and under its usage cap.
    fn is_selectable(&self, point: &EgressPoint) -> bool {
        self.tracker.is_usable(point) && point.requests_this_session < self.config.usage_cap
    }

    /// Fraction of points currently usable (alive and uncapped).
    pub fn usable_fraction(&self) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        let usable = self.points.iter().filter(|p| self.is_selectable(p)).count();
        usable as f64 / self.points.len() as f64
    }

    /// Return the current usable point, rotating first when due.
    ///
    /// Rotation triggers: the per-point request counter hit `rotate_every`,
    /// the current point is capped or dead, or the pool is under stress
    /// (usable fraction below the configured floor). Never blocks; an
    /// exhausted pool is an immediate error.
    pub fn acquire(&mut self) -> Result<EgressHandle, AcquireError> {
        if self.points.is_empty() {
            return Err(AcquireError::PoolExhausted);
        }

        self.acquires_since_recovery += 1;

        let stressed = self.usable_fraction() < self.config.min_usable_fraction;
        let rotation_due = {
            let rotate_every = self.config.rotate_every.max(1);
            let point = &self.points[self.current];
            let count_due =
                point.requests_this_session > 0 && point.requests_this_session % rotate_every == 0;
            count_due || !self.is_selectable(point) || stressed
        };

        if rotation_due {
            self.rotate()?;
        }

        let point = &mut self.points[self.current];

        // Long-lived sessions shed accumulated state on a fixed cadence.
        let session_age = Utc::now() - point.session_started_at;
        if session_age.num_seconds() as u64 >= self.config.session_duration_limit_secs {
            debug!(point = %point.id, "session duration limit reached, resetting session");
            point.reset_session();
        }

        Ok(point.handle())
    }

    /// Advance to the next selectable point, wrapping. With a single usable
    /// point the rotation lands back on it.
    fn rotate(&mut self) -> Result<(), AcquireError> {
        let n = self.points.len();
        for offset in 1..=n {
            let idx = (self.current + offset) % n;
            if self.is_selectable(&self.points[idx]) {
                if idx != self.current {
                    debug!(
                        from = %self.points[self.current].id,
                        to = %self.points[idx].id,
                        "rotating egress point"
                    );
                }
                self.current = idx;
                self.points[idx].last_rotated_at = Some(Utc::now());
                return Ok(());
            }
        }
        warn!("egress pool exhausted: no usable points remain");
        Err(AcquireError::PoolExhausted)
    }

    /// Record the outcome of a fetch on a point and bump its usage counter.
    pub fn release(&mut self, point_id: &str, success: bool) {
        if let Some(point) = self.points.iter_mut().find(|p| p.id == point_id) {
            point.requests_this_session += 1;
            self.tracker.record_outcome(point, success);
            if point.status == EgressStatus::Dead {
                warn!(point = %point.id, "egress point marked dead");
            }
        }
    }

    /// IDs of dead points, in pool order.
    pub fn dead_points(&self) -> Vec<EgressHandle> {
        self.points
            .iter()
            .filter(|p| p.status == EgressStatus::Dead)
            .map(|p| p.handle())
            .collect()
    }

    /// Whether the periodic recovery pass is due. Resets the cadence
    /// counter when it is.
    pub fn recovery_due(&mut self) -> bool {
        if self.acquires_since_recovery >= self.config.recovery_interval {
            self.acquires_since_recovery = 0;
            !self.dead_points().is_empty()
        } else {
            false
        }
    }

    /// Apply a recovery-probe outcome to a dead point.
    pub fn record_probe(&mut self, point_id: &str, success: bool) -> bool {
        match self.points.iter_mut().find(|p| p.id == point_id) {
            Some(point) => self.tracker.record_probe(point, success),
            None => false,
        }
    }

    /// Full session boundary: reset per-session counters on every point.
    pub fn reset_session(&mut self) {
        for point in &mut self.points {
            point.reset_session();
        }
    }

    pub fn summary(&self) -> PoolHealthSummary {
        PoolHealthSummary {
            points: self
                .points
                .iter()
                .map(|p| PointHealth {
                    id: p.id.clone(),
                    status: p.status,
                    success_count: p.success_count,
                    total_count: p.total_count,
                    requests_this_session: p.requests_this_session,
                })
                .collect(),
        }
    }

    pub fn points(&self) -> &[EgressPoint] {
        &self.points
    }

    /// Restore persisted health state for a point, matched by id.
    pub fn restore_point_state(
        &mut self,
        point_id: &str,
        status: EgressStatus,
        success_count: u64,
        total_count: u64,
    ) {
        if let Some(point) = self.points.iter_mut().find(|p| p.id == point_id) {
            point.status = status;
            point.success_count = success_count;
            point.total_count = total_count;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(n: usize) -> Vec<EgressCredentials> {
        (0..n)
            .map(|i| EgressCredentials {
                host: format!("proxy-{i}.example.net"),
                port: 8080,
                scheme: Default::default(),
                username: None,
                password: None,
            })
            .collect()
    }

    fn pool(n: usize, config: PoolConfig) -> EgressPool {
        EgressPool::new(creds(n), config)
    }

    #[test]
    fn test_exhausted_pool_errors_immediately() {
        let mut p = pool(2, PoolConfig::default());
        for _ in 0..3 {
            let a = p.acquire().unwrap();
            p.release(&a.id, false);
        }
        // First point dead; kill the second too.
        for _ in 0..3 {
            match p.acquire() {
                Ok(a) => p.release(&a.id, false),
                Err(_) => break,
            }
        }
        assert!(matches!(p.acquire(), Err(AcquireError::PoolExhausted)));
    }

    #[test]
    fn test_empty_pool_is_exhausted() {
        let mut p = pool(0, PoolConfig::default());
        assert!(matches!(p.acquire(), Err(AcquireError::PoolExhausted)));
    }

    #[test]
    fn test_proactive_rotation_after_rotate_every() {
        let config = PoolConfig {
            rotate_every: 15,
            ..Default::default()
        };
        let mut p = pool(3, config);

        let first = p.acquire().unwrap().id;
        for _ in 0..15 {
            let a = p.acquire().unwrap();
            assert_eq!(a.id, first);
            p.release(&a.id, true);
        }
        let sixteenth = p.acquire().unwrap();
        assert_ne!(sixteenth.id, first);
    }

    #[test]
    fn test_single_point_rotation_lands_on_itself() {
        let config = PoolConfig {
            rotate_every: 2,
            ..Default::default()
        };
        let mut p = pool(1, config);
        let only = p.acquire().unwrap().id;
        p.release(&only, true);
        p.release(&only, true);
        assert_eq!(p.acquire().unwrap().id, only);
    }

    #[test]
    fn test_capped_point_never_selected_until_session_reset() {
        let config = PoolConfig {
            usage_cap: 2,
            rotate_every: 100,
            ..Default::default()
        };
        let mut p = pool(2, config);

        let first = p.acquire().unwrap().id;
        p.release(&first, true);
        p.release(&first, true);

        let next = p.acquire().unwrap().id;
        assert_ne!(next, first);

        p.release(&next, true);
        p.release(&next, true);
        assert!(matches!(p.acquire(), Err(AcquireError::PoolExhausted)));

        p.reset_session();
        assert!(p.acquire().is_ok());
    }

    #[test]
    fn test_dead_point_skipped() {
        let mut p = pool(2, PoolConfig::default());
        let first = p.acquire().unwrap().id;
        for _ in 0..3 {
            p.release(&first, false);
        }
        let next = p.acquire().unwrap().id;
        assert_ne!(next, first);
    }

    #[test]
    fn test_recovery_cadence() {
        let config = PoolConfig {
            recovery_interval: 5,
            ..Default::default()
        };
        let mut p = pool(2, config);
        let first = p.acquire().unwrap().id;
        for _ in 0..3 {
            p.release(&first, false);
        }
        assert!(!p.recovery_due());
        for _ in 0..5 {
            let a = p.acquire().unwrap();
            p.release(&a.id, true);
        }
        assert!(p.recovery_due());
        // Cadence counter reset; not due again immediately.
        assert!(!p.recovery_due());
    }

    #[test]
    fn test_probe_restores_point_to_rotation() {
        let mut p = pool(2, PoolConfig::default());
        let first = p.acquire().unwrap().id;
        for _ in 0..3 {
            p.release(&first, false);
        }
        assert_eq!(p.dead_points().len(), 1);
        assert!(p.record_probe(&first, true));
        assert!(p.dead_points().is_empty());
    }

    #[test]
    fn test_summary_reflects_counters() {
        let mut p = pool(1, PoolConfig::default());
        let a = p.acquire().unwrap();
        p.release(&a.id, true);
        p.release(&a.id, false);
        let summary = p.summary();
        assert_eq!(summary.points.len(), 1);
        assert_eq!(summary.points[0].success_count, 1);
        assert_eq!(summary.points[0].total_count, 2);
        assert_eq!(summary.points[0].requests_this_session, 2);
    }
}
