//! Run reports: the per-partition summary every run terminates with.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::acquire::delta::DeltaStrategy;
use crate::models::egress::EgressStatus;

/// Health summary for one egress point, as included in a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointHealth {
    pub id: String,
    pub status: EgressStatus,
    pub success_count: u64,
    pub total_count: u64,
    pub requests_this_session: u32,
}

/// Snapshot of pool health at the end of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolHealthSummary {
    pub points: Vec<PointHealth>,
}

impl PoolHealthSummary {
    pub fn usable_count(&self) -> usize {
        self.points
            .iter()
            .filter(|p| p.status != EgressStatus::Dead)
            .count()
    }
}

/// Duplicate-collapse counters from the dedup engine, per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollapseCounters {
    /// Byte-identical serialized duplicates dropped.
    pub exact: usize,
    /// Duplicates sharing a natural identifier, collapsed keep-first.
    pub natural_id: usize,
    /// Same participants/date/result with differing incidental fields.
    pub similar: usize,
}

impl CollapseCounters {
    pub fn total(&self) -> usize {
        self.exact + self.natural_id + self.similar
    }
}

/// Why a surviving record was rejected during validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionReport {
    pub missing_date: usize,
    pub missing_participant: usize,
    pub missing_result: usize,
    pub implausible_score: usize,
    pub implausible_date: usize,
}

impl RejectionReport {
    pub fn total(&self) -> usize {
        self.missing_date
            + self.missing_participant
            + self.missing_result
            + self.implausible_score
            + self.implausible_date
    }
}

/// Terminal outcome of a partition run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum RunOutcome {
    /// Run completed; may have acquired zero records (no new data).
    Success,
    /// Run aborted; records acquired before the failure were still emitted.
    Failed(String),
}

/// Per-partition run report. Always produced, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub partition: String,
    pub strategy: DeltaStrategy,
    pub range_start: Option<NaiveDate>,
    pub range_end: Option<NaiveDate>,
    pub pages_fetched: usize,
    pub candidates: usize,
    pub canonical: usize,
    pub collapsed: CollapseCounters,
    pub rejections: RejectionReport,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub pool: PoolHealthSummary,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Success)
    }
}
