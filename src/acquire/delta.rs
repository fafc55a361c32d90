//! Delta strategy selection: local vs remote freshness.
//!
//! Deliberately has no fallback heuristics. An earlier iteration guessed a
//! range when the remote state was ambiguous and once produced a 171-day
//! incorrect gap; since then an unobtainable remote date means "do nothing",
//! never a substituted range.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// Fetch scope decided from local and remote freshness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaStrategy {
    /// Cold start: no local data exists at all.
    Full,
    /// Fetch only the gap between local and remote latest dates.
    Incremental,
    /// Incremental with a full re-scan if the gap fetch comes up empty.
    IncrementalWithFallback,
    /// Nothing to do, or nothing that can safely be done.
    None,
}

impl DeltaStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
            Self::IncrementalWithFallback => "incremental_with_fallback",
            Self::None => "none",
        }
    }
}

/// Result of comparing local and remote freshness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaDecision {
    pub strategy: DeltaStrategy,
    pub range_start: Option<NaiveDate>,
    pub range_end: Option<NaiveDate>,
}

impl DeltaDecision {
    pub fn none() -> Self {
        Self {
            strategy: DeltaStrategy::None,
            range_start: None,
            range_end: None,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.strategy == DeltaStrategy::None
    }
}

/// Decide fetch scope from the locally-known latest record date and the
/// remote site's latest date (when obtainable).
///
/// - Remote unobtainable: do nothing. Never substitute a guessed range.
/// - Remote at or behind local: nothing new, do nothing.
/// - Otherwise: incremental over `[local + 1 day, remote]`.
/// - No local data at all: full scrape (requires a known remote end).
pub fn decide(local_latest: Option<NaiveDate>, remote_latest: Option<NaiveDate>) -> DeltaDecision {
    let Some(remote) = remote_latest else {
        return DeltaDecision::none();
    };

    let Some(local) = local_latest else {
        return DeltaDecision {
            strategy: DeltaStrategy::Full,
            range_start: None,
            range_end: Some(remote),
        };
    };

    if remote <= local {
        return DeltaDecision::none();
    }

    let start = local
        .checked_add_days(Days::new(1))
        .unwrap_or(remote);
    DeltaDecision {
        strategy: DeltaStrategy::Incremental,
        range_start: Some(start),
        range_end: Some(remote),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_unreachable_remote_is_noop() {
        let decision = decide(Some(date(2025, 2, 11)), None);
        assert_eq!(decision.strategy, DeltaStrategy::None);
        assert_eq!(decision.range_start, None);
        assert_eq!(decision.range_end, None);
    }

    #[test]
    fn test_unreachable_remote_with_no_local_is_still_noop() {
        let decision = decide(None, None);
        assert!(decision.is_noop());
    }

    #[test]
    fn test_local_ahead_of_remote_is_noop() {
        let decision = decide(Some(date(2025, 2, 19)), Some(date(2025, 2, 11)));
        assert_eq!(decision.strategy, DeltaStrategy::None);
        assert_eq!(decision.range_start, None);
        assert_eq!(decision.range_end, None);
    }

    #[test]
    fn test_equal_dates_is_noop() {
        let decision = decide(Some(date(2025, 2, 11)), Some(date(2025, 2, 11)));
        assert!(decision.is_noop());
    }

    #[test]
    fn test_real_gap_is_incremental() {
        let decision = decide(Some(date(2025, 2, 11)), Some(date(2025, 2, 19)));
        assert_eq!(decision.strategy, DeltaStrategy::Incremental);
        assert_eq!(decision.range_start, Some(date(2025, 2, 12)));
        assert_eq!(decision.range_end, Some(date(2025, 2, 19)));
    }

    #[test]
    fn test_one_day_gap() {
        let decision = decide(Some(date(2025, 2, 11)), Some(date(2025, 2, 12)));
        assert_eq!(decision.strategy, DeltaStrategy::Incremental);
        assert_eq!(decision.range_start, Some(date(2025, 2, 12)));
        assert_eq!(decision.range_end, Some(date(2025, 2, 12)));
    }

    #[test]
    fn test_cold_start_is_full() {
        let decision = decide(None, Some(date(2025, 2, 19)));
        assert_eq!(decision.strategy, DeltaStrategy::Full);
        assert_eq!(decision.range_start, None);
        assert_eq!(decision.range_end, Some(date(2025, 2, 19)));
    }
}
