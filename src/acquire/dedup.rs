//! Deduplication and validation of candidate records.
//!
//! Three collapse tiers applied in order, then structural validation with a
//! rejection report. Idempotence is a hard requirement: feeding the engine's
//! own output back through it yields the identical set with zero further
//! collapses or rejections.

use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{
    CandidateRecord, CanonicalRecord, CollapseCounters, RejectionReport, CANONICAL_SCHEMA_VERSION,
};

/// Validation policy for surviving records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Upper plausibility bound for score-like fields.
    pub max_score: u32,
    /// Records dated before this are implausible.
    pub earliest_date: NaiveDate,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_score: 200,
            earliest_date: NaiveDate::from_ymd_opt(1950, 1, 1).expect("valid date"),
        }
    }
}

/// Output of one dedup run: the clean records plus what was dropped and why.
#[derive(Debug, Clone)]
pub struct DedupOutcome {
    pub records: Vec<CanonicalRecord>,
    pub collapsed: CollapseCounters,
    pub rejections: RejectionReport,
}

/// Collapses duplicates and rejects structurally invalid records.
#[derive(Debug, Clone, Default)]
pub struct DedupEngine {
    config: ValidationConfig,
}

impl DedupEngine {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Process a candidate stream into canonical records.
    ///
    /// Order-insensitive for correctness; first-seen wins within each tier.
    pub fn process(&self, candidates: Vec<CandidateRecord>) -> DedupOutcome {
        let mut collapsed = CollapseCounters::default();
        let mut rejections = RejectionReport::default();

        // Tier 1: exact structural duplicates (identical serialized content).
        let mut seen_content: HashSet<String> = HashSet::new();
        // Tier 2: shared natural identifier, keep first-seen.
        let mut seen_refs: HashSet<String> = HashSet::new();
        // Tier 3: same participants, date and result; incidental fields differ.
        let mut seen_similar: HashSet<String> = HashSet::new();
        // Hard invariant: at most one canonical record per identity key.
        let mut seen_identity: HashSet<String> = HashSet::new();

        let mut records = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            if !seen_content.insert(candidate.content_hash()) {
                collapsed.exact += 1;
                continue;
            }

            if let Some(source_ref) = &candidate.source_ref {
                if !seen_refs.insert(source_ref.clone()) {
                    collapsed.natural_id += 1;
                    continue;
                }
            }

            if !seen_similar.insert(candidate.similarity_key()) {
                collapsed.similar += 1;
                warn!(
                    home = %candidate.home,
                    away = %candidate.away,
                    "collapsed near-duplicate record"
                );
                continue;
            }

            let record = match self.validate(candidate, &mut rejections) {
                Some(record) => record,
                None => continue,
            };

            if !seen_identity.insert(record.identity_key.clone()) {
                collapsed.similar += 1;
                continue;
            }
            records.push(record);
        }

        debug!(
            kept = records.len(),
            collapsed = collapsed.total(),
            rejected = rejections.total(),
            "dedup pass complete"
        );

        DedupOutcome {
            records,
            collapsed,
            rejections,
        }
    }

    /// Structural validation; failures are counted, not raised.
    fn validate(
        &self,
        candidate: CandidateRecord,
        rejections: &mut RejectionReport,
    ) -> Option<CanonicalRecord> {
        let Some(date) = candidate.date else {
            rejections.missing_date += 1;
            return None;
        };
        if date < self.config.earliest_date {
            rejections.implausible_date += 1;
            return None;
        }
        if candidate.home.trim().is_empty() || candidate.away.trim().is_empty() {
            rejections.missing_participant += 1;
            return None;
        }

        let result = match resolve_result(&candidate) {
            Some(result) => result,
            None => {
                rejections.missing_result += 1;
                return None;
            }
        };

        for score in [candidate.home_score, candidate.away_score].into_iter().flatten() {
            if score > self.config.max_score {
                rejections.implausible_score += 1;
                return None;
            }
        }

        let identity_key = CanonicalRecord::identity_key_for(
            date,
            &candidate.home,
            &candidate.away,
            candidate.venue.as_deref(),
        );

        Some(CanonicalRecord {
            identity_key,
            date,
            home: candidate.home,
            away: candidate.away,
            result,
            home_score: candidate.home_score,
            away_score: candidate.away_score,
            venue: candidate.venue,
            source_ref: candidate.source_ref,
            acquired_at: Utc::now(),
            schema_version: CANONICAL_SCHEMA_VERSION,
        })
    }
}

/// A record's result: the raw string if present, else reconstructed from
/// numeric scores.
fn resolve_result(candidate: &CandidateRecord) -> Option<String> {
    if let Some(result) = &candidate.result {
        if !result.trim().is_empty() {
            return Some(result.trim().to_string());
        }
    }
    match (candidate.home_score, candidate.away_score) {
        (Some(h), Some(a)) => Some(format!("{h}:{a}")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> DedupEngine {
        DedupEngine::new(ValidationConfig::default())
    }

    fn candidate(home: &str, away: &str, day: u32) -> CandidateRecord {
        CandidateRecord {
            date: NaiveDate::from_ymd_opt(2025, 2, day),
            home: home.to_string(),
            away: away.to_string(),
            result: Some("2:1".to_string()),
            home_score: Some(2),
            away_score: Some(1),
            venue: Some("Arena".to_string()),
            source_ref: None,
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn test_exact_duplicates_dropped() {
        let outcome = engine().process(vec![
            candidate("Alpha", "Beta", 11),
            candidate("Alpha", "Beta", 11),
            candidate("Gamma", "Delta", 11),
        ]);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.collapsed.exact, 1);
    }

    #[test]
    fn test_natural_id_collapse_keeps_first() {
        let mut a = candidate("Alpha", "Beta", 11);
        a.source_ref = Some("match-100".to_string());
        let mut b = candidate("Gamma", "Delta", 12);
        b.source_ref = Some("match-100".to_string());

        let outcome = engine().process(vec![a, b]);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].home, "Alpha");
        assert_eq!(outcome.collapsed.natural_id, 1);
    }

    #[test]
    fn test_similar_collapse_with_warning_counter() {
        let a = candidate("Alpha", "Beta", 11);
        let mut b = candidate("Alpha", "Beta", 11);
        b.venue = Some("Other Arena".to_string());

        let outcome = engine().process(vec![a, b]);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.collapsed.similar, 1);
        assert_eq!(outcome.records[0].venue.as_deref(), Some("Arena"));
    }

    #[test]
    fn test_missing_fields_rejected_and_counted() {
        let mut no_date = candidate("Alpha", "Beta", 11);
        no_date.date = None;
        let mut no_home = candidate("", "Beta", 12);
        no_home.home = "  ".to_string();
        let mut no_result = candidate("Gamma", "Delta", 13);
        no_result.result = None;
        no_result.home_score = None;
        no_result.away_score = None;

        let outcome = engine().process(vec![no_date, no_home, no_result]);
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.rejections.missing_date, 1);
        assert_eq!(outcome.rejections.missing_participant, 1);
        assert_eq!(outcome.rejections.missing_result, 1);
        assert_eq!(outcome.rejections.total(), 3);
    }

    #[test]
    fn test_implausible_score_rejected() {
        let mut wild = candidate("Alpha", "Beta", 11);
        wild.home_score = Some(4000);
        wild.result = Some("4000:0".to_string());

        let outcome = engine().process(vec![wild]);
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.rejections.implausible_score, 1);
    }

    #[test]
    fn test_implausible_date_rejected() {
        let mut ancient = candidate("Alpha", "Beta", 11);
        ancient.date = NaiveDate::from_ymd_opt(1890, 5, 1);

        let outcome = engine().process(vec![ancient]);
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.rejections.implausible_date, 1);
    }

    #[test]
    fn test_result_reconstructed_from_scores() {
        let mut scores_only = candidate("Alpha", "Beta", 11);
        scores_only.result = None;

        let outcome = engine().process(vec![scores_only]);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].result, "2:1");
    }

    #[test]
    fn test_idempotence() {
        let batch = vec![
            candidate("Alpha", "Beta", 11),
            candidate("Alpha", "Beta", 11),
            candidate("Gamma", "Delta", 12),
            {
                let mut c = candidate("Gamma", "Delta", 12);
                c.venue = None;
                c
            },
        ];
        let e = engine();
        let first = e.process(batch);

        let again: Vec<CandidateRecord> = first
            .records
            .iter()
            .cloned()
            .map(CandidateRecord::from)
            .collect();
        let second = e.process(again);

        assert_eq!(second.collapsed.total(), 0);
        assert_eq!(second.rejections.total(), 0);
        let first_keys: Vec<&str> = first.records.iter().map(|r| r.identity_key.as_str()).collect();
        let second_keys: Vec<&str> = second.records.iter().map(|r| r.identity_key.as_str()).collect();
        assert_eq!(first_keys, second_keys);
    }

    #[test]
    fn test_order_insensitive_count() {
        let batch = vec![
            candidate("Alpha", "Beta", 11),
            candidate("Gamma", "Delta", 12),
            candidate("Alpha", "Beta", 11),
        ];
        let mut reversed = batch.clone();
        reversed.reverse();

        let e = engine();
        assert_eq!(
            e.process(batch).records.len(),
            e.process(reversed).records.len()
        );
    }
}
