//! Per-partition run orchestration.
//!
//! A single logical worker drives the retry controller sequentially within
//! one partition; concurrency only ever happens at the granularity of
//! independent partitions, each with its own pool session and rate budget.

use std::time::Instant;

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::acquire::dedup::DedupEngine;
use crate::acquire::delta::{self, DeltaDecision, DeltaStrategy};
use crate::acquire::retry::PageFetcher;
use crate::acquire::AcquireError;
use crate::models::{CandidateRecord, CanonicalRecord, RunOutcome, RunReport};
use crate::state::{Checkpoint, StateStore};

/// How a run decides its fetch scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Compare local and remote freshness.
    #[default]
    Auto,
    /// Ignore local data and re-fetch everything.
    ForceFull,
    /// Incremental even if local data looks complete; cold start still
    /// degrades to a full fetch.
    ForceIncremental,
}

/// One independently-fetched league or partition, as configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionSpec {
    pub id: String,
    /// Landing page used by the freshness probe.
    pub index_url: String,
    /// Per-date page URL; `{date}` is substituted with `YYYY-MM-DD`.
    pub page_url_template: String,
    /// Content signatures a genuine page of this partition must carry.
    #[serde(default)]
    pub required_markers: Vec<String>,
    /// Range start for full fetches.
    #[serde(default)]
    pub first_season_start: Option<NaiveDate>,
}

impl PartitionSpec {
    pub fn page_url(&self, date: NaiveDate) -> String {
        self.page_url_template.replace("{date}", &date.to_string())
    }
}

/// Cadences for checkpointing and session recycling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Persist a checkpoint every this many completed units.
    pub checkpoint_every: u32,
    /// Restart the whole session context every this many units.
    pub session_restart_every: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            checkpoint_every: 5,
            session_restart_every: 10,
        }
    }
}

/// Page-model collaborator: turns a raw fetched body into candidate
/// records. All markup knowledge lives behind this seam.
pub trait PageModel: Send + Sync {
    fn parse(&self, body: &str, partition: &PartitionSpec)
        -> Result<Vec<CandidateRecord>, AcquireError>;
}

/// Freshness-query collaborator: the remote site's latest known record
/// date for a partition. The production implementation routes its fetch
/// through the same retry controller as everything else.
#[async_trait]
pub trait FreshnessProbe: Send + Sync {
    async fn remote_latest(
        &self,
        fetcher: &mut dyn PageFetcher,
        partition: &PartitionSpec,
    ) -> Result<Option<NaiveDate>, AcquireError>;
}

/// Local-state collaborator: the latest record date already persisted for
/// a partition.
pub trait LocalState: Send + Sync {
    fn local_latest(&self, partition: &str) -> Result<Option<NaiveDate>, AcquireError>;
}

/// Downstream import/storage collaborator consuming the validated stream.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn emit(
        &self,
        partition: &str,
        records: &[CanonicalRecord],
    ) -> Result<(), AcquireError>;
}

/// Drives one partition's acquisition from delta decision to emitted
/// canonical records, with periodic checkpoints and session restarts.
pub struct Runner {
    controller: Box<dyn PageFetcher>,
    dedup: DedupEngine,
    page_model: Box<dyn PageModel>,
    freshness: Box<dyn FreshnessProbe>,
    local: Box<dyn LocalState>,
    sink: Box<dyn RecordSink>,
    store: StateStore,
    config: RunnerConfig,
}

impl Runner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        controller: Box<dyn PageFetcher>,
        dedup: DedupEngine,
        page_model: Box<dyn PageModel>,
        freshness: Box<dyn FreshnessProbe>,
        local: Box<dyn LocalState>,
        sink: Box<dyn RecordSink>,
        store: StateStore,
        config: RunnerConfig,
    ) -> Self {
        Self {
            controller,
            dedup,
            page_model,
            freshness,
            local,
            sink,
            store,
            config,
        }
    }

    /// Run one partition. Always terminates with a report; failures are
    /// carried in the report's outcome, with records acquired before the
    /// failure still emitted downstream.
    pub async fn run(&mut self, partition: &PartitionSpec, mode: RunMode) -> RunReport {
        let started_at = Utc::now();
        let timer = Instant::now();

        let decision = match self.decide(partition, mode).await {
            Ok(decision) => decision,
            Err(e) => {
                return self.report(
                    partition,
                    DeltaDecision::none(),
                    started_at,
                    timer,
                    0,
                    RunOutcome::Failed(e.to_string()),
                );
            }
        };

        info!(
            partition = %partition.id,
            strategy = decision.strategy.as_str(),
            range_start = ?decision.range_start,
            range_end = ?decision.range_end,
            "delta decision"
        );

        if decision.is_noop() {
            return self.report(partition, decision, started_at, timer, 0, RunOutcome::Success);
        }

        let (range_start, range_end) = match self.resolve_range(partition, &decision) {
            Ok(bounds) => bounds,
            Err(e) => {
                return self.report(
                    partition,
                    decision,
                    started_at,
                    timer,
                    0,
                    RunOutcome::Failed(e.to_string()),
                );
            }
        };
        // The report carries the range actually planned, which for a full
        // fetch differs from the decision's open start.
        let decision = DeltaDecision {
            strategy: decision.strategy,
            range_start: Some(range_start),
            range_end: Some(range_end),
        };

        // Resume from a checkpoint when one lies inside the planned range.
        // Forced modes always start over: the operator asked for the scope.
        let mut cursor = range_start;
        let mut completed_units: u32 = 0;
        if mode == RunMode::Auto {
            if let Ok(Some(checkpoint)) = self.store.load_checkpoint(&partition.id) {
                if checkpoint.cursor_date >= range_start && checkpoint.cursor_date < range_end {
                    cursor = checkpoint.cursor_date + Days::new(1);
                    completed_units = checkpoint.completed_units;
                    info!(
                        partition = %partition.id,
                        resume_from = %cursor,
                        "resuming from checkpoint"
                    );
                }
            }
        }

        let mut candidates: Vec<CandidateRecord> = Vec::new();
        let mut pages_fetched = 0usize;
        let mut failure: Option<AcquireError> = None;

        while cursor <= range_end {
            let url = partition.page_url(cursor);
            match self
                .controller
                .fetch_with_retry(&url, &partition.required_markers)
                .await
            {
                Ok(body) => {
                    pages_fetched += 1;
                    match self.page_model.parse(&body, partition) {
                        Ok(mut parsed) => {
                            debug!(partition = %partition.id, date = %cursor, records = parsed.len(), "page parsed");
                            candidates.append(&mut parsed);
                        }
                        Err(e) => {
                            // Parse failures are collaborator trouble, not
                            // acquisition trouble; the page yields nothing.
                            warn!(partition = %partition.id, date = %cursor, error = %e, "page model error");
                        }
                    }
                }
                Err(e) => {
                    warn!(partition = %partition.id, date = %cursor, error = %e, "page fetch failed, aborting partition");
                    failure = Some(e);
                    break;
                }
            }

            completed_units += 1;

            if completed_units % self.config.checkpoint_every.max(1) == 0 {
                let checkpoint = Checkpoint {
                    cursor_date: cursor,
                    completed_units,
                };
                if let Err(e) = self.store.save_checkpoint(&partition.id, &checkpoint) {
                    warn!(partition = %partition.id, error = %e, "checkpoint save failed");
                }
            }

            if completed_units % self.config.session_restart_every.max(1) == 0 {
                self.controller.restart_session();
            }

            match cursor.succ_opt() {
                Some(next) => cursor = next,
                None => break,
            }
        }

        let outcome = match &failure {
            None => RunOutcome::Success,
            Some(e) => RunOutcome::Failed(e.to_string()),
        };

        // Emit whatever was acquired, even on a failed run.
        let report = self.finish(partition, decision, started_at, timer, pages_fetched, candidates, outcome, cursor)
            .await;

        if let Err(e) = self.controller.persist_pool(&self.store) {
            warn!(error = %e, "pool state save failed");
        }

        report
    }

    /// Apply the run mode and collaborators to reach a delta decision.
    async fn decide(
        &mut self,
        partition: &PartitionSpec,
        mode: RunMode,
    ) -> Result<DeltaDecision, AcquireError> {
        let local = match mode {
            RunMode::ForceFull => None,
            _ => self.local.local_latest(&partition.id)?,
        };

        let remote = match self
            .freshness
            .remote_latest(self.controller.as_mut(), partition)
            .await
        {
            Ok(remote) => remote,
            Err(AcquireError::FreshnessUnknown) => None,
            Err(e) => return Err(e),
        };

        Ok(delta::decide(local, remote))
    }

    /// Concrete date bounds for the decided strategy.
    fn resolve_range(
        &self,
        partition: &PartitionSpec,
        decision: &DeltaDecision,
    ) -> Result<(NaiveDate, NaiveDate), AcquireError> {
        let end = decision
            .range_end
            .ok_or_else(|| AcquireError::Config("decision without range end".to_string()))?;
        let start = match decision.strategy {
            DeltaStrategy::Full => partition.first_season_start.ok_or_else(|| {
                AcquireError::Config(format!(
                    "partition {} has no first_season_start for a full fetch",
                    partition.id
                ))
            })?,
            _ => decision
                .range_start
                .ok_or_else(|| AcquireError::Config("incremental without range start".to_string()))?,
        };
        Ok((start, end))
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &mut self,
        partition: &PartitionSpec,
        decision: DeltaDecision,
        started_at: chrono::DateTime<Utc>,
        timer: Instant,
        pages_fetched: usize,
        candidates: Vec<CandidateRecord>,
        outcome: RunOutcome,
        cursor: NaiveDate,
    ) -> RunReport {
        let candidate_count = candidates.len();
        let dedup_outcome = self.dedup.process(candidates);

        let mut outcome = outcome;
        if !dedup_outcome.records.is_empty() {
            if let Err(e) = self.sink.emit(&partition.id, &dedup_outcome.records).await {
                warn!(partition = %partition.id, error = %e, "record emission failed");
                outcome = RunOutcome::Failed(e.to_string());
            } else if let Some(newest) = dedup_outcome.records.iter().map(|r| r.date).max() {
                if let Err(e) = self.store.advance_progress(&partition.id, newest) {
                    warn!(partition = %partition.id, error = %e, "progress update failed");
                }
            }
        }

        match outcome {
            RunOutcome::Success => {
                // Completed runs resume fresh next time.
                if let Err(e) = self.store.clear_checkpoint(&partition.id) {
                    warn!(partition = %partition.id, error = %e, "checkpoint clear failed");
                }
            }
            RunOutcome::Failed(_) => {
                // Keep a resume point at the last completed date.
                if let Some(last_done) = cursor.pred_opt() {
                    let _ = self.store.save_checkpoint(
                        &partition.id,
                        &Checkpoint {
                            cursor_date: last_done,
                            completed_units: pages_fetched as u32,
                        },
                    );
                }
            }
        }

        RunReport {
            partition: partition.id.clone(),
            strategy: decision.strategy,
            range_start: decision.range_start,
            range_end: decision.range_end,
            pages_fetched,
            candidates: candidate_count,
            canonical: dedup_outcome.records.len(),
            collapsed: dedup_outcome.collapsed,
            rejections: dedup_outcome.rejections,
            started_at,
            duration_ms: timer.elapsed().as_millis() as u64,
            pool: self.controller.pool_summary(),
            outcome,
        }
    }

    /// Zero-work report for no-op and failed-before-start runs.
    fn report(
        &self,
        partition: &PartitionSpec,
        decision: DeltaDecision,
        started_at: chrono::DateTime<Utc>,
        timer: Instant,
        pages_fetched: usize,
        outcome: RunOutcome,
    ) -> RunReport {
        RunReport {
            partition: partition.id.clone(),
            strategy: decision.strategy,
            range_start: decision.range_start,
            range_end: decision.range_end,
            pages_fetched,
            candidates: 0,
            canonical: 0,
            collapsed: Default::default(),
            rejections: Default::default(),
            started_at,
            duration_ms: timer.elapsed().as_millis() as u64,
            pool: self.controller.pool_summary(),
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_url_substitution() {
        let partition = PartitionSpec {
            id: "league-1".to_string(),
            index_url: "https://results.example.com/league-1".to_string(),
            page_url_template: "https://results.example.com/league-1/day/{date}".to_string(),
            required_markers: Vec::new(),
            first_season_start: None,
        };
        let date = NaiveDate::from_ymd_opt(2025, 2, 12).unwrap();
        assert_eq!(
            partition.page_url(date),
            "https://results.example.com/league-1/day/2025-02-12"
        );
    }
}
