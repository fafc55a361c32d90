//! The run command: acquire records for one or more partitions.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use super::{ModeArg, EXIT_HARD, EXIT_OK, EXIT_PARTIAL};
use crate::acquire::dedup::DedupEngine;
use crate::acquire::detect::BlockDetector;
use crate::acquire::fetch::FetchExecutor;
use crate::acquire::pool::EgressPool;
use crate::acquire::retry::RetryController;
use crate::acquire::throttle::AdaptiveThrottle;
use crate::cli::helpers::print_report;
use crate::config::Settings;
use crate::models::{RunOutcome, RunReport};
use crate::runner::Runner;
use crate::sources::{JsonLinesSink, RegexFreshnessProbe, RegexPageModel, StoreLocalState};
use crate::state::StateStore;

pub async fn cmd_run(
    settings: &Settings,
    partitions: &[String],
    all: bool,
    mode: ModeArg,
    json: bool,
) -> anyhow::Result<i32> {
    let targets: Vec<String> = if all {
        settings.partition_ids()
    } else {
        partitions.to_vec()
    };

    if targets.is_empty() {
        println!(
            "{} No partitions specified. Use --all or provide partition IDs.",
            style("✗").red()
        );
        println!(
            "Available partitions: {}",
            settings.partition_ids().join(", ")
        );
        return Ok(EXIT_HARD);
    }

    let progress = if json {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(targets.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    };

    let mut reports: Vec<RunReport> = Vec::with_capacity(targets.len());

    // Partitions run sequentially: each gets its own pool session and rate
    // budget, and concurrent fetches against one site amplify detection
    // signals.
    for target in &targets {
        progress.set_message(target.clone());

        let report = match run_partition(settings, target, mode).await {
            Ok(report) => report,
            Err(e) => {
                // Wiring failures (bad config, unreadable state db) still
                // yield a terminal report for this partition.
                RunReport {
                    partition: target.clone(),
                    strategy: crate::acquire::delta::DeltaStrategy::None,
                    range_start: None,
                    range_end: None,
                    pages_fetched: 0,
                    candidates: 0,
                    canonical: 0,
                    collapsed: Default::default(),
                    rejections: Default::default(),
                    started_at: chrono::Utc::now(),
                    duration_ms: 0,
                    pool: Default::default(),
                    outcome: RunOutcome::Failed(e.to_string()),
                }
            }
        };
        reports.push(report);
        progress.inc(1);
    }
    progress.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            print_report(report);
        }
    }

    let succeeded = reports.iter().filter(|r| r.is_success()).count();
    let code = if succeeded == reports.len() {
        EXIT_OK
    } else if succeeded > 0 {
        EXIT_PARTIAL
    } else {
        EXIT_HARD
    };
    Ok(code)
}

/// Build a fresh acquisition stack for one partition and run it.
async fn run_partition(
    settings: &Settings,
    partition_id: &str,
    mode: ModeArg,
) -> anyhow::Result<RunReport> {
    let spec = settings
        .partition_spec(partition_id)
        .ok_or_else(|| anyhow::anyhow!("unknown partition: {partition_id}"))?;

    let db_path = settings.state_db_path();
    let store = StateStore::open(&db_path)?;

    let mut pool = EgressPool::new(
        settings.pool.endpoints.clone(),
        settings.pool.policy.clone(),
    );
    if let Err(e) = store.load_pool_state(&mut pool) {
        tracing::warn!(error = %e, "could not restore pool state");
    }

    let executor = FetchExecutor::new(settings.fetch.clone());
    let detector = BlockDetector::new(&settings.detector)?;
    let throttle = AdaptiveThrottle::new(settings.throttle.clone());
    let controller = RetryController::new(pool, executor, detector, throttle, settings.retry.clone());

    let mut runner = Runner::new(
        Box::new(controller),
        DedupEngine::new(settings.validation.clone()),
        Box::new(RegexPageModel::from_settings(settings)?),
        Box::new(RegexFreshnessProbe::from_settings(settings)?),
        Box::new(StoreLocalState::new(db_path)),
        Box::new(JsonLinesSink::new(settings.data_dir.clone())),
        store,
        settings.run.clone(),
    );

    Ok(runner.run(&spec, mode.into()).await)
}
