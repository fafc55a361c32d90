//! Pool command: egress point health as last persisted.

use console::style;

use crate::acquire::pool::EgressPool;
use crate::cli::helpers::status_dot;
use crate::config::Settings;
use crate::state::StateStore;

pub fn cmd_pool(settings: &Settings) -> anyhow::Result<()> {
    if settings.pool.endpoints.is_empty() {
        println!(
            "{} No egress points configured. Add [[pool.endpoints]] entries.",
            style("!").yellow()
        );
        return Ok(());
    }

    let mut pool = EgressPool::new(
        settings.pool.endpoints.clone(),
        settings.pool.policy.clone(),
    );
    let store = StateStore::open(&settings.state_db_path())?;
    store.load_pool_state(&mut pool)?;

    println!("\n{}", style("Egress Pool").bold());
    println!("{}", "-".repeat(40));
    for point in pool.points() {
        println!(
            "{} {:<28} {:<9} {}/{} ok ({:.0}%)",
            status_dot(point.status),
            point.id,
            point.status.as_str(),
            point.success_count,
            point.total_count,
            point.success_rate() * 100.0
        );
    }
    let summary = pool.summary();
    println!(
        "\n{} of {} points usable",
        summary.usable_count(),
        summary.points.len()
    );

    Ok(())
}
