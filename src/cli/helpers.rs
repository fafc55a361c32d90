//! Shared CLI output helpers.

use console::style;

use crate::models::{EgressStatus, RunOutcome, RunReport};

pub fn format_duration_ms(ms: u64) -> String {
    if ms >= 60_000 {
        format!("{}m{:02}s", ms / 60_000, (ms % 60_000) / 1000)
    } else if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{ms}ms")
    }
}

pub fn status_dot(status: EgressStatus) -> String {
    match status {
        EgressStatus::Healthy => style("●").green().to_string(),
        EgressStatus::Degraded => style("●").yellow().to_string(),
        EgressStatus::Dead => style("●").red().to_string(),
    }
}

/// Print one partition report in the styled terminal format.
pub fn print_report(report: &RunReport) {
    let marker = match &report.outcome {
        RunOutcome::Success => style("✓").green().to_string(),
        RunOutcome::Failed(_) => style("✗").red().to_string(),
    };
    println!(
        "\n{} {}",
        marker,
        style(format!("Partition: {}", report.partition)).bold()
    );
    println!("{}", "-".repeat(40));
    println!("{:<20} {}", "Strategy:", report.strategy.as_str());
    if let (Some(start), Some(end)) = (report.range_start, report.range_end) {
        println!("{:<20} {} → {}", "Range:", start, end);
    }
    println!("{:<20} {}", "Pages fetched:", report.pages_fetched);
    println!("{:<20} {}", "Candidates:", report.candidates);
    println!("{:<20} {}", "Canonical:", report.canonical);
    if report.collapsed.total() > 0 {
        println!(
            "{:<20} {} (exact {}, natural-id {}, similar {})",
            "Collapsed:",
            report.collapsed.total(),
            report.collapsed.exact,
            report.collapsed.natural_id,
            report.collapsed.similar
        );
    }
    if report.rejections.total() > 0 {
        println!(
            "{:<20} {}",
            "Rejected:",
            style(report.rejections.total()).yellow()
        );
    }
    println!(
        "{:<20} {}",
        "Duration:",
        format_duration_ms(report.duration_ms)
    );
    println!(
        "{:<20} {}/{} points usable",
        "Pool:",
        report.pool.usable_count(),
        report.pool.points.len()
    );
    for point in &report.pool.points {
        println!(
            "  {} {} ({}/{} ok, {} this session)",
            status_dot(point.status),
            point.id,
            point.success_count,
            point.total_count,
            point.requests_this_session
        );
    }
    if let RunOutcome::Failed(reason) = &report.outcome {
        println!("{:<20} {}", "Failure:", style(reason).red());
    }
}
