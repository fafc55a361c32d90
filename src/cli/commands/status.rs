//! Status command: checkpoints and acquisition progress per partition.

use console::style;

use crate::config::Settings;
use crate::state::StateStore;

pub fn cmd_status(settings: &Settings, partition: Option<&str>) -> anyhow::Result<()> {
    let store = StateStore::open(&settings.state_db_path())?;

    let partitions: Vec<String> = match partition {
        Some(id) => vec![id.to_string()],
        None => settings.partition_ids(),
    };

    if partitions.is_empty() {
        println!("{} No partitions configured", style("!").yellow());
        return Ok(());
    }

    for id in &partitions {
        println!("\n{}", style(format!("Partition: {id}")).bold());
        println!("{}", "-".repeat(40));

        match store.latest_record_date(id)? {
            Some(date) => println!("{:<20} {}", "Latest record:", date),
            None => println!("{:<20} {}", "Latest record:", style("none").dim()),
        }

        match store.load_checkpoint(id)? {
            Some(checkpoint) => {
                println!(
                    "{:<20} {}",
                    "Checkpoint:",
                    style("Needs Resume").yellow()
                );
                println!("{:<20} {}", "Resume after:", checkpoint.cursor_date);
                println!("{:<20} {}", "Units done:", checkpoint.completed_units);
            }
            None => println!("{:<20} {}", "Checkpoint:", style("Clean").green()),
        }
    }

    let orphaned: Vec<String> = store
        .checkpointed_partitions()?
        .into_iter()
        .filter(|p| !settings.partitions.contains_key(p))
        .collect();
    if partition.is_none() && !orphaned.is_empty() {
        println!(
            "\n{} Checkpoints for unconfigured partitions: {}",
            style("!").yellow(),
            orphaned.join(", ")
        );
    }

    Ok(())
}
