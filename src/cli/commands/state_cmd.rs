//! State management commands.

use console::style;

use crate::config::Settings;
use crate::state::StateStore;

pub fn cmd_state_reset(settings: &Settings, partition: &str) -> anyhow::Result<()> {
    let store = StateStore::open(&settings.state_db_path())?;

    match store.load_checkpoint(partition)? {
        Some(checkpoint) => {
            store.clear_checkpoint(partition)?;
            println!(
                "{} Dropped checkpoint for {} (was at {})",
                style("✓").green(),
                partition,
                checkpoint.cursor_date
            );
        }
        None => {
            println!(
                "{} No checkpoint for {}",
                style("!").yellow(),
                partition
            );
        }
    }

    Ok(())
}
