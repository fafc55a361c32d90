//! Init command: starter configuration plus state database.

use std::path::Path;

use console::style;

use crate::config::{Settings, DEFAULT_CONFIG_FILE};
use crate::state::StateStore;

pub fn cmd_init(settings: &Settings, config_path: Option<&Path>) -> anyhow::Result<()> {
    let target = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

    if target.exists() {
        println!(
            "{} Config file {} already exists, leaving it untouched",
            style("!").yellow(),
            target.display()
        );
    } else {
        Settings::write_template(target)?;
        println!(
            "{} Wrote starter config to {}",
            style("✓").green(),
            target.display()
        );
    }

    std::fs::create_dir_all(&settings.data_dir)?;
    let db_path = settings.state_db_path();
    StateStore::open(&db_path)?;
    println!(
        "{} State database ready at {}",
        style("✓").green(),
        db_path.display()
    );

    Ok(())
}
