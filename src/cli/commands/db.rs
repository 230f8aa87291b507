//! Database management commands.

use console::style;

use crate::config::Settings;

/// Create the schema.
pub fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.database()?;
    println!(
        "{} Database ready at {}",
        style("✓").green(),
        settings.database_path.display()
    );
    Ok(())
}
