//! `credvault list`: display all credentials in a table.

use crate::cli::output;
use crate::cli::{load_settings, open_manager, unlock, Cli};
use crate::errors::Result;

/// Execute the `list` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let settings = load_settings(cli)?;
    let manager = open_manager(&settings)?;
    unlock(&manager)?;

    let entries = manager.with_store(|store| Ok(store.list_entries()))?;

    output::info(&format!("{} credential(s)", entries.len()));
    output::print_entries_table(&entries);

    manager.lock();
    Ok(())
}
