//! `credvault delete`: remove a credential from the vault.

use crate::cli::output;
use crate::cli::{confirm, load_settings, open_manager, unlock, Cli};
use crate::errors::Result;

/// Execute the `delete` command.
pub fn execute(cli: &Cli, name: &str, force: bool) -> Result<()> {
    // Unless --force is set, ask for confirmation before deleting.
    if !force && !confirm(&format!("Delete credential '{name}'?"))? {
        output::info("Cancelled.");
        return Ok(());
    }

    let settings = load_settings(cli)?;
    let manager = open_manager(&settings)?;
    unlock(&manager)?;

    manager.with_store(|store| store.delete_entry(name))?;
    output::success(&format!("Deleted credential '{name}'"));

    manager.lock();
    Ok(())
}
