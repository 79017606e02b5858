//! `credvault reset`: erase the vault.
//!
//! Destroys the wrapping key, every payload key, every record and the
//! datastore. Neither credentials nor files produced by `credvault encrypt`
//! can be recovered afterwards.

use crate::cli::output;
use crate::cli::{confirm, load_settings, open_manager, Cli};
use crate::errors::Result;

/// Execute the `reset` command.
pub fn execute(cli: &Cli, force: bool) -> Result<()> {
    if !force
        && !confirm("Erase the vault and ALL stored credentials? This cannot be undone")?
    {
        output::info("Cancelled.");
        return Ok(());
    }

    let settings = load_settings(cli)?;
    let manager = open_manager(&settings)?;
    manager.reset()?;

    output::success("Vault erased");
    output::tip("Run `credvault init` to start over.");
    Ok(())
}
