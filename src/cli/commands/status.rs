//! `credvault status`: show vault state without asking for a password.

use crate::cli::output;
use crate::cli::{load_settings, open_manager, Cli};
use crate::config::KeyStoreBackend;
use crate::errors::Result;

/// Execute the `status` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let settings = load_settings(cli)?;
    let manager = open_manager(&settings)?;
    let status = manager.status()?;

    let key_store = match settings.key_store {
        KeyStoreBackend::Os => "os",
        KeyStoreBackend::File => "file (software)",
    };
    output::print_status(
        &status,
        &settings.data_path(&std::env::current_dir()?),
        key_store,
    );

    if status.legacy_pending {
        output::tip("Run `credvault unlock` to migrate this vault.");
    } else if !status.initialized {
        output::tip("Run `credvault init` to create a vault.");
    }
    Ok(())
}
