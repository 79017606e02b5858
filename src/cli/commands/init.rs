//! `credvault init` / `credvault unlock`: create the vault on first use,
//! otherwise unlock it (completing any pending migration or rekey).

use crate::cli::output;
use crate::cli::{load_settings, open_manager, unlock, Cli};
use crate::errors::Result;

/// Execute the `init` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let settings = load_settings(cli)?;
    let manager = open_manager(&settings)?;

    let was_legacy = manager.status()?.legacy_pending;
    let created = unlock(&manager)?;

    let count = manager.with_store(|store| Ok(store.entry_count()))?;
    if created {
        output::success(&format!(
            "Vault created at {}",
            settings.data_path(&std::env::current_dir()?).display()
        ));
        output::tip("Run `credvault set <NAME>` to add a credential.");
    } else if was_legacy {
        output::success(&format!(
            "Legacy vault migrated to a wrapped data key ({count} credentials)"
        ));
    } else {
        output::success(&format!("Vault unlocked ({count} credentials)"));
    }

    manager.lock();
    Ok(())
}
