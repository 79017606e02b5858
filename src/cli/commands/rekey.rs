//! `credvault rekey`: rotate the data key.
//!
//! A fresh DEK is generated, the datastore re-encrypted under it and the
//! wrapped record replaced. The master password does not change.

use crate::cli::output;
use crate::cli::{load_settings, open_manager, unlock, Cli};
use crate::errors::Result;

/// Execute the `rekey` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let settings = load_settings(cli)?;
    let manager = open_manager(&settings)?;
    unlock(&manager)?;

    manager.rekey()?;

    let (count, generation) =
        manager.with_store(|store| Ok((store.entry_count(), store.key_generation())))?;
    output::success(&format!(
        "Data key rotated ({count} credentials re-encrypted, key generation {generation})"
    ));

    manager.lock();
    Ok(())
}
