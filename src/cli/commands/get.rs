//! `credvault get`: print a single credential's value.

use std::io::Write;

use crate::cli::{load_settings, open_manager, unlock, Cli};
use crate::errors::Result;

/// Execute the `get` command.
pub fn execute(cli: &Cli, name: &str) -> Result<()> {
    let settings = load_settings(cli)?;
    let manager = open_manager(&settings)?;
    unlock(&manager)?;

    let value = manager.with_store(|store| store.get_entry(name))?;

    // Raw bytes to stdout so binary seeds survive piping.
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(value.expose())?;
    stdout.write_all(b"\n")?;
    stdout.flush()?;

    manager.lock();
    Ok(())
}
