//! `credvault set`: add or update a credential.

use std::io::{self, IsTerminal, Read};

use zeroize::Zeroize;

use crate::cli::output;
use crate::cli::{load_settings, open_manager, prompt_error, unlock, Cli};
use crate::datastore::EntryKind;
use crate::errors::Result;
use crate::secret::SecretBuffer;

/// Execute the `set` command.
pub fn execute(cli: &Cli, name: &str, value: Option<&str>, kind: EntryKind) -> Result<()> {
    // Determine the value from one of three sources.
    let value = if let Some(v) = value {
        // Source 1: Inline value on the command line.
        output::warning("Value provided on command line, it may appear in shell history.");
        SecretBuffer::from(v)
    } else if !io::stdin().is_terminal() {
        // Source 2: Piped input (stdin is not a terminal).
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        let value = SecretBuffer::from_string(buf.trim_end().to_string());
        buf.zeroize();
        value
    } else {
        // Source 3: Interactive secure prompt (default).
        let v = dialoguer::Password::new()
            .with_prompt(format!("Enter value for {name}"))
            .interact()
            .map_err(prompt_error("input prompt"))?;
        SecretBuffer::from_string(v)
    };

    let settings = load_settings(cli)?;
    let manager = open_manager(&settings)?;
    unlock(&manager)?;

    let (existed, total) = manager.with_store(|store| {
        let existed = store.contains_entry(name);
        store.set_entry(name, kind, &value)?;
        Ok((existed, store.entry_count()))
    })?;

    let verb = if existed { "updated" } else { "added" };
    output::success(&format!("{kind} '{name}' {verb} ({total} total)"));

    manager.lock();
    Ok(())
}
