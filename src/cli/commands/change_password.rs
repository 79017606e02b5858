//! `credvault change-password`: replace the master password.
//!
//! Only the verification hash changes. The data key, its wrapped record and
//! every stored credential are untouched, so this is instant regardless of
//! vault size.

use crate::cli::output;
use crate::cli::{
    load_settings, open_manager, prompt_new_password, prompt_password, Cli, NEW_PASSWORD_ENV,
};
use crate::errors::Result;

/// Execute the `change-password` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let settings = load_settings(cli)?;
    let manager = open_manager(&settings)?;

    output::info("Enter your current master password.");
    let old = prompt_password("Current master password")?;
    // Unlocking first completes a pending legacy migration, which is what
    // creates the hash being replaced.
    manager.initialize_or_unlock(&old)?;

    output::info("Choose your new master password.");
    let new = prompt_new_password(NEW_PASSWORD_ENV, "New master password")?;

    manager.change_master_password(&old, &new)?;
    output::success("Master password changed");

    manager.lock();
    Ok(())
}
