//! `credvault hash-password`: produce or check an Argon2id PHC string
//! using the configured cost parameters. Does not touch the vault.

use crate::cli::output;
use crate::cli::{load_settings, prompt_password, Cli};
use crate::crypto::password;
use crate::errors::{Result, VaultError};

/// Execute the `hash-password` command.
pub fn execute(cli: &Cli, verify: Option<&str>) -> Result<()> {
    let settings = load_settings(cli)?;
    let pw = prompt_password("Password")?;

    match verify {
        Some(hash) => {
            if password::verify_password(&pw, hash)? {
                output::success("Password matches");
                Ok(())
            } else {
                Err(VaultError::WrongPassword)
            }
        }
        None => {
            let params = settings.argon2_params();
            params.validate()?;
            println!("{}", password::hash_password(&pw, &params)?);
            Ok(())
        }
    }
}
