//! CLI module: Clap argument parser, output helpers, and command implementations.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::Parser;

use crate::config::Settings;
use crate::crypto::Algorithm;
use crate::datastore::{CredentialStore, EntryKind};
use crate::errors::{Result, VaultError};
use crate::secret::MasterPassword;
use crate::vault::VaultKeyManager;

/// Minimum password length to prevent trivially weak passwords.
const MIN_PASSWORD_LEN: usize = 8;

/// Password for unlocking (and for the first run).
pub const PASSWORD_ENV: &str = "CREDVAULT_PASSWORD";

/// Replacement password for `change-password`.
pub const NEW_PASSWORD_ENV: &str = "CREDVAULT_NEW_PASSWORD";

/// The manager type every command works with.
pub type Manager = VaultKeyManager<CredentialStore>;

/// credvault CLI: offline credential vault.
#[derive(Parser)]
#[command(
    name = "credvault",
    about = "Offline credential vault with hardware-wrapped keys",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Data directory (default: `data_dir` from .credvault.toml, else .credvault)
    #[arg(long, global = true)]
    pub data_dir: Option<String>,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Create the vault on first use, or unlock it and show its status
    #[command(alias = "unlock")]
    Init,

    /// Show vault status without unlocking
    Status,

    /// Store a credential (add or update)
    Set {
        /// Entry name (e.g. github.com)
        name: String,
        /// Value (omit for interactive prompt or piped stdin)
        value: Option<String>,
        /// Entry kind: password, otp-seed or note
        #[arg(short, long, default_value = "password")]
        kind: EntryKind,
    },

    /// Print a credential's value
    Get {
        /// Entry name
        name: String,
    },

    /// List all credentials
    List,

    /// Delete a credential
    Delete {
        /// Entry name
        name: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Change the master password (the data key is untouched)
    ChangePassword,

    /// Replace the data key and re-encrypt the datastore
    Rekey,

    /// Irreversibly erase the vault, its keys and all credentials
    Reset {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Encrypt a file into a self-describing payload under a named key
    Encrypt {
        /// Key alias
        #[arg(short, long)]
        alias: String,
        /// auto, aes-gcm or chacha20-poly1305 (default: from .credvault.toml)
        #[arg(long)]
        algorithm: Option<Algorithm>,
        /// Plaintext input file
        input: PathBuf,
        /// Payload output file
        output: PathBuf,
    },

    /// Decrypt a payload produced by `encrypt`
    Decrypt {
        /// Key alias the payload was encrypted under
        #[arg(short, long)]
        alias: String,
        /// Payload input file
        input: PathBuf,
        /// Plaintext output file
        output: PathBuf,
    },

    /// Print an Argon2id hash of a password, or check one
    HashPassword {
        /// Verify the password against this PHC string instead
        #[arg(long)]
        verify: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

/// Load `.credvault.toml` from the current directory, applying `--data-dir`.
pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let cwd = std::env::current_dir()?;
    let mut settings = Settings::load(&cwd)?;
    if let Some(dir) = &cli.data_dir {
        settings.data_dir = dir.clone();
    }
    Ok(settings)
}

/// Build a (locked) manager from settings.
pub fn open_manager(settings: &Settings) -> Result<Manager> {
    let cwd = std::env::current_dir()?;
    settings.build_manager(&cwd)
}

/// Unlock `manager`, prompting for a new password if the vault does not
/// exist yet. Returns `true` when this call created the vault.
pub fn unlock(manager: &Manager) -> Result<bool> {
    let status = manager.status()?;
    let first_run = !status.initialized && !status.legacy_pending;

    let password = if first_run {
        output::info("No vault found, creating one.");
        prompt_new_password(PASSWORD_ENV, "Choose master password")?
    } else {
        prompt_password("Enter master password")?
    };

    manager.initialize_or_unlock(&password)?;
    Ok(first_run)
}

/// Get a password, trying in order:
/// 1. `CREDVAULT_PASSWORD` env var (CI/CD)
/// 2. Interactive prompt
pub fn prompt_password(prompt: &str) -> Result<MasterPassword> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            return Ok(MasterPassword::from_string(pw));
        }
    }

    let pw = dialoguer::Password::new()
        .with_prompt(prompt)
        .interact()
        .map_err(prompt_error("password prompt"))?;
    Ok(MasterPassword::from_string(pw))
}

/// Prompt for a new password with confirmation.
///
/// `env_var` is consulted first for scripted/CI usage. Enforces a minimum
/// password length either way.
pub fn prompt_new_password(env_var: &str, prompt: &str) -> Result<MasterPassword> {
    if let Ok(pw) = std::env::var(env_var) {
        if !pw.is_empty() {
            check_new_password(&pw)?;
            return Ok(MasterPassword::from_string(pw));
        }
    }

    loop {
        let password = dialoguer::Password::new()
            .with_prompt(prompt)
            .with_confirmation("Confirm password", "Passwords do not match, try again")
            .interact()
            .map_err(prompt_error("password prompt"))?;

        if let Err(e) = check_new_password(&password) {
            output::warning(&format!("{e}. Try again."));
            continue;
        }

        return Ok(MasterPassword::from_string(password));
    }
}

fn check_new_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(VaultError::InvalidInput(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Ask a yes/no question, defaulting to no.
pub fn confirm(prompt: &str) -> Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(prompt_error("confirm prompt"))
}

/// Map a dialoguer failure, treating Ctrl-C as a cancellation.
pub(crate) fn prompt_error(what: &'static str) -> impl Fn(dialoguer::Error) -> VaultError {
    move |e| match e {
        dialoguer::Error::IO(io) if io.kind() == std::io::ErrorKind::Interrupted => {
            VaultError::UserCancelled
        }
        other => VaultError::CommandFailed(format!("{what}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn new_password_length_is_enforced() {
        assert!(check_new_password("short").is_err());
        assert!(check_new_password("long enough").is_ok());
        // Counted in characters, not bytes.
        assert!(check_new_password("ééééééé").is_err());
    }

    #[test]
    fn parses_set_with_kind() {
        let cli = Cli::try_parse_from(["credvault", "set", "bank", "--kind", "otp-seed"]).unwrap();
        match cli.command {
            Commands::Set { name, value, kind } => {
                assert_eq!(name, "bank");
                assert!(value.is_none());
                assert_eq!(kind, EntryKind::OtpSeed);
            }
            _ => panic!("expected set"),
        }
    }

    #[test]
    fn unlock_is_an_alias_of_init() {
        let cli = Cli::try_parse_from(["credvault", "unlock"]).unwrap();
        assert!(matches!(cli.command, Commands::Init));
    }

    #[test]
    fn encrypt_parses_algorithm() {
        let cli = Cli::try_parse_from([
            "credvault",
            "--data-dir",
            "/tmp/v",
            "encrypt",
            "--alias",
            "backup",
            "--algorithm",
            "chacha20-poly1305",
            "in.txt",
            "out.bin",
        ])
        .unwrap();
        assert_eq!(cli.data_dir.as_deref(), Some("/tmp/v"));
        match cli.command {
            Commands::Encrypt { alias, algorithm, .. } => {
                assert_eq!(alias, "backup");
                assert_eq!(algorithm, Some(Algorithm::ChaCha20Poly1305));
            }
            _ => panic!("expected encrypt"),
        }
    }

    #[test]
    fn rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["credvault", "set", "x", "--kind", "blob"]).is_err());
    }
}
