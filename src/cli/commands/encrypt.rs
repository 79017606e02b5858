//! `credvault encrypt`: seal a file under a named key.
//!
//! The output is a self-describing payload (version, algorithm, IV) that
//! `credvault decrypt` can open on any machine holding the same key store.

use std::fs;
use std::path::Path;

use crate::cli::output;
use crate::cli::{load_settings, open_manager, unlock, Cli};
use crate::crypto::Algorithm;
use crate::errors::Result;
use crate::prefs::write_atomic;

/// Execute the `encrypt` command.
pub fn execute(
    cli: &Cli,
    alias: &str,
    algorithm: Option<Algorithm>,
    input: &Path,
    output_path: &Path,
) -> Result<()> {
    let settings = load_settings(cli)?;
    let algorithm = algorithm.unwrap_or(settings.algorithm);

    let manager = open_manager(&settings)?;
    unlock(&manager)?;

    let plaintext = zeroize::Zeroizing::new(fs::read(input)?);
    let payload = manager.encrypt_payload(&plaintext, algorithm, alias)?;
    write_atomic(output_path, &payload.to_bytes()?)?;

    output::success(&format!(
        "Encrypted {} -> {} ({}, key '{alias}')",
        input.display(),
        output_path.display(),
        payload.algorithm
    ));

    manager.lock();
    Ok(())
}
