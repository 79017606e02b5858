//! `credvault decrypt`: open a payload produced by `credvault encrypt`.

use std::fs;
use std::path::Path;

use crate::cli::output;
use crate::cli::{load_settings, open_manager, unlock, Cli};
use crate::crypto::EncryptedPayload;
use crate::errors::Result;
use crate::prefs::write_atomic;

/// Execute the `decrypt` command.
pub fn execute(cli: &Cli, alias: &str, input: &Path, output_path: &Path) -> Result<()> {
    let payload = EncryptedPayload::from_bytes(&fs::read(input)?)?;

    let settings = load_settings(cli)?;
    let manager = open_manager(&settings)?;
    unlock(&manager)?;

    let plaintext = zeroize::Zeroizing::new(manager.decrypt_payload(&payload, Some(alias))?);
    // Written 0600 like every other file we produce.
    write_atomic(output_path, &plaintext)?;

    output::success(&format!(
        "Decrypted {} -> {}",
        input.display(),
        output_path.display()
    ));

    manager.lock();
    Ok(())
}
