//! Legacy password-derived key function.
//!
//! Installations created before envelope encryption opened their datastore
//! with a key derived straight from the master password:
//!
//! ```text
//! key = PBKDF2-HMAC-SHA256(password, installation_id || salt, iterations)
//! ```
//!
//! Both salt halves are random 16-byte values persisted in preferences and
//! created on first use. The path exists only so such vaults can be migrated
//! to a wrapped data key once; see `vault::migration`.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::random;
use crate::errors::{Result, VaultError};
use crate::prefs::{self, keys, Preferences};
use crate::secret::{DataKey, SecretBuffer, DATA_KEY_LEN};

/// Lowest iteration count accepted for derivation.
pub const MIN_ITERATIONS: u32 = 100_000;

/// Length of each persisted salt component in bytes.
const SALT_PART_LEN: usize = 16;

/// Derive the legacy 256-bit key for `password`.
///
/// Deterministic for a fixed (password, salt, installation id) triple.
pub fn derive_key(
    prefs: &dyn Preferences,
    password: &SecretBuffer,
    iterations: u32,
) -> Result<DataKey> {
    if password.is_empty() {
        return Err(VaultError::EmptyPassword);
    }
    if iterations < MIN_ITERATIONS {
        return Err(VaultError::Config(format!(
            "PDKF iterations must be at least {MIN_ITERATIONS} (got {iterations})"
        )));
    }

    let installation_id = load_or_create(prefs, keys::INSTALLATION_ID)?;
    let salt = load_or_create(prefs, keys::LEGACY_SALT)?;

    let mut full_salt = Zeroizing::new(Vec::with_capacity(installation_id.len() + salt.len()));
    full_salt.extend_from_slice(&installation_id);
    full_salt.extend_from_slice(&salt);

    let mut out = Zeroizing::new([0u8; DATA_KEY_LEN]);
    pbkdf2_hmac::<Sha256>(password.expose(), &full_salt, iterations, &mut out[..]);

    Ok(DataKey::from_bytes(*out))
}

/// Remove the persisted salt and installation id.
///
/// After this, no key previously returned by [`derive_key`] can be
/// reproduced.
pub fn purge(prefs: &dyn Preferences) -> Result<()> {
    prefs.remove(keys::LEGACY_SALT)?;
    prefs.remove(keys::INSTALLATION_ID)?;
    Ok(())
}

fn load_or_create(prefs: &dyn Preferences, key: &str) -> Result<Vec<u8>> {
    if let Some(existing) = prefs::get_bytes(prefs, key)? {
        return Ok(existing);
    }
    let fresh = random::bytes(SALT_PART_LEN)?;
    prefs::put_bytes(prefs, key, &fresh)?;
    Ok(fresh)
}
