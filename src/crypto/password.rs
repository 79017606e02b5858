//! Master password verification hashes using Argon2id.
//!
//! The hash is a PHC string (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`)
//! carrying its own parameters and salt, so verification keeps working after
//! the configured parameters change.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use super::random;
use crate::errors::{Result, VaultError};
use crate::secret::SecretBuffer;

/// Length of the per-hash random salt in bytes.
pub const SALT_LEN: usize = 16;

/// Minimum safe memory cost in KiB (8 MB).
const MIN_MEMORY_KIB: u32 = 8_192;

/// Configurable Argon2id parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2Params {
    /// Memory cost in KiB (default: 65 536 = 64 MiB).
    pub memory_kib: u32,
    /// Number of iterations (default: 3).
    pub iterations: u32,
    /// Parallelism lanes (default: 4).
    pub parallelism: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_kib: 65_536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

impl Argon2Params {
    /// Reject dangerously weak settings.
    pub fn validate(&self) -> Result<()> {
        if self.memory_kib < MIN_MEMORY_KIB {
            return Err(VaultError::Config(format!(
                "Argon2 memory_kib must be at least {MIN_MEMORY_KIB} (got {})",
                self.memory_kib
            )));
        }
        if self.iterations < 1 {
            return Err(VaultError::Config(
                "Argon2 iterations must be at least 1".into(),
            ));
        }
        if self.parallelism < 1 {
            return Err(VaultError::Config(
                "Argon2 parallelism must be at least 1".into(),
            ));
        }
        Ok(())
    }

    fn hasher(&self) -> Result<Argon2<'static>> {
        self.validate()?;
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| VaultError::Config(format!("invalid Argon2 params: {e}")))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Produce a PHC verification hash for `password` with a fresh random salt.
pub fn hash_password(password: &SecretBuffer, params: &Argon2Params) -> Result<String> {
    if password.is_empty() {
        return Err(VaultError::EmptyPassword);
    }

    let argon2 = params.hasher()?;

    let salt_bytes = random::bytes(SALT_LEN)?;
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| VaultError::InvalidInput(format!("salt encoding failed: {e}")))?;

    let hash = argon2
        .hash_password(password.expose(), &salt)
        .map_err(|e| VaultError::InvalidInput(format!("Argon2id hashing failed: {e}")))?;

    Ok(hash.to_string())
}

/// Check `password` against a stored PHC hash.
///
/// Returns `Ok(false)` on mismatch. The comparison itself happens inside
/// the `argon2` crate in constant time.
pub fn verify_password(password: &SecretBuffer, hash: &str) -> Result<bool> {
    if password.is_empty() {
        return Err(VaultError::EmptyPassword);
    }

    let parsed = PasswordHash::new(hash)
        .map_err(|e| VaultError::InvalidFormat(format!("stored password hash: {e}")))?;

    match Argon2::default().verify_password(password.expose(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(VaultError::InvalidFormat(format!(
            "password hash verification: {e}"
        ))),
    }
}
