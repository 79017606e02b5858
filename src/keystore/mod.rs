//! Hardware-backed key wrapping.
//!
//! A [`KeyStore`] owns one key-encryption key (KEK) per alias and uses it to
//! wrap and unwrap small secrets such as the vault's data key. KEK bytes
//! never leave the implementation.
//!
//! Wrapped layout produced by every implementation here:
//!
//! ```text
//! [ 12-byte nonce | AES-256-GCM ciphertext + 16-byte tag ]   (AAD = alias)
//! ```
//!
//! Binding the alias as additional data means a blob wrapped under one
//! alias can never be unwrapped under another, even if both KEKs collide.

mod file;
mod memory;
#[cfg(feature = "keyring-store")]
mod os;

pub use file::FileKeyStore;
pub use memory::MemoryKeyStore;
#[cfg(feature = "keyring-store")]
pub use os::OsKeyStore;

use zeroize::Zeroizing;

use crate::crypto::{aead, random};
use crate::errors::{Result, VaultError};
use crate::secret::{SecretBuffer, DATA_KEY_LEN};

/// Wrap/unwrap adapter over secure key storage.
///
/// Round-trips exactly: `unwrap(a, wrap(a, x)) == x`. After `delete_key(a)`,
/// every blob wrapped under `a` is permanently unrecoverable.
pub trait KeyStore: Send + Sync {
    /// Encrypt `plaintext` under the KEK for `alias`, creating the KEK on
    /// first use.
    fn wrap(&self, alias: &str, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt a blob produced by [`KeyStore::wrap`] for the same alias.
    fn unwrap(&self, alias: &str, wrapped: &[u8]) -> Result<SecretBuffer>;

    /// Destroy the KEK for `alias`. Deleting a missing alias succeeds.
    fn delete_key(&self, alias: &str) -> Result<()>;

    fn contains_key(&self, alias: &str) -> Result<bool>;
}

/// A freshly generated KEK.
pub(crate) fn generate_kek() -> Result<Zeroizing<[u8; DATA_KEY_LEN]>> {
    let mut kek = Zeroizing::new([0u8; DATA_KEY_LEN]);
    random::fill(&mut kek[..])?;
    Ok(kek)
}

/// Wrap with a KEK the caller already holds.
pub(crate) fn seal_with_kek(kek: &[u8], alias: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
    aead::encrypt(kek, plaintext, alias.as_bytes())
}

/// Unwrap with a KEK the caller already holds.
pub(crate) fn open_with_kek(kek: &[u8], alias: &str, wrapped: &[u8]) -> Result<SecretBuffer> {
    aead::decrypt(kek, wrapped, alias.as_bytes()).map(SecretBuffer::new)
}

/// Reject aliases that would be ambiguous as storage keys.
pub(crate) fn check_alias(alias: &str) -> Result<()> {
    if alias.is_empty() {
        return Err(VaultError::MissingKey("key alias is empty".into()));
    }
    if alias.chars().any(|c| c.is_control() || c == '/' || c == '\\') {
        return Err(VaultError::InvalidInput(format!(
            "key alias '{}' contains invalid characters",
            alias.escape_debug()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_binding_prevents_cross_alias_unwrap() {
        let kek = generate_kek().unwrap();
        let wrapped = seal_with_kek(&kek[..], "a", b"secret").unwrap();
        assert_eq!(
            open_with_kek(&kek[..], "a", &wrapped).unwrap().expose(),
            b"secret"
        );
        assert!(matches!(
            open_with_kek(&kek[..], "b", &wrapped),
            Err(VaultError::AuthenticationFailure)
        ));
    }

    #[test]
    fn alias_validation() {
        assert!(check_alias("credvault.dek").is_ok());
        assert!(matches!(check_alias(""), Err(VaultError::MissingKey(_))));
        assert!(check_alias("a/b").is_err());
        assert!(check_alias("a\nb").is_err());
    }
}
