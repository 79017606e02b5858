//! Sub-key derivation using HKDF-SHA256.
//!
//! From a single data encryption key we derive:
//! - An **integrity key** for the datastore HMAC.
//! - An **entry root key**, from which a unique key per credential entry
//!   name is derived on demand.
//!
//! The DEK is uniformly random, so it is used directly as the HKDF input
//! keying material with an empty salt. Holders of [`StoreKeys`] never see
//! the DEK itself.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::errors::{Result, VaultError};
use crate::secret::{DataKey, DATA_KEY_LEN};

/// A derived 256-bit key, zeroed on drop.
pub type SubKey = Zeroizing<[u8; DATA_KEY_LEN]>;

/// Keys a datastore needs to seal entries and authenticate its file.
pub struct StoreKeys {
    integrity: SubKey,
    entry_root: SubKey,
}

impl StoreKeys {
    pub fn derive(dek: &DataKey) -> Result<Self> {
        Ok(Self {
            integrity: hkdf_derive(dek.expose(), b"credvault-integrity")?,
            entry_root: hkdf_derive(dek.expose(), b"credvault-entries")?,
        })
    }

    /// Key for the HMAC that covers the whole datastore file.
    pub fn integrity_key(&self) -> &[u8] {
        &self.integrity[..]
    }

    /// Key that seals the entry called `entry_name`.
    ///
    /// Distinct names yield independent keys, so one recovered entry key
    /// says nothing about the others.
    pub fn entry_key(&self, entry_name: &str) -> Result<SubKey> {
        let info = format!("credvault-entry:{entry_name}");
        hkdf_derive(&self.entry_root[..], info.as_bytes())
    }
}

impl std::fmt::Debug for StoreKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StoreKeys([REDACTED])")
    }
}

fn hkdf_derive(ikm: &[u8], info: &[u8]) -> Result<SubKey> {
    let hk = Hkdf::<Sha256>::new(None, ikm);

    let mut okm = Zeroizing::new([0u8; DATA_KEY_LEN]);
    hk.expand(info, &mut okm[..])
        .map_err(|e| VaultError::InvalidInput(format!("HKDF expand failed: {e}")))?;

    Ok(okm)
}
