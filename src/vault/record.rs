//! The persisted, wrapped form of the data encryption key.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::errors::{Result, VaultError};
use crate::keystore::KeyStore;
use crate::prefs::Preferences;
use crate::secret::DataKey;

/// The DEK wrapped by the key store, base64-encoded for preferences.
///
/// Depends only on the DEK and the KEK, never on the master password.
#[derive(Clone, PartialEq, Eq)]
pub struct WrappedKeyRecord(String);

impl WrappedKeyRecord {
    /// Wrap `dek` under `alias`.
    pub fn wrap(key_store: &dyn KeyStore, alias: &str, dek: &DataKey) -> Result<Self> {
        let wrapped = key_store.wrap(alias, dek.expose())?;
        Ok(Self(BASE64.encode(wrapped)))
    }

    /// Recover the DEK through the key store.
    pub fn unwrap(&self, key_store: &dyn KeyStore, alias: &str) -> Result<DataKey> {
        let wrapped = BASE64
            .decode(self.0.as_bytes())
            .map_err(|e| VaultError::InvalidFormat(format!("wrapped key record: {e}")))?;
        let plain = key_store.unwrap(alias, &wrapped)?;
        DataKey::from_slice(plain.expose())
    }

    pub fn load(prefs: &dyn Preferences, key: &str) -> Result<Option<Self>> {
        Ok(prefs.get_string(key)?.map(Self))
    }

    pub fn save(&self, prefs: &dyn Preferences, key: &str) -> Result<()> {
        prefs.put_string(key, &self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for WrappedKeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WrappedKeyRecord")
            .field(&format_args!("{} chars", self.0.len()))
            .finish()
    }
}
