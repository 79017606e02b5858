//! OS credential store integration.
//!
//! KEKs are kept in the operating system's secure credential store:
//! - macOS: Keychain
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring / KDE Wallet)
//!
//! Every backend failure surfaces as `KeyStoreUnavailable`. There is no
//! fallback to a software store here; choosing one is the caller's call.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use zeroize::Zeroizing;

use super::{check_alias, generate_kek, open_with_kek, seal_with_kek, KeyStore};
use crate::errors::{Result, VaultError};
use crate::secret::SecretBuffer;

/// Default service name under which KEKs are filed.
const SERVICE_NAME: &str = "credvault";

/// Key store backed by the platform keyring.
#[derive(Debug, Clone)]
pub struct OsKeyStore {
    service: String,
}

impl Default for OsKeyStore {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl OsKeyStore {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, alias: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, &format!("kek:{alias}")).map_err(|e| {
            VaultError::KeyStoreUnavailable(format!("failed to create keyring entry: {e}"))
        })
    }

    fn load_kek(&self, alias: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        match self.entry(alias)?.get_password() {
            Ok(encoded) => {
                let encoded = Zeroizing::new(encoded);
                BASE64
                    .decode(encoded.as_bytes())
                    .map(|kek| Some(Zeroizing::new(kek)))
                    .map_err(|e| {
                        VaultError::KeyStoreUnavailable(format!("corrupt keyring entry: {e}"))
                    })
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(VaultError::KeyStoreUnavailable(format!(
                "failed to read from keyring: {e}"
            ))),
        }
    }
}

impl KeyStore for OsKeyStore {
    fn wrap(&self, alias: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        check_alias(alias)?;
        let kek = match self.load_kek(alias)? {
            Some(kek) => kek,
            None => {
                let fresh = generate_kek()?;
                let encoded = Zeroizing::new(BASE64.encode(&fresh[..]));
                self.entry(alias)?.set_password(&encoded).map_err(|e| {
                    VaultError::KeyStoreUnavailable(format!("failed to store key in keyring: {e}"))
                })?;
                Zeroizing::new(fresh.to_vec())
            }
        };
        seal_with_kek(&kek, alias, plaintext)
    }

    fn unwrap(&self, alias: &str, wrapped: &[u8]) -> Result<SecretBuffer> {
        check_alias(alias)?;
        let kek = self
            .load_kek(alias)?
            .ok_or_else(|| VaultError::KeyNotFound(alias.to_string()))?;
        open_with_kek(&kek, alias, wrapped)
    }

    fn delete_key(&self, alias: &str) -> Result<()> {
        check_alias(alias)?;
        match self.entry(alias)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(VaultError::KeyStoreUnavailable(format!(
                "failed to delete from keyring: {e}"
            ))),
        }
    }

    fn contains_key(&self, alias: &str) -> Result<bool> {
        Ok(self.load_kek(alias)?.is_some())
    }
}
