use std::path::{Path, PathBuf};

use zeroize::Zeroizing;

use super::{check_alias, generate_kek, open_with_kek, seal_with_kek, KeyStore};
use crate::errors::{Result, VaultError};
use crate::prefs::{self, JsonFilePreferences, Preferences};
use crate::secret::SecretBuffer;

/// Software key store: KEKs kept base64-encoded in an owner-only JSON file.
///
/// This offers no hardware isolation, so it can only be built with explicit
/// consent (`allow_software_key_store = true`).
#[derive(Debug)]
pub struct FileKeyStore {
    file: JsonFilePreferences,
}

impl FileKeyStore {
    /// File name of the KEK store inside the data directory.
    pub const FILE_NAME: &'static str = "keystore.json";

    /// Open the key store in `data_dir`.
    ///
    /// Fails with `KeyStoreUnavailable` unless `consent` is true.
    pub fn open(data_dir: &Path, consent: bool) -> Result<Self> {
        if !consent {
            return Err(VaultError::KeyStoreUnavailable(
                "software key store requires allow_software_key_store = true".into(),
            ));
        }
        Ok(Self {
            file: JsonFilePreferences::open(&Self::path(data_dir))?,
        })
    }

    pub fn path(data_dir: &Path) -> PathBuf {
        data_dir.join(Self::FILE_NAME)
    }

    fn load_kek(&self, alias: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        Ok(prefs::get_bytes(&self.file, alias)?.map(Zeroizing::new))
    }
}

impl KeyStore for FileKeyStore {
    fn wrap(&self, alias: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        check_alias(alias)?;
        let kek = match self.load_kek(alias)? {
            Some(kek) => kek,
            None => {
                let fresh = generate_kek()?;
                prefs::put_bytes(&self.file, alias, &fresh[..])?;
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
        self.file.remove(alias)
    }

    fn contains_key(&self, alias: &str) -> Result<bool> {
        self.file.contains(alias)
    }
}
