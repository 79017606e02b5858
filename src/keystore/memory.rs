use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use zeroize::Zeroizing;

use super::{check_alias, generate_kek, open_with_kek, seal_with_kek, KeyStore};
use crate::errors::{Result, VaultError};
use crate::secret::{SecretBuffer, DATA_KEY_LEN};

/// Deterministic in-process key store for tests and headless tooling.
///
/// KEKs live only in memory, so everything wrapped here dies with the
/// process. `set_available(false)` makes every call fail with
/// `KeyStoreUnavailable`, standing in for a locked or missing secure
/// element.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: Mutex<HashMap<String, Zeroizing<[u8; DATA_KEY_LEN]>>>,
    unavailable: AtomicBool,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(VaultError::KeyStoreUnavailable(
                "in-memory key store disabled".into(),
            ));
        }
        Ok(())
    }

    fn keys(&self) -> MutexGuard<'_, HashMap<String, Zeroizing<[u8; DATA_KEY_LEN]>>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyStore for MemoryKeyStore {
    fn wrap(&self, alias: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        check_alias(alias)?;
        self.ensure_available()?;
        let mut keys = self.keys();
        if !keys.contains_key(alias) {
            keys.insert(alias.to_string(), generate_kek()?);
        }
        match keys.get(alias) {
            Some(kek) => seal_with_kek(&kek[..], alias, plaintext),
            None => Err(VaultError::KeyNotFound(alias.to_string())),
        }
    }

    fn unwrap(&self, alias: &str, wrapped: &[u8]) -> Result<SecretBuffer> {
        check_alias(alias)?;
        self.ensure_available()?;
        let keys = self.keys();
        let kek = keys
            .get(alias)
            .ok_or_else(|| VaultError::KeyNotFound(alias.to_string()))?;
        open_with_kek(&kek[..], alias, wrapped)
    }

    fn delete_key(&self, alias: &str) -> Result<()> {
        check_alias(alias)?;
        self.ensure_available()?;
        self.keys().remove(alias);
        Ok(())
    }

    fn contains_key(&self, alias: &str) -> Result<bool> {
        self.ensure_available()?;
        Ok(self.keys().contains_key(alias))
    }
}

impl std::fmt::Debug for MemoryKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKeyStore")
            .field("aliases", &self.keys().len())
            .field("available", &!self.unavailable.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_unwrap_roundtrip() {
        let store = MemoryKeyStore::new();
        let wrapped = store.wrap("dek", &[0x42; 32]).unwrap();
        assert!(!wrapped.windows(32).any(|w| w == [0x42; 32]));
        assert_eq!(store.unwrap("dek", &wrapped).unwrap().expose(), &[0x42; 32]);
        assert!(store.contains_key("dek").unwrap());
    }

    #[test]
    fn kek_is_reused_for_the_same_alias() {
        let store = MemoryKeyStore::new();
        let first = store.wrap("dek", b"one").unwrap();
        let second = store.wrap("dek", b"two").unwrap();
        assert_eq!(store.unwrap("dek", &first).unwrap().expose(), b"one");
        assert_eq!(store.unwrap("dek", &second).unwrap().expose(), b"two");
    }

    #[test]
    fn deleted_alias_cannot_unwrap() {
        let store = MemoryKeyStore::new();
        let wrapped = store.wrap("dek", b"secret").unwrap();
        store.delete_key("dek").unwrap();
        store.delete_key("dek").unwrap();

        assert!(matches!(
            store.unwrap("dek", &wrapped),
            Err(VaultError::KeyNotFound(_))
        ));

        // A new KEK under the same alias does not revive old blobs.
        store.wrap("dek", b"fresh").unwrap();
        assert!(matches!(
            store.unwrap("dek", &wrapped),
            Err(VaultError::AuthenticationFailure)
        ));
    }

    #[test]
    fn unavailable_store_fails_every_call() {
        let store = MemoryKeyStore::new();
        let wrapped = store.wrap("dek", b"x").unwrap();
        store.set_available(false);

        assert!(matches!(
            store.wrap("dek", b"x"),
            Err(VaultError::KeyStoreUnavailable(_))
        ));
        assert!(matches!(
            store.unwrap("dek", &wrapped),
            Err(VaultError::KeyStoreUnavailable(_))
        ));

        store.set_available(true);
        assert_eq!(store.unwrap("dek", &wrapped).unwrap().expose(), b"x");
    }
}
