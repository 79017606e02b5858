//! App-private key-value storage.
//!
//! The vault keeps a handful of small string values here: the wrapped data
//! key, the master password verification hash, wrapped engine keys and the
//! legacy derivation salt. Values are opaque strings; binary values are
//! base64-encoded by the caller.
//!
//! Implementations:
//! - [`JsonFilePreferences`]: a single JSON file written atomically
//! - [`SqlitePreferences`]: a SQLite table (feature `sqlite-prefs`)
//! - [`MemoryPreferences`]: in-process, with write-failure injection for tests

mod file;
mod memory;
#[cfg(feature = "sqlite-prefs")]
mod sqlite;

pub use file::JsonFilePreferences;
pub(crate) use file::{restrict_permissions, temp_path, write_atomic};
pub use memory::MemoryPreferences;
#[cfg(feature = "sqlite-prefs")]
pub use sqlite::SqlitePreferences;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::errors::{Result, VaultError};

/// Fixed key names used by the crate.
pub mod keys {
    /// Current wrapped data encryption key.
    pub const WRAPPED_DEK: &str = "vault.wrapped_dek";
    /// Wrapped data key staged by an in-flight rekey.
    pub const PENDING_WRAPPED_DEK: &str = "vault.wrapped_dek.pending";
    /// Argon2id PHC string for the master password.
    pub const PASSWORD_HASH: &str = "vault.password_hash";
    /// Marker left by pre-envelope installations.
    pub const LEGACY_VAULT: &str = "legacy.vault";
    /// Random salt for the legacy password-derived key.
    pub const LEGACY_SALT: &str = "legacy.pdkf_salt";
    /// Per-installation identifier mixed into the legacy salt.
    pub const INSTALLATION_ID: &str = "legacy.installation_id";

    /// Prefix shared by every wrapped engine key.
    pub const ENGINE_KEY_PREFIX: &str = "engine.key.";

    /// Key under which the engine stores the wrapped key for `alias`.
    pub fn engine_key(alias: &str) -> String {
        format!("{ENGINE_KEY_PREFIX}{alias}")
    }
}

/// String key-value storage private to this application.
pub trait Preferences: Send + Sync {
    fn get_string(&self, key: &str) -> Result<Option<String>>;

    fn put_string(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key)?.is_some())
    }

    /// Every stored key starting with `prefix`, sorted.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Read a base64-encoded binary value.
pub fn get_bytes(prefs: &dyn Preferences, key: &str) -> Result<Option<Vec<u8>>> {
    match prefs.get_string(key)? {
        Some(encoded) => BASE64
            .decode(encoded.as_bytes())
            .map(Some)
            .map_err(|e| VaultError::InvalidFormat(format!("preference '{key}': {e}"))),
        None => Ok(None),
    }
}

/// Store a binary value base64-encoded.
pub fn put_bytes(prefs: &dyn Preferences, key: &str, value: &[u8]) -> Result<()> {
    prefs.put_string(key, &BASE64.encode(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_helpers_roundtrip_through_base64() {
        let prefs = MemoryPreferences::new();
        put_bytes(&prefs, "k", &[0, 1, 2, 255]).unwrap();
        assert_eq!(prefs.get_string("k").unwrap().as_deref(), Some("AAEC/w=="));
        assert_eq!(get_bytes(&prefs, "k").unwrap(), Some(vec![0, 1, 2, 255]));
        assert_eq!(get_bytes(&prefs, "missing").unwrap(), None);
    }

    #[test]
    fn corrupt_base64_is_a_format_error() {
        let prefs = MemoryPreferences::new();
        prefs.put_string("k", "%%%").unwrap();
        assert!(matches!(
            get_bytes(&prefs, "k"),
            Err(VaultError::InvalidFormat(_))
        ));
    }

    #[test]
    fn engine_key_names_are_namespaced() {
        assert_eq!(keys::engine_key("backup"), "engine.key.backup");
        assert!(keys::engine_key("backup").starts_with(keys::ENGINE_KEY_PREFIX));
    }
}
