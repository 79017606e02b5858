//! Integration tests for the on-disk pieces: credential store files,
//! preferences backends and the software key store.

use std::fs;
use std::sync::Arc;

use credvault::crypto::{Argon2Params, CryptoEngine};
use credvault::datastore::{CredentialStore, Datastore, EntryKind};
use credvault::errors::VaultError;
use credvault::keystore::{FileKeyStore, KeyStore};
use credvault::prefs::{JsonFilePreferences, Preferences};
use credvault::secret::{DataKey, MasterPassword, SecretBuffer};
use credvault::vault::VaultKeyManager;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Credential store file
// ---------------------------------------------------------------------------

#[test]
fn tampered_store_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = CredentialStore::in_dir(dir.path());
    let key = DataKey::generate().unwrap();

    let handle = store.open_or_create(&key).unwrap();
    handle
        .set_entry("mail", EntryKind::Password, &SecretBuffer::from("pw"))
        .unwrap();
    store.close(handle).unwrap();

    let path = store.path().to_path_buf();
    let mut bytes = fs::read(&path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0x01;
    fs::write(&path, &bytes).unwrap();

    assert!(store.open_or_create(&key).is_err());
}

#[test]
fn rekeyed_store_opens_only_with_new_key() {
    let dir = TempDir::new().unwrap();
    let store = CredentialStore::in_dir(dir.path());
    let old = DataKey::generate().unwrap();
    let new = DataKey::generate().unwrap();

    let handle = store.open_or_create(&old).unwrap();
    handle
        .set_entry("seed", EntryKind::OtpSeed, &SecretBuffer::from("JBSWY3DP"))
        .unwrap();
    store.change_key(&handle, &new).unwrap();
    store.close(handle).unwrap();

    assert!(matches!(
        store.open_or_create(&old),
        Err(VaultError::AuthenticationFailure)
    ));
    let reopened = store.open_or_create(&new).unwrap();
    assert_eq!(reopened.get_entry("seed").unwrap().expose(), b"JBSWY3DP");
    assert_eq!(reopened.key_generation(), 1);
}

// ---------------------------------------------------------------------------
// Preferences backends
// ---------------------------------------------------------------------------

fn exercise_prefs(prefs: &dyn Preferences) {
    assert_eq!(prefs.get_string("vault.wrapped_dek").unwrap(), None);
    prefs.put_string("vault.wrapped_dek", "abc").unwrap();
    prefs.put_string("vault.wrapped_dek", "def").unwrap();
    assert_eq!(
        prefs.get_string("vault.wrapped_dek").unwrap().as_deref(),
        Some("def")
    );
    prefs.remove("vault.wrapped_dek").unwrap();
    prefs.remove("vault.wrapped_dek").unwrap();
    assert!(!prefs.contains("vault.wrapped_dek").unwrap());

    prefs.put_string("engine.key.backup", "x").unwrap();
    prefs.put_string("engine.key.export", "y").unwrap();
    prefs.put_string("vault.password_hash", "z").unwrap();
    assert_eq!(
        prefs.keys_with_prefix("engine.key.").unwrap(),
        vec!["engine.key.backup", "engine.key.export"]
    );
}

#[test]
fn json_preferences_persist_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("prefs.json");

    exercise_prefs(&JsonFilePreferences::open(&path).unwrap());

    JsonFilePreferences::open(&path)
        .unwrap()
        .put_string("vault.password_hash", "$argon2id$stub")
        .unwrap();
    let reopened = JsonFilePreferences::open(&path).unwrap();
    assert_eq!(
        reopened.get_string("vault.password_hash").unwrap().as_deref(),
        Some("$argon2id$stub")
    );
}

#[cfg(feature = "sqlite-prefs")]
#[test]
fn sqlite_preferences_persist_across_reopen() {
    use credvault::prefs::SqlitePreferences;

    let dir = TempDir::new().unwrap();
    exercise_prefs(&SqlitePreferences::open(dir.path()).unwrap());

    SqlitePreferences::open(dir.path())
        .unwrap()
        .put_string("legacy.vault", "1")
        .unwrap();
    assert!(SqlitePreferences::open(dir.path())
        .unwrap()
        .contains("legacy.vault")
        .unwrap());
}

// ---------------------------------------------------------------------------
// Software key store
// ---------------------------------------------------------------------------

#[test]
fn file_key_store_needs_consent() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        FileKeyStore::open(dir.path(), false),
        Err(VaultError::KeyStoreUnavailable(_))
    ));
}

#[test]
fn file_key_store_unwraps_after_reopen_and_forgets_on_delete() {
    let dir = TempDir::new().unwrap();
    let wrapped = FileKeyStore::open(dir.path(), true)
        .unwrap()
        .wrap("credvault.dek", b"0123456789abcdef0123456789abcdef")
        .unwrap();

    let reopened = FileKeyStore::open(dir.path(), true).unwrap();
    assert_eq!(
        reopened.unwrap("credvault.dek", &wrapped).unwrap().expose(),
        b"0123456789abcdef0123456789abcdef"
    );

    reopened.delete_key("credvault.dek").unwrap();
    assert!(matches!(
        FileKeyStore::open(dir.path(), true)
            .unwrap()
            .unwrap("credvault.dek", &wrapped),
        Err(VaultError::KeyNotFound(_))
    ));
}

#[test]
fn full_vault_on_disk_survives_restart() {
    let dir = TempDir::new().unwrap();
    let build = || {
        let engine = CryptoEngine::new(
            Arc::new(FileKeyStore::open(dir.path(), true).unwrap()),
            Arc::new(JsonFilePreferences::open(&dir.path().join("prefs.json")).unwrap()),
        )
        .with_argon2_params(Argon2Params {
            memory_kib: 8192,
            iterations: 1,
            parallelism: 1,
        });
        VaultKeyManager::new(Arc::new(engine), CredentialStore::in_dir(dir.path()))
    };
    let password = MasterPassword::from("Secret123!");

    {
        let manager = build();
        manager.initialize_or_unlock(&password).unwrap();
        manager
            .with_store(|s| s.set_entry("note", EntryKind::Note, &SecretBuffer::from("remember")))
            .unwrap();
        manager.rekey().unwrap();
    }

    let manager = build();
    manager.initialize_or_unlock(&password).unwrap();
    let value = manager.with_store(|s| s.get_entry("note")).unwrap();
    assert_eq!(value.expose(), b"remember");
}
