//! File-backed credential datastore.
//!
//! `CredentialStore` knows where the store file lives; opening it with a DEK
//! yields a `CredentialHandle` with simple calls like
//! `handle.set_entry("github", EntryKind::Password, &value)`. Every mutation
//! is written to disk before the call returns.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::debug;

use super::entry::{EntryKind, EntryMetadata, StoredEntry};
use super::format::{self, StoreHeader};
use super::Datastore;
use crate::crypto::aead;
use crate::crypto::keys::StoreKeys;
use crate::errors::{Result, VaultError};
use crate::prefs;
use crate::secret::{DataKey, SecretBuffer};

/// Location of a credential store on disk.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// File name of the store inside the data directory.
    pub const FILE_NAME: &'static str = "credentials.cvlt";

    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Store at the default location inside `data_dir`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(&data_dir.join(Self::FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Datastore for CredentialStore {
    type Handle = CredentialHandle;

    fn open_or_create(&self, key: &DataKey) -> Result<CredentialHandle> {
        let keys = StoreKeys::derive(key)?;

        if !self.path.exists() {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let header = StoreHeader::new();
            format::write_store(&self.path, &header, &[], keys.integrity_key())?;
            debug!(path = %self.path.display(), "credential store created");
            return Ok(CredentialHandle::new(
                self.path.clone(),
                keys,
                header,
                BTreeMap::new(),
            ));
        }

        let raw = format::read_store(&self.path)?;
        raw.verify(keys.integrity_key())?;

        let entries = raw
            .entries
            .into_iter()
            .map(|e| (e.name.clone(), e))
            .collect();

        debug!(path = %self.path.display(), "credential store opened");
        Ok(CredentialHandle::new(
            self.path.clone(),
            keys,
            raw.header,
            entries,
        ))
    }

    fn change_key(&self, handle: &CredentialHandle, new_key: &DataKey) -> Result<()> {
        handle.rekey(new_key)
    }

    fn close(&self, handle: CredentialHandle) -> Result<()> {
        drop(handle);
        Ok(())
    }

    fn exists(&self) -> Result<bool> {
        Ok(self.path.exists())
    }

    fn destroy(&self) -> Result<()> {
        for path in [self.path.clone(), prefs::temp_path(&self.path)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!(path = %self.path.display(), "credential store destroyed");
        Ok(())
    }
}

struct Inner {
    keys: StoreKeys,
    header: StoreHeader,
    entries: BTreeMap<String, StoredEntry>,
}

/// An open credential store.
///
/// Holds only keys derived from the DEK, never the DEK itself. Safe to share
/// across threads; mutations are serialized internally.
pub struct CredentialHandle {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl CredentialHandle {
    fn new(
        path: PathBuf,
        keys: StoreKeys,
        header: StoreHeader,
        entries: BTreeMap<String, StoredEntry>,
    ) -> Self {
        Self {
            path,
            inner: Mutex::new(Inner {
                keys,
                header,
                entries,
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Entry operations
    // ------------------------------------------------------------------

    /// Add or update an entry and persist the store.
    pub fn set_entry(&self, name: &str, kind: EntryKind, value: &SecretBuffer) -> Result<()> {
        validate_entry_name(name)?;
        if value.is_empty() {
            return Err(VaultError::InvalidInput(format!(
                "value for '{name}' is empty"
            )));
        }

        let mut inner = self.inner();
        let entry_key = inner.keys.entry_key(name)?;
        let encrypted_value = aead::encrypt(&entry_key[..], value.expose(), name.as_bytes())?;

        let now = Utc::now();
        let created_at = inner
            .entries
            .get(name)
            .map_or(now, |existing| existing.created_at);

        let previous = inner.entries.insert(
            name.to_string(),
            StoredEntry {
                name: name.to_string(),
                kind,
                encrypted_value,
                created_at,
                updated_at: now,
            },
        );

        if let Err(e) = self.persist(&inner) {
            // Keep memory in line with what is on disk.
            match previous {
                Some(old) => inner.entries.insert(name.to_string(), old),
                None => inner.entries.remove(name),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Decrypt and return an entry's value.
    pub fn get_entry(&self, name: &str) -> Result<SecretBuffer> {
        validate_entry_name(name)?;
        let inner = self.inner();
        let entry = inner
            .entries
            .get(name)
            .ok_or_else(|| VaultError::EntryNotFound(name.to_string()))?;

        let entry_key = inner.keys.entry_key(name)?;
        aead::decrypt(&entry_key[..], &entry.encrypted_value, name.as_bytes())
            .map(SecretBuffer::new)
    }

    /// Remove an entry and persist the store.
    pub fn delete_entry(&self, name: &str) -> Result<()> {
        validate_entry_name(name)?;
        let mut inner = self.inner();
        let removed = inner
            .entries
            .remove(name)
            .ok_or_else(|| VaultError::EntryNotFound(name.to_string()))?;

        if let Err(e) = self.persist(&inner) {
            inner.entries.insert(name.to_string(), removed);
            return Err(e);
        }
        Ok(())
    }

    /// Metadata for all entries, sorted by name.
    pub fn list_entries(&self) -> Vec<EntryMetadata> {
        self.inner().entries.values().map(EntryMetadata::from).collect()
    }

    pub fn entry_count(&self) -> usize {
        self.inner().entries.len()
    }

    pub fn contains_entry(&self, name: &str) -> bool {
        self.inner().entries.contains_key(name)
    }

    /// Number of times the store has been re-keyed.
    pub fn key_generation(&self) -> u32 {
        self.inner().header.key_generation
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    fn persist(&self, inner: &Inner) -> Result<()> {
        let entries: Vec<StoredEntry> = inner.entries.values().cloned().collect();
        format::write_store(
            &self.path,
            &inner.header,
            &entries,
            inner.keys.integrity_key(),
        )
    }

    /// Re-seal every entry under keys derived from `new_key` and replace the
    /// file with one rename. In-memory state switches only after the rename.
    fn rekey(&self, new_key: &DataKey) -> Result<()> {
        let new_keys = StoreKeys::derive(new_key)?;
        let mut inner = self.inner();

        let mut resealed = BTreeMap::new();
        for (name, entry) in &inner.entries {
            let old_key = inner.keys.entry_key(name)?;
            let plaintext = SecretBuffer::new(aead::decrypt(
                &old_key[..],
                &entry.encrypted_value,
                name.as_bytes(),
            )?);

            let fresh_key = new_keys.entry_key(name)?;
            let encrypted_value =
                aead::encrypt(&fresh_key[..], plaintext.expose(), name.as_bytes())?;

            resealed.insert(
                name.clone(),
                StoredEntry {
                    encrypted_value,
                    ..entry.clone()
                },
            );
        }

        let mut header = inner.header.clone();
        header.key_generation = header.key_generation.saturating_add(1);
        header.rekeyed_at = Some(Utc::now());

        let entries: Vec<StoredEntry> = resealed.values().cloned().collect();
        format::write_store(&self.path, &header, &entries, new_keys.integrity_key())?;

        inner.keys = new_keys;
        inner.header = header;
        inner.entries = resealed;
        debug!(
            path = %self.path.display(),
            entries = inner.entries.len(),
            generation = inner.header.key_generation,
            "credential store re-keyed"
        );
        Ok(())
    }
}

impl std::fmt::Debug for CredentialHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHandle")
            .field("path", &self.path)
            .field("entries", &self.entry_count())
            .finish()
    }
}

/// Validate that an entry name is safe.
///
/// Allowed: ASCII letters, digits, underscores, hyphens, periods, `@`.
/// Must be non-empty and at most 256 characters.
fn validate_entry_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(VaultError::InvalidInput("entry name cannot be empty".into()));
    }
    if name.len() > 256 {
        return Err(VaultError::InvalidInput(
            "entry name cannot exceed 256 characters".into(),
        ));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b'@'))
    {
        return Err(VaultError::InvalidInput(format!(
            "entry name '{name}' contains invalid characters; only ASCII letters, digits, '_', '-', '.' and '@' are allowed"
        )));
    }
    Ok(())
}
