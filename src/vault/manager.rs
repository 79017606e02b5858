//! The vault key manager: owner of the resident DEK and the open datastore.
//!
//! ```text
//!   Locked ──initialize_or_unlock──▶ Unlocking ──ok──▶ Unlocked
//!     ▲                                  │                 │
//!     └───────────── error ──────────────┘                 │
//!     └──────────────────── lock / reset ──────────────────┘
//! ```
//!
//! Transitions (unlock, lock, rekey, reset, password change) take the
//! session lock exclusively, so at most one runs at a time. Datastore and
//! payload calls take it shared: they run concurrently with each other but
//! never while a transition is in flight.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use super::migration;
use super::record::WrappedKeyRecord;
use crate::crypto::{Algorithm, CryptoEngine, EncryptedPayload};
use crate::datastore::Datastore;
use crate::errors::{Result, VaultError};
use crate::prefs::{keys, Preferences};
use crate::secret::{DataKey, MasterPassword};

/// Lifecycle state of a [`VaultKeyManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    /// No DEK resident.
    Locked,
    /// An unlock is in progress.
    Unlocking,
    /// DEK resident and datastore open.
    Unlocked,
}

impl VaultState {
    fn as_u8(self) -> u8 {
        match self {
            VaultState::Locked => 0,
            VaultState::Unlocking => 1,
            VaultState::Unlocked => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => VaultState::Unlocking,
            2 => VaultState::Unlocked,
            _ => VaultState::Locked,
        }
    }
}

impl fmt::Display for VaultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VaultState::Locked => "locked",
            VaultState::Unlocking => "unlocking",
            VaultState::Unlocked => "unlocked",
        })
    }
}

/// Snapshot returned by [`VaultKeyManager::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultStatus {
    pub state: VaultState,
    /// A wrapped key record exists.
    pub initialized: bool,
    /// A pre-envelope vault is waiting to be migrated.
    pub legacy_pending: bool,
    /// A staged record from an interrupted rekey is present.
    pub rekey_pending: bool,
    pub key_alias: String,
}

struct Session<H> {
    dek: DataKey,
    handle: H,
}

/// Owns the DEK while unlocked and mediates every use of it.
///
/// Construct one per vault at application start and share it by reference.
pub struct VaultKeyManager<D: Datastore> {
    engine: Arc<CryptoEngine>,
    datastore: D,
    alias: String,
    state: AtomicU8,
    session: RwLock<Option<Session<D::Handle>>>,
}

impl<D: Datastore> VaultKeyManager<D> {
    /// Default key store alias for the DEK's wrapping key.
    pub const DEFAULT_ALIAS: &'static str = "credvault.dek";

    pub fn new(engine: Arc<CryptoEngine>, datastore: D) -> Self {
        Self::with_alias(engine, datastore, Self::DEFAULT_ALIAS)
    }

    pub fn with_alias(engine: Arc<CryptoEngine>, datastore: D, alias: &str) -> Self {
        Self {
            engine,
            datastore,
            alias: alias.to_string(),
            state: AtomicU8::new(VaultState::Locked.as_u8()),
            session: RwLock::new(None),
        }
    }

    pub fn engine(&self) -> &CryptoEngine {
        &self.engine
    }

    pub fn datastore(&self) -> &D {
        &self.datastore
    }

    pub fn key_alias(&self) -> &str {
        &self.alias
    }

    // ------------------------------------------------------------------
    // State queries
    // ------------------------------------------------------------------

    pub fn state(&self) -> VaultState {
        VaultState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Cheap, never blocks on a running transition.
    pub fn is_unlocked(&self) -> bool {
        self.state() == VaultState::Unlocked
    }

    pub fn status(&self) -> Result<VaultStatus> {
        let prefs = self.prefs();
        Ok(VaultStatus {
            state: self.state(),
            initialized: prefs.contains(keys::WRAPPED_DEK)?,
            legacy_pending: migration::is_pending(&self.engine)?,
            rekey_pending: prefs.contains(keys::PENDING_WRAPPED_DEK)?,
            key_alias: self.alias.clone(),
        })
    }

    /// The current wrapped key record, if one has been written.
    pub fn wrapped_key_record(&self) -> Result<Option<WrappedKeyRecord>> {
        WrappedKeyRecord::load(self.prefs(), keys::WRAPPED_DEK)
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Verify `password`, recover (or on first run create) the DEK and open
    /// the datastore.
    ///
    /// The password only gates access; the DEK and its wrapped record never
    /// depend on it. On any error the vault is left `Locked`.
    pub fn initialize_or_unlock(&self, password: &MasterPassword) -> Result<()> {
        let mut session = self.write_session();

        if session.is_some() {
            // Already open: still demand the right password.
            self.verify_identity(password)?;
            debug!(alias = %self.alias, "unlock on an open vault");
            return Ok(());
        }

        self.set_state(VaultState::Unlocking);
        match self.open_session(password) {
            Ok(opened) => {
                *session = Some(opened);
                self.set_state(VaultState::Unlocked);
                info!(alias = %self.alias, "vault unlocked");
                Ok(())
            }
            Err(e) => {
                self.set_state(VaultState::Locked);
                debug!(alias = %self.alias, error = %e, "unlock failed");
                Err(e)
            }
        }
    }

    /// Zero the DEK, close the datastore and go to `Locked`. Idempotent and
    /// infallible; a failing close is logged after the key is gone.
    pub fn lock(&self) {
        let mut session = self.write_session();
        if let Some(mut open) = session.take() {
            open.dek.wipe();
            if let Err(e) = self.datastore.close(open.handle) {
                warn!(error = %e, "datastore close failed during lock");
            }
            info!(alias = %self.alias, "vault locked");
        }
        self.set_state(VaultState::Locked);
    }

    /// Replace the DEK with a fresh one and re-encrypt the datastore.
    ///
    /// The new DEK is staged wrapped as a pending record before the datastore
    /// is touched and promoted only after it confirms. If the datastore
    /// fails, the old DEK and record stay authoritative.
    ///
    /// A record left pending by an earlier rekey whose promotion failed is
    /// promoted first; if that still fails nothing new is staged.
    pub fn rekey(&self) -> Result<()> {
        let mut session = self.write_session();
        let open = session.as_mut().ok_or(VaultError::NotInitialized)?;
        let prefs = self.prefs();

        self.settle_pending(&open.dek)?;

        let new_dek = DataKey::generate()?;
        let record = WrappedKeyRecord::wrap(self.engine.key_store().as_ref(), &self.alias, &new_dek)?;
        record.save(prefs, keys::PENDING_WRAPPED_DEK)?;

        if let Err(e) = self.datastore.change_key(&open.handle, &new_dek) {
            if let Err(cleanup) = prefs.remove(keys::PENDING_WRAPPED_DEK) {
                warn!(error = %cleanup, "could not drop staged key after failed rekey");
            }
            warn!(alias = %self.alias, error = %e, "rekey aborted, previous key kept");
            return Err(e);
        }

        // The datastore now only opens with the new DEK.
        open.dek = new_dek;

        record.save(prefs, keys::WRAPPED_DEK).map_err(|e| {
            warn!(error = %e, "rekey not promoted; next unlock rolls forward");
            e
        })?;
        if let Err(e) = prefs.remove(keys::PENDING_WRAPPED_DEK) {
            warn!(error = %e, "stale pending key left behind; cleared on next unlock");
        }

        info!(alias = %self.alias, "vault re-keyed");
        Ok(())
    }

    /// Erase the vault: lock, destroy the wrapping key, every payload key,
    /// the records, the password hash, legacy material and the datastore
    /// itself.
    ///
    /// Once the keys are gone every old ciphertext, datastore and payload
    /// alike, is unrecoverable. Works in any state; no password is required.
    pub fn reset(&self) -> Result<()> {
        let mut session = self.write_session();
        if let Some(mut open) = session.take() {
            open.dek.wipe();
            if let Err(e) = self.datastore.close(open.handle) {
                warn!(error = %e, "datastore close failed during reset");
            }
        }
        self.set_state(VaultState::Locked);

        self.engine.key_store().delete_key(&self.alias)?;
        let forgotten = self.engine.forget_all_keys()?;
        debug!(count = forgotten, "payload keys destroyed");

        let prefs = self.prefs();
        prefs.remove(keys::WRAPPED_DEK)?;
        prefs.remove(keys::PENDING_WRAPPED_DEK)?;
        prefs.remove(keys::PASSWORD_HASH)?;
        crate::crypto::pdkf::purge(prefs)?;
        prefs.remove(keys::LEGACY_VAULT)?;

        self.datastore.destroy()?;

        info!(alias = %self.alias, "vault reset");
        Ok(())
    }

    /// Replace the master password's verification hash.
    ///
    /// Fails with `AuthenticationFailure` if `old` does not match, leaving
    /// everything untouched. The DEK, its record and the datastore are never
    /// modified.
    pub fn change_master_password(
        &self,
        old: &MasterPassword,
        new: &MasterPassword,
    ) -> Result<()> {
        let _session = self.write_session();
        let prefs = self.prefs();

        let hash = prefs
            .get_string(keys::PASSWORD_HASH)?
            .ok_or(VaultError::NotInitialized)?;
        if !self.engine.verify_password(old, &hash)? {
            return Err(VaultError::AuthenticationFailure);
        }

        let new_hash = self.engine.hash_password(new)?;
        prefs.put_string(keys::PASSWORD_HASH, &new_hash)?;

        info!(alias = %self.alias, "master password changed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Shared-access operations
    // ------------------------------------------------------------------

    /// Run `f` against the open datastore handle.
    ///
    /// Fails with `NotInitialized` while locked. Do not call transition
    /// methods from inside `f`.
    pub fn with_store<R>(&self, f: impl FnOnce(&D::Handle) -> Result<R>) -> Result<R> {
        let session = self.read_session();
        let open = session.as_ref().ok_or(VaultError::NotInitialized)?;
        f(&open.handle)
    }

    /// Encrypt a payload under `key_alias` while the vault is unlocked.
    pub fn encrypt_payload(
        &self,
        plaintext: &[u8],
        algorithm: Algorithm,
        key_alias: &str,
    ) -> Result<EncryptedPayload> {
        let session = self.read_session();
        if session.is_none() {
            return Err(VaultError::NotInitialized);
        }
        self.engine.encrypt(plaintext, algorithm, key_alias)
    }

    /// Decrypt a payload while the vault is unlocked.
    pub fn decrypt_payload(
        &self,
        payload: &EncryptedPayload,
        key_alias: Option<&str>,
    ) -> Result<Vec<u8>> {
        let session = self.read_session();
        if session.is_none() {
            return Err(VaultError::NotInitialized);
        }
        self.engine.decrypt(payload, key_alias)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn prefs(&self) -> &dyn Preferences {
        self.engine.preferences().as_ref()
    }

    fn set_state(&self, state: VaultState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    fn read_session(&self) -> RwLockReadGuard<'_, Option<Session<D::Handle>>> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_session(&self) -> RwLockWriteGuard<'_, Option<Session<D::Handle>>> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check `password` against the stored hash, if there is one.
    ///
    /// Returns whether a hash existed.
    fn verify_identity(&self, password: &MasterPassword) -> Result<bool> {
        match self.prefs().get_string(keys::PASSWORD_HASH)? {
            Some(hash) => {
                if self.engine.verify_password(password, &hash)? {
                    Ok(true)
                } else {
                    Err(VaultError::WrongPassword)
                }
            }
            None => Ok(false),
        }
    }

    fn open_session(&self, password: &MasterPassword) -> Result<Session<D::Handle>> {
        let prefs = self.prefs();

        if migration::is_pending(&self.engine)? {
            let (dek, handle) =
                migration::migrate(&self.engine, &self.datastore, &self.alias, password)?;
            return Ok(Session { dek, handle });
        }

        let has_hash = self.verify_identity(password)?;

        match WrappedKeyRecord::load(prefs, keys::WRAPPED_DEK)? {
            Some(record) => {
                if !has_hash {
                    return Err(VaultError::InvalidState(
                        "wrapped key exists without a password hash; reset the vault".into(),
                    ));
                }
                self.open_existing(&record)
            }
            None => self.first_run(password, has_hash),
        }
    }

    /// No record yet: create the DEK, the datastore and the record.
    ///
    /// The key store is exercised before anything is persisted. Write order
    /// is then hash, datastore, record: a crash at any point leaves either
    /// nothing or a hash without a record, and the next unlock verifies
    /// against that hash and starts over.
    fn first_run(&self, password: &MasterPassword, has_hash: bool) -> Result<Session<D::Handle>> {
        let prefs = self.prefs();

        let dek = DataKey::generate()?;
        let record = WrappedKeyRecord::wrap(self.engine.key_store().as_ref(), &self.alias, &dek)?;

        if !has_hash {
            let hash = self.engine.hash_password(password)?;
            prefs.put_string(keys::PASSWORD_HASH, &hash)?;
        }

        if self.datastore.exists()? {
            // Its DEK was never recorded, so the content is unreadable.
            warn!("discarding datastore left behind by an interrupted first run");
            self.datastore.destroy()?;
        }

        let handle = self.datastore.open_or_create(&dek)?;

        if let Err(e) = record.save(prefs, keys::WRAPPED_DEK) {
            if let Err(close) = self.datastore.close(handle) {
                warn!(error = %close, "datastore close failed after first-run error");
            }
            return Err(e);
        }

        info!(alias = %self.alias, "vault initialized");
        Ok(Session { dek, handle })
    }

    /// Resolve a pending record while `resident` is open.
    ///
    /// A pending record holding the resident DEK means an earlier promotion
    /// failed: the datastore is already on it, so it must become the record
    /// before anything else is staged over it. Any other pending record is
    /// stale and dropped.
    fn settle_pending(&self, resident: &DataKey) -> Result<()> {
        let prefs = self.prefs();
        let Some(pending) = WrappedKeyRecord::load(prefs, keys::PENDING_WRAPPED_DEK)? else {
            return Ok(());
        };

        let staged = pending.unwrap(self.engine.key_store().as_ref(), &self.alias)?;
        if staged.expose() == resident.expose() {
            pending.save(prefs, keys::WRAPPED_DEK).map_err(|e| {
                warn!(error = %e, "earlier rekey still not promoted; refusing to rekey");
                e
            })?;
            info!(alias = %self.alias, "earlier rekey promoted");
        } else {
            debug!(alias = %self.alias, "stale pending key dropped before rekey");
        }
        prefs.remove(keys::PENDING_WRAPPED_DEK)?;
        Ok(())
    }

    /// Unwrap the record and open the datastore, finishing any rekey that
    /// was interrupted after the datastore switched keys.
    fn open_existing(&self, record: &WrappedKeyRecord) -> Result<Session<D::Handle>> {
        let prefs = self.prefs();
        let key_store = self.engine.key_store().as_ref();
        let pending = WrappedKeyRecord::load(prefs, keys::PENDING_WRAPPED_DEK)?;

        let dek = record.unwrap(key_store, &self.alias)?;
        match self.datastore.open_or_create(&dek) {
            Ok(handle) => {
                if pending.is_some() {
                    prefs.remove(keys::PENDING_WRAPPED_DEK)?;
                    info!(alias = %self.alias, "stale pending key discarded");
                }
                Ok(Session { dek, handle })
            }
            Err(VaultError::AuthenticationFailure) => {
                let Some(pending) = pending else {
                    return Err(VaultError::AuthenticationFailure);
                };
                drop(dek);
                let new_dek = pending.unwrap(key_store, &self.alias)?;
                let handle = self.datastore.open_or_create(&new_dek)?;
                pending.save(prefs, keys::WRAPPED_DEK)?;
                prefs.remove(keys::PENDING_WRAPPED_DEK)?;
                info!(alias = %self.alias, "interrupted rekey rolled forward");
                Ok(Session {
                    dek: new_dek,
                    handle,
                })
            }
            Err(e) => Err(e),
        }
    }
}

impl<D: Datastore> Drop for VaultKeyManager<D> {
    fn drop(&mut self) {
        self.lock();
    }
}

impl<D: Datastore> fmt::Debug for VaultKeyManager<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultKeyManager")
            .field("alias", &self.alias)
            .field("state", &self.state())
            .finish()
    }
}
