//! One-time migration of pre-envelope vaults.
//!
//! A legacy vault opened its datastore with a key derived from the master
//! password (see `crypto::pdkf`). It is recognised by the `legacy.vault`
//! marker with no wrapped key record. Migration:
//!
//! 1. derive the legacy key and open the datastore with it (this is what
//!    authenticates the password)
//! 2. store a verification hash for the password
//! 3. generate a random DEK, stage it wrapped as the pending record
//! 4. re-key the datastore to the DEK
//! 5. promote the pending record and purge every piece of legacy material
//!
//! An interrupted migration is resumed on the next unlock: the password is
//! checked against the stored hash, and if the legacy key no longer opens
//! the store, the staged DEK is tried.

use tracing::{info, warn};

use super::record::WrappedKeyRecord;
use crate::crypto::{pdkf, CryptoEngine};
use crate::datastore::Datastore;
use crate::errors::{Result, VaultError};
use crate::prefs::keys;
use crate::secret::{DataKey, MasterPassword};

/// Whether preferences describe a vault still awaiting migration.
pub fn is_pending(engine: &CryptoEngine) -> Result<bool> {
    let prefs = engine.preferences();
    Ok(prefs.contains(keys::LEGACY_VAULT)? && !prefs.contains(keys::WRAPPED_DEK)?)
}

/// Migrate the legacy vault and return the new DEK with an open handle.
pub(crate) fn migrate<D: Datastore>(
    engine: &CryptoEngine,
    datastore: &D,
    alias: &str,
    password: &MasterPassword,
) -> Result<(DataKey, D::Handle)> {
    let prefs = engine.preferences().as_ref();
    let key_store = engine.key_store().as_ref();

    let stored_hash = prefs.get_string(keys::PASSWORD_HASH)?;
    if let Some(hash) = &stored_hash {
        if !engine.verify_password(password, hash)? {
            return Err(VaultError::WrongPassword);
        }
    }

    // Opening the legacy store is what authenticates the password, so a
    // missing store must not be recreated under whatever key was typed.
    if !datastore.exists()? {
        return Err(VaultError::InvalidState(
            "legacy vault marker present but its datastore is missing; reset the vault".into(),
        ));
    }

    let legacy_key = engine.derive_key(password)?;
    let handle = match datastore.open_or_create(&legacy_key) {
        Ok(handle) => handle,
        Err(VaultError::AuthenticationFailure) => {
            return resume_after_rekey(engine, datastore, alias, stored_hash.is_some());
        }
        Err(e) => return Err(e),
    };
    drop(legacy_key);

    if stored_hash.is_none() {
        let hash = engine.hash_password(password)?;
        prefs.put_string(keys::PASSWORD_HASH, &hash)?;
    }

    let dek = DataKey::generate()?;
    let record = WrappedKeyRecord::wrap(key_store, alias, &dek)?;
    record.save(prefs, keys::PENDING_WRAPPED_DEK)?;

    if let Err(e) = datastore.change_key(&handle, &dek) {
        if let Err(cleanup) = prefs.remove(keys::PENDING_WRAPPED_DEK) {
            warn!(error = %cleanup, "could not drop staged key after failed migration");
        }
        return Err(e);
    }

    record.save(prefs, keys::WRAPPED_DEK)?;
    finish(engine)?;

    info!(alias, "legacy vault migrated to wrapped data key");
    Ok((dek, handle))
}

/// The legacy key no longer opens the store: a previous migration got as
/// far as re-keying. Only valid once the password has been verified.
fn resume_after_rekey<D: Datastore>(
    engine: &CryptoEngine,
    datastore: &D,
    alias: &str,
    password_verified: bool,
) -> Result<(DataKey, D::Handle)> {
    let prefs = engine.preferences().as_ref();
    let pending = WrappedKeyRecord::load(prefs, keys::PENDING_WRAPPED_DEK)?;

    let pending = match (password_verified, pending) {
        (true, Some(pending)) => pending,
        _ => return Err(VaultError::WrongPassword),
    };

    let dek = pending.unwrap(engine.key_store().as_ref(), alias)?;
    let handle = datastore.open_or_create(&dek)?;

    pending.save(prefs, keys::WRAPPED_DEK)?;
    finish(engine)?;

    info!(alias, "interrupted legacy migration completed");
    Ok((dek, handle))
}

/// Drop the staged record and every piece of legacy key material.
fn finish(engine: &CryptoEngine) -> Result<()> {
    let prefs = engine.preferences().as_ref();
    prefs.remove(keys::PENDING_WRAPPED_DEK)?;
    pdkf::purge(prefs)?;
    prefs.remove(keys::LEGACY_VAULT)?;
    Ok(())
}

/// Lay down a vault in the pre-envelope layout: the datastore keyed by the
/// password-derived key plus the legacy marker.
///
/// Used to exercise migration and to import stores from old installs.
pub fn create_legacy_vault<D: Datastore>(
    engine: &CryptoEngine,
    datastore: &D,
    password: &MasterPassword,
) -> Result<D::Handle> {
    let legacy_key = engine.derive_key(password)?;
    let handle = datastore.open_or_create(&legacy_key)?;
    engine.preferences().put_string(keys::LEGACY_VAULT, "1")?;
    Ok(handle)
}
