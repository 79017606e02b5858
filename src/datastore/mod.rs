//! The datastore collaborator: encrypted storage opened with the DEK.
//!
//! The vault key manager only ever talks to the [`Datastore`] trait. It hands
//! over the DEK to open or re-key the store and passes the resulting handle
//! on to consumers; the DEK bytes themselves stay with the manager.
//!
//! [`CredentialStore`] is the file-backed implementation shipped with the
//! crate.

pub mod entry;
pub mod format;
mod store;

pub use entry::{EntryKind, EntryMetadata};
pub use store::{CredentialHandle, CredentialStore};

use crate::errors::Result;
use crate::secret::DataKey;

/// Encrypted storage keyed by a data encryption key.
pub trait Datastore: Send + Sync {
    /// An open store. Shared by reference across concurrent readers.
    type Handle: Send + Sync;

    /// Open the store with `key`, creating an empty one if none exists.
    ///
    /// Opening an existing store with the wrong key fails with
    /// `AuthenticationFailure`.
    fn open_or_create(&self, key: &DataKey) -> Result<Self::Handle>;

    /// Re-encrypt all content under `new_key`.
    ///
    /// All-or-nothing: on error the store is still readable with the old
    /// key, on success only with the new one.
    fn change_key(&self, handle: &Self::Handle, new_key: &DataKey) -> Result<()>;

    fn close(&self, handle: Self::Handle) -> Result<()>;

    /// Whether a store has been created.
    fn exists(&self) -> Result<bool>;

    /// Delete the store and everything in it.
    fn destroy(&self) -> Result<()>;
}
