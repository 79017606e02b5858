//! Vault key management.
//!
//! - `manager`: the [`VaultKeyManager`] state machine that owns the DEK
//! - `record`: [`WrappedKeyRecord`], the DEK as persisted
//! - `migration`: one-time upgrade of password-derived-key vaults

pub mod manager;
pub mod migration;
pub mod record;

pub use manager::{VaultKeyManager, VaultState, VaultStatus};
pub use record::WrappedKeyRecord;
