use std::path::PathBuf;
use thiserror::Error;

/// All errors that can occur in credvault.
#[derive(Debug, Error)]
pub enum VaultError {
    // --- Input validation ---
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Password must not be empty")]
    EmptyPassword,

    #[error("Invalid size {0} — must be greater than zero")]
    InvalidSize(usize),

    // --- Key resolution ---
    #[error("No key available for alias '{0}'")]
    MissingKey(String),

    #[error("Unsupported payload version {found} (this build reads up to {supported})")]
    UnsupportedVersion { found: u8, supported: u8 },

    #[error("Unsupported algorithm id {0}")]
    UnsupportedAlgorithm(u8),

    // --- Authentication ---
    #[error("Authentication failed — wrong key or tampered data")]
    AuthenticationFailure,

    #[error("Wrong master password")]
    WrongPassword,

    // --- Key store ---
    #[error("Key store unavailable: {0}")]
    KeyStoreUnavailable(String),

    #[error("No wrapping key exists for alias '{0}'")]
    KeyNotFound(String),

    // --- Platform ---
    #[error("System random number generator failed: {0}")]
    RandomnessUnavailable(String),

    // --- Vault state ---
    #[error("Vault not initialized — unlock it first")]
    NotInitialized,

    #[error("Invalid vault state: {0}")]
    InvalidState(String),

    // --- Storage ---
    #[error("Datastore not found at {0}")]
    DatastoreNotFound(PathBuf),

    #[error("Invalid datastore format: {0}")]
    InvalidFormat(String),

    #[error("Entry '{0}' not found")]
    EntryNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // --- Config ---
    #[error("Config file error: {0}")]
    Config(String),

    // --- CLI ---
    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("User cancelled operation")]
    UserCancelled,
}

/// Coarse classification of [`VaultError`] so callers can react to the
/// category of a failure rather than its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InputValidation,
    Authentication,
    KeyStore,
    UnsupportedVersion,
    State,
    Storage,
    /// The OS could not provide a primitive the crate depends on.
    Platform,
    Interaction,
}

impl ErrorKind {
    /// Whether repeating the same call could succeed.
    ///
    /// Validation and authentication failures never succeed on retry with
    /// unchanged input, and automatic password retries are a caller policy.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::KeyStore | ErrorKind::Storage)
    }
}

impl VaultError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::InvalidInput(_)
            | VaultError::EmptyPassword
            | VaultError::InvalidSize(_)
            | VaultError::UnsupportedAlgorithm(_) => ErrorKind::InputValidation,
            VaultError::AuthenticationFailure | VaultError::WrongPassword => {
                ErrorKind::Authentication
            }
            VaultError::MissingKey(_)
            | VaultError::KeyStoreUnavailable(_)
            | VaultError::KeyNotFound(_) => ErrorKind::KeyStore,
            VaultError::UnsupportedVersion { .. } => ErrorKind::UnsupportedVersion,
            VaultError::RandomnessUnavailable(_) => ErrorKind::Platform,
            VaultError::NotInitialized | VaultError::InvalidState(_) => ErrorKind::State,
            VaultError::DatastoreNotFound(_)
            | VaultError::InvalidFormat(_)
            | VaultError::EntryNotFound(_)
            | VaultError::Storage(_)
            | VaultError::Io(_)
            | VaultError::Serialization(_)
            | VaultError::Config(_) => ErrorKind::Storage,
            VaultError::CommandFailed(_)
            | VaultError::UserCancelled => ErrorKind::Interaction,
        }
    }
}

/// Convenience type alias for credvault results.
pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_errors_are_distinguishable() {
        assert_eq!(
            VaultError::AuthenticationFailure.kind(),
            ErrorKind::Authentication
        );
        assert_eq!(VaultError::WrongPassword.kind(), ErrorKind::Authentication);
        assert_ne!(
            VaultError::Storage("disk full".into()).kind(),
            ErrorKind::Authentication
        );
    }

    #[test]
    fn validation_and_auth_failures_are_not_retryable() {
        assert!(!VaultError::EmptyPassword.kind().is_retryable());
        assert!(!VaultError::InvalidSize(0).kind().is_retryable());
        assert!(!VaultError::AuthenticationFailure.kind().is_retryable());
        assert!(VaultError::KeyStoreUnavailable("locked".into())
            .kind()
            .is_retryable());
    }

    #[test]
    fn rng_failure_is_a_fatal_platform_error() {
        let err = VaultError::RandomnessUnavailable("getrandom: ENOSYS".into());
        assert_eq!(err.kind(), ErrorKind::Platform);
        assert!(!err.kind().is_retryable());
    }

    #[test]
    fn unsupported_version_has_its_own_kind() {
        let err = VaultError::UnsupportedVersion {
            found: 9,
            supported: 1,
        };
        assert_eq!(err.kind(), ErrorKind::UnsupportedVersion);
        assert!(err.to_string().contains('9'));
    }
}
