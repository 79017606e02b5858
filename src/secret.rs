//! Zero-on-drop containers for passwords and key material.
//!
//! Every secret in the crate lives in one of these types so it is wiped on
//! every exit path, including early `?` returns and panics that unwind.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::random;
use crate::errors::{Result, VaultError};

/// Length of a data encryption key in bytes (256 bits).
pub const DATA_KEY_LEN: usize = 32;

/// A growable byte buffer that is overwritten with zeros when dropped.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct SecretBuffer {
    bytes: Vec<u8>,
}

/// The user's master password. Only ever held as a [`SecretBuffer`].
pub type MasterPassword = SecretBuffer;

impl SecretBuffer {
    /// Take ownership of `bytes`. The caller's vector is moved, not copied.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Copy `bytes` into a new buffer.
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    /// Build a buffer from a string, consuming it so no plaintext copy
    /// survives outside the buffer.
    pub fn from_string(s: String) -> Self {
        Self {
            bytes: s.into_bytes(),
        }
    }

    pub fn expose(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<&str> for SecretBuffer {
    fn from(s: &str) -> Self {
        Self::from_slice(s.as_bytes())
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretBuffer")
            .field("len", &self.bytes.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A 256-bit data encryption key. Zeroed on drop and never printed.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DataKey {
    bytes: [u8; DATA_KEY_LEN],
}

impl DataKey {
    /// Generate a fresh key from the operating system CSPRNG.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; DATA_KEY_LEN];
        random::fill(&mut bytes)?;
        let key = Self { bytes };
        bytes.zeroize();
        Ok(key)
    }

    pub fn from_bytes(bytes: [u8; DATA_KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Build a key from an unwrapped buffer, rejecting anything that is not
    /// exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; DATA_KEY_LEN] = bytes.try_into().map_err(|_| {
            VaultError::InvalidFormat(format!(
                "data key must be {DATA_KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self { bytes: array })
    }

    pub fn expose(&self) -> &[u8; DATA_KEY_LEN] {
        &self.bytes
    }

    /// Overwrite the key in place. Called by `lock()` before the key is
    /// released so the zeroing does not depend on drop order.
    pub fn wipe(&mut self) {
        self.bytes.zeroize();
    }

    pub(crate) fn is_wiped(&self) -> bool {
        self.bytes.iter().all(|b| *b == 0)
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_never_contains_secret() {
        let buf = SecretBuffer::from("hunter2");
        let printed = format!("{buf:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("REDACTED"));

        let key = DataKey::from_bytes([0x41; DATA_KEY_LEN]);
        assert_eq!(format!("{key:?}"), "DataKey([REDACTED])");
    }

    #[test]
    fn wipe_zeroes_key_in_place() {
        let mut key = DataKey::from_bytes([0xAB; DATA_KEY_LEN]);
        assert!(!key.is_wiped());
        key.wipe();
        assert!(key.is_wiped());
    }

    #[test]
    fn generated_keys_differ() {
        let a = DataKey::generate().unwrap();
        let b = DataKey::generate().unwrap();
        assert_ne!(a.expose(), b.expose());
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(DataKey::from_slice(&[0u8; 16]).is_err());
        assert!(DataKey::from_slice(&[0u8; 32]).is_ok());
    }

    #[test]
    fn secret_buffer_keeps_long_input() {
        let long = "x".repeat(10_000);
        let buf = SecretBuffer::from(long.as_str());
        assert_eq!(buf.len(), 10_000);
        assert!(!buf.is_empty());
    }
}
