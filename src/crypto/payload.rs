//! Self-describing encrypted payload envelope.
//!
//! Binary layout consumed by backup and export tooling:
//!
//! ```text
//! [version: 1 byte][algorithm id: 1 byte][IV length: 2 bytes BE][IV][ciphertext + 16-byte tag]
//! ```
//!
//! Everything needed to decrypt (except the key) travels with the payload.

use super::algorithm::{Algorithm, TAG_LEN};
use crate::errors::{Result, VaultError};

/// Highest payload format version this build reads and the one it writes.
pub const CURRENT_VERSION: u8 = 1;

/// Fixed-size prefix: 1 (version) + 1 (algorithm) + 2 (IV length).
const PREFIX_LEN: usize = 4;

/// An encrypted, authenticated blob produced by the crypto engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    pub version: u8,
    /// The algorithm actually used. Never `Algorithm::Auto`.
    pub algorithm: Algorithm,
    pub iv: Vec<u8>,
    /// Ciphertext with the authentication tag appended.
    pub ciphertext: Vec<u8>,
}

impl EncryptedPayload {
    /// Encode into the wire layout.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let iv_len = u16::try_from(self.iv.len()).map_err(|_| {
            VaultError::InvalidInput(format!("IV length {} exceeds u16::MAX", self.iv.len()))
        })?;

        let mut buf = Vec::with_capacity(PREFIX_LEN + self.iv.len() + self.ciphertext.len());
        buf.push(self.version);
        buf.push(self.algorithm.id());
        buf.extend_from_slice(&iv_len.to_be_bytes());
        buf.extend_from_slice(&self.iv);
        buf.extend_from_slice(&self.ciphertext);
        Ok(buf)
    }

    /// Decode from the wire layout.
    ///
    /// The version is checked before anything else so payloads from a newer
    /// format are rejected outright instead of being half-parsed.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(VaultError::InvalidFormat("empty payload".into()));
        }

        let version = data[0];
        if version > CURRENT_VERSION {
            return Err(VaultError::UnsupportedVersion {
                found: version,
                supported: CURRENT_VERSION,
            });
        }
        if version == 0 {
            return Err(VaultError::InvalidFormat("payload version 0 is invalid".into()));
        }

        if data.len() < PREFIX_LEN {
            return Err(VaultError::InvalidFormat(
                "payload too small to hold a header".into(),
            ));
        }

        let algorithm = Algorithm::from_id(data[1])?;
        let iv_len = usize::from(u16::from_be_bytes([data[2], data[3]]));
        if iv_len != algorithm.iv_len() {
            return Err(VaultError::InvalidFormat(format!(
                "IV length {iv_len} does not match {algorithm} (expected {})",
                algorithm.iv_len()
            )));
        }

        let iv_end = PREFIX_LEN + iv_len;
        if data.len() < iv_end + TAG_LEN {
            return Err(VaultError::InvalidFormat(
                "payload truncated before authentication tag".into(),
            ));
        }

        Ok(Self {
            version,
            algorithm,
            iv: data[PREFIX_LEN..iv_end].to_vec(),
            ciphertext: data[iv_end..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EncryptedPayload {
        EncryptedPayload {
            version: CURRENT_VERSION,
            algorithm: Algorithm::ChaCha20Poly1305,
            iv: vec![9; 12],
            ciphertext: vec![1; 21],
        }
    }

    #[test]
    fn layout_matches_documented_format() {
        let bytes = sample().to_bytes().unwrap();
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[1], 2);
        assert_eq!(&bytes[2..4], &[0, 12]);
        assert_eq!(&bytes[4..16], &[9; 12]);
        assert_eq!(bytes.len(), 4 + 12 + 21);
        assert_eq!(EncryptedPayload::from_bytes(&bytes).unwrap(), sample());
    }

    #[test]
    fn newer_version_is_rejected() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[0] = CURRENT_VERSION + 1;
        assert!(matches!(
            EncryptedPayload::from_bytes(&bytes),
            Err(VaultError::UnsupportedVersion { found: 2, supported: 1 })
        ));
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[1] = 0x7F;
        assert!(matches!(
            EncryptedPayload::from_bytes(&bytes),
            Err(VaultError::UnsupportedAlgorithm(0x7F))
        ));
    }

    #[test]
    fn mismatched_iv_length_is_rejected() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[3] = 16;
        assert!(matches!(
            EncryptedPayload::from_bytes(&bytes),
            Err(VaultError::InvalidFormat(_))
        ));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let bytes = sample().to_bytes().unwrap();
        assert!(EncryptedPayload::from_bytes(&bytes[..3]).is_err());
        assert!(EncryptedPayload::from_bytes(&bytes[..20]).is_err());
        assert!(EncryptedPayload::from_bytes(&[]).is_err());
    }
}
