//! AEAD algorithm identifiers and capability-based selection.
//!
//! The chosen algorithm is written into every payload header, so a payload
//! encrypted on one machine decrypts on any other regardless of what that
//! machine would have picked.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, VaultError};

/// Nonce length shared by both supported ciphers.
pub const IV_LEN: usize = 12;

/// Authentication tag length shared by both supported ciphers.
pub const TAG_LEN: usize = 16;

/// Symmetric AEAD algorithms understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    /// Let the engine pick based on [`DeviceCapabilities`]. Never stored.
    Auto,
    /// AES-256-GCM.
    AesGcm,
    /// ChaCha20-Poly1305 (RFC 8439).
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
}

impl Algorithm {
    /// Wire id written into the payload header.
    pub fn id(self) -> u8 {
        match self {
            Algorithm::Auto => 0,
            Algorithm::AesGcm => 1,
            Algorithm::ChaCha20Poly1305 => 2,
        }
    }

    /// Parse a wire id. `Auto` is a request-only value and is rejected here.
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            1 => Ok(Algorithm::AesGcm),
            2 => Ok(Algorithm::ChaCha20Poly1305),
            other => Err(VaultError::UnsupportedAlgorithm(other)),
        }
    }

    /// IV length for this algorithm.
    pub fn iv_len(self) -> usize {
        IV_LEN
    }

    /// Whether decrypting with this algorithm needs a key alias.
    pub fn requires_key(self) -> bool {
        !matches!(self, Algorithm::Auto)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::Auto => "auto",
            Algorithm::AesGcm => "aes-gcm",
            Algorithm::ChaCha20Poly1305 => "chacha20-poly1305",
        };
        f.write_str(name)
    }
}

impl FromStr for Algorithm {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Algorithm::Auto),
            "aes-gcm" | "aes_gcm" | "aes256-gcm" => Ok(Algorithm::AesGcm),
            "chacha20-poly1305" | "chacha20_poly1305" | "chacha" => {
                Ok(Algorithm::ChaCha20Poly1305)
            }
            other => Err(VaultError::InvalidInput(format!(
                "unknown algorithm '{other}', expected auto, aes-gcm or chacha20-poly1305"
            ))),
        }
    }
}

/// What the current device can do, as far as algorithm choice is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// The CPU advertises AES instructions.
    pub hardware_aes: bool,
    /// The platform is recent enough to ship a vetted stream cipher.
    pub stream_cipher_supported: bool,
}

impl DeviceCapabilities {
    /// Detect what the running CPU supports.
    pub fn detect() -> Self {
        Self {
            hardware_aes: cpu_has_aes(),
            stream_cipher_supported: true,
        }
    }

    /// Choose an algorithm for new payloads.
    ///
    /// Hardware AES first, then the stream cipher, then AES in software.
    pub fn select(self) -> Algorithm {
        if self.hardware_aes {
            Algorithm::AesGcm
        } else if self.stream_cipher_supported {
            Algorithm::ChaCha20Poly1305
        } else {
            Algorithm::AesGcm
        }
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn cpu_has_aes() -> bool {
    std::arch::is_x86_feature_detected!("aes") && std::arch::is_x86_feature_detected!("pclmulqdq")
}

#[cfg(target_arch = "aarch64")]
fn cpu_has_aes() -> bool {
    std::arch::is_aarch64_feature_detected!("aes")
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
fn cpu_has_aes() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_aes_selects_block_cipher() {
        let caps = DeviceCapabilities {
            hardware_aes: true,
            stream_cipher_supported: true,
        };
        assert_eq!(caps.select(), Algorithm::AesGcm);
    }

    #[test]
    fn no_acceleration_prefers_stream_cipher() {
        let caps = DeviceCapabilities {
            hardware_aes: false,
            stream_cipher_supported: true,
        };
        assert_eq!(caps.select(), Algorithm::ChaCha20Poly1305);
    }

    #[test]
    fn old_platform_falls_back_to_software_aes() {
        let caps = DeviceCapabilities {
            hardware_aes: false,
            stream_cipher_supported: false,
        };
        assert_eq!(caps.select(), Algorithm::AesGcm);
    }

    #[test]
    fn ids_round_trip_and_auto_is_not_a_wire_value() {
        for alg in [Algorithm::AesGcm, Algorithm::ChaCha20Poly1305] {
            assert_eq!(Algorithm::from_id(alg.id()).unwrap(), alg);
        }
        assert!(matches!(
            Algorithm::from_id(0),
            Err(VaultError::UnsupportedAlgorithm(0))
        ));
        assert!(Algorithm::from_id(7).is_err());
    }

    #[test]
    fn parses_names() {
        assert_eq!("AES-GCM".parse::<Algorithm>().unwrap(), Algorithm::AesGcm);
        assert_eq!(
            "chacha20-poly1305".parse::<Algorithm>().unwrap(),
            Algorithm::ChaCha20Poly1305
        );
        assert_eq!("auto".parse::<Algorithm>().unwrap(), Algorithm::Auto);
        assert!("rot13".parse::<Algorithm>().is_err());
    }

    #[test]
    fn both_ciphers_use_twelve_byte_ivs() {
        assert_eq!(Algorithm::AesGcm.iv_len(), 12);
        assert_eq!(Algorithm::ChaCha20Poly1305.iv_len(), 12);
    }
}
