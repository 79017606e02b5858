//! Cryptographic primitives for credvault.
//!
//! This module provides:
//! - AES-256-GCM and ChaCha20-Poly1305 sealing (`aead`)
//! - Algorithm ids and capability-based selection (`algorithm`)
//! - The self-describing payload envelope (`payload`)
//! - Argon2id password verification hashes (`password`)
//! - The legacy PBKDF2 password-derived key (`pdkf`)
//! - HKDF per-entry and integrity sub-keys (`keys`)
//! - The [`CryptoEngine`] façade tying them to named keys (`engine`)

pub mod aead;
pub mod algorithm;
pub mod engine;
pub mod keys;
pub mod password;
pub mod payload;
pub mod pdkf;
pub mod random;

pub use algorithm::{Algorithm, DeviceCapabilities};
pub use engine::CryptoEngine;
pub use password::Argon2Params;
pub use payload::{EncryptedPayload, CURRENT_VERSION};
