//! AES-256-GCM and ChaCha20-Poly1305 authenticated encryption.
//!
//! `seal` / `open` take an explicit IV and are used by the payload codec.
//! `encrypt` / `decrypt` generate a fresh random 12-byte nonce and prepend
//! it to the ciphertext; they back key wrapping and datastore entries.
//!
//! Layout of the buffer returned by `encrypt`:
//!   [ 12-byte nonce | ciphertext + 16-byte auth tag ]

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::Aes256Gcm;
use chacha20poly1305::ChaCha20Poly1305;

use super::algorithm::{Algorithm, IV_LEN};
use super::random;
use crate::errors::{Result, VaultError};

/// Encrypt and authenticate `plaintext` under `key` with the given IV.
///
/// Returns ciphertext with the 16-byte tag appended.
pub fn seal(
    algorithm: Algorithm,
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    check_iv(iv)?;
    let payload = Payload {
        msg: plaintext,
        aad,
    };

    match algorithm {
        Algorithm::AesGcm => {
            let cipher = Aes256Gcm::new_from_slice(key)
                .map_err(|e| VaultError::InvalidInput(format!("invalid key length: {e}")))?;
            cipher
                .encrypt(aes_gcm::Nonce::from_slice(iv), payload)
                .map_err(|e| VaultError::InvalidInput(format!("encryption error: {e}")))
        }
        Algorithm::ChaCha20Poly1305 => {
            let cipher = ChaCha20Poly1305::new_from_slice(key)
                .map_err(|e| VaultError::InvalidInput(format!("invalid key length: {e}")))?;
            cipher
                .encrypt(chacha20poly1305::Nonce::from_slice(iv), payload)
                .map_err(|e| VaultError::InvalidInput(format!("encryption error: {e}")))
        }
        Algorithm::Auto => Err(VaultError::InvalidInput(
            "algorithm must be resolved before sealing".into(),
        )),
    }
}

/// Verify and decrypt `ciphertext` (tag appended).
///
/// Any tag mismatch surfaces as `AuthenticationFailure`; unverified
/// plaintext is never returned.
pub fn open(
    algorithm: Algorithm,
    key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    check_iv(iv)?;
    let payload = Payload {
        msg: ciphertext,
        aad,
    };

    match algorithm {
        Algorithm::AesGcm => {
            let cipher =
                Aes256Gcm::new_from_slice(key).map_err(|_| VaultError::AuthenticationFailure)?;
            cipher
                .decrypt(aes_gcm::Nonce::from_slice(iv), payload)
                .map_err(|_| VaultError::AuthenticationFailure)
        }
        Algorithm::ChaCha20Poly1305 => {
            let cipher = ChaCha20Poly1305::new_from_slice(key)
                .map_err(|_| VaultError::AuthenticationFailure)?;
            cipher
                .decrypt(chacha20poly1305::Nonce::from_slice(iv), payload)
                .map_err(|_| VaultError::AuthenticationFailure)
        }
        Algorithm::Auto => Err(VaultError::InvalidInput(
            "algorithm must be resolved before opening".into(),
        )),
    }
}

/// AES-256-GCM encrypt with a random nonce, returning `nonce || ciphertext`.
pub fn encrypt(key: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let mut nonce = [0u8; IV_LEN];
    random::fill(&mut nonce)?;

    let ciphertext = seal(Algorithm::AesGcm, key, &nonce, plaintext, aad)?;

    // Prepend the nonce so the caller only needs to store one blob.
    let mut output = Vec::with_capacity(IV_LEN + ciphertext.len());
    output.extend_from_slice(&nonce);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

/// Decrypt data that was produced by `encrypt`.
pub fn decrypt(key: &[u8], ciphertext_with_nonce: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if ciphertext_with_nonce.len() < IV_LEN {
        return Err(VaultError::AuthenticationFailure);
    }

    let (nonce, ciphertext) = ciphertext_with_nonce.split_at(IV_LEN);
    open(Algorithm::AesGcm, key, nonce, ciphertext, aad)
}

fn check_iv(iv: &[u8]) -> Result<()> {
    if iv.len() != IV_LEN {
        return Err(VaultError::InvalidInput(format!(
            "IV must be {IV_LEN} bytes, got {}",
            iv.len()
        )));
    }
    Ok(())
}
