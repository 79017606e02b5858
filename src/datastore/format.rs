//! Binary credential store file format and HMAC integrity verification.
//!
//! A store file has this layout:
//!
//! ```text
//! [CVLT: 4 bytes][version: 1 byte][header_len: 4 bytes LE][header JSON][entries JSON][HMAC-SHA256: 32 bytes]
//! ```
//!
//! - **Magic** (`CVLT`): identifies the file as a credvault store.
//! - **Version**: format version (currently `1`).
//! - **Header length**: little-endian u32 telling us where the header
//!   JSON ends and the entries JSON begins.
//! - **Header JSON**: serialized `StoreHeader`.
//! - **Entries JSON**: serialized `Vec<StoredEntry>`.
//! - **HMAC-SHA256**: 32-byte tag over header + entries bytes, keyed by
//!   the DEK-derived integrity key. A wrong DEK fails here, before any
//!   entry is touched.

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::entry::StoredEntry;
use crate::errors::{Result, VaultError};
use crate::prefs;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic bytes at the start of every store file.
const MAGIC: &[u8; 4] = b"CVLT";

/// Current binary format version.
pub const CURRENT_VERSION: u8 = 1;

/// Size of the HMAC tag appended to the file (SHA-256 = 32 bytes).
const HMAC_LEN: usize = 32;

/// Fixed-size prefix: 4 (magic) + 1 (version) + 4 (header_len).
const PREFIX_LEN: usize = 9;

// ---------------------------------------------------------------------------
// StoreHeader
// ---------------------------------------------------------------------------

/// Metadata stored at the beginning of a store file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreHeader {
    pub version: u8,

    pub created_at: DateTime<Utc>,

    /// Bumped every time the store is re-keyed.
    #[serde(default)]
    pub key_generation: u32,

    /// When the store was last re-keyed, if ever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rekeyed_at: Option<DateTime<Utc>>,
}

impl StoreHeader {
    pub fn new() -> Self {
        Self {
            version: CURRENT_VERSION,
            created_at: Utc::now(),
            key_generation: 0,
            rekeyed_at: None,
        }
    }
}

impl Default for StoreHeader {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Write a store file to disk **atomically**.
///
/// 1. Serialize header and entries to JSON.
/// 2. Compute HMAC over header + entries bytes.
/// 3. Write to a temp file in the same directory.
/// 4. Rename temp file over the target path.
pub fn write_store(
    path: &Path,
    header: &StoreHeader,
    entries: &[StoredEntry],
    hmac_key: &[u8],
) -> Result<()> {
    let header_bytes = serde_json::to_vec(header)
        .map_err(|e| VaultError::Serialization(format!("header: {e}")))?;
    let entries_bytes = serde_json::to_vec(entries)
        .map_err(|e| VaultError::Serialization(format!("entries: {e}")))?;

    let hmac_tag = compute_hmac(hmac_key, &header_bytes, &entries_bytes)?;

    let header_len = u32::try_from(header_bytes.len()).map_err(|_| {
        VaultError::Serialization(format!(
            "header length {} exceeds u32::MAX",
            header_bytes.len()
        ))
    })?;
    let total = PREFIX_LEN + header_bytes.len() + entries_bytes.len() + HMAC_LEN;
    let mut buf = Vec::with_capacity(total);

    buf.extend_from_slice(MAGIC);
    buf.push(CURRENT_VERSION);
    buf.extend_from_slice(&header_len.to_le_bytes());
    buf.extend_from_slice(&header_bytes);
    buf.extend_from_slice(&entries_bytes);
    buf.extend_from_slice(&hmac_tag);

    prefs::write_atomic(path, &buf)
}

/// Raw data read from a store file on disk.
///
/// Keeps the original bytes so the HMAC is verified over exactly what was
/// written, with no re-serialization.
pub struct RawStore {
    pub header: StoreHeader,
    pub entries: Vec<StoredEntry>,
    pub header_bytes: Vec<u8>,
    pub entries_bytes: Vec<u8>,
    pub stored_hmac: Vec<u8>,
}

impl RawStore {
    /// Check the trailing HMAC with `hmac_key`.
    pub fn verify(&self, hmac_key: &[u8]) -> Result<()> {
        verify_hmac(
            hmac_key,
            &self.header_bytes,
            &self.entries_bytes,
            &self.stored_hmac,
        )
    }
}

/// Read a store file from disk and return its parts **with raw bytes**.
///
/// Callers must [`RawStore::verify`] before trusting the parsed data.
pub fn read_store(path: &Path) -> Result<RawStore> {
    if !path.exists() {
        return Err(VaultError::DatastoreNotFound(path.to_path_buf()));
    }

    let data = fs::read(path)?;

    let min_size = PREFIX_LEN + HMAC_LEN;
    if data.len() < min_size {
        return Err(VaultError::InvalidFormat(
            "file too small to be a valid credential store".into(),
        ));
    }

    // --- Parse the fixed-size prefix ---

    if &data[0..4] != MAGIC {
        return Err(VaultError::InvalidFormat("missing CVLT magic bytes".into()));
    }

    let version = data[4];
    if version > CURRENT_VERSION {
        return Err(VaultError::UnsupportedVersion {
            found: version,
            supported: CURRENT_VERSION,
        });
    }
    if version == 0 {
        return Err(VaultError::InvalidFormat("store version 0 is invalid".into()));
    }

    let header_len_u32 = u32::from_le_bytes(
        data[5..9]
            .try_into()
            .map_err(|_| VaultError::InvalidFormat("bad header length".into()))?,
    );
    let header_len = usize::try_from(header_len_u32).map_err(|_| {
        VaultError::InvalidFormat(format!(
            "header length {header_len_u32} exceeds platform address space"
        ))
    })?;

    let header_end = PREFIX_LEN
        .checked_add(header_len)
        .ok_or_else(|| VaultError::InvalidFormat("header length overflow".into()))?;
    if header_end + HMAC_LEN > data.len() {
        return Err(VaultError::InvalidFormat(
            "header length exceeds file size".into(),
        ));
    }

    // --- Extract the three variable-length sections as raw bytes ---

    let header_bytes = data[PREFIX_LEN..header_end].to_vec();
    let entries_end = data.len() - HMAC_LEN;
    let entries_bytes = data[header_end..entries_end].to_vec();
    let stored_hmac = data[entries_end..].to_vec();

    let header: StoreHeader = serde_json::from_slice(&header_bytes)
        .map_err(|e| VaultError::InvalidFormat(format!("header JSON: {e}")))?;

    let entries: Vec<StoredEntry> = serde_json::from_slice(&entries_bytes)
        .map_err(|e| VaultError::InvalidFormat(format!("entries JSON: {e}")))?;

    Ok(RawStore {
        header,
        entries,
        header_bytes,
        entries_bytes,
        stored_hmac,
    })
}

/// Compute HMAC-SHA256 over header + entries bytes.
pub fn compute_hmac(hmac_key: &[u8], header_bytes: &[u8], entries_bytes: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(hmac_key)
        .map_err(|e| VaultError::InvalidInput(format!("invalid HMAC key: {e}")))?;

    mac.update(header_bytes);
    mac.update(entries_bytes);

    Ok(mac.finalize().into_bytes().to_vec())
}

/// Verify the HMAC in constant time (`hmac::Mac::verify_slice`).
pub fn verify_hmac(
    hmac_key: &[u8],
    header_bytes: &[u8],
    entries_bytes: &[u8],
    expected_hmac: &[u8],
) -> Result<()> {
    let mut mac = Hmac::<Sha256>::new_from_slice(hmac_key)
        .map_err(|e| VaultError::InvalidInput(format!("invalid HMAC key: {e}")))?;

    mac.update(header_bytes);
    mac.update(entries_bytes);

    mac.verify_slice(expected_hmac)
        .map_err(|_| VaultError::AuthenticationFailure)
}

// ---------------------------------------------------------------------------
// Serde helpers for base64-encoded Vec<u8> fields
// ---------------------------------------------------------------------------

pub(crate) fn base64_encode<S>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&BASE64.encode(data))
}

pub(crate) fn base64_decode<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    BASE64.decode(&s).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const KEY: [u8; 32] = [3; 32];

    #[test]
    fn write_then_read_verifies() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.cvlt");
        write_store(&path, &StoreHeader::new(), &[], &KEY).unwrap();

        let raw = read_store(&path).unwrap();
        raw.verify(&KEY).unwrap();
        assert!(raw.entries.is_empty());
        assert_eq!(raw.header.version, CURRENT_VERSION);
    }

    #[test]
    fn wrong_key_is_authentication_failure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.cvlt");
        write_store(&path, &StoreHeader::new(), &[], &KEY).unwrap();

        let raw = read_store(&path).unwrap();
        assert!(matches!(
            raw.verify(&[4; 32]),
            Err(VaultError::AuthenticationFailure)
        ));
    }

    #[test]
    fn tampered_header_fails_hmac() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.cvlt");
        write_store(&path, &StoreHeader::new(), &[], &KEY).unwrap();

        let mut data = fs::read(&path).unwrap();
        // Flip a digit inside the header JSON.
        let idx = data[PREFIX_LEN..]
            .iter()
            .position(|b| b.is_ascii_digit())
            .unwrap()
            + PREFIX_LEN;
        data[idx] = if data[idx] == b'9' { b'8' } else { data[idx] + 1 };
        fs::write(&path, &data).unwrap();

        let raw = read_store(&path).unwrap();
        assert!(raw.verify(&KEY).is_err());
    }

    #[test]
    fn missing_file_and_bad_magic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.cvlt");
        assert!(matches!(
            read_store(&path),
            Err(VaultError::DatastoreNotFound(_))
        ));

        fs::write(&path, vec![0u8; 64]).unwrap();
        assert!(matches!(read_store(&path), Err(VaultError::InvalidFormat(_))));
    }

    #[test]
    fn newer_version_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.cvlt");
        write_store(&path, &StoreHeader::new(), &[], &KEY).unwrap();

        let mut data = fs::read(&path).unwrap();
        data[4] = CURRENT_VERSION + 1;
        fs::write(&path, &data).unwrap();

        assert!(matches!(
            read_store(&path),
            Err(VaultError::UnsupportedVersion { .. })
        ));
    }
}
