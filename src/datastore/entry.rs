//! Credential entry types stored inside the datastore.
//!
//! Each entry holds its name, kind, the sealed value and timestamps. The
//! `encrypted_value` field serializes as a base64 string in JSON rather
//! than a raw byte array.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::format::{base64_decode, base64_encode};
use crate::errors::VaultError;

/// What an entry holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryKind {
    #[default]
    Password,
    OtpSeed,
    Note,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntryKind::Password => "password",
            EntryKind::OtpSeed => "otp-seed",
            EntryKind::Note => "note",
        })
    }
}

impl FromStr for EntryKind {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password" => Ok(EntryKind::Password),
            "otp-seed" | "otp" => Ok(EntryKind::OtpSeed),
            "note" => Ok(EntryKind::Note),
            other => Err(VaultError::InvalidInput(format!(
                "unknown entry kind '{other}', expected password, otp-seed or note"
            ))),
        }
    }
}

/// A single sealed entry as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    pub name: String,

    pub kind: EntryKind,

    /// `nonce || ciphertext + tag` under the entry's derived key.
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub encrypted_value: Vec<u8>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Entry description without any ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata {
    pub name: String,
    pub kind: EntryKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&StoredEntry> for EntryMetadata {
    fn from(entry: &StoredEntry) -> Self {
        Self {
            name: entry.name.clone(),
            kind: entry.kind,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_and_displays() {
        for kind in [EntryKind::Password, EntryKind::OtpSeed, EntryKind::Note] {
            assert_eq!(kind.to_string().parse::<EntryKind>().unwrap(), kind);
        }
        assert_eq!("otp".parse::<EntryKind>().unwrap(), EntryKind::OtpSeed);
        assert!("pin".parse::<EntryKind>().is_err());
    }

    #[test]
    fn entry_serializes_value_as_base64() {
        let now = Utc::now();
        let entry = StoredEntry {
            name: "github".into(),
            kind: EntryKind::OtpSeed,
            encrypted_value: vec![0xde, 0xad],
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"encrypted_value\":\"3q0=\""));
        assert!(json.contains("\"kind\":\"otp-seed\""));
    }
}
