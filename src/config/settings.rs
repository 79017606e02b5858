use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::crypto::pdkf::MIN_ITERATIONS;
use crate::crypto::{Algorithm, Argon2Params, CryptoEngine};
use crate::datastore::CredentialStore;
use crate::errors::{Result, VaultError};
use crate::keystore::{FileKeyStore, KeyStore};
use crate::prefs::{JsonFilePreferences, Preferences};
use crate::vault::VaultKeyManager;

/// Where key-encryption keys live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyStoreBackend {
    /// The OS credential store (Keychain, Credential Manager, Secret Service).
    #[default]
    Os,
    /// A 0600 file in the data directory. Needs explicit consent.
    File,
}

/// Where preferences (wrapped key, password hash, ...) are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreferencesBackend {
    #[default]
    Sqlite,
    Json,
}

/// Project-level configuration, loaded from `.credvault.toml`.
///
/// Every field has a sensible default so credvault works out-of-the-box
/// without any config file at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory (relative to project root) holding the store and preferences.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Key store alias of the KEK that wraps the DEK.
    #[serde(default = "default_key_alias")]
    pub key_alias: String,

    /// Argon2 memory cost in KiB (default: 64 MiB).
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,

    /// Argon2 iteration count (default: 3).
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,

    /// Argon2 parallelism degree (default: 4).
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,

    /// PBKDF2 rounds for the legacy derivation path.
    #[serde(default = "default_pdkf_iterations")]
    pub pdkf_iterations: u32,

    /// Algorithm for new payloads; `auto` picks by device capability.
    #[serde(default = "default_algorithm")]
    pub algorithm: Algorithm,

    #[serde(default)]
    pub key_store: KeyStoreBackend,

    /// Consent to keep KEKs in a software file store.
    #[serde(default)]
    pub allow_software_key_store: bool,

    #[serde(default)]
    pub preferences: PreferencesBackend,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_data_dir() -> String {
    ".credvault".to_string()
}

fn default_key_alias() -> String {
    "credvault.dek".to_string()
}

fn default_argon2_memory_kib() -> u32 {
    65_536 // 64 MiB
}

fn default_argon2_iterations() -> u32 {
    3
}

fn default_argon2_parallelism() -> u32 {
    4
}

fn default_pdkf_iterations() -> u32 {
    MIN_ITERATIONS
}

fn default_algorithm() -> Algorithm {
    Algorithm::Auto
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            key_alias: default_key_alias(),
            argon2_memory_kib: default_argon2_memory_kib(),
            argon2_iterations: default_argon2_iterations(),
            argon2_parallelism: default_argon2_parallelism(),
            pdkf_iterations: default_pdkf_iterations(),
            algorithm: default_algorithm(),
            key_store: KeyStoreBackend::default(),
            allow_software_key_store: false,
            preferences: PreferencesBackend::default(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the project root.
    pub const FILE_NAME: &'static str = ".credvault.toml";

    /// Load settings from `<project_dir>/.credvault.toml`.
    ///
    /// If the file does not exist, defaults are returned. If it exists but
    /// cannot be parsed or holds unsafe values, an error is returned.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            VaultError::Config(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Enforce the cost floors.
    pub fn validate(&self) -> Result<()> {
        self.argon2_params().validate()?;
        if self.pdkf_iterations < MIN_ITERATIONS {
            return Err(VaultError::Config(format!(
                "pdkf_iterations must be at least {MIN_ITERATIONS} (got {})",
                self.pdkf_iterations
            )));
        }
        if self.key_alias.is_empty() {
            return Err(VaultError::Config("key_alias cannot be empty".into()));
        }
        Ok(())
    }

    /// Full path of the data directory.
    ///
    /// Example: `project_dir/.credvault`
    pub fn data_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.data_dir)
    }

    /// Convert the Argon2 settings into crypto-layer params.
    pub fn argon2_params(&self) -> Argon2Params {
        Argon2Params {
            memory_kib: self.argon2_memory_kib,
            iterations: self.argon2_iterations,
            parallelism: self.argon2_parallelism,
        }
    }

    // ── Component construction ───────────────────────────────────────

    /// The configured key store. Never falls back from one backend to
    /// another.
    pub fn build_key_store(&self, data_dir: &Path) -> Result<Arc<dyn KeyStore>> {
        match self.key_store {
            KeyStoreBackend::File => Ok(Arc::new(FileKeyStore::open(
                data_dir,
                self.allow_software_key_store,
            )?)),
            #[cfg(feature = "keyring-store")]
            KeyStoreBackend::Os => Ok(Arc::new(crate::keystore::OsKeyStore::default())),
            #[cfg(not(feature = "keyring-store"))]
            KeyStoreBackend::Os => Err(VaultError::KeyStoreUnavailable(
                "built without OS key store support (feature `keyring-store`)".into(),
            )),
        }
    }

    pub fn build_preferences(&self, data_dir: &Path) -> Result<Arc<dyn Preferences>> {
        std::fs::create_dir_all(data_dir)?;
        match self.preferences {
            #[cfg(feature = "sqlite-prefs")]
            PreferencesBackend::Sqlite => {
                Ok(Arc::new(crate::prefs::SqlitePreferences::open(data_dir)?))
            }
            #[cfg(not(feature = "sqlite-prefs"))]
            PreferencesBackend::Sqlite => Ok(Arc::new(JsonFilePreferences::open(
                &data_dir.join("prefs.json"),
            )?)),
            PreferencesBackend::Json => Ok(Arc::new(JsonFilePreferences::open(
                &data_dir.join("prefs.json"),
            )?)),
        }
    }

    pub fn build_engine(&self, data_dir: &Path) -> Result<CryptoEngine> {
        self.validate()?;
        let key_store = self.build_key_store(data_dir)?;
        let prefs = self.build_preferences(data_dir)?;
        Ok(CryptoEngine::new(key_store, prefs)
            .with_argon2_params(self.argon2_params())
            .with_pdkf_iterations(self.pdkf_iterations))
    }

    /// Wire up the whole vault for `project_dir`.
    pub fn build_manager(&self, project_dir: &Path) -> Result<VaultKeyManager<CredentialStore>> {
        let data_dir = self.data_path(project_dir);
        let engine = Arc::new(self.build_engine(&data_dir)?);
        Ok(VaultKeyManager::with_alias(
            engine,
            CredentialStore::in_dir(&data_dir),
            &self.key_alias,
        ))
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn default_settings_are_sensible() {
        let s = Settings::default();
        assert_eq!(s.data_dir, ".credvault");
        assert_eq!(s.key_alias, "credvault.dek");
        assert_eq!(s.argon2_memory_kib, 65_536);
        assert_eq!(s.argon2_iterations, 3);
        assert_eq!(s.argon2_parallelism, 4);
        assert_eq!(s.pdkf_iterations, 100_000);
        assert_eq!(s.algorithm, Algorithm::Auto);
        assert_eq!(s.key_store, KeyStoreBackend::Os);
        assert!(!s.allow_software_key_store);
    }

    #[test]
    fn load_returns_defaults_when_no_config_file() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.data_dir, ".credvault");
    }

    #[test]
    fn load_parses_toml_file() {
        let tmp = TempDir::new().unwrap();
        let config = r#"
data_dir = "secrets"
key_alias = "team.dek"
argon2_memory_kib = 131072
argon2_iterations = 5
argon2_parallelism = 8
pdkf_iterations = 250000
algorithm = "chacha20-poly1305"
key_store = "file"
allow_software_key_store = true
preferences = "json"
"#;
        fs::write(tmp.path().join(".credvault.toml"), config).unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.data_dir, "secrets");
        assert_eq!(settings.key_alias, "team.dek");
        assert_eq!(settings.argon2_memory_kib, 131_072);
        assert_eq!(settings.pdkf_iterations, 250_000);
        assert_eq!(settings.algorithm, Algorithm::ChaCha20Poly1305);
        assert_eq!(settings.key_store, KeyStoreBackend::File);
        assert!(settings.allow_software_key_store);
        assert_eq!(settings.preferences, PreferencesBackend::Json);
    }

    #[test]
    fn load_uses_defaults_for_missing_fields() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".credvault.toml"), "data_dir = \"x\"\n").unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.data_dir, "x");
        assert_eq!(settings.argon2_iterations, 3);
        assert_eq!(settings.key_store, KeyStoreBackend::Os);
    }

    #[test]
    fn load_errors_on_invalid_toml() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".credvault.toml"), "not valid {{toml").unwrap();
        assert!(Settings::load(tmp.path()).is_err());
    }

    #[test]
    fn load_rejects_weak_costs() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".credvault.toml"), "pdkf_iterations = 1000\n").unwrap();
        assert!(matches!(
            Settings::load(tmp.path()),
            Err(VaultError::Config(_))
        ));

        fs::write(tmp.path().join(".credvault.toml"), "argon2_memory_kib = 64\n").unwrap();
        assert!(matches!(
            Settings::load(tmp.path()),
            Err(VaultError::Config(_))
        ));
    }

    #[test]
    fn file_key_store_requires_consent() {
        let tmp = TempDir::new().unwrap();
        let s = Settings {
            key_store: KeyStoreBackend::File,
            ..Settings::default()
        };
        assert!(matches!(
            s.build_key_store(tmp.path()),
            Err(VaultError::KeyStoreUnavailable(_))
        ));

        let consented = Settings {
            allow_software_key_store: true,
            ..s
        };
        assert!(consented.build_key_store(tmp.path()).is_ok());
    }

    #[test]
    fn data_path_respects_custom_dir() {
        let s = Settings {
            data_dir: "secrets".to_string(),
            ..Settings::default()
        };
        assert_eq!(
            s.data_path(Path::new("/home/user/project")),
            PathBuf::from("/home/user/project/secrets")
        );
    }
}
