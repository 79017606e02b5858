//! The crypto engine: payload encryption under named keys, password
//! hashing, legacy key derivation and randomness behind one façade.
//!
//! Each key alias resolves to a random 256-bit key that is persisted only in
//! wrapped form: the key store wraps it under the same alias and the blob is
//! kept in preferences as `engine.key.<alias>`. Unwrapped keys are cached in
//! memory for the life of the engine.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, PoisonError};

use tracing::debug;
use zeroize::Zeroizing;

use super::algorithm::{Algorithm, DeviceCapabilities};
use super::password::{self, Argon2Params};
use super::payload::{EncryptedPayload, CURRENT_VERSION};
use super::{aead, pdkf, random};
use crate::errors::{Result, VaultError};
use crate::keystore::KeyStore;
use crate::prefs::{self, keys, Preferences};
use crate::secret::{DataKey, SecretBuffer, DATA_KEY_LEN};

type AliasKey = Zeroizing<[u8; DATA_KEY_LEN]>;

/// Symmetric encryption, hashing and derivation for the vault.
pub struct CryptoEngine {
    key_store: Arc<dyn KeyStore>,
    prefs: Arc<dyn Preferences>,
    capabilities: DeviceCapabilities,
    argon2: Argon2Params,
    pdkf_iterations: u32,
    alias_keys: RwLock<HashMap<String, AliasKey>>,
}

impl CryptoEngine {
    /// Engine with detected capabilities and default cost parameters.
    pub fn new(key_store: Arc<dyn KeyStore>, prefs: Arc<dyn Preferences>) -> Self {
        Self {
            key_store,
            prefs,
            capabilities: DeviceCapabilities::detect(),
            argon2: Argon2Params::default(),
            pdkf_iterations: pdkf::MIN_ITERATIONS,
            alias_keys: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_argon2_params(mut self, params: Argon2Params) -> Self {
        self.argon2 = params;
        self
    }

    pub fn with_pdkf_iterations(mut self, iterations: u32) -> Self {
        self.pdkf_iterations = iterations;
        self
    }

    pub fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    pub fn key_store(&self) -> &Arc<dyn KeyStore> {
        &self.key_store
    }

    pub fn preferences(&self) -> &Arc<dyn Preferences> {
        &self.prefs
    }

    // -----------------------------------------------------------------------
    // Payload encryption
    // -----------------------------------------------------------------------

    /// Encrypt `plaintext` under the key named `key_alias`.
    ///
    /// `Algorithm::Auto` is resolved through [`select_algorithm`] and the
    /// concrete choice is recorded in the payload. A fresh IV is drawn for
    /// every call.
    ///
    /// [`select_algorithm`]: CryptoEngine::select_algorithm
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        algorithm: Algorithm,
        key_alias: &str,
    ) -> Result<EncryptedPayload> {
        if plaintext.is_empty() {
            return Err(VaultError::InvalidInput("plaintext is empty".into()));
        }
        if key_alias.is_empty() {
            return Err(VaultError::MissingKey("no key alias supplied".into()));
        }

        let algorithm = self.resolve(algorithm);
        let key = self.alias_key(key_alias, true)?;
        let iv = self.generate_iv(algorithm)?;
        let ciphertext = aead::seal(
            algorithm,
            &key[..],
            &iv,
            plaintext,
            &header_aad(CURRENT_VERSION, algorithm),
        )?;

        debug!(alias = key_alias, %algorithm, len = plaintext.len(), "payload encrypted");

        Ok(EncryptedPayload {
            version: CURRENT_VERSION,
            algorithm,
            iv,
            ciphertext,
        })
    }

    /// Verify and decrypt `payload`.
    ///
    /// The version is checked first, then the key alias, then the tag. A
    /// tag mismatch is always `AuthenticationFailure`.
    pub fn decrypt(&self, payload: &EncryptedPayload, key_alias: Option<&str>) -> Result<Vec<u8>> {
        if payload.version > CURRENT_VERSION {
            return Err(VaultError::UnsupportedVersion {
                found: payload.version,
                supported: CURRENT_VERSION,
            });
        }

        let alias = match key_alias {
            Some(alias) if !alias.is_empty() => alias,
            _ if payload.algorithm.requires_key() => {
                return Err(VaultError::MissingKey(format!(
                    "{} payload needs a key alias",
                    payload.algorithm
                )))
            }
            _ => {
                return Err(VaultError::InvalidFormat(
                    "payload does not name a concrete algorithm".into(),
                ))
            }
        };

        let key = self.alias_key(alias, false)?;
        let plaintext = aead::open(
            payload.algorithm,
            &key[..],
            &payload.iv,
            &payload.ciphertext,
            &header_aad(payload.version, payload.algorithm),
        )?;

        debug!(alias, algorithm = %payload.algorithm, "payload decrypted");
        Ok(plaintext)
    }

    /// Parse a serialized payload and decrypt it.
    pub fn decrypt_bytes(&self, data: &[u8], key_alias: Option<&str>) -> Result<Vec<u8>> {
        let payload = EncryptedPayload::from_bytes(data)?;
        self.decrypt(&payload, key_alias)
    }

    /// Algorithm used for new payloads when the caller asks for `Auto`.
    pub fn select_algorithm(&self) -> Algorithm {
        self.capabilities.select()
    }

    /// Destroy the key named `key_alias`. Payloads sealed under it become
    /// unrecoverable.
    pub fn forget_key(&self, key_alias: &str) -> Result<()> {
        self.write_cache().remove(key_alias);
        // KEK first: once it is gone the stored blob is useless on its own.
        self.key_store.delete_key(&store_alias(key_alias))?;
        self.prefs.remove(&keys::engine_key(key_alias))?;
        debug!(alias = key_alias, "payload key forgotten");
        Ok(())
    }

    /// Destroy every payload key this engine's storage knows about,
    /// returning how many aliases were forgotten.
    pub fn forget_all_keys(&self) -> Result<usize> {
        let mut aliases: Vec<String> = self
            .prefs
            .keys_with_prefix(keys::ENGINE_KEY_PREFIX)?
            .into_iter()
            .filter_map(|k| k.strip_prefix(keys::ENGINE_KEY_PREFIX).map(str::to_string))
            .collect();
        aliases.extend(self.read_cache().keys().cloned());
        aliases.sort();
        aliases.dedup();

        for alias in &aliases {
            self.forget_key(alias)?;
        }
        self.write_cache().clear();
        Ok(aliases.len())
    }

    // -----------------------------------------------------------------------
    // Passwords and derivation
    // -----------------------------------------------------------------------

    /// Argon2id PHC hash of `password` with a fresh salt.
    pub fn hash_password(&self, password: &SecretBuffer) -> Result<String> {
        password::hash_password(password, &self.argon2)
    }

    pub fn verify_password(&self, password: &SecretBuffer, hash: &str) -> Result<bool> {
        password::verify_password(password, hash)
    }

    /// Legacy password-derived key for this installation.
    pub fn derive_key(&self, password: &SecretBuffer) -> Result<DataKey> {
        pdkf::derive_key(self.prefs.as_ref(), password, self.pdkf_iterations)
    }

    // -----------------------------------------------------------------------
    // Randomness
    // -----------------------------------------------------------------------

    pub fn generate_random_bytes(&self, n: usize) -> Result<Vec<u8>> {
        random::bytes(n)
    }

    /// A fresh IV sized for `algorithm`.
    pub fn generate_iv(&self, algorithm: Algorithm) -> Result<Vec<u8>> {
        random::bytes(self.resolve(algorithm).iv_len())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn resolve(&self, algorithm: Algorithm) -> Algorithm {
        match algorithm {
            Algorithm::Auto => self.select_algorithm(),
            concrete => concrete,
        }
    }

    /// Look up (and with `create`, lazily create) the key for `alias`.
    fn alias_key(&self, alias: &str, create: bool) -> Result<AliasKey> {
        if let Some(key) = self.read_cache().get(alias) {
            return Ok(key.clone());
        }

        let mut cache = self.write_cache();
        if let Some(key) = cache.get(alias) {
            return Ok(key.clone());
        }

        let pref_key = keys::engine_key(alias);
        let key = match prefs::get_bytes(self.prefs.as_ref(), &pref_key)? {
            Some(wrapped) => {
                let unwrapped = self
                    .key_store
                    .unwrap(&store_alias(alias), &wrapped)
                    .map_err(|e| match e {
                        VaultError::KeyNotFound(_) => VaultError::MissingKey(alias.to_string()),
                        other => other,
                    })?;
                let bytes: [u8; DATA_KEY_LEN] =
                    unwrapped.expose().try_into().map_err(|_| {
                        VaultError::InvalidFormat(format!("stored key '{alias}' has wrong length"))
                    })?;
                Zeroizing::new(bytes)
            }
            None if create => {
                let mut fresh = Zeroizing::new([0u8; DATA_KEY_LEN]);
                random::fill(&mut fresh[..])?;
                let wrapped = self.key_store.wrap(&store_alias(alias), &fresh[..])?;
                prefs::put_bytes(self.prefs.as_ref(), &pref_key, &wrapped)?;
                debug!(alias, "payload key created");
                fresh
            }
            None => return Err(VaultError::MissingKey(alias.to_string())),
        };

        cache.insert(alias.to_string(), key.clone());
        Ok(key)
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, HashMap<String, AliasKey>> {
        self.alias_keys.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, HashMap<String, AliasKey>> {
        self.alias_keys.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CryptoEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoEngine")
            .field("capabilities", &self.capabilities)
            .field("argon2", &self.argon2)
            .field("pdkf_iterations", &self.pdkf_iterations)
            .field("cached_keys", &"[REDACTED]")
            .finish()
    }
}

/// Key store alias for a payload key; kept apart from the vault's DEK alias.
fn store_alias(alias: &str) -> String {
    format!("engine.{alias}")
}

/// Header bytes bound into the tag so version or algorithm cannot be swapped.
fn header_aad(version: u8, algorithm: Algorithm) -> [u8; 2] {
    [version, algorithm.id()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::MemoryKeyStore;
    use crate::prefs::MemoryPreferences;

    fn engine() -> CryptoEngine {
        CryptoEngine::new(
            Arc::new(MemoryKeyStore::new()),
            Arc::new(MemoryPreferences::new()),
        )
        .with_argon2_params(Argon2Params {
            memory_kib: 8_192,
            iterations: 1,
            parallelism: 1,
        })
    }

    #[test]
    fn roundtrip_for_each_algorithm() {
        let engine = engine();
        for alg in [Algorithm::AesGcm, Algorithm::ChaCha20Poly1305] {
            let payload = engine.encrypt(b"hello", alg, "k1").unwrap();
            assert_eq!(payload.algorithm, alg);
            assert_eq!(engine.decrypt(&payload, Some("k1")).unwrap(), b"hello");
        }
    }

    #[test]
    fn auto_records_concrete_choice() {
        let engine = engine().with_capabilities(DeviceCapabilities {
            hardware_aes: false,
            stream_cipher_supported: true,
        });
        let payload = engine.encrypt(b"x", Algorithm::Auto, "k").unwrap();
        assert_eq!(payload.algorithm, Algorithm::ChaCha20Poly1305);
    }

    #[test]
    fn empty_plaintext_rejected() {
        let result = engine().encrypt(b"", Algorithm::AesGcm, "k");
        assert!(matches!(result, Err(VaultError::InvalidInput(_))));
    }

    #[test]
    fn missing_alias_rejected() {
        let engine = engine();
        assert!(matches!(
            engine.encrypt(b"x", Algorithm::AesGcm, ""),
            Err(VaultError::MissingKey(_))
        ));

        let payload = engine.encrypt(b"x", Algorithm::AesGcm, "k").unwrap();
        assert!(matches!(
            engine.decrypt(&payload, None),
            Err(VaultError::MissingKey(_))
        ));
        assert!(matches!(
            engine.decrypt(&payload, Some("never-created")),
            Err(VaultError::MissingKey(_))
        ));
    }

    #[test]
    fn newer_version_rejected_before_key_lookup() {
        let engine = engine();
        let mut payload = engine.encrypt(b"x", Algorithm::AesGcm, "k").unwrap();
        payload.version = CURRENT_VERSION + 1;
        assert!(matches!(
            engine.decrypt(&payload, None),
            Err(VaultError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn swapped_algorithm_fails_authentication() {
        let engine = engine();
        let mut payload = engine.encrypt(b"x", Algorithm::AesGcm, "k").unwrap();
        payload.algorithm = Algorithm::ChaCha20Poly1305;
        assert!(matches!(
            engine.decrypt(&payload, Some("k")),
            Err(VaultError::AuthenticationFailure)
        ));
    }

    #[test]
    fn wrong_alias_fails_authentication() {
        let engine = engine();
        engine.encrypt(b"other", Algorithm::AesGcm, "k2").unwrap();
        let payload = engine.encrypt(b"x", Algorithm::AesGcm, "k1").unwrap();
        assert!(matches!(
            engine.decrypt(&payload, Some("k2")),
            Err(VaultError::AuthenticationFailure)
        ));
    }

    #[test]
    fn keys_persist_across_engine_instances() {
        let store: Arc<dyn KeyStore> = Arc::new(MemoryKeyStore::new());
        let prefs: Arc<dyn Preferences> = Arc::new(MemoryPreferences::new());

        let payload = CryptoEngine::new(store.clone(), prefs.clone())
            .encrypt(b"persisted", Algorithm::AesGcm, "backup")
            .unwrap();
        assert!(prefs.contains("engine.key.backup").unwrap());

        let fresh = CryptoEngine::new(store, prefs);
        assert_eq!(fresh.decrypt(&payload, Some("backup")).unwrap(), b"persisted");
    }

    #[test]
    fn forget_key_makes_payload_unreadable() {
        let engine = engine();
        let payload = engine.encrypt(b"x", Algorithm::AesGcm, "gone").unwrap();
        engine.forget_key("gone").unwrap();
        assert!(matches!(
            engine.decrypt(&payload, Some("gone")),
            Err(VaultError::MissingKey(_))
        ));
    }

    #[test]
    fn forget_all_keys_clears_storage_and_cache() {
        let store = Arc::new(MemoryKeyStore::new());
        let prefs = Arc::new(MemoryPreferences::new());
        let engine = CryptoEngine::new(store.clone(), prefs.clone());

        let a = engine.encrypt(b"a", Algorithm::AesGcm, "backup").unwrap();
        let b = engine.encrypt(b"b", Algorithm::ChaCha20Poly1305, "export").unwrap();
        prefs.put_string("vault.password_hash", "kept").unwrap();

        assert_eq!(engine.forget_all_keys().unwrap(), 2);
        assert!(prefs.keys_with_prefix(keys::ENGINE_KEY_PREFIX).unwrap().is_empty());
        assert!(!store.contains_key("engine.backup").unwrap());
        assert!(prefs.contains("vault.password_hash").unwrap());
        assert!(matches!(
            engine.decrypt(&a, Some("backup")),
            Err(VaultError::MissingKey(_))
        ));
        assert!(matches!(
            engine.decrypt(&b, Some("export")),
            Err(VaultError::MissingKey(_))
        ));

        assert_eq!(engine.forget_all_keys().unwrap(), 0);
    }

    #[test]
    fn iv_and_random_sizes() {
        let engine = engine();
        assert_eq!(engine.generate_iv(Algorithm::AesGcm).unwrap().len(), 12);
        assert_eq!(engine.generate_iv(Algorithm::Auto).unwrap().len(), 12);
        assert_eq!(engine.generate_random_bytes(64).unwrap().len(), 64);
        assert!(matches!(
            engine.generate_random_bytes(0),
            Err(VaultError::InvalidSize(0))
        ));
    }

    #[test]
    fn password_hash_roundtrip() {
        let engine = engine();
        let hash = engine.hash_password(&SecretBuffer::from("pw")).unwrap();
        assert!(engine.verify_password(&SecretBuffer::from("pw"), &hash).unwrap());
        assert!(!engine.verify_password(&SecretBuffer::from("nope"), &hash).unwrap());
    }
}
