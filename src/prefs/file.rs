use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::Preferences;
use crate::errors::{Result, VaultError};

/// Preferences persisted as one JSON object on disk.
///
/// Every write rewrites the whole file through a temp file + rename, so a
/// crash leaves either the previous or the new contents, never a mix.
#[derive(Debug)]
pub struct JsonFilePreferences {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFilePreferences {
    /// Use the preferences file at `path`. The file is created on first write.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let data = fs::read(&self.path)?;
        serde_json::from_slice(&data).map_err(|e| {
            VaultError::InvalidFormat(format!("{}: {e}", self.path.display()))
        })
    }

    fn store(&self, values: &BTreeMap<String, String>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(values)
            .map_err(|e| VaultError::Serialization(format!("preferences: {e}")))?;

        write_atomic(&self.path, &bytes)
    }

    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut values = self.load()?;
        f(&mut values);
        self.store(&values)
    }
}

impl Preferences for JsonFilePreferences {
    fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn put_string(&self, key: &str, value: &str) -> Result<()> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        self.update(|values| {
            values.remove(key);
        })
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .load()?
            .into_keys()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }
}

/// Write `bytes` to `path` via a sibling temp file and a rename.
///
/// The temp file is in the same directory so the rename stays on one
/// filesystem. Readers see either the old file or the new one.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = temp_path(path);
    fs::write(&tmp_path, bytes)?;
    restrict_permissions(&tmp_path)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Sibling path used by [`write_atomic`] for `path`.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or(Path::new("."));
    parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ))
}

#[cfg(unix)]
pub(crate) fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs.json");

        let prefs = JsonFilePreferences::open(&path).unwrap();
        prefs.put_string("vault.wrapped_dek", "abc").unwrap();
        prefs.put_string("other", "1").unwrap();
        prefs.remove("other").unwrap();
        drop(prefs);

        let reopened = JsonFilePreferences::open(&path).unwrap();
        assert_eq!(
            reopened.get_string("vault.wrapped_dek").unwrap().as_deref(),
            Some("abc")
        );
        assert!(!reopened.contains("other").unwrap());
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let prefs = JsonFilePreferences::open(&dir.path().join("nested/prefs.json")).unwrap();
        assert_eq!(prefs.get_string("anything").unwrap(), None);
        prefs.remove("anything").unwrap();
    }

    #[test]
    fn corrupt_file_is_a_format_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "{not json").unwrap();
        let prefs = JsonFilePreferences::open(&path).unwrap();
        assert!(matches!(
            prefs.get_string("k"),
            Err(VaultError::InvalidFormat(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs.json");
        let prefs = JsonFilePreferences::open(&path).unwrap();
        prefs.put_string("k", "v").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
