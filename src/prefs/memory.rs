use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::Preferences;
use crate::errors::{Result, VaultError};

/// In-process preferences. Clones of an `Arc<MemoryPreferences>` act as the
/// same storage across simulated process restarts.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: Mutex<HashMap<String, String>>,
    failing_keys: Mutex<HashSet<String>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write or removal of `key` fail with a storage
    /// error, as if the process died before the write reached disk.
    pub fn fail_writes_to(&self, key: &str) {
        lock(&self.failing_keys).insert(key.to_string());
    }

    pub fn clear_failures(&self) {
        lock(&self.failing_keys).clear();
    }

    fn check_writable(&self, key: &str) -> Result<()> {
        if lock(&self.failing_keys).contains(key) {
            return Err(VaultError::Storage(format!(
                "injected write failure for '{key}'"
            )));
        }
        Ok(())
    }
}

impl Preferences for MemoryPreferences {
    fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.values).get(key).cloned())
    }

    fn put_string(&self, key: &str, value: &str) -> Result<()> {
        self.check_writable(key)?;
        lock(&self.values).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.check_writable(key)?;
        lock(&self.values).remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut found: Vec<String> = lock(&self.values)
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        found.sort();
        Ok(found)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_remove() {
        let prefs = MemoryPreferences::new();
        assert!(!prefs.contains("a").unwrap());
        prefs.put_string("a", "1").unwrap();
        assert_eq!(prefs.get_string("a").unwrap().as_deref(), Some("1"));
        prefs.remove("a").unwrap();
        prefs.remove("a").unwrap();
        assert!(!prefs.contains("a").unwrap());
    }

    #[test]
    fn lists_keys_by_prefix() {
        let prefs = MemoryPreferences::new();
        prefs.put_string("engine.key.b", "1").unwrap();
        prefs.put_string("engine.key.a", "2").unwrap();
        prefs.put_string("vault.wrapped_dek", "3").unwrap();

        assert_eq!(
            prefs.keys_with_prefix("engine.key.").unwrap(),
            vec!["engine.key.a", "engine.key.b"]
        );
        assert!(prefs.keys_with_prefix("legacy.").unwrap().is_empty());
    }

    #[test]
    fn injected_failure_blocks_only_that_key() {
        let prefs = MemoryPreferences::new();
        prefs.put_string("a", "old").unwrap();
        prefs.fail_writes_to("a");

        assert!(prefs.put_string("a", "new").is_err());
        assert!(prefs.remove("a").is_err());
        assert_eq!(prefs.get_string("a").unwrap().as_deref(), Some("old"));
        prefs.put_string("b", "ok").unwrap();

        prefs.clear_failures();
        prefs.put_string("a", "new").unwrap();
        assert_eq!(prefs.get_string("a").unwrap().as_deref(), Some("new"));
    }
}
