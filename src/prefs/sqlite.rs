//! SQLite-backed preferences at `<data_dir>/prefs.db`.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{params, Connection, OptionalExtension};

use super::Preferences;
use crate::errors::{Result, VaultError};

/// Preferences stored in a single SQLite table.
pub struct SqlitePreferences {
    conn: Mutex<Connection>,
}

impl SqlitePreferences {
    /// Open (or create) the preferences database in `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let db_path = Self::db_path(data_dir);
        let conn = Connection::open(&db_path)
            .map_err(|e| VaultError::Storage(format!("open {}: {e}", db_path.display())))?;

        super::restrict_permissions(&db_path)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS prefs (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
        .map_err(|e| VaultError::Storage(format!("create prefs table: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Path of the preferences database inside `data_dir`.
    pub fn db_path(data_dir: &Path) -> PathBuf {
        data_dir.join("prefs.db")
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Preferences for SqlitePreferences {
    fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.conn()
            .query_row(
                "SELECT value FROM prefs WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| VaultError::Storage(format!("read '{key}': {e}")))
    }

    fn put_string(&self, key: &str, value: &str) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO prefs (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map_err(|e| VaultError::Storage(format!("write '{key}': {e}")))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM prefs WHERE key = ?1", params![key])
            .map_err(|e| VaultError::Storage(format!("delete '{key}': {e}")))?;
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT key FROM prefs WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key")
            .map_err(|e| VaultError::Storage(format!("list '{prefix}*': {e}")))?;
        let rows = stmt
            .query_map(params![prefix], |row| row.get::<_, String>(0))
            .map_err(|e| VaultError::Storage(format!("list '{prefix}*': {e}")))?;
        let keys = rows
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| VaultError::Storage(format!("list '{prefix}*': {e}")))?;
        Ok(keys)
    }
}
