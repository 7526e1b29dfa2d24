//! Key/value JSON persistence standing in for the browser's local storage.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub mod keys {
    pub const ADMIN_DATA: &str = "adminData";
    pub const SAVED_PORTFOLIOS: &str = "savedPortfolios";
    pub const FIRE_PLANS: &str = "firePlans";
    pub const WATCHLIST: &str = "etfWatchlist";
    pub const AFFILIATE_CLICKS: &str = "affiliateClicks";
    pub const AFFILIATE_ANALYTICS: &str = "affiliateAnalytics";
    pub const USER_PREFERENCES: &str = "userPreferences";
    pub const PRE_RESTORE_BACKUP: &str = "etf_admin_pre_restore_backup";
    pub const AUTO_BACKUPS: &str = "etf_admin_auto_backups";
    pub const LAST_AUTO_BACKUP: &str = "lastAutoBackup";

    pub fn rate_limit(action: &str) -> String {
        format!("rateLimit_{}", action)
    }
}

pub struct LocalStore {
    conn: Connection,
}

impl LocalStore {
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| format!("open sqlite {}", path))?;
        let mut store = Self { conn };
        store.init()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let mut store = Self { conn: Connection::open_in_memory()? };
        store.init()?;
        Ok(store)
    }

    fn init(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            COMMIT;",
        )?;
        Ok(())
    }

    pub fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn set_raw(&mut self, key: &str, value: &str) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, chrono::Utc::now().timestamp_millis()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Reads and decodes a key. A value that no longer parses is treated as absent.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_raw(key)? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Ok(Some(value)),
                Err(err) => {
                    crate::logging::log(
                        crate::logging::Level::Warn,
                        crate::logging::Domain::System,
                        "storage_decode_failed",
                        crate::logging::obj(&[
                            ("key", crate::logging::v_str(key)),
                            ("error", crate::logging::v_str(&err.to_string())),
                        ]),
                    );
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub fn get_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        Ok(self.get_json(key)?.unwrap_or_default())
    }

    pub fn set_json<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set_raw(key, &raw)
    }

    pub fn get_value(&self, key: &str) -> Result<Option<Value>> {
        self.get_json(key)
    }

    /// Returns whether the key existed.
    pub fn remove(&mut self, key: &str) -> Result<bool> {
        let n = self.conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(n > 0)
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT key FROM kv ORDER BY key")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn updated_at(&self, key: &str) -> Result<Option<i64>> {
        let ts = self
            .conn
            .query_row("SELECT updated_at FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(ts)
    }
}
