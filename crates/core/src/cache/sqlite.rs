//! SQLite-backed shared cache layer.
//!
//! Opens the database with WAL mode so several processes on one host can
//! share warmed entries, runs migrations, and implements [`RemoteLayer`]
//! on a single `cache_entries` table.

use super::migrations;
use super::remote::RemoteLayer;
use crate::Error;
use crate::clock::{Clock, SystemClock};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio_rusqlite::{Connection, params, rusqlite};

/// Shared cache layer handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread. Row expiry is computed from the same clock as
/// the cache store that owns this layer.
#[derive(Clone, Debug)]
pub struct SqliteLayer {
    pub(crate) conn: Connection,
    clock: Arc<dyn Clock>,
}

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
                       PRAGMA synchronous=NORMAL;
                       PRAGMA temp_store=MEMORY;
                       PRAGMA busy_timeout=2000;";

impl SqliteLayer {
    /// Open a database at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies pragmas,
    /// and runs any pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    /// Open an in-memory database for testing.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(Error::Database)?;

        migrations::run(&conn).await?;

        Ok(Self { conn, clock: Arc::new(SystemClock) })
    }

    /// Use `clock` instead of wall time for row expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn now_ts(&self) -> i64 {
        self.clock.now().timestamp()
    }

    fn expiry_from_now(&self, ttl_seconds: u64) -> i64 {
        self.now_ts().saturating_add(i64::try_from(ttl_seconds).unwrap_or(i64::MAX))
    }

    /// Number of rows, live or not.
    pub async fn row_count(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[async_trait]
impl RemoteLayer for SqliteLayer {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let key = key.to_string();
        let now = self.now_ts();
        self.conn
            .call(move |conn| -> Result<Option<Vec<u8>>, Error> {
                let mut stmt = conn.prepare("SELECT value FROM cache_entries WHERE key = ?1 AND expires_at >= ?2")?;

                match stmt.query_row(params![key, now], |row| row.get(0)) {
                    Ok(value) => Ok(Some(value)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Uses UPSERT semantics: entries are only ever replaced wholesale.
    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<(), Error> {
        let key = key.to_string();
        let expires_at = self.expiry_from_now(ttl_seconds);
        let updated_at = self.clock.now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO cache_entries (key, value, expires_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        expires_at = excluded.expires_at,
                        updated_at = excluded.updated_at",
                    params![key, value, expires_at, updated_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<bool, Error> {
        let key = key.to_string();
        let expires_at = self.expiry_from_now(ttl_seconds);
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let updated =
                    conn.execute("UPDATE cache_entries SET expires_at = ?2 WHERE key = ?1", params![key, expires_at])?;
                Ok(updated > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, Error> {
        let prefix = prefix.to_string();
        let now = self.now_ts();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                // substr avoids LIKE wildcard escaping for keys containing % or _
                let mut stmt = conn.prepare(
                    "SELECT key FROM cache_entries
                    WHERE substr(key, 1, length(?1)) = ?1 AND expires_at >= ?2
                    ORDER BY key",
                )?;
                let keys = stmt
                    .query_map(params![prefix, now], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    async fn flush(&self) -> Result<(), Error> {
        self.conn
            .call(|conn| -> Result<(), Error> {
                conn.execute("DELETE FROM cache_entries", [])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn purge_expired(&self) -> Result<u64, Error> {
        let now = self.now_ts();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM cache_entries WHERE expires_at < ?1", params![now])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn test_open_in_memory() {
        let layer = SqliteLayer::open_in_memory().await.unwrap();
        let version = layer
            .conn
            .call(|conn| conn.query_row("SELECT sqlite_version()", [], |row| row.get::<_, String>(0)))
            .await
            .unwrap();
        assert!(!version.is_empty());
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let layer = SqliteLayer::open_in_memory().await.unwrap();
        layer.set("k", b"payload".to_vec(), 3600).await.unwrap();

        assert_eq!(layer.get("k").await.unwrap(), Some(b"payload".to_vec()));
        assert!(layer.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_value() {
        let layer = SqliteLayer::open_in_memory().await.unwrap();
        layer.set("k", b"old".to_vec(), 3600).await.unwrap();
        layer.set("k", b"new".to_vec(), 3600).await.unwrap();

        assert_eq!(layer.get("k").await.unwrap(), Some(b"new".to_vec()));
        assert_eq!(layer.row_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let layer = SqliteLayer::open_in_memory().await.unwrap();
        layer.set("k", b"v".to_vec(), 3600).await.unwrap();
        layer.delete("k").await.unwrap();

        assert!(layer.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_rows_hidden_and_purged() {
        let clock = Arc::new(ManualClock::new());
        let layer = SqliteLayer::open_in_memory().await.unwrap().with_clock(clock.clone());
        layer.set("expiring", b"v".to_vec(), 1).await.unwrap();
        layer.set("fresh", b"v".to_vec(), 3600).await.unwrap();

        clock.advance_secs(2);

        assert!(layer.get("expiring").await.unwrap().is_none());
        assert_eq!(layer.scan_keys("").await.unwrap(), vec!["fresh".to_string()]);

        let deleted = layer.purge_expired().await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(layer.row_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unbounded_ttl_row_stays_live() {
        let clock = Arc::new(ManualClock::new());
        let layer = SqliteLayer::open_in_memory().await.unwrap().with_clock(clock.clone());
        layer.set("forever", b"v".to_vec(), u64::MAX).await.unwrap();

        clock.advance_secs(100 * 365 * 24 * 60 * 60);
        assert_eq!(layer.get("forever").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(layer.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expire_existing_and_missing() {
        let layer = SqliteLayer::open_in_memory().await.unwrap();
        layer.set("k", b"v".to_vec(), 3600).await.unwrap();

        assert!(layer.expire("k", 60).await.unwrap());
        assert!(!layer.expire("missing", 60).await.unwrap());
    }

    #[tokio::test]
    async fn test_scan_keys_by_prefix() {
        let layer = SqliteLayer::open_in_memory().await.unwrap();
        layer.set("search:a", b"1".to_vec(), 3600).await.unwrap();
        layer.set("search:b", b"2".to_vec(), 3600).await.unwrap();
        layer.set("geo:Austin", b"3".to_vec(), 3600).await.unwrap();
        layer.set("search_x", b"4".to_vec(), 3600).await.unwrap();

        let keys = layer.scan_keys("search:").await.unwrap();
        assert_eq!(keys, vec!["search:a".to_string(), "search:b".to_string()]);
        assert_eq!(layer.scan_keys("").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_flush() {
        let layer = SqliteLayer::open_in_memory().await.unwrap();
        layer.set("a", b"1".to_vec(), 3600).await.unwrap();
        layer.set("b", b"2".to_vec(), 3600).await.unwrap();
        layer.flush().await.unwrap();

        assert_eq!(layer.row_count().await.unwrap(), 0);
    }
}
