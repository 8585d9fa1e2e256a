//! Schema versions of the shared cache database.

use crate::Error;
use tokio_rusqlite::{Connection, params, rusqlite};

/// Ordered schema steps. A database records the highest version applied.
const SCHEMA: &[(i64, &str)] = &[(1, include_str!("../../migrations/001_cache_entries.sql"))];

/// Bring the schema up to the latest version. Each step commits on its own,
/// so a failed step leaves earlier ones in place.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )?;

        let applied = schema_version(conn)?;
        for &(version, sql) in SCHEMA.iter().filter(|(version, _)| *version > applied) {
            let tx = conn.transaction()?;
            tx.execute_batch(sql)
                .map_err(|e| Error::MigrationFailed(format!("schema version {version}: {e}")))?;
            tx.execute(
                "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                params![version, chrono::Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
            tracing::debug!(version, "cache schema upgraded");
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}

fn schema_version(conn: &rusqlite::Connection) -> Result<i64, Error> {
    let version = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn version_of(conn: &Connection) -> i64 {
        conn.call(|conn| -> Result<i64, Error> { schema_version(conn) }).await.unwrap()
    }

    #[tokio::test]
    async fn test_fresh_database_reaches_latest_version() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn).await.unwrap();

        let has_table: bool = conn
            .call(|conn| {
                conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='cache_entries')",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();

        assert!(has_table);
        assert_eq!(version_of(&conn).await, SCHEMA[SCHEMA.len() - 1].0);
    }

    #[tokio::test]
    async fn test_rerun_applies_nothing() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        let rows: i64 = conn
            .call(|conn| conn.query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(rows, SCHEMA.len() as i64);
    }

    #[tokio::test]
    async fn test_newer_database_left_alone() {
        let conn = Connection::open_in_memory().await.unwrap();
        conn.call(|conn| {
            conn.execute_batch(
                "CREATE TABLE _migrations (version INTEGER PRIMARY KEY, applied_at TEXT NOT NULL);
                 INSERT INTO _migrations (version, applied_at) VALUES (99, 'later');",
            )
        })
        .await
        .unwrap();

        run(&conn).await.unwrap();
        assert_eq!(version_of(&conn).await, 99);
    }
}
