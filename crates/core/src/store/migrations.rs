//! Schema migrations for the shared key-value database.
//!
//! Applied versions are recorded in `_migrations`. Each pending migration
//! runs in its own transaction together with its bookkeeping row, so a
//! failed batch leaves the schema at the previous version.

use tokio_rusqlite::{Connection, params, rusqlite};

use crate::Error;

/// Ordered `(version, sql)` pairs. Versions only ever grow.
const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("../../migrations/001_kv.sql"))];

/// Highest schema version this build knows about.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map_or(0, |(version, _)| *version)
}

/// Bring the schema up to [`latest_version`].
///
/// # Errors
///
/// Returns [`Error::MigrationFailed`] when the database was written by a newer
/// build, and a database error when a migration batch fails.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )?;

        let current = applied_version(conn)?;
        if current > latest_version() {
            return Err(Error::MigrationFailed(format!(
                "database schema version {current} is newer than supported version {}",
                latest_version()
            )));
        }

        for (version, sql) in MIGRATIONS.iter().filter(|(version, _)| *version > current) {
            let tx = conn.transaction()?;
            tx.execute_batch(sql)?;
            tx.execute(
                "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                params![version, chrono::Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
            tracing::debug!(version, "applied migration");
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}

fn applied_version(conn: &rusqlite::Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))
}
