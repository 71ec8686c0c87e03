//! SQLite-backed namespaces sharing one connection.
//!
//! [`SharedDb`] owns the connection; each [`SqliteStore`] is a logical
//! namespace registered on it. The connection is closed only when the last
//! registered namespace closes.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_rusqlite::{Connection, params, rusqlite};

use super::{Store, migrations};
use crate::Error;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;";

/// Shared database handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread.
#[derive(Clone, Debug)]
pub struct SharedDb {
    inner: Arc<SharedInner>,
}

#[derive(Debug)]
struct SharedInner {
    conn: Connection,
    state: Mutex<SharedState>,
}

#[derive(Debug, Default)]
struct SharedState {
    namespaces: HashSet<String>,
    closed: bool,
}

impl SharedDb {
    /// Open a database at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies performance pragmas,
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

        Ok(Self { inner: Arc::new(SharedInner { conn, state: Mutex::new(SharedState::default()) }) })
    }

    /// Register a namespace on this handle.
    ///
    /// # Errors
    ///
    /// Fails if the namespace is already open or the handle was closed.
    pub fn namespace(&self, name: &str) -> Result<SqliteStore, Error> {
        let mut state = self.lock_state()?;
        if state.closed {
            return Err(Error::StoreClosed(name.to_string()));
        }
        if !state.namespaces.insert(name.to_string()) {
            return Err(Error::NamespaceInUse(name.to_string()));
        }
        Ok(SqliteStore { db: self.clone(), name: name.to_string(), open: AtomicBool::new(true) })
    }

    /// Number of namespaces currently registered.
    pub fn open_namespaces(&self) -> usize {
        self.lock_state().map(|s| s.namespaces.len()).unwrap_or(0)
    }

    /// Whether the underlying connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.lock_state().map(|s| s.closed).unwrap_or(true)
    }

    async fn release(&self, name: &str) -> Result<(), Error> {
        let last = {
            let mut state = self.lock_state()?;
            state.namespaces.remove(name);
            if state.namespaces.is_empty() && !state.closed {
                state.closed = true;
                true
            } else {
                false
            }
        };

        if last {
            tracing::debug!(namespace = name, "last namespace closed, closing database");
            self.inner.conn.clone().close().await?;
        }
        Ok(())
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, SharedState>, Error> {
        self.inner
            .state
            .lock()
            .map_err(|_| Error::StoreClosed("shared database (lock poisoned)".to_string()))
    }
}

/// One logical namespace of a [`SharedDb`].
pub struct SqliteStore {
    db: SharedDb,
    name: String,
    open: AtomicBool,
}

impl SqliteStore {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn check_open(&self) -> Result<(), Error> {
        if !self.open.load(Ordering::Acquire) {
            return Err(Error::StoreClosed(self.name.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), Error> {
        self.check_open()?;
        let namespace = self.name.clone();
        let key = key.to_string();
        let value = value.to_vec();
        let now = chrono::Utc::now().to_rfc3339();
        self.db
            .inner
            .conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO kv (namespace, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(namespace, key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at",
                    params![namespace, key, value, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        self.check_open()?;
        let namespace = self.name.clone();
        let key = key.to_string();
        self.db
            .inner
            .conn
            .call(move |conn| -> Result<Option<Vec<u8>>, Error> {
                let mut stmt = conn.prepare("SELECT value FROM kv WHERE namespace = ?1 AND key = ?2")?;
                match stmt.query_row(params![namespace, key], |row| row.get(0)) {
                    Ok(value) => Ok(Some(value)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.check_open()?;
        let namespace = self.name.clone();
        let key = key.to_string();
        self.db
            .inner
            .conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute("DELETE FROM kv WHERE namespace = ?1 AND key = ?2", params![namespace, key])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn close(&self) -> Result<(), Error> {
        if self.open.swap(false, Ordering::AcqRel) {
            self.db.release(&self.name).await?;
        }
        Ok(())
    }
}
