//! Async SQLite executor.
//!
//! Every statement runs on one dedicated thread owned by
//! `tokio_rusqlite::Connection`; callers await the result without blocking a
//! runtime worker. Statements execute in submission order.
//!
//! Only SQL and row mapping belong inside [`AsyncDatabase::call`]. Anything
//! slow in the closure stalls every other query.

use crate::{migrations, StoreError, StoreResult};
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::info;

fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> StoreError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => StoreError::Sqlite(e),
        tokio_rusqlite::Error::ConnectionClosed => StoreError::Connection("Connection closed".to_string()),
        other => StoreError::Connection(other.to_string()),
    }
}

/// SQLite database behind a dedicated executor thread.
#[derive(Clone)]
pub struct AsyncDatabase {
    conn: Connection,
    path: String,
}

impl AsyncDatabase {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let path_str = path.to_string_lossy().to_string();
        info!(path = %path_str, "Opening message store");

        let conn = Connection::open(path)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        conn.call(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
            Ok(())
        })
        .await
        .map_err(from_tokio_rusqlite)?;

        Self::prepare(conn, path_str).await
    }

    /// Open a private in-memory database. Contents vanish with the last clone.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Self::prepare(conn, ":memory:".to_string()).await
    }

    async fn prepare(conn: Connection, path: String) -> StoreResult<Self> {
        let db = Self { conn, path };
        db.call(migrations::run_migrations).await?;
        info!(path = %db.path, "Message store ready");
        Ok(db)
    }

    /// Run `f` on the executor thread.
    pub async fn call<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        // The store result rides inside tokio_rusqlite's Ok so our own error
        // variants survive the trip back.
        match self.conn.call(move |conn| Ok(f(conn))).await {
            Ok(inner) => inner,
            Err(e) => Err(from_tokio_rusqlite(e)),
        }
    }

    /// Run `f` on the executor thread when it only produces rusqlite errors.
    pub async fn call_sqlite<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.conn
            .call(move |conn| Ok(f(conn)?))
            .await
            .map_err(from_tokio_rusqlite)
    }

    /// Close the connection once pending statements finish.
    pub async fn close(self) -> StoreResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to close database: {e}")))?;
        info!(path = %self.path, "Message store closed");
        Ok(())
    }
}
