//! Schema migrations, tracked in the `migrations` table.

use crate::{StoreError, StoreResult};
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "schema version {current_version} is newer than supported version {CURRENT_VERSION}"
        )));
    }

    if current_version == CURRENT_VERSION {
        debug!(current_version, "Schema up to date");
        return Ok(());
    }

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_messages(conn)?;
    }
    if current_version < 2 {
        migrate_v2_processed_index(conn)?;
    }

    info!("Migrations complete");
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: messages table.
fn migrate_v1_messages(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            message BLOB NOT NULL,
            status TEXT NOT NULL DEFAULT 'in_processing'
                CHECK (status IN ('in_processing', 'processed')),
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    record_migration(conn, 1, "messages")
}

/// V2: index backing the processed-count windows.
fn migrate_v2_processed_index(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_messages_status_updated ON messages (status, updated_at);",
    )?;
    record_migration(conn, 2, "processed_index")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO migrations (version, name) VALUES (?1, 'future')",
            [CURRENT_VERSION + 1],
        )
        .unwrap();

        let err = run_migrations(&conn).unwrap_err();
        assert!(matches!(err, StoreError::Migration(msg) if msg.contains("newer")));
    }

    #[test]
    fn test_status_is_constrained() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO messages (id, message, status) VALUES ('a', x'01', 'lost')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_new_rows_default_to_in_processing() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        conn.execute("INSERT INTO messages (id, message) VALUES ('a', x'01')", [])
            .unwrap();
        let status: String = conn
            .query_row("SELECT status FROM messages WHERE id = 'a'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(status, "in_processing");
    }
}
