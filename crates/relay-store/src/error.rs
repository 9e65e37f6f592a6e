//! Store error types.

use relay_core::RepositoryError;
use thiserror::Error;

/// Store error type.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Executor thread unavailable or connection closed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for RepositoryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Connection(msg) => RepositoryError::Unavailable(msg),
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(code, msg))
                if matches!(
                    code.code,
                    rusqlite::ErrorCode::DatabaseBusy
                        | rusqlite::ErrorCode::DatabaseLocked
                        | rusqlite::ErrorCode::CannotOpen
                ) =>
            {
                RepositoryError::Unavailable(msg.unwrap_or_else(|| code.to_string()))
            }
            other => RepositoryError::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_maps_to_unavailable() {
        let err: RepositoryError = StoreError::Connection("closed".to_string()).into();
        assert!(matches!(err, RepositoryError::Unavailable(msg) if msg == "closed"));
    }

    #[test]
    fn test_busy_maps_to_unavailable() {
        let sqlite = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        );
        let err: RepositoryError = StoreError::Sqlite(sqlite).into();
        assert!(matches!(err, RepositoryError::Unavailable(_)));
    }

    #[test]
    fn test_other_errors_keep_message() {
        let err: RepositoryError = StoreError::Migration("schema too new".to_string()).into();
        assert_eq!(err.to_string(), "Migration error: schema too new");
    }
}
