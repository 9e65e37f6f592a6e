//! Outbox error types.

use thiserror::Error;

/// Outbox error type.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Record rejected before it reached storage
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Stored entry could not be turned back into a record
    #[error("Malformed entry in {outbox}: {reason}")]
    Malformed {
        /// Outbox the entry was read from.
        outbox: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// Result type alias using OutboxError.
pub type OutboxResult<T> = Result<T, OutboxError>;
