//! Error types for the Redis Streams adapter.

use relay_core::BrokerError;
use thiserror::Error;

/// Stream adapter error type.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Redis connection or operation error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Reply had an unexpected shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Message could not be encoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for stream operations.
pub type StreamResult<T> = Result<T, StreamError>;

impl From<StreamError> for BrokerError {
    fn from(e: StreamError) -> Self {
        match e {
            StreamError::Redis(e) => BrokerError::Transport(e.to_string()),
            StreamError::Protocol(msg) => BrokerError::Protocol(msg),
            StreamError::Json(e) => BrokerError::Json(e),
        }
    }
}
