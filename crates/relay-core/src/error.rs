//! Error types for the relay core and its collaborators.

use relay_outbox::OutboxError;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Relay orchestrator error type.
///
/// `SavingToRepository` and `UpdateStatus` are soft errors: the message was
/// accepted and the relay owns any further retry.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Message accepted but not yet durably saved
    #[error("failed to save to repository: {0}")]
    SavingToRepository(#[source] RepositoryError),

    /// Processed status could not be recorded
    #[error("failed to update status in repository: {0}")]
    UpdateStatus(#[source] RepositoryError),

    /// A record could not be buffered
    #[error("failed to save to outbox {outbox}: {source}")]
    SavingToOutbox {
        /// Outbox that refused the record.
        outbox: String,
        #[source]
        source: OutboxError,
    },

    /// The record was neither stored nor buffered
    #[error("message {id} lost: {reason}")]
    MessageLost { id: Uuid, reason: String },

    /// Nothing to relay
    #[error("message payload is empty")]
    EmptyPayload,

    /// Repository query failed
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Result type alias using RelayError.
pub type RelayResult<T> = Result<T, RelayError>;

/// Error reported by a [`crate::Repository`] implementation.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// A message with this identifier is already stored
    #[error("duplicate message id {0}")]
    DuplicateId(Uuid),

    /// The store could not be reached or refused the operation
    #[error("repository unavailable: {0}")]
    Unavailable(String),

    /// Any other storage failure
    #[error("{0}")]
    Other(String),
}

/// Result type alias using RepositoryError.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Error reported by broker collaborators.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Transport-level failure talking to the broker
    #[error("broker transport error: {0}")]
    Transport(String),

    /// Write did not complete in time
    #[error("broker write timed out after {0:?}")]
    Timeout(Duration),

    /// Message could not be encoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Event from the broker had an unexpected shape
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Result type alias using BrokerError.
pub type BrokerResult<T> = Result<T, BrokerError>;
