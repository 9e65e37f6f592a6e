//! Outbox buffers for operations deferred by a downstream failure.
//!
//! This crate provides:
//! - MessageRecord: The identifier/payload pair every outbox holds
//! - Outbox: The backend-agnostic buffer contract (LIFO discipline)
//! - MemoryOutbox: Volatile in-process backend guarded by a single lock
//! - RedisOutbox: Durable backend on a Redis list, one list per outbox and instance

mod error;
mod memory;
mod record;
mod redis_outbox;

pub use error::{OutboxError, OutboxResult};
pub use memory::MemoryOutbox;
pub use record::MessageRecord;
pub use redis_outbox::{RedisOutbox, OUTBOX_KEY_PREFIX};

use async_trait::async_trait;
use tracing::warn;

/// A buffer of message records waiting for a deferred operation.
///
/// Entries come back most-recently-added first. Which operation an entry is
/// waiting for is decided by the outbox instance that holds it, never by a
/// field on the record.
#[async_trait]
pub trait Outbox: Send + Sync {
    /// Name used in logs and storage keys.
    fn name(&self) -> &str;

    /// Store one entry.
    async fn add(&self, record: MessageRecord) -> OutboxResult<()>;

    /// Remove and return the most recently added entry.
    ///
    /// `Ok(None)` means the outbox is empty. Backend failures and malformed
    /// entries are reported as errors.
    async fn try_pop(&self) -> OutboxResult<Option<MessageRecord>>;

    /// Current number of entries.
    async fn try_len(&self) -> OutboxResult<usize>;

    /// Remove and return the most recently added entry, or the zero-value
    /// record when the outbox is empty or the backend failed.
    async fn pop(&self) -> MessageRecord {
        match self.try_pop().await {
            Ok(Some(record)) => record,
            Ok(None) => MessageRecord::default(),
            Err(e) => {
                warn!(outbox = %self.name(), error = %e, "Pop failed, treating outbox as empty");
                MessageRecord::default()
            }
        }
    }

    /// Current number of entries, 0 when the backend cannot be reached.
    async fn len(&self) -> usize {
        match self.try_len().await {
            Ok(len) => len,
            Err(e) => {
                warn!(outbox = %self.name(), error = %e, "Len failed, reporting 0");
                0
            }
        }
    }

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
