//! Volatile in-process outbox.

use crate::{MessageRecord, Outbox, OutboxResult};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

/// Initial capacity of the backing stack.
const INITIAL_CAPACITY: usize = 10;

/// In-memory outbox.
///
/// All operations are serialized by one lock. Entries do not survive a
/// restart, and any record is accepted, including the zero value.
pub struct MemoryOutbox {
    name: String,
    entries: Mutex<Vec<MessageRecord>>,
}

impl MemoryOutbox {
    /// Create an empty outbox. `name` identifies it in logs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(Vec::with_capacity(INITIAL_CAPACITY)),
        }
    }
}

#[async_trait]
impl Outbox for MemoryOutbox {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add(&self, record: MessageRecord) -> OutboxResult<()> {
        let mut entries = self.entries.lock().await;
        debug!(
            outbox = %self.name,
            id = %record.id,
            payload_len = record.payload.len(),
            "Added to outbox"
        );
        entries.push(record);
        Ok(())
    }

    async fn try_pop(&self) -> OutboxResult<Option<MessageRecord>> {
        let mut entries = self.entries.lock().await;
        let record = entries.pop();

        if let Some(ref record) = record {
            debug!(
                outbox = %self.name,
                id = %record.id,
                remaining = entries.len(),
                "Popped from outbox"
            );
        }

        Ok(record)
    }

    async fn try_len(&self) -> OutboxResult<usize> {
        Ok(self.entries.lock().await.len())
    }
}
