//! Bounded hand-off channel between the orchestrator and the broker forwarder.

use relay_outbox::MessageRecord;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

/// A send that did not reach the forwarder. The record is handed back so the
/// caller can buffer it.
#[derive(Error, Debug)]
pub enum HandOffError {
    /// No consumer took the record within the send timeout
    #[error("hand-off timed out after {timeout:?}")]
    Timeout {
        record: MessageRecord,
        timeout: Duration,
    },

    /// The consumer side was dropped
    #[error("hand-off channel closed")]
    Closed { record: MessageRecord },
}

impl HandOffError {
    /// Recover the record that was not delivered.
    pub fn into_record(self) -> MessageRecord {
        match self {
            HandOffError::Timeout { record, .. } | HandOffError::Closed { record } => record,
        }
    }
}

/// Hand-off channel.
///
/// Senders wait for room for at most `timeout`; a send that cannot complete
/// is rejected back to the caller rather than blocking forever when nobody
/// consumes the channel.
pub struct HandOff {
    sender: mpsc::Sender<MessageRecord>,
    receiver: Mutex<Option<mpsc::Receiver<MessageRecord>>>,
    timeout: Duration,
}

impl HandOff {
    /// Create a channel holding up to `capacity` records (at least 1).
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            timeout,
        }
    }

    /// Send one record, waiting at most the configured timeout.
    pub async fn send(&self, record: MessageRecord) -> Result<(), HandOffError> {
        self.sender
            .send_timeout(record, self.timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(record) => HandOffError::Timeout {
                    record,
                    timeout: self.timeout,
                },
                SendTimeoutError::Closed(record) => HandOffError::Closed { record },
            })
    }

    /// Take the consuming end. Only the first call gets it.
    pub fn take_receiver(&self) -> Option<mpsc::Receiver<MessageRecord>> {
        match self.receiver.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}
