//! Broker forwarding loop: drains the hand-off channel into a broker producer.

use crate::config::RelayConfig;
use crate::error::{BrokerError, BrokerResult};
use crate::service::RelayService;
use async_trait::async_trait;
use relay_outbox::MessageRecord;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// Message as written to the broker.
///
/// The payload travels base64-encoded under `message`; `instance` lets the
/// confirmation path route acknowledgements back to this relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(with = "base64_payload")]
    pub message: Vec<u8>,
    pub id: Uuid,
    pub instance: String,
}

impl OutboundMessage {
    pub fn new(record: MessageRecord, instance: impl Into<String>) -> Self {
        Self {
            message: record.payload,
            id: record.id,
            instance: instance.into(),
        }
    }

    pub fn to_json(&self) -> BrokerResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    fn into_record(self) -> MessageRecord {
        MessageRecord::new(self.id, self.message)
    }
}

mod base64_payload {
    use super::BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Writes relayed messages to the broker.
#[async_trait]
pub trait BrokerProducer: Send + Sync {
    async fn publish(&self, message: &OutboundMessage) -> BrokerResult<()>;
}

/// Consumes the hand-off channel and publishes each record.
///
/// A failed or timed-out write sends the record back to the broker outbox and
/// pauses for the retry delay before taking the next record.
pub struct Forwarder {
    service: RelayService,
    producer: Arc<dyn BrokerProducer>,
    write_timeout: Duration,
    retry_delay: Duration,
}

impl Forwarder {
    pub fn new(service: RelayService, producer: Arc<dyn BrokerProducer>, config: &RelayConfig) -> Self {
        Self {
            service,
            producer,
            write_timeout: config.broker_write_timeout,
            retry_delay: config.broker_retry_delay,
        }
    }

    /// Publish one record within the write timeout.
    pub async fn forward(&self, record: MessageRecord) -> Result<(), (MessageRecord, BrokerError)> {
        let message = OutboundMessage::new(record, self.service.instance());

        let result = match tokio::time::timeout(self.write_timeout, self.producer.publish(&message)).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Timeout(self.write_timeout)),
        };

        match result {
            Ok(()) => {
                debug!(id = %message.id, "Message forwarded to broker");
                Ok(())
            }
            Err(e) => Err((message.into_record(), e)),
        }
    }

    /// Run until the channel closes or `shutdown` turns true.
    ///
    /// On exit, records left in the channel go to the broker outbox.
    pub async fn run(self, mut receiver: mpsc::Receiver<MessageRecord>, mut shutdown: watch::Receiver<bool>) {
        info!(instance = %self.service.instance(), "Forwarder started");

        loop {
            let record = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                record = receiver.recv() => match record {
                    Some(record) => record,
                    None => break,
                },
            };

            let Err((record, e)) = self.forward(record).await else {
                continue;
            };

            warn!(id = %record.id, error = %e, "Broker write failed, deferring to outbox");
            let id = record.id;
            if let Err(e) = self.service.save_unsent_message(record).await {
                error!(id = %id, error = %e, "Message lost");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.retry_delay) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let drained = self.drain(&mut receiver).await;
        info!(drained, "Forwarder stopped");
    }

    /// Close the channel and move records still buffered in it to the broker
    /// outbox. Senders racing the close see a closed channel and buffer their
    /// record themselves.
    async fn drain(&self, receiver: &mut mpsc::Receiver<MessageRecord>) -> usize {
        receiver.close();

        let mut drained = 0;
        while let Ok(record) = receiver.try_recv() {
            let id = record.id;
            match self.service.save_unsent_message(record).await {
                Ok(()) => drained += 1,
                Err(e) => error!(id = %id, error = %e, "Message lost"),
            }
        }
        drained
    }
}
