//! Confirmation loop: closes the relay cycle once the broker side has
//! consumed a message.

use crate::config::RelayConfig;
use crate::error::BrokerResult;
use crate::service::RelayService;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Confirmation event body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub id: Uuid,
    pub instance: String,
}

/// Raw event read from a confirmation source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationEvent {
    /// Source-specific handle used to acknowledge the event
    pub receipt: String,
    /// JSON-encoded [`Confirmation`]
    pub data: Vec<u8>,
}

/// Stream of confirmation events with explicit acknowledgement.
#[async_trait]
pub trait ConfirmationSource: Send + Sync {
    /// Wait for the next event. `Ok(None)` means nothing arrived within the
    /// source's poll window.
    async fn next_event(&self) -> BrokerResult<Option<ConfirmationEvent>>;

    /// Commit an event so it is not delivered again.
    async fn ack(&self, receipt: &str) -> BrokerResult<()>;

    /// Leave an event uncommitted so the source delivers it again.
    async fn nack(&self, _receipt: &str) -> BrokerResult<()> {
        Ok(())
    }

    /// Re-establish the connection after a read error.
    async fn reconnect(&self) -> BrokerResult<()> {
        Ok(())
    }
}

/// What happened to one confirmation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    /// Marked as processed and acknowledged
    Confirmed(Uuid),
    /// Addressed to another relay instance; acknowledged and dropped
    Foreign,
    /// Not a confirmation; acknowledged and dropped
    Undecodable,
    /// The status update failed; left unacknowledged for redelivery
    Rejected(Uuid),
}

pub struct ConfirmationListener {
    service: RelayService,
    source: Arc<dyn ConfirmationSource>,
    retry_delay: Duration,
}

impl ConfirmationListener {
    pub fn new(service: RelayService, source: Arc<dyn ConfirmationSource>, config: &RelayConfig) -> Self {
        Self {
            service,
            source,
            retry_delay: config.broker_retry_delay,
        }
    }

    /// Process one event.
    pub async fn handle(&self, event: ConfirmationEvent) -> ConfirmationOutcome {
        let confirmation: Confirmation = match serde_json::from_slice(&event.data) {
            Ok(confirmation) => confirmation,
            Err(e) => {
                warn!(receipt = %event.receipt, error = %e, "Discarding undecodable confirmation");
                self.ack(&event.receipt).await;
                return ConfirmationOutcome::Undecodable;
            }
        };

        if confirmation.instance != self.service.instance() {
            debug!(
                id = %confirmation.id,
                instance = %confirmation.instance,
                "Ignoring confirmation for another instance"
            );
            self.ack(&event.receipt).await;
            return ConfirmationOutcome::Foreign;
        }

        match self.service.mark_message_as_processed(confirmation.id).await {
            Ok(()) => {
                self.ack(&event.receipt).await;
                ConfirmationOutcome::Confirmed(confirmation.id)
            }
            Err(e) => {
                warn!(id = %confirmation.id, error = %e, "Status update failed, leaving confirmation pending");
                if let Err(e) = self.source.nack(&event.receipt).await {
                    warn!(receipt = %event.receipt, error = %e, "Failed to release confirmation");
                }
                ConfirmationOutcome::Rejected(confirmation.id)
            }
        }
    }

    /// Run until `shutdown` turns true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(instance = %self.service.instance(), "Confirmation listener started");

        loop {
            let pause = tokio::select! {
                next = self.source.next_event() => match next {
                    Ok(Some(event)) => {
                        matches!(self.handle(event).await, ConfirmationOutcome::Rejected(_))
                    }
                    Ok(None) => false,
                    Err(e) => {
                        warn!(error = %e, "Confirmation read failed, reconnecting");
                        if let Err(e) = self.source.reconnect().await {
                            warn!(error = %e, "Reconnect failed");
                        }
                        true
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    false
                }
            };

            if pause {
                tokio::select! {
                    _ = tokio::time::sleep(self.retry_delay) => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        }

        info!("Confirmation listener stopped");
    }

    async fn ack(&self, receipt: &str) {
        if let Err(e) = self.source.ack(receipt).await {
            warn!(receipt = %receipt, error = %e, "Failed to acknowledge confirmation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_parses() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"id":"{id}","instance":"node-a"}}"#);
        let confirmation: Confirmation = serde_json::from_str(&raw).unwrap();
        assert_eq!(confirmation.id, id);
        assert_eq!(confirmation.instance, "node-a");
    }

    #[test]
    fn test_confirmation_requires_instance() {
        let raw = format!(r#"{{"id":"{}"}}"#, Uuid::new_v4());
        assert!(serde_json::from_str::<Confirmation>(&raw).is_err());
    }
}
