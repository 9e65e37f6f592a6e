//! Relay orchestrator.

use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult, RepositoryError};
use crate::gate::RetryGate;
use crate::handoff::HandOff;
use crate::ports::{Metrics, ProcessedCounts, Repository};
use crate::statistics::{StatisticSnapshot, Statistics};
use crate::supervisor::spawn_supervised;
use relay_outbox::{MessageRecord, Outbox};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outcome of accepting a message.
#[derive(Debug)]
pub enum Acceptance {
    /// Stored; forwarding continues in the background.
    Saved { id: Uuid },
    /// Accepted but not yet durably stored. The relay owns the retry; the
    /// caller must not resend.
    Deferred { id: Uuid, error: RelayError },
}

impl Acceptance {
    pub fn id(&self) -> Uuid {
        match self {
            Acceptance::Saved { id } | Acceptance::Deferred { id, .. } => *id,
        }
    }

    /// The soft error of a deferred acceptance.
    pub fn soft_error(&self) -> Option<&RelayError> {
        match self {
            Acceptance::Saved { .. } => None,
            Acceptance::Deferred { error, .. } => Some(error),
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Acceptance::Deferred { .. })
    }
}

struct Inner {
    instance: String,
    repository: Arc<dyn Repository>,
    broker_outbox: Arc<dyn Outbox>,
    repo_outbox: Arc<dyn Outbox>,
    metrics: Arc<dyn Metrics>,
    handoff: HandOff,
    gate: RetryGate,
    statistics: Statistics,
    retry_interval: Duration,
}

/// The relay orchestrator.
///
/// Cheap to clone; clones share outboxes, counters, the hand-off channel and
/// the retry gate.
#[derive(Clone)]
pub struct RelayService {
    inner: Arc<Inner>,
}

impl RelayService {
    /// Create a relay over its collaborators.
    ///
    /// `broker_outbox` holds records waiting to be forwarded, `repo_outbox`
    /// records waiting to be stored.
    pub fn new(
        repository: Arc<dyn Repository>,
        broker_outbox: Arc<dyn Outbox>,
        repo_outbox: Arc<dyn Outbox>,
        metrics: Arc<dyn Metrics>,
        config: &RelayConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                instance: config.instance.clone(),
                repository,
                broker_outbox,
                repo_outbox,
                metrics,
                handoff: HandOff::new(config.handoff_capacity, config.handoff_timeout),
                gate: RetryGate::new(),
                statistics: Statistics::new(),
                retry_interval: config.retry_interval,
            }),
        }
    }

    /// Identifier of this relay instance.
    pub fn instance(&self) -> &str {
        &self.inner.instance
    }

    /// Accept a message: assign an id, store it, then forward it.
    ///
    /// Only an empty payload is rejected. Storage failures are reported as
    /// [`Acceptance::Deferred`]; the record is buffered for replay before
    /// this returns. Forwarding always happens in the background.
    ///
    /// Dropping the returned future does not abandon the message: the save
    /// and the forward-or-buffer step that follows it run to completion.
    pub async fn process_message(&self, payload: impl Into<Vec<u8>>) -> RelayResult<Acceptance> {
        let payload = payload.into();
        if payload.is_empty() {
            return Err(RelayError::EmptyPayload);
        }

        let record = MessageRecord::new(Uuid::new_v4(), payload);
        let id = record.id;

        self.inner.metrics.incoming_msg_inc();
        self.inner.statistics.record_accepted();

        // Detached from the caller: once the store has the record it must
        // still be forwarded or buffered even if the caller goes away.
        let service = self.clone();
        match tokio::spawn(async move { service.persist(record).await }).await {
            Ok(acceptance) => Ok(acceptance),
            Err(e) => {
                error!(id = %id, error = %e, "Persist task failed, message lost");
                Ok(Acceptance::Deferred {
                    id,
                    error: RelayError::MessageLost {
                        id,
                        reason: e.to_string(),
                    },
                })
            }
        }
    }

    /// Record that the broker confirmed consumption of `id`.
    pub async fn mark_message_as_processed(&self, id: Uuid) -> RelayResult<()> {
        self.inner
            .repository
            .update_status(id)
            .await
            .map_err(RelayError::UpdateStatus)?;

        self.inner.metrics.processed_msg_inc();
        debug!(id = %id, "Message marked as processed");
        Ok(())
    }

    /// Buffer a record whose broker write failed.
    pub async fn save_unsent_message(&self, record: MessageRecord) -> RelayResult<()> {
        let outbox = &self.inner.broker_outbox;
        let id = record.id;

        outbox
            .add(record)
            .await
            .map_err(|source| RelayError::SavingToOutbox {
                outbox: outbox.name().to_string(),
                source,
            })?;

        self.inner.statistics.record_sent_to_broker_outbox();
        debug!(id = %id, outbox = %outbox.name(), "Unsent message buffered");
        Ok(())
    }

    /// Take the consuming end of the hand-off channel. Only the first call
    /// gets it.
    pub fn take_message_receiver(&self) -> Option<mpsc::Receiver<MessageRecord>> {
        self.inner.handoff.take_receiver()
    }

    pub fn statistic(&self) -> StatisticSnapshot {
        self.inner.statistics.snapshot()
    }

    /// Windowed processed-message counts from the repository.
    pub async fn processed_count_statistic(&self) -> RelayResult<ProcessedCounts> {
        Ok(self.inner.repository.processed_count().await?)
    }

    /// Move records from the repository outbox into the repository.
    ///
    /// Stops at the first failure, putting the failed record back. A record
    /// the repository already holds counts as replayed. Replayed records are
    /// forwarded like freshly saved ones. Returns the number of records
    /// replayed.
    pub async fn replay_repository_outbox(&self) -> usize {
        let outbox = &self.inner.repo_outbox;
        let mut replayed = 0;

        loop {
            let record = match outbox.try_pop().await {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => {
                    warn!(outbox = %outbox.name(), error = %e, "Failed to pop from outbox");
                    break;
                }
            };

            match self.inner.repository.save_message(&record).await {
                Ok(()) => {}
                Err(RepositoryError::DuplicateId(id)) => {
                    debug!(id = %id, "Message already stored, dropping from outbox");
                }
                Err(e) => {
                    warn!(id = %record.id, error = %e, "Replay save failed, stopping pass");
                    self.restore(outbox.as_ref(), record).await;
                    break;
                }
            }

            self.inner.statistics.record_returned_from_outbox();
            replayed += 1;
            self.spawn_forward(record);
        }

        if replayed > 0 {
            info!(replayed, outbox = %outbox.name(), "Replayed messages into repository");
        }
        replayed
    }

    /// Move records from the broker outbox onto the hand-off channel.
    ///
    /// Only one pass runs at a time; a pass that finds the gate taken returns
    /// 0 at once. A send that times out puts its record back and ends the
    /// pass. Returns the number of records handed off.
    pub async fn replay_broker_outbox(&self) -> usize {
        let Some(_guard) = self.inner.gate.try_acquire() else {
            debug!("Broker replay already running");
            return 0;
        };

        let outbox = &self.inner.broker_outbox;
        let mut handed_off = 0;

        loop {
            let record = match outbox.try_pop().await {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => {
                    warn!(outbox = %outbox.name(), error = %e, "Failed to pop from outbox");
                    break;
                }
            };

            match self.inner.handoff.send(record).await {
                Ok(()) => {
                    self.inner.statistics.record_returned_to_broker();
                    handed_off += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Hand-off failed, stopping broker replay");
                    self.restore(outbox.as_ref(), e.into_record()).await;
                    break;
                }
            }
        }

        if handed_off > 0 {
            info!(handed_off, outbox = %outbox.name(), "Replayed messages to broker");
        }
        handed_off
    }

    /// Start the fixed-interval replay scheduler.
    ///
    /// Each tick launches a repository replay and, when no broker replay is
    /// running, a broker replay. The loop ends when `shutdown` turns true or
    /// its sender is dropped.
    pub fn spawn_retry_loop(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let service = self.clone();
        let period = self.inner.retry_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            info!(period_ms = period.as_millis() as u64, "Retry loop started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let replay = service.clone();
                        spawn_supervised("repository-replay", async move {
                            replay.replay_repository_outbox().await;
                        });

                        if service.inner.gate.is_idle() {
                            let replay = service.clone();
                            spawn_supervised("broker-replay", async move {
                                replay.replay_broker_outbox().await;
                            });
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Retry loop stopped");
        })
    }

    /// Store a record, then forward it or buffer it for another save.
    async fn persist(&self, record: MessageRecord) -> Acceptance {
        let id = record.id;

        if let Err(e) = self.inner.repository.save_message(&record).await {
            warn!(id = %id, error = %e, "Failed to save message, deferring to outbox");
            self.inner.metrics.problems_saving_in_db();

            let error = self.defer_persistence(record, e).await;
            return Acceptance::Deferred { id, error };
        }

        debug!(id = %id, "Message saved");
        self.spawn_forward(record);
        Acceptance::Saved { id }
    }

    /// Buffer a record that could not be stored and return the soft error to
    /// report for it.
    async fn defer_persistence(&self, record: MessageRecord, cause: RepositoryError) -> RelayError {
        let outbox = &self.inner.repo_outbox;
        let id = record.id;

        match outbox.add(record).await {
            Ok(()) => {
                self.inner.statistics.record_sent_to_outbox();
                debug!(id = %id, outbox = %outbox.name(), "Message deferred for persistence");
                RelayError::SavingToRepository(cause)
            }
            Err(source) => {
                error!(id = %id, outbox = %outbox.name(), error = %source, "Failed to save to outbox, message lost");
                RelayError::SavingToOutbox {
                    outbox: outbox.name().to_string(),
                    source,
                }
            }
        }
    }

    /// Forward a stored record in the background.
    ///
    /// A record never overtakes an existing backlog: while the broker outbox
    /// is non-empty it joins the outbox instead of the hand-off channel.
    fn spawn_forward(&self, record: MessageRecord) {
        let service = self.clone();

        spawn_supervised("forward", async move {
            let inner = &service.inner;

            let record = if inner.broker_outbox.is_empty().await {
                match inner.handoff.send(record).await {
                    Ok(()) => return,
                    Err(e) => {
                        warn!(error = %e, "Hand-off failed, deferring to broker outbox");
                        e.into_record()
                    }
                }
            } else {
                record
            };

            let id = record.id;
            if let Err(e) = service.save_unsent_message(record).await {
                error!(id = %id, error = %e, "Message lost");
            }
        });
    }

    /// Put a record back after a failed replay step.
    async fn restore(&self, outbox: &dyn Outbox, record: MessageRecord) {
        let id = record.id;
        if let Err(e) = outbox.add(record).await {
            error!(id = %id, outbox = %outbox.name(), error = %e, "Failed to restore record, message lost");
        }
    }
}
