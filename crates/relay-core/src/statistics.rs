//! Throughput and buffering counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters updated by the orchestrator.
///
/// Each counter is independent; a snapshot is not a consistent cut across
/// all of them.
#[derive(Debug, Default)]
pub struct Statistics {
    total: AtomicU64,
    sent_to_outbox: AtomicU64,
    returned_from_outbox: AtomicU64,
    sent_to_broker_outbox: AtomicU64,
    returned_to_broker: AtomicU64,
}

/// Point-in-time copy of [`Statistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticSnapshot {
    /// Messages accepted for processing.
    pub total: u64,
    /// Messages buffered because the repository rejected them.
    pub messages_sent_to_outbox: u64,
    /// Messages moved from the repository outbox into the repository.
    pub messages_returned_from_outbox: u64,
    /// Messages buffered for a later broker hand-off.
    pub messages_sent_to_broker_outbox: u64,
    /// Messages replayed from the broker outbox onto the hand-off channel.
    pub messages_returned_to_broker: u64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_accepted(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sent_to_outbox(&self) {
        self.sent_to_outbox.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_returned_from_outbox(&self) {
        self.returned_from_outbox.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sent_to_broker_outbox(&self) {
        self.sent_to_broker_outbox.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_returned_to_broker(&self) {
        self.returned_to_broker.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter.
    pub fn snapshot(&self) -> StatisticSnapshot {
        StatisticSnapshot {
            total: self.total.load(Ordering::Relaxed),
            messages_sent_to_outbox: self.sent_to_outbox.load(Ordering::Relaxed),
            messages_returned_from_outbox: self.returned_from_outbox.load(Ordering::Relaxed),
            messages_sent_to_broker_outbox: self.sent_to_broker_outbox.load(Ordering::Relaxed),
            messages_returned_to_broker: self.returned_to_broker.load(Ordering::Relaxed),
        }
    }
}
