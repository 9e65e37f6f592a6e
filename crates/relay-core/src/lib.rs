//! # Relay core
//!
//! Accepts messages, stores them in a repository and hands them to a broker
//! forwarder. Either side effect may fail independently; the failed one is
//! deferred into an outbox and replayed in the background until it succeeds,
//! without blocking the caller and without losing the message.
//!
//! ## Flow
//!
//! ```text
//!  caller ──▶ RelayService::process_message
//!                 │ save ok                 │ save failed
//!                 ▼                         ▼
//!         broker outbox empty?       repository outbox
//!          yes │        │ no                │
//!              ▼        ▼                   │ retry tick
//!        hand-off   broker outbox ◀──┐      ▼
//!         channel        │ retry tick│  Repository::save_message
//!              │         ▼           │
//!              │     hand-off ───────┘ (timeout: back to the outbox)
//!              ▼
//!         Forwarder ──▶ BrokerProducer ──(failure)──▶ save_unsent_message
//!
//!  ConfirmationSource ──▶ ConfirmationListener ──▶ mark_message_as_processed
//! ```
//!
//! ## Guarantees
//!
//! - **At-least-once**: every accepted message is eventually stored and
//!   eventually forwarded, as long as outbox writes succeed.
//! - **No global ordering**: outboxes replay newest first, and online and
//!   replayed sends interleave on the hand-off channel.
//! - **One forward replay at a time**: enforced by [`RetryGate`].

mod config;
mod confirmation;
mod error;
mod forwarder;
mod gate;
mod handoff;
pub mod logging;
mod ports;
mod service;
mod statistics;
mod supervisor;

#[cfg(test)]
mod tests;

pub use config::RelayConfig;
pub use confirmation::{
    Confirmation, ConfirmationEvent, ConfirmationListener, ConfirmationOutcome, ConfirmationSource,
};
pub use error::{
    BrokerError, BrokerResult, RelayError, RelayResult, RepositoryError, RepositoryResult,
};
pub use forwarder::{BrokerProducer, Forwarder, OutboundMessage};
pub use gate::{RetryGate, RetryGuard};
pub use handoff::{HandOff, HandOffError};
pub use ports::{Metrics, NoopMetrics, ProcessedCounts, Repository};
pub use service::{Acceptance, RelayService};
pub use statistics::{StatisticSnapshot, Statistics};
pub use supervisor::spawn_supervised;

pub use relay_outbox::{MemoryOutbox, MessageRecord, Outbox, OutboxError, OutboxResult};
