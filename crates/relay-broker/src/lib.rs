//! Redis Streams broker adapter.
//!
//! This crate provides:
//! - RedisStreamProducer: Publishes relayed messages with XADD
//! - RedisConfirmationSource: Reads confirmations through a consumer group
//! - StreamConfig: Stream names and read tuning

mod config;
mod consumer;
mod error;
mod producer;

pub use config::StreamConfig;
pub use consumer::{parse_stream_entry, RedisConfirmationSource, StreamEntry};
pub use error::{StreamError, StreamResult};
pub use producer::{RedisStreamProducer, DATA_FIELD};
