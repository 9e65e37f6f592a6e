//! Reads confirmation events from a Redis stream through a consumer group.
//!
//! Each relay instance reads with its own group, so every instance sees
//! every confirmation and keeps only its own. Entries stay in the group's
//! pending list until acknowledged; after a released entry or a reconnect the
//! next read starts from that pending list before taking new entries.

use crate::producer::DATA_FIELD;
use crate::{StreamConfig, StreamError, StreamResult};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, RedisResult, Value};
use relay_core::{BrokerResult, ConfirmationEvent, ConfirmationSource};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// One stream entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Redis entry id, e.g. "1234567890-0".
    pub entry_id: String,
    /// Value of the `data` field.
    pub data: Vec<u8>,
}

/// Confirmation source on a Redis stream.
pub struct RedisConfirmationSource {
    client: Client,
    conn: Mutex<MultiplexedConnection>,
    config: StreamConfig,
    read_pending: AtomicBool,
}

impl RedisConfirmationSource {
    /// Connect and make sure the consumer group exists.
    pub async fn connect(config: StreamConfig) -> StreamResult<Self> {
        let client = Client::open(config.redis_url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;

        let source = Self {
            client,
            conn: Mutex::new(conn),
            config,
            // Pick up anything left unacknowledged by a previous run.
            read_pending: AtomicBool::new(true),
        };
        source.ensure_consumer_group().await?;

        Ok(source)
    }

    async fn connection(&self) -> MultiplexedConnection {
        self.conn.lock().await.clone()
    }

    async fn ensure_consumer_group(&self) -> StreamResult<()> {
        let stream = &self.config.confirm_stream;
        let group = &self.config.consumer_group;

        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut self.connection().await)
            .await;

        match result {
            Ok(()) => info!(stream = %stream, group = %group, "Created consumer group"),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(stream = %stream, group = %group, "Consumer group already exists");
            }
            Err(e) => return Err(e.into()),
        }

        Ok(())
    }

    /// Read one entry. Pending entries of this consumer come first, then new
    /// ones with a blocking read.
    pub async fn read_next(&self) -> StreamResult<Option<StreamEntry>> {
        let pending = self.read_pending.load(Ordering::Acquire);
        let start = if pending { "0" } else { ">" };

        let value: Value = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_group)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(self.config.block_timeout_ms)
            .arg("STREAMS")
            .arg(&self.config.confirm_stream)
            .arg(start)
            .query_async(&mut self.connection().await)
            .await?;

        let entry = parse_stream_entry(value)?;
        if pending && entry.is_none() {
            debug!(stream = %self.config.confirm_stream, "Pending confirmations drained");
            self.read_pending.store(false, Ordering::Release);
        }
        Ok(entry)
    }

    /// Acknowledge an entry, removing it from the pending list.
    pub async fn acknowledge(&self, entry_id: &str) -> StreamResult<()> {
        let acked: i64 = redis::cmd("XACK")
            .arg(&self.config.confirm_stream)
            .arg(&self.config.consumer_group)
            .arg(entry_id)
            .query_async(&mut self.connection().await)
            .await?;

        if acked == 1 {
            debug!(entry_id = %entry_id, "Acknowledged confirmation");
        } else {
            warn!(entry_id = %entry_id, acked, "XACK matched no pending entry");
        }
        Ok(())
    }
}

#[async_trait]
impl ConfirmationSource for RedisConfirmationSource {
    async fn next_event(&self) -> BrokerResult<Option<ConfirmationEvent>> {
        Ok(self.read_next().await?.map(|entry| ConfirmationEvent {
            receipt: entry.entry_id,
            data: entry.data,
        }))
    }

    async fn ack(&self, receipt: &str) -> BrokerResult<()> {
        Ok(self.acknowledge(receipt).await?)
    }

    async fn nack(&self, receipt: &str) -> BrokerResult<()> {
        debug!(entry_id = %receipt, "Confirmation left pending for redelivery");
        self.read_pending.store(true, Ordering::Release);
        Ok(())
    }

    async fn reconnect(&self) -> BrokerResult<()> {
        info!("Reconnecting to Redis...");
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(StreamError::from)?;
        *self.conn.lock().await = conn;

        self.ensure_consumer_group().await?;
        self.read_pending.store(true, Ordering::Release);
        Ok(())
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(s) => Some(String::from_utf8_lossy(s).into_owned()),
        Value::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}

fn as_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::BulkString(s) => Some(s.clone()),
        Value::SimpleString(s) => Some(s.as_bytes().to_vec()),
        _ => None,
    }
}

fn protocol(msg: impl Into<String>) -> StreamError {
    StreamError::Protocol(msg.into())
}

/// Extract the first entry from an XREADGROUP reply.
///
/// Reply shape: `[[stream, [[entry_id, [field, value, ...]], ...]]]`. A nil
/// reply or an empty entry list means nothing was read.
pub fn parse_stream_entry(value: Value) -> StreamResult<Option<StreamEntry>> {
    let streams = match value {
        Value::Array(streams) => streams,
        Value::Nil => return Ok(None),
        other => return Err(protocol(format!("Unexpected XREADGROUP reply: {other:?}"))),
    };

    let Some(stream) = streams.first() else {
        return Ok(None);
    };
    let Value::Array(stream) = stream else {
        return Err(protocol("Expected array for stream"));
    };
    let Some(Value::Array(entries)) = stream.get(1) else {
        return Err(protocol("Stream reply missing entries"));
    };
    let Some(entry) = entries.first() else {
        return Ok(None);
    };
    let Value::Array(entry) = entry else {
        return Err(protocol("Expected array for entry"));
    };

    let entry_id = entry
        .first()
        .and_then(as_text)
        .ok_or_else(|| protocol("Entry missing id"))?;

    // A pending entry that was deleted from the stream comes back with nil fields.
    let fields = match entry.get(1) {
        Some(Value::Array(fields)) => fields,
        Some(Value::Nil) => {
            return Ok(Some(StreamEntry {
                entry_id,
                data: Vec::new(),
            }))
        }
        _ => return Err(protocol("Expected array for fields")),
    };

    let data = fields
        .chunks_exact(2)
        .find(|pair| as_text(&pair[0]).as_deref() == Some(DATA_FIELD))
        .and_then(|pair| as_bytes(&pair[1]))
        .ok_or_else(|| protocol(format!("Entry {entry_id} missing {DATA_FIELD} field")))?;

    Ok(Some(StreamEntry { entry_id, data }))
}
