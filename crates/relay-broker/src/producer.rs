//! Publishes relayed messages to a Redis stream.

use crate::{StreamConfig, StreamResult};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;
use relay_core::{BrokerProducer, BrokerResult, OutboundMessage};
use tracing::{debug, info};

/// Stream field holding the JSON-encoded message.
pub const DATA_FIELD: &str = "data";

/// XADD-based broker producer.
pub struct RedisStreamProducer {
    conn: MultiplexedConnection,
    stream: String,
    max_len: Option<usize>,
}

impl RedisStreamProducer {
    pub async fn connect(config: &StreamConfig) -> StreamResult<Self> {
        let client = Client::open(config.redis_url.as_str())?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;

        info!(stream = %config.message_stream, "Broker producer connected");
        Ok(Self {
            conn,
            stream: config.message_stream.clone(),
            max_len: config.max_len,
        })
    }

    /// Append one message; returns the stream entry id.
    pub async fn send(&self, message: &OutboundMessage) -> StreamResult<String> {
        let data = serde_json::to_vec(message)?;

        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.stream);
        if let Some(max_len) = self.max_len {
            cmd.arg("MAXLEN").arg("~").arg(max_len);
        }
        cmd.arg("*").arg(DATA_FIELD).arg(data);

        let entry_id: String = cmd.query_async(&mut self.conn.clone()).await?;
        debug!(id = %message.id, entry_id = %entry_id, stream = %self.stream, "Published message");
        Ok(entry_id)
    }
}

#[async_trait]
impl BrokerProducer for RedisStreamProducer {
    async fn publish(&self, message: &OutboundMessage) -> BrokerResult<()> {
        self.send(message).await?;
        Ok(())
    }
}
