//! Durable outbox on a Redis list.
//!
//! Each outbox owns the list at `rop:<name>:<instance>`. One logical entry is
//! two consecutive list elements, `[payload, id-as-text]` reading from the
//! head, pushed by a single LPUSH and removed by a single `LPOP key 2`, so an
//! entry is never half-written or half-read.

use crate::{MessageRecord, Outbox, OutboxError, OutboxResult};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;
use tracing::{debug, info};
use uuid::Uuid;

/// Key prefix shared by every outbox list.
pub const OUTBOX_KEY_PREFIX: &str = "rop";

/// List elements per logical entry.
const ENTRY_WIDTH: usize = 2;

/// Redis-backed outbox.
pub struct RedisOutbox {
    conn: MultiplexedConnection,
    name: String,
    key: String,
}

impl RedisOutbox {
    /// Connect to Redis and create an outbox.
    ///
    /// Fails if the server cannot be reached; callers treat this as fatal at
    /// startup.
    pub async fn connect(redis_url: &str, name: &str, instance: &str) -> OutboxResult<Self> {
        let client = Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Self::with_connection(conn, name, instance).await
    }

    /// Create an outbox on an existing connection, verifying it with PING.
    pub async fn with_connection(
        mut conn: MultiplexedConnection,
        name: &str,
        instance: &str,
    ) -> OutboxResult<Self> {
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        let key = outbox_key(name, instance);
        info!(outbox = %name, key = %key, reply = %pong, "Redis outbox ready");

        Ok(Self {
            conn,
            name: name.to_string(),
            key,
        })
    }

    /// The list key this outbox writes to.
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl Outbox for RedisOutbox {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add(&self, record: MessageRecord) -> OutboxResult<()> {
        validate(&record)?;

        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("LPUSH")
            .arg(&self.key)
            .arg(record.id.to_string())
            .arg(&record.payload)
            .query_async(&mut conn)
            .await?;

        debug!(outbox = %self.name, id = %record.id, "Added to outbox");
        Ok(())
    }

    async fn try_pop(&self) -> OutboxResult<Option<MessageRecord>> {
        let mut conn = self.conn.clone();
        let elements: Option<Vec<Vec<u8>>> = redis::cmd("LPOP")
            .arg(&self.key)
            .arg(ENTRY_WIDTH)
            .query_async(&mut conn)
            .await?;

        match elements {
            None => Ok(None),
            Some(elements) if elements.is_empty() => Ok(None),
            Some(elements) => {
                let record = decode_entry(&self.name, elements)?;
                debug!(outbox = %self.name, id = %record.id, "Popped from outbox");
                Ok(Some(record))
            }
        }
    }

    async fn try_len(&self) -> OutboxResult<usize> {
        let mut conn = self.conn.clone();
        let elements: usize = redis::cmd("LLEN")
            .arg(&self.key)
            .query_async(&mut conn)
            .await?;
        Ok(elements / ENTRY_WIDTH)
    }
}

/// Build the list key for an outbox name and instance id.
fn outbox_key(name: &str, instance: &str) -> String {
    format!("{}:{}:{}", OUTBOX_KEY_PREFIX, name, instance)
}

/// Reject records the durable store must never hold.
fn validate(record: &MessageRecord) -> OutboxResult<()> {
    if record.payload.is_empty() {
        return Err(OutboxError::InvalidRecord("payload is empty".to_string()));
    }
    if record.id.is_nil() {
        return Err(OutboxError::InvalidRecord("id is nil".to_string()));
    }
    Ok(())
}

/// Rebuild a record from the `[payload, id]` pair returned by LPOP.
fn decode_entry(outbox: &str, mut elements: Vec<Vec<u8>>) -> OutboxResult<MessageRecord> {
    if elements.len() != ENTRY_WIDTH {
        return Err(OutboxError::Malformed {
            outbox: outbox.to_string(),
            reason: format!("expected {} elements, got {}", ENTRY_WIDTH, elements.len()),
        });
    }

    let id_bytes = elements.pop().unwrap_or_default();
    let payload = elements.pop().unwrap_or_default();

    let id_text = String::from_utf8(id_bytes).map_err(|e| OutboxError::Malformed {
        outbox: outbox.to_string(),
        reason: format!("id is not UTF-8: {}", e),
    })?;
    let id = Uuid::parse_str(&id_text).map_err(|e| OutboxError::Malformed {
        outbox: outbox.to_string(),
        reason: format!("id {:?} is not a UUID: {}", id_text, e),
    })?;

    Ok(MessageRecord { id, payload })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbox_key_layout() {
        assert_eq!(
            outbox_key("brokerOutbox", "instance-1"),
            "rop:brokerOutbox:instance-1"
        );
        assert_ne!(
            outbox_key("brokerOutbox", "instance-1"),
            outbox_key("repoOutbox", "instance-1")
        );
        assert_ne!(
            outbox_key("repoOutbox", "instance-1"),
            outbox_key("repoOutbox", "instance-2")
        );
    }

    #[test]
    fn test_validate_rejects_empty_payload() {
        let record = MessageRecord::new(Uuid::new_v4(), Vec::new());
        assert!(matches!(validate(&record), Err(OutboxError::InvalidRecord(_))));
    }

    #[test]
    fn test_validate_rejects_nil_id() {
        let record = MessageRecord::new(Uuid::nil(), "payload");
        assert!(matches!(validate(&record), Err(OutboxError::InvalidRecord(_))));
    }

    #[test]
    fn test_validate_accepts_complete_record() {
        let record = MessageRecord::new(Uuid::new_v4(), "payload");
        assert!(validate(&record).is_ok());
    }

    #[test]
    fn test_decode_entry_restores_record() {
        let id = Uuid::new_v4();
        let elements = vec![b"hello".to_vec(), id.to_string().into_bytes()];

        let record = decode_entry("repoOutbox", elements).unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.payload, b"hello".to_vec());
    }

    #[test]
    fn test_decode_entry_rejects_short_result() {
        let err = decode_entry("repoOutbox", vec![b"hello".to_vec()]).unwrap_err();
        assert!(matches!(err, OutboxError::Malformed { .. }));
    }

    #[test]
    fn test_decode_entry_rejects_bad_uuid() {
        let elements = vec![b"hello".to_vec(), b"not-a-uuid".to_vec()];
        let err = decode_entry("repoOutbox", elements).unwrap_err();
        assert!(err.to_string().contains("not a UUID"));
    }

    // The tests below need a running Redis server:
    // REDIS_URL=redis://127.0.0.1:6379 cargo test -- --ignored

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    async fn fresh_outbox(name: &str) -> RedisOutbox {
        let instance = Uuid::new_v4().to_string();
        RedisOutbox::connect(&redis_url(), name, &instance).await.unwrap()
    }

    #[tokio::test]
    #[ignore]
    async fn test_round_trip() {
        let outbox = fresh_outbox("repoOutbox").await;
        let record = MessageRecord::new(Uuid::new_v4(), vec![0u8, 159, 146, 150, 255]);

        outbox.add(record.clone()).await.unwrap();
        assert_eq!(outbox.len().await, 1);

        let popped = outbox.pop().await;
        assert_eq!(popped, record);
        assert!(outbox.is_empty().await);
    }

    #[tokio::test]
    #[ignore]
    async fn test_pop_on_empty_returns_zero_value() {
        let outbox = fresh_outbox("brokerOutbox").await;

        assert_eq!(outbox.pop().await, MessageRecord::default());
        assert_eq!(outbox.len().await, 0);
    }

    #[tokio::test]
    #[ignore]
    async fn test_lifo_order_across_entries() {
        let outbox = fresh_outbox("repoOutbox").await;
        let first = MessageRecord::new(Uuid::new_v4(), "first");
        let second = MessageRecord::new(Uuid::new_v4(), "second");

        outbox.add(first.clone()).await.unwrap();
        outbox.add(second.clone()).await.unwrap();
        assert_eq!(outbox.len().await, 2);

        assert_eq!(outbox.pop().await, second);
        assert_eq!(outbox.pop().await, first);
    }

    #[tokio::test]
    #[ignore]
    async fn test_add_rejects_invalid_record() {
        let outbox = fresh_outbox("repoOutbox").await;

        let result = outbox.add(MessageRecord::default()).await;
        assert!(matches!(result, Err(OutboxError::InvalidRecord(_))));
        assert_eq!(outbox.len().await, 0);
    }
}
