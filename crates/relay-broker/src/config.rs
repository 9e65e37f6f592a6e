//! Configuration for the Redis Streams adapter.

/// Stream adapter configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Redis connection URL
    pub redis_url: String,

    /// Stream the relay publishes messages to
    pub message_stream: String,

    /// Stream confirmations are read from
    pub confirm_stream: String,

    /// Consumer group and consumer name; one group per relay instance
    pub consumer_group: String,

    /// XREADGROUP block timeout in milliseconds
    pub block_timeout_ms: u64,

    /// Approximate cap on the message stream length (XADD MAXLEN ~)
    pub max_len: Option<usize>,
}

impl StreamConfig {
    /// Defaults for `instance`, overridable through `RELAY_MESSAGE_STREAM`,
    /// `RELAY_CONFIRM_STREAM`, `RELAY_BLOCK_MS` and `RELAY_STREAM_MAXLEN`.
    pub fn new(redis_url: impl Into<String>, instance: impl Into<String>) -> Self {
        Self::from_lookup(redis_url, instance, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(redis_url: impl Into<String>, instance: impl Into<String>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            redis_url: redis_url.into(),
            message_stream: lookup("RELAY_MESSAGE_STREAM").unwrap_or_else(|| "relay:messages".to_string()),
            confirm_stream: lookup("RELAY_CONFIRM_STREAM")
                .unwrap_or_else(|| "relay:confirmations".to_string()),
            consumer_group: instance.into(),
            block_timeout_ms: lookup("RELAY_BLOCK_MS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(5000),
            max_len: lookup("RELAY_STREAM_MAXLEN").and_then(|s| s.parse().ok()),
        }
    }

    pub fn with_streams(mut self, message_stream: impl Into<String>, confirm_stream: impl Into<String>) -> Self {
        self.message_stream = message_stream.into();
        self.confirm_stream = confirm_stream.into();
        self
    }
}
