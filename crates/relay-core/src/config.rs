//! Configuration for the relay orchestrator.

use std::time::Duration;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Identifier of this relay instance; confirmations for other instances are ignored
    pub instance: String,

    /// Period of the background replay loop
    pub retry_interval: Duration,

    /// How long a hand-off send waits for the forwarder
    pub handoff_timeout: Duration,

    /// Hand-off channel capacity
    pub handoff_capacity: usize,

    /// Upper bound on a single broker write
    pub broker_write_timeout: Duration,

    /// Pause after a failed broker write
    pub broker_retry_delay: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            instance: format!("relay-{}", uuid::Uuid::new_v4()),
            retry_interval: Duration::from_secs(5),
            handoff_timeout: Duration::from_secs(5),
            handoff_capacity: 1,
            broker_write_timeout: Duration::from_secs(5),
            broker_retry_delay: Duration::from_secs(1),
        }
    }
}

impl RelayConfig {
    /// Build a configuration from `RELAY_*` environment variables, falling back
    /// to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let millis = |key: &str, fallback: Duration| {
            lookup(key)
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(fallback)
        };

        Self {
            instance: lookup("RELAY_INSTANCE")
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.instance),
            retry_interval: millis("RELAY_RETRY_INTERVAL_MS", defaults.retry_interval),
            handoff_timeout: millis("RELAY_HANDOFF_TIMEOUT_MS", defaults.handoff_timeout),
            handoff_capacity: lookup("RELAY_HANDOFF_CAPACITY")
                .and_then(|s| s.parse::<usize>().ok())
                .map(|c| c.max(1))
                .unwrap_or(defaults.handoff_capacity),
            broker_write_timeout: millis(
                "RELAY_BROKER_WRITE_TIMEOUT_MS",
                defaults.broker_write_timeout,
            ),
            broker_retry_delay: millis("RELAY_BROKER_RETRY_DELAY_MS", defaults.broker_retry_delay),
        }
    }

    /// Override the instance identifier.
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert!(config.instance.starts_with("relay-"));
        assert_eq!(config.retry_interval, Duration::from_secs(5));
        assert_eq!(config.handoff_capacity, 1);
    }

    #[test]
    fn test_default_instances_are_unique() {
        assert_ne!(RelayConfig::default().instance, RelayConfig::default().instance);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = RelayConfig::from_lookup(lookup_from(&[
            ("RELAY_INSTANCE", "node-a"),
            ("RELAY_RETRY_INTERVAL_MS", "250"),
            ("RELAY_HANDOFF_TIMEOUT_MS", "10"),
            ("RELAY_HANDOFF_CAPACITY", "4"),
            ("RELAY_BROKER_WRITE_TIMEOUT_MS", "300"),
            ("RELAY_BROKER_RETRY_DELAY_MS", "20"),
        ]));

        assert_eq!(config.instance, "node-a");
        assert_eq!(config.retry_interval, Duration::from_millis(250));
        assert_eq!(config.handoff_timeout, Duration::from_millis(10));
        assert_eq!(config.handoff_capacity, 4);
        assert_eq!(config.broker_write_timeout, Duration::from_millis(300));
        assert_eq!(config.broker_retry_delay, Duration::from_millis(20));
    }

    #[test]
    fn test_from_lookup_ignores_garbage() {
        let config = RelayConfig::from_lookup(lookup_from(&[
            ("RELAY_RETRY_INTERVAL_MS", "soon"),
            ("RELAY_HANDOFF_CAPACITY", "0"),
            ("RELAY_INSTANCE", ""),
        ]));

        assert_eq!(config.retry_interval, Duration::from_secs(5));
        assert_eq!(config.handoff_capacity, 1);
        assert!(config.instance.starts_with("relay-"));
    }
}
