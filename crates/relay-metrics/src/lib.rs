//! OpenTelemetry metrics for the relay.
//!
//! Instruments are recorded through an OpenTelemetry meter whose reader is a
//! Prometheus exporter, so a scrape endpoint only has to call
//! [`RelayMetrics::render`].
//!
//! # Metrics
//!
//! | Name | Kind | Labels |
//! |------|------|--------|
//! | `relay_incoming_messages_total` | counter | |
//! | `relay_processed_messages_total` | counter | |
//! | `relay_problems_saving_total` | counter | |
//! | `relay_http_requests_total` | counter | `path` |
//! | `relay_http_request_duration_seconds` | histogram | |

mod error;

pub use error::{MetricsError, MetricsResult};

use opentelemetry::metrics::{Counter, Histogram, MeterProvider as _};
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Registry, TextEncoder};
use relay_core::Metrics;
use std::time::Duration;
use tracing::debug;

/// Label carrying the request path on HTTP metrics.
pub const PATH_LABEL: &str = "path";

/// Path label value for requests that matched no route.
pub const NON_EXISTENT_PATH: &str = "non-existent path";

/// Relay metrics collector.
///
/// Each instance owns its meter provider and Prometheus registry.
pub struct RelayMetrics {
    // Dropping the provider stops collection.
    _provider: SdkMeterProvider,
    registry: Registry,

    /// Messages accepted over HTTP
    incoming: Counter<u64>,

    /// Messages confirmed by the broker
    processed: Counter<u64>,

    /// Failed first saves
    problems_saving: Counter<u64>,

    /// HTTP requests by path
    http_requests: Counter<u64>,

    /// Distribution of HTTP request durations
    http_duration: Histogram<f64>,
}

impl RelayMetrics {
    /// Create the collector and its Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the exporter cannot be registered.
    pub fn new() -> MetricsResult<Self> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .without_scope_info()
            .without_target_info()
            .build()
            .map_err(|e| MetricsError::OpenTelemetry(e.to_string()))?;

        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        let meter = provider.meter("relay");

        let incoming = meter
            .u64_counter("relay_incoming_messages")
            .with_description("Count of incoming messages")
            .build();

        let processed = meter
            .u64_counter("relay_processed_messages")
            .with_description("Count of processed messages")
            .build();

        let problems_saving = meter
            .u64_counter("relay_problems_saving")
            .with_description("Count of saving problems")
            .build();

        let http_requests = meter
            .u64_counter("relay_http_requests")
            .with_description("Count of HTTP requests by path")
            .build();

        let http_duration = meter
            .f64_histogram("relay_http_request_duration")
            .with_unit("s")
            .with_description("Duration of HTTP requests")
            .build();

        debug!("Relay metrics registered");

        Ok(Self {
            _provider: provider,
            registry,
            incoming,
            processed,
            problems_saving,
            http_requests,
            http_duration,
        })
    }

    /// Record one HTTP request. `path` is the matched route, or
    /// [`NON_EXISTENT_PATH`].
    pub fn record_http_request(&self, path: &str, elapsed: Duration) {
        self.http_requests
            .add(1, &[KeyValue::new(PATH_LABEL, path.to_string())]);
        self.http_duration.record(elapsed.as_secs_f64(), &[]);
    }

    /// Gather every metric in the Prometheus text exposition format.
    pub fn render(&self) -> MetricsResult<String> {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .map_err(|e| MetricsError::PrometheusExport(e.to_string()))
    }
}

impl Metrics for RelayMetrics {
    fn incoming_msg_inc(&self) {
        self.incoming.add(1, &[]);
    }

    fn processed_msg_inc(&self) {
        self.processed.add(1, &[]);
    }

    fn problems_saving_in_db(&self) {
        self.problems_saving.add(1, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample<'a>(text: &'a str, name: &str, label: Option<&str>) -> Option<&'a str> {
        text.lines()
            .filter(|line| !line.starts_with('#'))
            .filter(|line| line.starts_with(name))
            .find(|line| label.map_or(true, |label| line.contains(label)))
    }

    #[test]
    fn test_service_counters_are_exported() {
        let metrics = RelayMetrics::new().unwrap();
        metrics.incoming_msg_inc();
        metrics.incoming_msg_inc();
        metrics.processed_msg_inc();
        metrics.problems_saving_in_db();

        let text = metrics.render().unwrap();
        assert!(sample(&text, "relay_incoming_messages_total", None)
            .unwrap()
            .ends_with(" 2"));
        assert!(sample(&text, "relay_processed_messages_total", None)
            .unwrap()
            .ends_with(" 1"));
        assert!(sample(&text, "relay_problems_saving_total", None)
            .unwrap()
            .ends_with(" 1"));
    }

    #[test]
    fn test_http_requests_labelled_by_path() {
        let metrics = RelayMetrics::new().unwrap();
        metrics.record_http_request("/msg", Duration::from_millis(3));
        metrics.record_http_request("/msg", Duration::from_millis(5));
        metrics.record_http_request(NON_EXISTENT_PATH, Duration::from_millis(1));

        let text = metrics.render().unwrap();
        assert!(sample(&text, "relay_http_requests_total", Some(r#"path="/msg""#))
            .unwrap()
            .ends_with(" 2"));
        assert!(
            sample(&text, "relay_http_requests_total", Some(r#"path="non-existent path""#))
                .unwrap()
                .ends_with(" 1")
        );
        assert!(sample(&text, "relay_http_request_duration_seconds_count", None)
            .unwrap()
            .ends_with(" 3"));
    }

    #[test]
    fn test_collectors_are_independent() {
        let first = RelayMetrics::new().unwrap();
        let second = RelayMetrics::new().unwrap();
        first.incoming_msg_inc();

        let text = second.render().unwrap();
        let line = sample(&text, "relay_incoming_messages_total", None);
        assert!(line.map_or(true, |line| line.ends_with(" 0")));
    }
}
