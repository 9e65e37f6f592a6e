//! Error types for metrics operations

use thiserror::Error;

/// Errors that can occur while setting up or exporting metrics
#[derive(Debug, Error)]
pub enum MetricsError {
    /// OpenTelemetry SDK error
    #[error("OpenTelemetry error: {0}")]
    OpenTelemetry(String),

    /// Prometheus export error
    #[error("Prometheus export error: {0}")]
    PrometheusExport(String),
}

/// Result type alias using MetricsError.
pub type MetricsResult<T> = Result<T, MetricsError>;
