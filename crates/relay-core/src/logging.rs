//! Logging initialization for relay processes.
//!
//! Every relay binary logs through `tracing`. The filter comes from `RUST_LOG`
//! when set, otherwise from the level passed in.

use std::str::FromStr;
use tracing_subscriber::EnvFilter;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable single-line output
    #[default]
    Compact,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compact" | "text" => Ok(LogFormat::Compact),
            "json" | "jsonl" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Initialize the global subscriber.
///
/// Calling this more than once is harmless; later calls leave the first
/// subscriber in place.
///
/// ```ignore
/// init_logging("info", LogFormat::Compact);
/// tracing::info!("Relay started");
/// ```
pub fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("COMPACT".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_logging("debug", LogFormat::Compact);
        init_logging("info", LogFormat::Json);
    }
}
