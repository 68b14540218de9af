//! # History Telemetry
//!
//! Logging and metrics for the transaction-history replica.
//!
//! ## Components
//!
//! - **Logs**: `tracing` events rendered by `tracing-subscriber`, pretty in
//!   development and JSON lines in containers.
//! - **Metrics**: Prometheus counters and gauges under `qc_history_*`,
//!   exposed as text via [`gather_metrics`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use history_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _logger = init_telemetry(&TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `history-replica` | Service name in logs |
//! | `QC_LOG_LEVEL` | `info` | Log level filter |
//! | `QC_JSON_LOGS` | `false` | JSON log lines |
//! | `QC_CONSOLE_OUTPUT` | `true` | Write logs to stdout |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{init_logging, StructuredLogger};
pub use metrics::{
    gather_metrics, register_metrics, EVENTS_DROPPED, EVENTS_RECEIVED, EVENT_PROCESSING_DURATION,
    HANDLER_FAILURES, LEDGER_INCONSISTENCIES, QUEUE_DEPTH, RECORDS_PERSISTED,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Register metrics and install the global log subscriber.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<StructuredLogger, TelemetryError> {
    register_metrics()?;
    init_logging(config)
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_inc_macro() {
        let before = EVENTS_DROPPED.with_label_values(&["untagged"]).get();
        metric_inc!(EVENTS_DROPPED, &["untagged"]);
        assert_eq!(EVENTS_DROPPED.with_label_values(&["untagged"]).get(), before + 1);
    }

    #[test]
    fn test_error_display() {
        let err = TelemetryError::Config("bad level".into());
        assert_eq!(err.to_string(), "Invalid configuration: bad level");
    }
}
