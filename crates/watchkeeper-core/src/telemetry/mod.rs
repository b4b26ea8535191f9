//! Telemetry module for the monitoring engine
//!
//! Prometheus metrics for scheduling, result processing, notifications and
//! external commands. The HTTP surface exposing them lives in the binary.

pub mod metrics;

pub use metrics::EngineMetrics;

use thiserror::Error;

/// Telemetry errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),

    #[error("Failed to encode metrics: {0}")]
    EncodingFailed(String),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
