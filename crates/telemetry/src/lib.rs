//! Telemetry for ClawRun runs.
//!
//! Producers emit [`TelemetryEvent`]s into a [`TelemetryEngine`], which
//! aggregates [`SessionMetrics`], optionally writes events to a JSONL file,
//! and fans them out on a [`TelemetryBroadcast`] for the stream-json output.

pub mod broadcast;
pub mod engine;
pub mod exporter;
pub mod model;

pub use broadcast::{SubscriptionId, TelemetryBroadcast, TelemetryListener};
pub use engine::{MetricsSource, TelemetryEngine};
pub use exporter::TelemetryExporter;
pub use model::{
    ApiMetrics, ModelMetrics, SessionMetrics, TelemetryEvent, TokenMetrics, ToolCallStats,
    ToolMetrics,
};

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("telemetry I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
