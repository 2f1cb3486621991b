//! Thread-safe telemetry engine: records session metrics, exports events,
//! and fans them out on the broadcast channel.

use crate::broadcast::TelemetryBroadcast;
use crate::exporter::TelemetryExporter;
use crate::model::{SessionMetrics, TelemetryEvent};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Read access to the metrics aggregated for the current run.
pub trait MetricsSource: Send + Sync {
    fn metrics(&self) -> SessionMetrics;
}

/// The core telemetry engine.
///
/// Every producer (backend, dispatcher, loop) calls [`emit`](Self::emit).
/// Events update the running totals first, then go to the exporter, then to
/// broadcast listeners. A disabled engine drops everything.
pub struct TelemetryEngine {
    enabled: bool,
    metrics: RwLock<SessionMetrics>,
    broadcast: Arc<TelemetryBroadcast>,
    exporter: Mutex<Option<TelemetryExporter>>,
}

impl TelemetryEngine {
    /// Create an enabled engine with its own broadcast channel.
    pub fn new() -> Self {
        Self::with_broadcast(Arc::new(TelemetryBroadcast::new()))
    }

    /// Create an enabled engine that publishes on a shared broadcast.
    pub fn with_broadcast(broadcast: Arc<TelemetryBroadcast>) -> Self {
        Self {
            enabled: true,
            metrics: RwLock::new(SessionMetrics::default()),
            broadcast,
            exporter: Mutex::new(None),
        }
    }

    /// Create an engine that records and publishes nothing.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    /// Attach a file exporter.
    pub fn with_exporter(self, exporter: TelemetryExporter) -> Self {
        *self.exporter.lock().unwrap_or_else(PoisonError::into_inner) = Some(exporter);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn broadcast(&self) -> &Arc<TelemetryBroadcast> {
        &self.broadcast
    }

    /// Record, export, and publish one event.
    pub fn emit(&self, event: TelemetryEvent) {
        if !self.enabled {
            return;
        }

        self.metrics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .record(&event);

        if let Some(exporter) = self
            .exporter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            if let Err(e) = exporter.export(&event) {
                tracing::warn!(path = %exporter.path().display(), error = %e, "Telemetry export failed");
            }
        }

        let delivered = self.broadcast.publish(&event);
        tracing::trace!(event = event.name(), delivered, "Telemetry event emitted");
    }

    /// Flush and release the exporter. Safe to call more than once.
    pub fn shutdown(&self) {
        let exporter = self
            .exporter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut exporter) = exporter {
            if let Err(e) = exporter.flush() {
                tracing::warn!(error = %e, "Telemetry flush failed");
            } else {
                tracing::debug!(path = %exporter.path().display(), "Telemetry flushed");
            }
        }
    }
}

impl MetricsSource for TelemetryEngine {
    fn metrics(&self) -> SessionMetrics {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for TelemetryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn api_response(model: &str) -> TelemetryEvent {
        TelemetryEvent::ApiResponse {
            timestamp: Utc::now(),
            model: model.into(),
            prompt_id: "p".into(),
            duration_ms: 10,
            input_token_count: 5,
            output_token_count: 7,
        }
    }

    #[test]
    fn emit_updates_metrics() {
        let engine = TelemetryEngine::new();
        engine.emit(api_response("m"));
        engine.emit(api_response("m"));
        let metrics = engine.metrics();
        assert_eq!(metrics.models["m"].api.total_requests, 2);
        assert_eq!(metrics.models["m"].tokens.total, 24);
    }

    #[test]
    fn emit_publishes_only_when_broadcast_enabled() {
        let engine = TelemetryEngine::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        engine
            .broadcast()
            .subscribe(move |e| sink.lock().unwrap().push(e.name()));

        engine.emit(TelemetryEvent::user_prompt("p", 1));
        assert!(seen.lock().unwrap().is_empty());

        engine.broadcast().enable();
        engine.emit(TelemetryEvent::api_request("m", "p"));
        assert_eq!(*seen.lock().unwrap(), vec!["api_request"]);
        // Metrics are recorded regardless of the broadcast gate.
        assert!(engine.metrics().models.is_empty());
    }

    #[test]
    fn disabled_engine_drops_events() {
        let engine = TelemetryEngine::disabled();
        engine.broadcast().enable();
        let seen = Arc::new(Mutex::new(0));
        let sink = seen.clone();
        engine.broadcast().subscribe(move |_| *sink.lock().unwrap() += 1);

        engine.emit(api_response("m"));
        assert_eq!(*seen.lock().unwrap(), 0);
        assert_eq!(engine.metrics(), SessionMetrics::default());
    }

    #[test]
    fn shutdown_flushes_exporter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.jsonl");
        let engine =
            TelemetryEngine::new().with_exporter(TelemetryExporter::open(&path).unwrap());

        engine.emit(TelemetryEvent::user_prompt("p", 2));
        engine.shutdown();
        engine.shutdown();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }
}
