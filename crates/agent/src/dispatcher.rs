//! Tool call dispatch: runs one turn's tool requests in order.

use std::sync::Arc;
use std::time::Instant;

use clawrun_core::{Error, Part, Result, ToolCallRequest, ToolExecutor};
use clawrun_telemetry::{TelemetryEngine, TelemetryEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::output::OutputSink;

/// Error type reported when the executor did not classify a failure.
pub const TOOL_EXECUTION_ERROR: &str = "TOOL_EXECUTION_ERROR";

/// A non-fatal tool failure, as reported to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolErrorReport {
    pub tool_name: String,
    pub call_id: String,
    pub message: String,
    pub error_type: String,
    pub display: Option<String>,
}

/// Where tool failures are reported.
pub trait ErrorChannel: Send + Sync {
    fn report(&self, report: &ToolErrorReport);
}

/// Reports tool failures as plain lines on a sink (normally stderr).
pub struct SinkErrorChannel {
    sink: Arc<OutputSink>,
}

impl SinkErrorChannel {
    pub fn new(sink: Arc<OutputSink>) -> Self {
        Self { sink }
    }
}

impl ErrorChannel for SinkErrorChannel {
    fn report(&self, report: &ToolErrorReport) {
        let detail = report.display.as_deref().unwrap_or(&report.message);
        self.sink.write_line(&format!(
            "Error executing tool {}: {detail}",
            report.tool_name
        ));
    }
}

/// Executes tool call requests sequentially and collects their parts.
pub struct ToolDispatcher {
    executor: Arc<dyn ToolExecutor>,
    errors: Arc<dyn ErrorChannel>,
    telemetry: Arc<TelemetryEngine>,
}

impl ToolDispatcher {
    pub fn new(
        executor: Arc<dyn ToolExecutor>,
        errors: Arc<dyn ErrorChannel>,
        telemetry: Arc<TelemetryEngine>,
    ) -> Self {
        Self {
            executor,
            errors,
            telemetry,
        }
    }

    /// Run every request in order and return their response parts in the
    /// same order. A failing tool is reported and does not stop the batch.
    /// Returns `Cancelled` if the token fires before a call starts.
    pub async fn dispatch(
        &self,
        requests: &[ToolCallRequest],
        cancel: &CancellationToken,
    ) -> Result<Vec<Part>> {
        let mut parts = Vec::new();

        for request in requests {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            debug!(tool = %request.name, call_id = %request.id, "Executing tool call");
            let started = Instant::now();
            let result = self.executor.execute(request, cancel).await;
            let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            let error_type = result.error.as_ref().map(|_| {
                result
                    .error_type
                    .clone()
                    .unwrap_or_else(|| TOOL_EXECUTION_ERROR.to_string())
            });

            self.telemetry.emit(TelemetryEvent::ToolCall {
                timestamp: chrono::Utc::now(),
                prompt_id: request.prompt_id.clone(),
                call_id: request.id.clone(),
                function_name: request.name.clone(),
                duration_ms,
                success: result.error.is_none(),
                error_type: error_type.clone(),
            });

            if let (Some(error), Some(error_type)) = (&result.error, error_type) {
                warn!(tool = %request.name, error = %error.message, "Tool execution failed");
                self.errors.report(&ToolErrorReport {
                    tool_name: request.name.clone(),
                    call_id: request.id.clone(),
                    message: error.message.clone(),
                    error_type,
                    display: result.result_display.clone(),
                });
            }

            parts.extend(result.response_parts);
        }

        Ok(parts)
    }
}
