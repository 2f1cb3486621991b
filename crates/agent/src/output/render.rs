//! Mode-specific renderers driven by the turn loop.

use std::sync::Arc;

use clawrun_config::OutputFormat;
use clawrun_core::Error;
use clawrun_telemetry::{SessionMetrics, SubscriptionId, TelemetryBroadcast};

use super::json::JsonFormatter;
use super::sink::OutputSink;
use super::stream_json::StreamJsonFormatter;

/// Turns loop outputs into user-visible output for one output mode.
///
/// The loop calls `on_content` for every fragment in arrival order, then
/// exactly one of `on_complete` or `on_error`.
pub trait OutputRenderer: Send + Sync {
    /// Route telemetry into the output stream, if this mode shows it.
    /// The returned subscription is removed, and the broadcast disabled,
    /// when the run ends.
    fn attach_telemetry(&self, _broadcast: &TelemetryBroadcast) -> Option<SubscriptionId> {
        None
    }

    fn on_content(&self, fragment: &str);

    fn on_complete(&self, response: &str, stats: &SessionMetrics);

    fn on_error(&self, error: &Error);
}

/// Build the renderer for `format`.
pub fn renderer_for(
    format: OutputFormat,
    stdout: Arc<OutputSink>,
    stderr: Arc<OutputSink>,
) -> Box<dyn OutputRenderer> {
    match format {
        OutputFormat::Text => Box::new(TextRenderer { stdout, stderr }),
        OutputFormat::Json => Box::new(JsonRenderer { stdout, stderr }),
        OutputFormat::StreamJson => Box::new(StreamJsonRenderer { stdout }),
    }
}

/// Raw fragments, then a newline on natural completion.
pub struct TextRenderer {
    stdout: Arc<OutputSink>,
    stderr: Arc<OutputSink>,
}

impl OutputRenderer for TextRenderer {
    fn on_content(&self, fragment: &str) {
        self.stdout.write(fragment);
    }

    fn on_complete(&self, _response: &str, _stats: &SessionMetrics) {
        self.stdout.write("\n");
    }

    fn on_error(&self, error: &Error) {
        self.stderr.write_line(&error.to_string());
    }
}

/// Nothing until the end, then one `{response, stats}` object.
pub struct JsonRenderer {
    stdout: Arc<OutputSink>,
    stderr: Arc<OutputSink>,
}

impl OutputRenderer for JsonRenderer {
    fn on_content(&self, _fragment: &str) {}

    fn on_complete(&self, response: &str, stats: &SessionMetrics) {
        match JsonFormatter::format(response, stats) {
            Ok(out) => self.stdout.write(&out),
            Err(e) => self
                .stderr
                .write_line(&format!("Failed to render JSON output: {e}")),
        }
    }

    fn on_error(&self, error: &Error) {
        self.stderr.write_line(&error.to_string());
    }
}

/// NDJSON blocks: telemetry and content as they happen, then one `final`.
pub struct StreamJsonRenderer {
    stdout: Arc<OutputSink>,
}

impl OutputRenderer for StreamJsonRenderer {
    fn attach_telemetry(&self, broadcast: &TelemetryBroadcast) -> Option<SubscriptionId> {
        broadcast.enable();
        let sink = self.stdout.clone();
        Some(broadcast.subscribe(move |event| {
            sink.write_line(&StreamJsonFormatter::format_telemetry_block(event));
        }))
    }

    fn on_content(&self, fragment: &str) {
        self.stdout
            .write_line(&StreamJsonFormatter::format_content_block(fragment));
    }

    fn on_complete(&self, response: &str, stats: &SessionMetrics) {
        self.stdout.write_line(&StreamJsonFormatter::format_final_block(
            Some(response),
            Some(stats),
            None,
        ));
    }

    fn on_error(&self, error: &Error) {
        self.stdout.write_line(&StreamJsonFormatter::format_error(
            error,
            Some(error.exit_code()),
        ));
    }
}
