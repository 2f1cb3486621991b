//! Single-object output for `json` mode.

use clawrun_telemetry::SessionMetrics;
use serde::Serialize;

use super::ansi::strip_ansi;

#[derive(Serialize)]
struct JsonOutput<'a> {
    response: String,
    stats: &'a SessionMetrics,
}

/// Renders the whole run as one pretty-printed `{response, stats}` object.
pub struct JsonFormatter;

impl JsonFormatter {
    pub fn format(response: &str, stats: &SessionMetrics) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&JsonOutput {
            response: strip_ansi(response),
            stats,
        })
    }
}
