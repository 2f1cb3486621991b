//! Newline-delimited JSON blocks for `stream-json` output.
//!
//! Each function returns exactly one JSON object on a single line, without
//! the trailing newline. Absent fields are omitted, never `null`.

use clawrun_core::Error;
use clawrun_telemetry::{SessionMetrics, TelemetryEvent};
use serde::{Deserialize, Serialize};

use super::ansi::strip_ansi;

/// Error payload of a `final` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonError {
    /// Category name, e.g. `FatalTurnLimitedError`
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
}

/// One `stream-json` output line.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamJsonBlock<'a> {
    Telemetry {
        event: &'a TelemetryEvent,
    },
    Content {
        content: String,
    },
    Final {
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        stats: Option<&'a SessionMetrics>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<JsonError>,
    },
}

impl StreamJsonBlock<'_> {
    fn to_line(&self) -> String {
        // Only string-keyed maps reach here.
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to serialise output block");
            r#"{"type":"final"}"#.to_string()
        })
    }
}

/// Stateless block formatter.
pub struct StreamJsonFormatter;

impl StreamJsonFormatter {
    pub fn format_telemetry_block(event: &TelemetryEvent) -> String {
        StreamJsonBlock::Telemetry { event }.to_line()
    }

    pub fn format_content_block(content: &str) -> String {
        StreamJsonBlock::Content {
            content: strip_ansi(content),
        }
        .to_line()
    }

    pub fn format_final_block(
        response: Option<&str>,
        stats: Option<&SessionMetrics>,
        error: Option<JsonError>,
    ) -> String {
        StreamJsonBlock::Final {
            response: response.map(strip_ansi),
            stats,
            error,
        }
        .to_line()
    }

    /// A `final` block describing `error`.
    pub fn format_error(error: &Error, code: Option<i32>) -> String {
        let error = JsonError {
            kind: error.category().to_string(),
            message: strip_ansi(&error.to_string()),
            code,
        };
        Self::format_final_block(None, None, Some(error))
    }
}
