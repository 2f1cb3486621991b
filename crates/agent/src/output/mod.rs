//! Output rendering for the three output modes.
//!
//! - `text`: model text written as it streams
//! - `json`: one `{response, stats}` object at the end
//! - `stream-json`: NDJSON `telemetry`/`content` blocks, then one `final`

pub mod ansi;
pub mod json;
pub mod render;
pub mod sink;
pub mod stream_json;

pub use ansi::strip_ansi;
pub use json::JsonFormatter;
pub use render::{JsonRenderer, OutputRenderer, StreamJsonRenderer, TextRenderer, renderer_for};
pub use sink::OutputSink;
pub use stream_json::{JsonError, StreamJsonBlock, StreamJsonFormatter};
