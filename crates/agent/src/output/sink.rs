//! Serialised writer over stdout or stderr.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

/// A line-oriented output channel shared by the loop and telemetry listeners.
///
/// Each call writes and flushes under one lock, so concurrent writers never
/// interleave within a line. When the sink wraps stdout and the reader goes
/// away (`EPIPE`), the process exits with status 0.
pub struct OutputSink {
    writer: Mutex<Box<dyn Write + Send>>,
    exit_on_broken_pipe: bool,
}

impl OutputSink {
    pub fn stdout() -> Self {
        Self {
            writer: Mutex::new(Box::new(io::stdout())),
            exit_on_broken_pipe: true,
        }
    }

    pub fn stderr() -> Self {
        Self {
            writer: Mutex::new(Box::new(io::stderr())),
            exit_on_broken_pipe: false,
        }
    }

    /// Wrap any writer. Broken pipes are logged, not fatal.
    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            exit_on_broken_pipe: false,
        }
    }

    /// Write `text` verbatim.
    pub fn write(&self, text: &str) {
        self.emit(text.as_bytes(), false);
    }

    /// Write `line` followed by `\n`.
    pub fn write_line(&self, line: &str) {
        self.emit(line.as_bytes(), true);
    }

    fn emit(&self, bytes: &[u8], newline: bool) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        match write_flushed(&mut **writer, bytes, newline) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe && self.exit_on_broken_pipe => {
                std::process::exit(0);
            }
            Err(e) => tracing::warn!(error = %e, "Output write failed"),
        }
    }
}

fn write_flushed(writer: &mut dyn Write, bytes: &[u8], newline: bool) -> io::Result<()> {
    writer.write_all(bytes)?;
    if newline {
        writer.write_all(b"\n")?;
    }
    writer.flush()
}
