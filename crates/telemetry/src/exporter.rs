//! JSON Lines export of telemetry events to a local file.

use crate::TelemetryError;
use crate::model::TelemetryEvent;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Appends one JSON object per event to a file.
pub struct TelemetryExporter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl TelemetryExporter {
    /// Open (or create) `path` in append mode. Parent directories are created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TelemetryError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn export(&mut self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), TelemetryError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("telemetry.jsonl");

        let mut exporter = TelemetryExporter::open(&path).unwrap();
        exporter
            .export(&TelemetryEvent::user_prompt("p", 4))
            .unwrap();
        exporter
            .export(&TelemetryEvent::api_request("m", "p"))
            .unwrap();
        exporter.flush().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event_name"], "user_prompt");
    }

    #[test]
    fn appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.jsonl");
        std::fs::write(&path, "{}\n").unwrap();

        let mut exporter = TelemetryExporter::open(&path).unwrap();
        exporter
            .export(&TelemetryEvent::user_prompt("p", 1))
            .unwrap();
        exporter.flush().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }
}
