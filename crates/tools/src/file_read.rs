//! File read tool: read file contents inside the workspace.

use async_trait::async_trait;
use clawrun_core::error::ToolError;
use clawrun_core::tool::{Tool, ToolOutput};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

const TOOL_NAME: &str = "read_file";

/// Reads UTF-8 files. Relative paths resolve against the workspace root,
/// and the resolved path must stay inside it.
pub struct FileReadTool {
    workspace_root: PathBuf,
}

impl FileReadTool {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }

    /// Resolve `path` and reject anything outside the workspace.
    fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        let root = self.workspace_root.canonicalize().map_err(|e| {
            ToolError::ExecutionFailed {
                tool_name: TOOL_NAME.into(),
                reason: format!("workspace root {}: {e}", self.workspace_root.display()),
            }
        })?;

        let candidate = Path::new(path);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            root.join(candidate)
        };

        let resolved = joined.canonicalize().map_err(|e| ToolError::ExecutionFailed {
            tool_name: TOOL_NAME.into(),
            reason: format!("{path}: {e}"),
        })?;

        if !resolved.starts_with(&root) {
            return Err(ToolError::PermissionDenied {
                tool_name: TOOL_NAME.into(),
                reason: format!("{path} is outside the workspace"),
            });
        }
        Ok(resolved)
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Read the contents of a file in the workspace."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path, relative to the workspace root"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;

        let resolved = self.resolve(path)?;
        if resolved.is_dir() {
            return Err(ToolError::InvalidArguments(format!(
                "{path} is a directory"
            )));
        }

        let content = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ToolError::Cancelled(TOOL_NAME.into()));
            }
            read = tokio::fs::read_to_string(&resolved) => read.map_err(|e| {
                ToolError::ExecutionFailed {
                    tool_name: TOOL_NAME.into(),
                    reason: format!("Failed to read file: {e}"),
                }
            })?,
        };

        let display = format!("Read {} bytes from {path}", content.len());
        Ok(ToolOutput {
            output: content,
            display: Some(display),
        })
    }
}
