//! Shell tool: execute allowlisted system commands.
//!
//! Commands run in the workspace root. The child process is killed when the
//! run is cancelled.

use async_trait::async_trait;
use clawrun_core::error::ToolError;
use clawrun_core::tool::{Tool, ToolOutput};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const TOOL_NAME: &str = "shell";

/// Characters `sh -c` treats as command separators, substitutions or
/// redirections.
const SHELL_METACHARS: &[char] = &['&', '|', ';', '`', '$', '>', '<', '(', ')', '\n', '\r'];

/// Execute shell commands with an allowlist.
pub struct ShellTool {
    /// Only these base commands are allowed.
    allowed_commands: Vec<String>,
    working_dir: PathBuf,
}

impl ShellTool {
    pub fn new(allowed_commands: Vec<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            allowed_commands,
            working_dir: working_dir.into(),
        }
    }

    fn base_command(command: &str) -> &str {
        command.split_whitespace().next().unwrap_or("")
    }

    fn is_command_allowed(&self, command: &str) -> bool {
        let base = Self::base_command(command);
        // Any of these would let an allowed prefix run something else.
        let has_metachar = command.chars().any(|c| SHELL_METACHARS.contains(&c));
        !base.is_empty() && !has_metachar && self.allowed_commands.iter().any(|a| a == base)
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace and return stdout/stderr."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, ToolError> {
        let command = arguments["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;

        if !self.is_command_allowed(command) {
            return Err(ToolError::PermissionDenied {
                tool_name: TOOL_NAME.into(),
                reason: format!(
                    "Command '{}' not in allowlist",
                    Self::base_command(command)
                ),
            });
        }

        debug!(command = %command, "Executing shell command");

        let (shell, flag) = if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };
        let child = Command::new(shell)
            .args([flag, command])
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: TOOL_NAME.into(),
                reason: e.to_string(),
            })?;

        // Dropping the wait future drops the child, which kills it.
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(command = %command, "Shell command cancelled");
                return Err(ToolError::Cancelled(TOOL_NAME.into()));
            }
            output = child.wait_with_output() => output.map_err(|e| ToolError::ExecutionFailed {
                tool_name: TOOL_NAME.into(),
                reason: e.to_string(),
            })?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            return Err(ToolError::ExecutionFailed {
                tool_name: TOOL_NAME.into(),
                reason: format!("[exit code: {code}]\n{}\n{}", stdout.trim(), stderr.trim()),
            });
        }

        let text = if stderr.is_empty() {
            stdout.trim().to_string()
        } else {
            format!("{}\n[stderr]: {}", stdout.trim(), stderr.trim())
        };
        Ok(ToolOutput {
            display: Some(format!("$ {command}")),
            output: text,
        })
    }
}
