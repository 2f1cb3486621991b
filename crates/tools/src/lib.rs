//! Built-in tool implementations for ClawRun.
//!
//! Tools let the model read workspace files and run allowlisted shell
//! commands. Both honour the run's cancellation token.

pub mod file_read;
pub mod shell;

use clawrun_core::tool::ToolRegistry;
use std::path::Path;

pub use file_read::FileReadTool;
pub use shell::ShellTool;

/// Create the default tool registry.
///
/// `read_file` is always registered. `shell` is only registered when the
/// allowlist is non-empty.
pub fn default_registry(workspace_root: &Path, allowed_commands: &[String]) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(FileReadTool::new(workspace_root)));
    if !allowed_commands.is_empty() {
        registry.register(Box::new(ShellTool::new(
            allowed_commands.to_vec(),
            workspace_root,
        )));
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_includes_shell_when_allowed() {
        let registry = default_registry(Path::new("."), &["ls".to_string()]);
        let mut names = registry.names();
        names.sort();
        assert_eq!(names, vec!["read_file", "shell"]);
    }

    #[test]
    fn empty_allowlist_omits_shell() {
        let registry = default_registry(Path::new("."), &[]);
        assert_eq!(registry.names(), vec!["read_file"]);
    }
}
