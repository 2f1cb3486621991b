//! Error types for the ClawRun domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! The top-level [`Error`] distinguishes the fatal run outcomes (input,
//! turn limit, cancellation) from unclassified failures; each bounded
//! context keeps its own error enum.

use thiserror::Error;

/// The top-level error type for all ClawRun operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Fatal run outcomes ---
    #[error("{0}")]
    Input(String),

    #[error(
        "Reached max session turns for this session. Increase the number of turns by specifying max_session_turns in config.toml."
    )]
    MaxTurnsExceeded { max_turns: i64 },

    #[error("Operation cancelled.")]
    Cancelled,

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- I/O ---
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The category name reported in structured error output.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Input(_) => "FatalInputError",
            Self::MaxTurnsExceeded { .. } => "FatalTurnLimitedError",
            Self::Cancelled => "FatalCancellationError",
            _ => "Error",
        }
    }

    /// Process exit code the CLI maps this error to.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Input(_) => 42,
            Self::MaxTurnsExceeded { .. } => 53,
            Self::Cancelled => 130,
            _ => 1,
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool cancelled: {0}")]
    Cancelled(String),
}

impl ToolError {
    /// Stable classification tag carried on a failed tool result.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "TOOL_NOT_REGISTERED",
            Self::ExecutionFailed { .. } => "EXECUTION_FAILED",
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::InvalidArguments(_) => "INVALID_TOOL_PARAMS",
            Self::Cancelled(_) => "EXECUTION_CANCELLED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
        assert_eq!(err.category(), "Error");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn fatal_errors_have_distinct_codes() {
        assert_eq!(Error::Input("bad @".into()).exit_code(), 42);
        assert_eq!(Error::MaxTurnsExceeded { max_turns: 3 }.exit_code(), 53);
        assert_eq!(Error::Cancelled.exit_code(), 130);
    }

    #[test]
    fn fatal_error_categories() {
        assert_eq!(Error::Input("x".into()).category(), "FatalInputError");
        assert_eq!(
            Error::MaxTurnsExceeded { max_turns: 1 }.category(),
            "FatalTurnLimitedError"
        );
        assert_eq!(Error::Cancelled.category(), "FatalCancellationError");
    }

    #[test]
    fn max_turns_message_mentions_setting() {
        let err = Error::MaxTurnsExceeded { max_turns: 2 };
        assert!(err.to_string().contains("max_session_turns"));
    }

    #[test]
    fn tool_error_types() {
        assert_eq!(ToolError::NotFound("x".into()).error_type(), "TOOL_NOT_REGISTERED");
        assert_eq!(
            ToolError::InvalidArguments("x".into()).error_type(),
            "INVALID_TOOL_PARAMS"
        );
        let err = Error::Tool(ToolError::PermissionDenied {
            tool_name: "shell".into(),
            reason: "command not in allowlist".into(),
        });
        assert!(err.to_string().contains("shell"));
        assert!(err.to_string().contains("allowlist"));
    }
}
