//! # ClawRun Core
//!
//! Domain types, collaborator traits, and error definitions for the ClawRun
//! headless agent. The turn loop in `clawrun-agent` is written purely against
//! the traits defined here, so every collaborator can be swapped for a fake.
//!
//! ## Collaborators
//!
//! - [`Backend`] streams model output for one outgoing message
//! - [`ToolExecutor`] runs one tool call request
//! - [`QueryPreprocessor`] expands the raw user input before the first turn

pub mod error;
pub mod message;
pub mod preprocess;
pub mod provider;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use message::{ConversationMessage, FunctionCall, FunctionResponse, Part, Role};
pub use preprocess::{PassthroughPreprocessor, ProcessedQuery, QueryPreprocessor};
pub use provider::{Backend, EventReceiver, StreamEvent};
pub use session::{ResumedMessage, ResumedMessageKind, ResumedSessionState};
pub use tool::{
    Tool, ToolCallRequest, ToolCallResult, ToolDefinition, ToolErrorInfo, ToolExecutor,
    ToolOutput, ToolRegistry,
};
