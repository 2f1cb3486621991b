//! Backend trait: the abstraction over streaming model services.
//!
//! A Backend keeps the conversation history, accepts the parts of one
//! outgoing user message, and streams back content fragments and tool call
//! requests until the model's turn is over.
//!
//! Implementations: OpenAI-compatible endpoints (`clawrun-providers`),
//! scripted fakes in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::message::{ConversationMessage, Part};
use crate::tool::ToolCallRequest;

/// One event of a backend response stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A fragment of model text.
    Content(String),

    /// The model asks for a tool to be executed.
    ToolCallRequest(ToolCallRequest),
}

/// Receiving half of a backend response stream.
///
/// The stream ends when the sender is dropped; it cannot be restarted.
pub type EventReceiver = mpsc::Receiver<std::result::Result<StreamEvent, ProviderError>>;

/// The core Backend trait.
///
/// The turn loop calls `send_message_stream()` once per turn without knowing
/// which service is behind it.
#[async_trait]
pub trait Backend: Send + Sync {
    /// A human-readable name for this backend (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Replace the conversation history, e.g. from a resumed session.
    async fn set_history(
        &self,
        history: Vec<ConversationMessage>,
    ) -> std::result::Result<(), ProviderError>;

    /// Send one user message and stream the model's response.
    ///
    /// `parts` is never empty. The backend should stop producing events
    /// promptly once `cancel` fires.
    async fn send_message_stream(
        &self,
        parts: Vec<Part>,
        cancel: CancellationToken,
        prompt_id: &str,
    ) -> std::result::Result<EventReceiver, ProviderError>;
}
