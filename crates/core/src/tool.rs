//! Tool abstractions: requests, results, and the executor seam.
//!
//! The turn loop only sees [`ToolExecutor`]. [`ToolRegistry`] is the stock
//! executor: it looks tools up by name and wraps their output in
//! `functionResponse` parts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::message::{FunctionResponse, Part};

/// A tool invocation requested by the backend mid-stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique call ID (matches the model's tool call id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value, passed through untouched
    #[serde(default)]
    pub arguments: serde_json::Value,

    /// Prompt this request belongs to
    #[serde(default)]
    pub prompt_id: String,
}

/// Error payload attached to a failed tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolErrorInfo {
    pub message: String,
}

/// The outcome of executing one tool call request.
///
/// A failed call normally still carries response parts so the model learns
/// about the failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Parts to send back to the model, in order
    #[serde(default)]
    pub response_parts: Vec<Part>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolErrorInfo>,

    /// Classification of the error, if the executor made one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,

    /// Human-readable rendering of the result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_display: Option<String>,
}

impl ToolCallResult {
    /// A successful result.
    pub fn success(response_parts: Vec<Part>, result_display: Option<String>) -> Self {
        Self {
            response_parts,
            result_display,
            ..Default::default()
        }
    }

    /// A failed result, with an error `functionResponse` for the model.
    pub fn from_error(request: &ToolCallRequest, error: &ToolError) -> Self {
        let message = error.to_string();
        Self {
            response_parts: vec![Part::FunctionResponse(FunctionResponse {
                id: request.id.clone(),
                name: request.name.clone(),
                response: serde_json::json!({ "error": message }),
            })],
            error: Some(ToolErrorInfo {
                message: message.clone(),
            }),
            error_type: Some(error.error_type().to_string()),
            result_display: Some(message),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Executes tool call requests on behalf of the turn loop.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute one request. Failures are reported inside the result, never
    /// as a panic or an `Err`.
    async fn execute(&self, request: &ToolCallRequest, cancel: &CancellationToken)
    -> ToolCallResult;
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Output of a successful tool run.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Text returned to the model
    pub output: String,

    /// Optional shorter rendering for humans
    pub display: Option<String>,
}

impl ToolOutput {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            display: None,
        }
    }
}

/// The core Tool trait.
///
/// Each built-in tool implements this trait and is registered in the
/// [`ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "shell", "read_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
        cancel: &CancellationToken,
    ) -> std::result::Result<ToolOutput, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get all tool definitions (for sending to the model), sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(
        &self,
        request: &ToolCallRequest,
        cancel: &CancellationToken,
    ) -> ToolCallResult {
        let Some(tool) = self.get(&request.name) else {
            return ToolCallResult::from_error(request, &ToolError::NotFound(request.name.clone()));
        };

        if cancel.is_cancelled() {
            return ToolCallResult::from_error(request, &ToolError::Cancelled(request.name.clone()));
        }

        match tool.execute(request.arguments.clone(), cancel).await {
            Ok(output) => ToolCallResult::success(
                vec![Part::FunctionResponse(FunctionResponse {
                    id: request.id.clone(),
                    name: request.name.clone(),
                    response: serde_json::json!({ "output": output.output }),
                })],
                output.display,
            ),
            Err(e) => {
                tracing::debug!(tool = %request.name, error = %e, "Tool returned an error");
                ToolCallResult::from_error(request, &e)
            }
        }
    }
}
