//! OpenAI-compatible streaming backend.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, and any
//! endpoint exposing `/v1/chat/completions` with SSE streaming.
//!
//! The backend owns the conversation history. Each call to
//! `send_message_stream` appends the outgoing user message, streams the
//! model's reply as [`StreamEvent`]s, and appends the reply (text plus
//! function calls) once the stream completes.

use async_trait::async_trait;
use clawrun_config::BackendConfig;
use clawrun_core::error::ProviderError;
use clawrun_core::message::{ConversationMessage, FunctionCall, Part, Role};
use clawrun_core::provider::{Backend, EventReceiver, StreamEvent};
use clawrun_core::tool::{ToolCallRequest, ToolDefinition};
use clawrun_telemetry::{TelemetryEngine, TelemetryEvent};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

type History = Arc<Mutex<Vec<ConversationMessage>>>;

/// An OpenAI-compatible streaming backend.
pub struct OpenAiCompatBackend {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Vec<ToolDefinition>,
    client: reqwest::Client,
    history: History,
    telemetry: Option<Arc<TelemetryEngine>>,
}

impl OpenAiCompatBackend {
    /// Create a new OpenAI-compatible backend.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            tools: Vec::new(),
            client,
            history: Arc::new(Mutex::new(Vec::new())),
            telemetry: None,
        }
    }

    /// Build from the `[backend]` config section. Requires an API key.
    pub fn from_config(config: &BackendConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ProviderError::NotConfigured("no API key set".into()))?;

        let name = if config.api_url.contains("openrouter.ai") {
            "openrouter"
        } else if config.api_url.contains("api.openai.com") {
            "openai"
        } else {
            "openai-compatible"
        };

        let mut backend = Self::new(name, &config.api_url, api_key, &config.model);
        backend.temperature = config.temperature;
        backend.max_tokens = Some(config.max_tokens);
        Ok(backend)
    }

    /// Advertise these tools to the model.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Emit `api_*` telemetry into this engine.
    pub fn with_telemetry(mut self, telemetry: Arc<TelemetryEngine>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Snapshot of the current history.
    pub fn history(&self) -> Vec<ConversationMessage> {
        lock(&self.history).clone()
    }

    fn emit(&self, event: TelemetryEvent) {
        if let Some(t) = &self.telemetry {
            t.emit(event);
        }
    }

    fn emit_api_error(&self, prompt_id: &str, started: Instant, error: &ProviderError) {
        let status_code = match error {
            ProviderError::ApiError { status_code, .. } => Some(*status_code),
            ProviderError::RateLimited { .. } => Some(429),
            _ => None,
        };
        self.emit(TelemetryEvent::ApiError {
            timestamp: chrono::Utc::now(),
            model: self.model.clone(),
            prompt_id: prompt_id.to_string(),
            duration_ms: elapsed_ms(started),
            error: error.to_string(),
            status_code,
        });
    }

    fn request_body(&self, history: &[ConversationMessage]) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": to_api_messages(history),
            "temperature": self.temperature,
            "stream": true,
            "stream_options": { "include_usage": true },
        });

        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !self.tools.is_empty() {
            body["tools"] = serde_json::json!(to_api_tools(&self.tools));
        }
        body
    }

    async fn post(
        &self,
        body: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(body)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ProviderError::StreamInterrupted("request cancelled".into()));
            }
            response = request => response.map_err(|e| ProviderError::Network(e.to_string()))?,
        };

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Backend streaming error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Backend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set_history(&self, history: Vec<ConversationMessage>) -> Result<(), ProviderError> {
        debug!(messages = history.len(), "Seeding backend history");
        *lock(&self.history) = history;
        Ok(())
    }

    async fn send_message_stream(
        &self,
        parts: Vec<Part>,
        cancel: CancellationToken,
        prompt_id: &str,
    ) -> Result<EventReceiver, ProviderError> {
        let body = {
            let mut history = lock(&self.history);
            history.push(ConversationMessage::user(parts));
            self.request_body(&history)
        };

        self.emit(TelemetryEvent::api_request(&self.model, prompt_id));
        debug!(backend = %self.name, model = %self.model, "Sending streaming request");
        let started = Instant::now();

        let response = match self.post(&body, &cancel).await {
            Ok(r) => r,
            Err(e) => {
                self.emit_api_error(prompt_id, started, &e);
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::channel(64);
        let reader = StreamReader {
            model: self.model.clone(),
            prompt_id: prompt_id.to_string(),
            started,
            history: self.history.clone(),
            telemetry: self.telemetry.clone(),
        };

        // Spawn task to read the SSE byte stream and forward events
        tokio::spawn(reader.run(response, tx, cancel));

        Ok(rx)
    }
}

/// Owned state of the spawned SSE reader task.
struct StreamReader {
    model: String,
    prompt_id: String,
    started: Instant,
    history: History,
    telemetry: Option<Arc<TelemetryEngine>>,
}

impl StreamReader {
    async fn run(
        self,
        response: reqwest::Response,
        tx: mpsc::Sender<Result<StreamEvent, ProviderError>>,
        cancel: CancellationToken,
    ) {
        let mut byte_stream = response.bytes_stream();
        let mut parser = SseParser::default();

        while !parser.is_done() {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(prompt_id = %self.prompt_id, "Stream reader cancelled");
                    return;
                }
                next = byte_stream.next() => next,
            };

            let bytes = match next {
                Some(Ok(b)) => b,
                Some(Err(e)) => {
                    let error = ProviderError::StreamInterrupted(e.to_string());
                    self.emit(TelemetryEvent::ApiError {
                        timestamp: chrono::Utc::now(),
                        model: self.model.clone(),
                        prompt_id: self.prompt_id.clone(),
                        duration_ms: elapsed_ms(self.started),
                        error: error.to_string(),
                        status_code: None,
                    });
                    let _ = tx.send(Err(error)).await;
                    return;
                }
                None => break,
            };

            for delta in parser.push(&bytes) {
                if tx.send(Ok(StreamEvent::Content(delta))).await.is_err() {
                    return; // receiver dropped
                }
            }
        }

        let (text, calls, usage) = parser.finish();
        let requests: Vec<ToolCallRequest> = calls
            .into_iter()
            .map(|acc| acc.into_request(&self.prompt_id))
            .collect();

        // Record the model's turn before the loop answers its tool calls.
        let mut model_parts = Vec::new();
        if !text.is_empty() {
            model_parts.push(Part::Text(text));
        }
        model_parts.extend(requests.iter().map(|r| {
            Part::FunctionCall(FunctionCall {
                id: r.id.clone(),
                name: r.name.clone(),
                args: r.arguments.clone(),
            })
        }));
        if !model_parts.is_empty() {
            lock(&self.history).push(ConversationMessage::model(model_parts));
        }

        let usage = usage.unwrap_or_default();
        self.emit(TelemetryEvent::ApiResponse {
            timestamp: chrono::Utc::now(),
            model: self.model.clone(),
            prompt_id: self.prompt_id.clone(),
            duration_ms: elapsed_ms(self.started),
            input_token_count: usage.prompt_tokens,
            output_token_count: usage.completion_tokens,
        });

        for request in requests {
            if tx.send(Ok(StreamEvent::ToolCallRequest(request))).await.is_err() {
                return;
            }
        }
    }

    fn emit(&self, event: TelemetryEvent) {
        if let Some(t) = &self.telemetry {
            t.emit(event);
        }
    }
}

fn lock(history: &History) -> std::sync::MutexGuard<'_, Vec<ConversationMessage>> {
    history.lock().unwrap_or_else(PoisonError::into_inner)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

// --- SSE parsing ---

/// Incremental parser for a chat-completions SSE body.
#[derive(Default)]
struct SseParser {
    /// Bytes of the current incomplete line
    buffer: Vec<u8>,
    text: String,
    tool_calls: BTreeMap<u32, ToolCallAccumulator>,
    usage: Option<ApiUsage>,
    done: bool,
}

impl SseParser {
    /// Feed raw bytes; returns the content deltas completed by them.
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut deltas = Vec::new();

        // Decode only complete lines so a character split across chunks
        // stays intact.
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            // Skip empty lines and SSE comments
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();

            if data == "[DONE]" {
                self.done = true;
                break;
            }

            match serde_json::from_str::<StreamResponse>(data) {
                Ok(chunk) => {
                    if let Some(delta) = self.apply(chunk) {
                        deltas.push(delta);
                    }
                }
                Err(e) => {
                    trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
                }
            }
        }
        deltas
    }

    fn apply(&mut self, chunk: StreamResponse) -> Option<String> {
        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }

        let choice = chunk.choices.into_iter().next()?;

        for tc_delta in choice.delta.tool_calls.unwrap_or_default() {
            let acc = self.tool_calls.entry(tc_delta.index).or_default();
            if let Some(id) = tc_delta.id {
                acc.id = id;
            }
            if let Some(func) = tc_delta.function {
                if let Some(name) = func.name {
                    acc.name = name;
                }
                if let Some(args) = func.arguments {
                    acc.arguments.push_str(&args);
                }
            }
        }

        let content = choice.delta.content.filter(|c| !c.is_empty())?;
        self.text.push_str(&content);
        Some(content)
    }

    fn is_done(&self) -> bool {
        self.done
    }

    /// Full text, tool calls in index order, and usage if reported.
    fn finish(self) -> (String, Vec<ToolCallAccumulator>, Option<ApiUsage>) {
        (
            self.text,
            self.tool_calls.into_values().collect(),
            self.usage,
        )
    }
}

/// Accumulates incremental tool call deltas into a complete tool call.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn into_request(self, prompt_id: &str) -> ToolCallRequest {
        let id = if self.id.is_empty() {
            format!("call_{}", uuid::Uuid::new_v4().simple())
        } else {
            self.id
        };
        let arguments = if self.arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(&self.arguments)
                .unwrap_or(serde_json::Value::String(self.arguments))
        };
        ToolCallRequest {
            id,
            name: self.name,
            arguments,
            prompt_id: prompt_id.to_string(),
        }
    }
}

// --- History conversion ---

/// Convert history into chat-completions messages.
///
/// Function responses become `tool` messages ahead of any user text in the
/// same message, so they directly follow the assistant's `tool_calls`.
fn to_api_messages(history: &[ConversationMessage]) -> Vec<ApiMessage> {
    let mut out = Vec::new();
    for message in history {
        let text = joined_text(&message.parts);
        match message.role {
            Role::User => {
                for part in &message.parts {
                    if let Part::FunctionResponse(fr) = part {
                        out.push(ApiMessage {
                            role: "tool".into(),
                            content: Some(fr.response.to_string()),
                            tool_calls: None,
                            tool_call_id: Some(fr.id.clone()),
                        });
                    }
                }
                if let Some(text) = text {
                    out.push(ApiMessage {
                        role: "user".into(),
                        content: Some(text),
                        tool_calls: None,
                        tool_call_id: None,
                    });
                }
            }
            Role::Model => {
                let calls: Vec<ApiToolCall> = message
                    .parts
                    .iter()
                    .filter_map(|p| match p {
                        Part::FunctionCall(fc) => Some(ApiToolCall {
                            id: fc.id.clone(),
                            r#type: "function".into(),
                            function: ApiFunction {
                                name: fc.name.clone(),
                                arguments: fc.args.to_string(),
                            },
                        }),
                        _ => None,
                    })
                    .collect();
                if text.is_none() && calls.is_empty() {
                    continue;
                }
                out.push(ApiMessage {
                    role: "assistant".into(),
                    content: text,
                    tool_calls: (!calls.is_empty()).then_some(calls),
                    tool_call_id: None,
                });
            }
        }
    }
    out
}

fn joined_text(parts: &[Part]) -> Option<String> {
    let text: String = parts.iter().filter_map(Part::as_text).collect();
    (!text.is_empty()).then_some(text)
}

/// Convert tool definitions to OpenAI API format.
fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
    tools
        .iter()
        .map(|t| ApiToolDefinition {
            r#type: "function".into(),
            function: ApiToolFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
        })
        .collect()
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta: arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawrun_core::message::FunctionResponse;

    #[test]
    fn from_config_requires_key() {
        let config = BackendConfig::default();
        assert!(matches!(
            OpenAiCompatBackend::from_config(&config),
            Err(ProviderError::NotConfigured(_))
        ));

        let config = BackendConfig {
            api_key: Some("sk-test".into()),
            ..Default::default()
        };
        let backend = OpenAiCompatBackend::from_config(&config).unwrap();
        assert_eq!(backend.name(), "openrouter");
        assert!(backend.base_url.contains("openrouter.ai"));
    }

    #[tokio::test]
    async fn set_history_replaces_history() {
        let backend = OpenAiCompatBackend::new("t", "http://localhost", "k", "m");
        backend
            .set_history(vec![ConversationMessage::user(vec![Part::text("hi")])])
            .await
            .unwrap();
        assert_eq!(backend.history().len(), 1);
    }

    #[test]
    fn parser_emits_content_deltas() {
        let mut parser = SseParser::default();
        let deltas = parser.push(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n\
              data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        );
        assert_eq!(deltas, vec!["Hel", "lo"]);
        assert!(!parser.is_done());

        parser.push(b"data: [DONE]\n");
        assert!(parser.is_done());
        let (text, calls, _) = parser.finish();
        assert_eq!(text, "Hello");
        assert!(calls.is_empty());
    }

    #[test]
    fn parser_handles_lines_split_across_chunks() {
        let mut parser = SseParser::default();
        assert!(parser.push(b"data: {\"choices\":[{\"delta\":{\"con").is_empty());
        let deltas = parser.push(b"tent\":\"x\"}}]}\r\n");
        assert_eq!(deltas, vec!["x"]);
    }

    #[test]
    fn parser_keeps_multibyte_characters_split_across_chunks() {
        let mut parser = SseParser::default();
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"café\"}}]}\n\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;

        assert!(parser.push(&line[..split]).is_empty());
        let deltas = parser.push(&line[split..]);

        assert_eq!(deltas, vec!["café"]);
        assert_eq!(parser.finish().0, "café");
    }

    #[test]
    fn parser_accumulates_tool_calls_in_index_order() {
        let mut parser = SseParser::default();
        parser.push(
            br#"data: {"choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_b","function":{"name":"shell","arguments":"{\"command\":"}},{"index":0,"id":"call_a","function":{"name":"read_file","arguments":""}}]}}]}
data: {"choices":[{"delta":{"tool_calls":[{"index":1,"function":{"arguments":"\"ls\"}"}},{"index":0,"function":{"arguments":"{\"path\":\"a\"}"}}]}}]}
data: {"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}
data: [DONE]
"#,
        );
        let (_, calls, usage) = parser.finish();
        let requests: Vec<_> = calls.into_iter().map(|c| c.into_request("p")).collect();
        assert_eq!(requests[0].id, "call_a");
        assert_eq!(requests[0].arguments, serde_json::json!({"path": "a"}));
        assert_eq!(requests[1].name, "shell");
        assert_eq!(requests[1].arguments, serde_json::json!({"command": "ls"}));
        assert_eq!(requests[1].prompt_id, "p");
        assert_eq!(usage.unwrap().prompt_tokens, 10);
    }

    #[test]
    fn parser_ignores_comments_and_garbage() {
        let mut parser = SseParser::default();
        let deltas = parser.push(b": keep-alive\ndata: not json\nevent: x\n");
        assert!(deltas.is_empty());
    }

    #[test]
    fn accumulator_defaults() {
        let request = ToolCallAccumulator {
            name: "read_file".into(),
            ..Default::default()
        }
        .into_request("p");
        assert!(request.id.starts_with("call_"));
        assert_eq!(request.arguments, serde_json::json!({}));
    }

    #[test]
    fn history_conversion() {
        let history = vec![
            ConversationMessage::user(vec![Part::text("list files")]),
            ConversationMessage::model(vec![Part::FunctionCall(FunctionCall {
                id: "call_1".into(),
                name: "shell".into(),
                args: serde_json::json!({"command": "ls"}),
            })]),
            ConversationMessage::user(vec![Part::FunctionResponse(FunctionResponse {
                id: "call_1".into(),
                name: "shell".into(),
                response: serde_json::json!({"output": "a.txt"}),
            })]),
        ];
        let api = to_api_messages(&history);
        assert_eq!(api.len(), 3);
        assert_eq!(api[0].role, "user");
        assert_eq!(api[1].role, "assistant");
        assert!(api[1].content.is_none());
        let calls = api[1].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.arguments, r#"{"command":"ls"}"#);
        assert_eq!(api[2].role, "tool");
        assert_eq!(api[2].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn tool_definition_conversion() {
        let tools = vec![ToolDefinition {
            name: "shell".into(),
            description: "Run a shell command".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let api_tools = to_api_tools(&tools);
        assert_eq!(api_tools.len(), 1);
        assert_eq!(api_tools[0].function.name, "shell");
        assert_eq!(api_tools[0].r#type, "function");
    }

    #[test]
    fn request_body_includes_tools_and_stream_flag() {
        let backend = OpenAiCompatBackend::new("t", "http://x/", "k", "m").with_tools(vec![
            ToolDefinition {
                name: "read_file".into(),
                description: "d".into(),
                parameters: serde_json::json!({}),
            },
        ]);
        assert_eq!(backend.base_url, "http://x");
        let body = backend.request_body(&[ConversationMessage::user(vec![Part::text("hi")])]);
        assert_eq!(body["stream"], true);
        assert_eq!(body["model"], "m");
        assert_eq!(body["tools"][0]["function"]["name"], "read_file");
    }

    #[tokio::test]
    async fn cancelled_request_reports_api_error() {
        let telemetry = Arc::new(TelemetryEngine::new());
        let backend = OpenAiCompatBackend::new("t", "http://127.0.0.1:9", "k", "m")
            .with_telemetry(telemetry.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = backend
            .send_message_stream(vec![Part::text("hi")], cancel, "p")
            .await;
        assert!(matches!(result, Err(ProviderError::StreamInterrupted(_))));

        use clawrun_telemetry::MetricsSource;
        let metrics = telemetry.metrics();
        assert_eq!(metrics.models["m"].api.total_errors, 1);
        // The outgoing message is still part of the history.
        assert_eq!(backend.history().len(), 1);
    }
}
