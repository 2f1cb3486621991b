//! Shared fakes for agent tests.

use async_trait::async_trait;
use clawrun_core::error::ProviderError;
use clawrun_core::message::{ConversationMessage, Part};
use clawrun_core::provider::{Backend, EventReceiver, StreamEvent};
use clawrun_core::tool::{ToolCallRequest, ToolCallResult, ToolErrorInfo, ToolExecutor};
use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::{ErrorChannel, ToolErrorReport};

/// One scripted action of a backend response stream.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Content(String),
    Tool(ToolCallRequest),
    /// Fire the run's cancellation token.
    Cancel,
    Fail(ProviderError),
}

pub fn content(text: &str) -> ScriptStep {
    ScriptStep::Content(text.to_string())
}

pub fn tool(name: &str) -> ScriptStep {
    ScriptStep::Tool(request(name))
}

/// A request for tool `name` with id `call_<name>`.
pub fn request(name: &str) -> ToolCallRequest {
    ToolCallRequest {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: serde_json::json!({}),
        prompt_id: "prompt-1".into(),
    }
}

/// A backend that replays one script per turn.
///
/// Panics if more turns are requested than scripted, unless built with
/// [`ScriptedBackend::repeating`].
pub struct ScriptedBackend {
    turns: Mutex<VecDeque<Vec<ScriptStep>>>,
    repeat: Option<Vec<ScriptStep>>,
    sent: Mutex<Vec<Vec<Part>>>,
    history: Mutex<Option<Vec<ConversationMessage>>>,
}

impl ScriptedBackend {
    pub fn new(turns: Vec<Vec<ScriptStep>>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            repeat: None,
            sent: Mutex::new(Vec::new()),
            history: Mutex::new(None),
        }
    }

    /// Replay the same script on every turn, forever.
    pub fn repeating(script: Vec<ScriptStep>) -> Self {
        Self {
            repeat: Some(script),
            ..Self::new(Vec::new())
        }
    }

    /// Parts of every message sent so far.
    pub fn sent(&self) -> Vec<Vec<Part>> {
        self.sent.lock().unwrap().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn seeded_history(&self) -> Option<Vec<ConversationMessage>> {
        self.history.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn set_history(&self, history: Vec<ConversationMessage>) -> Result<(), ProviderError> {
        *self.history.lock().unwrap() = Some(history);
        Ok(())
    }

    async fn send_message_stream(
        &self,
        parts: Vec<Part>,
        cancel: CancellationToken,
        _prompt_id: &str,
    ) -> Result<EventReceiver, ProviderError> {
        assert!(!parts.is_empty(), "sent an empty message");
        let call = self.sent.lock().unwrap().len();
        self.sent.lock().unwrap().push(parts);

        let script = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.repeat.clone())
            .unwrap_or_else(|| panic!("ScriptedBackend: no script for turn #{}", call + 1));

        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            for step in script {
                let event = match step {
                    ScriptStep::Content(text) => Ok(StreamEvent::Content(text)),
                    ScriptStep::Tool(req) => Ok(StreamEvent::ToolCallRequest(req)),
                    ScriptStep::Fail(e) => Err(e),
                    ScriptStep::Cancel => {
                        cancel.cancel();
                        continue;
                    }
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

type Responder = Box<dyn Fn(&ToolCallRequest) -> ToolCallResult + Send + Sync>;

/// A tool executor that records calls and answers from a closure.
pub struct RecordingExecutor {
    respond: Responder,
    failures: HashMap<String, Option<String>>,
    calls: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn with(
        respond: impl Fn(&ToolCallRequest) -> ToolCallResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            failures: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call succeeds with one text part `<name>-result`.
    pub fn echo() -> Self {
        Self::with(|req| ToolCallResult::success(vec![Part::text(format!("{}-result", req.name))], None))
    }

    /// Make calls to `name` fail with no response parts.
    pub fn fail(mut self, name: &str, error_type: Option<&str>) -> Self {
        self.failures
            .insert(name.to_string(), error_type.map(String::from));
        self
    }

    /// Tool names in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for RecordingExecutor {
    async fn execute(
        &self,
        request: &ToolCallRequest,
        _cancel: &CancellationToken,
    ) -> ToolCallResult {
        self.calls.lock().unwrap().push(request.name.clone());
        match self.failures.get(&request.name) {
            Some(error_type) => ToolCallResult {
                response_parts: Vec::new(),
                error: Some(ToolErrorInfo {
                    message: format!("{} failed", request.name),
                }),
                error_type: error_type.clone(),
                result_display: Some(format!("{} failed", request.name)),
            },
            None => (self.respond)(request),
        }
    }
}

/// Collects tool error reports.
#[derive(Default)]
pub struct RecordingErrorChannel {
    reports: Mutex<Vec<ToolErrorReport>>,
}

impl RecordingErrorChannel {
    pub fn reports(&self) -> Vec<ToolErrorReport> {
        self.reports.lock().unwrap().clone()
    }
}

impl ErrorChannel for RecordingErrorChannel {
    fn report(&self, report: &ToolErrorReport) {
        self.reports.lock().unwrap().push(report.clone());
    }
}

/// In-memory writer whose contents can be read back.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
