//! The turn loop implementation.

use std::sync::Arc;

use clawrun_core::message::FunctionResponse;
use clawrun_core::{
    Backend, Error, EventReceiver, Part, PassthroughPreprocessor, QueryPreprocessor,
    ResumedSessionState, Result, StreamEvent, ToolCallRequest, ToolExecutor,
};
use clawrun_telemetry::{MetricsSource, TelemetryEngine, TelemetryEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatcher::{ErrorChannel, ToolDispatcher};
use crate::output::OutputRenderer;

const AT_COMMAND_ERROR: &str = "Exiting due to an error processing the @ command.";

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Text of the final model turn
    pub response: String,

    /// Backend round trips performed
    pub turns: i64,
}

/// States of one run. `Terminal` and `Failed` are the only exits.
enum TurnState {
    Init,
    SendTurn(Vec<Part>),
    StreamResponse(EventReceiver),
    Dispatch(Vec<ToolCallRequest>),
    Terminal,
    Failed(Error),
}

/// Drives one user query through as many backend turns as the model needs.
pub struct AgentLoop {
    backend: Arc<dyn Backend>,
    dispatcher: ToolDispatcher,
    preprocessor: Arc<dyn QueryPreprocessor>,
    renderer: Box<dyn OutputRenderer>,
    telemetry: Arc<TelemetryEngine>,

    /// Maximum backend round trips; negative means unbounded
    max_turns: i64,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        backend: Arc<dyn Backend>,
        executor: Arc<dyn ToolExecutor>,
        errors: Arc<dyn ErrorChannel>,
        renderer: Box<dyn OutputRenderer>,
        telemetry: Arc<TelemetryEngine>,
    ) -> Self {
        Self {
            backend,
            dispatcher: ToolDispatcher::new(executor, errors, telemetry.clone()),
            preprocessor: Arc::new(PassthroughPreprocessor),
            renderer,
            telemetry,
            max_turns: -1,
        }
    }

    /// Set the turn budget. `-1` is unbounded.
    pub fn with_max_turns(mut self, max: i64) -> Self {
        self.max_turns = max;
        self
    }

    /// Replace the input pre-processor.
    pub fn with_preprocessor(mut self, preprocessor: Arc<dyn QueryPreprocessor>) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    /// Run one query to completion.
    ///
    /// Output is rendered as the run progresses. The returned error has
    /// already been rendered; the caller only maps it to an exit code.
    pub async fn run(
        &self,
        input: &str,
        prompt_id: &str,
        resumed: Option<ResumedSessionState>,
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        let broadcast = self.telemetry.broadcast().clone();
        let subscription = self.renderer.attach_telemetry(&broadcast);

        info!(prompt_id = %prompt_id, max_turns = self.max_turns, "Starting run");
        let result = self.drive(input, prompt_id, resumed, &cancel).await;

        // Detach first so the final block is the last line written.
        if let Some(id) = subscription {
            broadcast.unsubscribe(id);
            broadcast.disable();
        }

        match &result {
            Ok(outcome) => {
                info!(turns = outcome.turns, "Run complete");
                self.renderer
                    .on_complete(&outcome.response, &self.telemetry.metrics());
            }
            Err(e) => {
                warn!(category = e.category(), error = %e, "Run failed");
                self.renderer.on_error(e);
            }
        }

        self.telemetry.shutdown();
        result
    }

    async fn drive(
        &self,
        input: &str,
        prompt_id: &str,
        mut resumed: Option<ResumedSessionState>,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let mut state = TurnState::Init;
        let mut turns: i64 = 0;
        let mut response = String::new();

        loop {
            state = match state {
                TurnState::Init => self.init(input, prompt_id, resumed.take()).await,

                TurnState::SendTurn(parts) => {
                    turns += 1;
                    if self.max_turns >= 0 && turns > self.max_turns {
                        TurnState::Failed(Error::MaxTurnsExceeded {
                            max_turns: self.max_turns,
                        })
                    } else {
                        debug!(turn = turns, parts = parts.len(), "Sending turn");
                        self.send(parts, prompt_id, cancel).await
                    }
                }

                TurnState::StreamResponse(rx) => {
                    response.clear();
                    self.consume(rx, &mut response, cancel).await
                }

                TurnState::Dispatch(requests) if requests.is_empty() => TurnState::Terminal,

                TurnState::Dispatch(requests) => {
                    debug!(count = requests.len(), "Dispatching tool calls");
                    match self.dispatcher.dispatch(&requests, cancel).await {
                        Ok(parts) => TurnState::SendTurn(with_placeholders(parts, &requests)),
                        Err(e) => TurnState::Failed(e),
                    }
                }

                TurnState::Terminal => return Ok(RunOutcome { response, turns }),

                TurnState::Failed(e) => return Err(e),
            };
        }
    }

    async fn init(
        &self,
        input: &str,
        prompt_id: &str,
        resumed: Option<ResumedSessionState>,
    ) -> TurnState {
        self.telemetry
            .emit(TelemetryEvent::user_prompt(prompt_id, input.chars().count()));

        if let Some(session) = resumed.filter(|s| !s.is_empty()) {
            let history = session.into_history();
            debug!(messages = history.len(), "Seeding history from resumed session");
            if let Err(e) = self.backend.set_history(history).await {
                return TurnState::Failed(e.into());
            }
        }

        let query = self.preprocessor.expand(input).await;
        if !query.should_proceed || query.parts.is_empty() {
            return TurnState::Failed(Error::Input(AT_COMMAND_ERROR.into()));
        }
        TurnState::SendTurn(query.parts)
    }

    async fn send(
        &self,
        parts: Vec<Part>,
        prompt_id: &str,
        cancel: &CancellationToken,
    ) -> TurnState {
        if cancel.is_cancelled() {
            return TurnState::Failed(Error::Cancelled);
        }
        match self
            .backend
            .send_message_stream(parts, cancel.clone(), prompt_id)
            .await
        {
            Ok(rx) => TurnState::StreamResponse(rx),
            Err(_) if cancel.is_cancelled() => TurnState::Failed(Error::Cancelled),
            Err(e) => TurnState::Failed(e.into()),
        }
    }

    /// Drain one response stream. Content goes to the renderer as it
    /// arrives; tool requests are collected for dispatch.
    async fn consume(
        &self,
        mut rx: EventReceiver,
        response: &mut String,
        cancel: &CancellationToken,
    ) -> TurnState {
        let mut requests = Vec::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return TurnState::Failed(Error::Cancelled),
                next = rx.recv() => next,
            };
            if cancel.is_cancelled() {
                return TurnState::Failed(Error::Cancelled);
            }

            match next {
                None => break,
                Some(Ok(StreamEvent::Content(text))) => {
                    response.push_str(&text);
                    self.renderer.on_content(&text);
                }
                Some(Ok(StreamEvent::ToolCallRequest(request))) => {
                    debug!(tool = %request.name, call_id = %request.id, "Tool call requested");
                    requests.push(request);
                }
                Some(Err(e)) => return TurnState::Failed(e.into()),
            }
        }

        TurnState::Dispatch(requests)
    }
}

/// A message must never be empty. Tools that produced no parts get an
/// empty function response each.
fn with_placeholders(parts: Vec<Part>, requests: &[ToolCallRequest]) -> Vec<Part> {
    if !parts.is_empty() {
        return parts;
    }
    requests
        .iter()
        .map(|r| {
            Part::FunctionResponse(FunctionResponse {
                id: r.id.clone(),
                name: r.name.clone(),
                response: serde_json::json!({}),
            })
        })
        .collect()
}
