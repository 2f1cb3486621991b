//! Data model for telemetry events and aggregated session metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Events ────────────────────────────────────────────────────────────────

/// A structured telemetry record.
///
/// Created once by a producer and then only read. The `event_name` tag is
/// the stable discriminant consumers switch on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_name", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// The user's query entered the run.
    UserPrompt {
        timestamp: DateTime<Utc>,
        prompt_id: String,
        prompt_length: usize,
    },

    /// A backend request was sent.
    ApiRequest {
        timestamp: DateTime<Utc>,
        model: String,
        prompt_id: String,
    },

    /// A backend response stream completed.
    ApiResponse {
        timestamp: DateTime<Utc>,
        model: String,
        prompt_id: String,
        duration_ms: u64,
        input_token_count: u32,
        output_token_count: u32,
    },

    /// A backend request failed.
    ApiError {
        timestamp: DateTime<Utc>,
        model: String,
        prompt_id: String,
        duration_ms: u64,
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },

    /// A tool call finished.
    ToolCall {
        timestamp: DateTime<Utc>,
        prompt_id: String,
        call_id: String,
        function_name: String,
        duration_ms: u64,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_type: Option<String>,
    },
}

impl TelemetryEvent {
    pub fn user_prompt(prompt_id: impl Into<String>, prompt_length: usize) -> Self {
        Self::UserPrompt {
            timestamp: Utc::now(),
            prompt_id: prompt_id.into(),
            prompt_length,
        }
    }

    pub fn api_request(model: impl Into<String>, prompt_id: impl Into<String>) -> Self {
        Self::ApiRequest {
            timestamp: Utc::now(),
            model: model.into(),
            prompt_id: prompt_id.into(),
        }
    }

    /// The stable discriminant of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::UserPrompt { .. } => "user_prompt",
            Self::ApiRequest { .. } => "api_request",
            Self::ApiResponse { .. } => "api_response",
            Self::ApiError { .. } => "api_error",
            Self::ToolCall { .. } => "tool_call",
        }
    }
}

// ── Metrics ───────────────────────────────────────────────────────────────

/// Aggregate counters for one run, keyed by model and tool name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub models: BTreeMap<String, ModelMetrics>,
    pub tools: ToolMetrics,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub api: ApiMetrics,
    pub tokens: TokenMetrics,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiMetrics {
    pub total_requests: u64,
    pub total_errors: u64,
    pub total_latency_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenMetrics {
    pub prompt: u64,
    pub candidates: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolMetrics {
    pub total_calls: u64,
    pub total_success: u64,
    pub total_fail: u64,
    pub total_duration_ms: u64,
    pub by_name: BTreeMap<String, ToolCallStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallStats {
    pub count: u64,
    pub success: u64,
    pub fail: u64,
    pub duration_ms: u64,
}

impl SessionMetrics {
    /// Fold one event into the counters. Events without numeric payload
    /// are ignored.
    pub fn record(&mut self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::ApiResponse {
                model,
                duration_ms,
                input_token_count,
                output_token_count,
                ..
            } => {
                let m = self.models.entry(model.clone()).or_default();
                m.api.total_requests += 1;
                m.api.total_latency_ms += duration_ms;
                m.tokens.prompt += u64::from(*input_token_count);
                m.tokens.candidates += u64::from(*output_token_count);
                m.tokens.total += u64::from(*input_token_count) + u64::from(*output_token_count);
            }
            TelemetryEvent::ApiError {
                model, duration_ms, ..
            } => {
                let m = self.models.entry(model.clone()).or_default();
                m.api.total_requests += 1;
                m.api.total_errors += 1;
                m.api.total_latency_ms += duration_ms;
            }
            TelemetryEvent::ToolCall {
                function_name,
                duration_ms,
                success,
                ..
            } => {
                let tools = &mut self.tools;
                tools.total_calls += 1;
                tools.total_duration_ms += duration_ms;
                let stats = tools.by_name.entry(function_name.clone()).or_default();
                stats.count += 1;
                stats.duration_ms += duration_ms;
                if *success {
                    tools.total_success += 1;
                    stats.success += 1;
                } else {
                    tools.total_fail += 1;
                    stats.fail += 1;
                }
            }
            TelemetryEvent::UserPrompt { .. } | TelemetryEvent::ApiRequest { .. } => {}
        }
    }
}
