//! Resumed session state: prior messages used to seed backend history.
//!
//! The on-disk format belongs to whoever recorded the session; this module
//! only knows the minimal shape `{ "messages": [{ "type", "content" }] }`
//! and how to turn it into [`ConversationMessage`]s.

use serde::{Deserialize, Serialize};

use crate::message::{ConversationMessage, Part, Role};

/// Who produced a recorded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResumedMessageKind {
    User,
    #[serde(alias = "gemini", alias = "assistant")]
    Model,
}

/// One recorded message. `content` is free-form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumedMessage {
    #[serde(rename = "type")]
    pub kind: ResumedMessageKind,
    pub content: serde_json::Value,
}

/// Prior conversation supplied before the loop starts. Consumed once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumedSessionState {
    #[serde(default)]
    pub messages: Vec<ResumedMessage>,
}

impl ResumedSessionState {
    /// Convert into backend history, consuming the state.
    pub fn into_history(self) -> Vec<ConversationMessage> {
        self.messages
            .into_iter()
            .map(|m| ConversationMessage {
                role: match m.kind {
                    ResumedMessageKind::User => Role::User,
                    ResumedMessageKind::Model => Role::Model,
                },
                parts: content_to_parts(m.content),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

fn content_to_parts(content: serde_json::Value) -> Vec<Part> {
    match content {
        serde_json::Value::String(s) => vec![Part::Text(s)],
        serde_json::Value::Array(items) => items.into_iter().map(item_to_part).collect(),
        other => vec![Part::Text(other.to_string())],
    }
}

fn item_to_part(item: serde_json::Value) -> Part {
    match item {
        serde_json::Value::String(s) => Part::Text(s),
        other => serde_json::from_value::<Part>(other.clone())
            .unwrap_or_else(|_| Part::Text(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_content_becomes_text_part() {
        let state: ResumedSessionState = serde_json::from_str(
            r#"{"messages":[{"type":"user","content":"hi"},{"type":"gemini","content":"hello"}]}"#,
        )
        .unwrap();
        let history = state.into_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].parts, vec![Part::text("hi")]);
        assert_eq!(history[1].role, Role::Model);
    }

    #[test]
    fn array_content_maps_each_item() {
        let state: ResumedSessionState = serde_json::from_str(
            r#"{"messages":[{"type":"model","content":["plain",{"text":"structured"},{"weird":1}]}]}"#,
        )
        .unwrap();
        let history = state.into_history();
        assert_eq!(
            history[0].parts,
            vec![
                Part::text("plain"),
                Part::text("structured"),
                Part::text(r#"{"weird":1}"#),
            ]
        );
    }

    #[test]
    fn object_content_is_stringified() {
        let state: ResumedSessionState = serde_json::from_str(
            r#"{"messages":[{"type":"user","content":{"a":1}}]}"#,
        )
        .unwrap();
        let history = state.into_history();
        assert_eq!(history[0].parts, vec![Part::text(r#"{"a":1}"#)]);
    }
}
