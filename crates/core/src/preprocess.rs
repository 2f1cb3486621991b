//! Query pre-processing: the step that turns raw user input into the parts
//! of the first outgoing message.

use async_trait::async_trait;

use crate::message::Part;

/// Result of expanding the raw user input.
#[derive(Debug, Clone, Default)]
pub struct ProcessedQuery {
    /// Parts of the first user message
    pub parts: Vec<Part>,

    /// `false` when expansion failed and the run must not contact the backend
    pub should_proceed: bool,
}

impl ProcessedQuery {
    /// A query that proceeds with the given parts.
    pub fn proceed(parts: Vec<Part>) -> Self {
        Self {
            parts,
            should_proceed: true,
        }
    }

    /// A query that must not proceed.
    pub fn halt() -> Self {
        Self::default()
    }
}

/// Expands raw input (e.g. `@file` references) before the first turn.
#[async_trait]
pub trait QueryPreprocessor: Send + Sync {
    async fn expand(&self, raw_input: &str) -> ProcessedQuery;
}

/// Pre-processor that passes the input through as a single text part.
pub struct PassthroughPreprocessor;

#[async_trait]
impl QueryPreprocessor for PassthroughPreprocessor {
    async fn expand(&self, raw_input: &str) -> ProcessedQuery {
        ProcessedQuery::proceed(vec![Part::text(raw_input)])
    }
}
