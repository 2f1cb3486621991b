//! `@path` includes: referenced workspace files are inlined into the query.

use std::path::PathBuf;

use async_trait::async_trait;
use clawrun_core::{Part, ProcessedQuery, QueryPreprocessor};
use tracing::{debug, error};

const CONTENT_HEADER: &str = "\n--- Content from referenced files ---";
const CONTENT_FOOTER: &str = "\n--- End of content ---";

/// Expands `@path` tokens into the contents of files under a workspace root.
pub struct AtCommandProcessor {
    workspace_root: PathBuf,
}

impl AtCommandProcessor {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }

    async fn read_reference(&self, reference: &str) -> Result<String, String> {
        let root = self
            .workspace_root
            .canonicalize()
            .map_err(|e| format!("workspace root unavailable: {e}"))?;
        let path = root
            .join(reference)
            .canonicalize()
            .map_err(|e| format!("{reference}: {e}"))?;

        if !path.starts_with(&root) {
            return Err(format!("{reference}: outside the workspace"));
        }
        if path.is_dir() {
            return Err(format!("{reference}: is a directory"));
        }
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("{reference}: {e}"))
    }
}

#[async_trait]
impl QueryPreprocessor for AtCommandProcessor {
    async fn expand(&self, raw_input: &str) -> ProcessedQuery {
        let references = parse_references(raw_input);
        if references.is_empty() {
            return ProcessedQuery::proceed(vec![Part::text(raw_input)]);
        }

        let mut parts = vec![Part::text(raw_input), Part::text(CONTENT_HEADER)];
        for reference in &references {
            match self.read_reference(reference).await {
                Ok(content) => {
                    debug!(path = %reference, bytes = content.len(), "Inlined @ reference");
                    parts.push(Part::text(format!("\nContent from @{reference}:\n")));
                    parts.push(Part::text(content));
                }
                Err(e) => {
                    error!(error = %e, "Failed to read @ reference");
                    return ProcessedQuery::halt();
                }
            }
        }
        parts.push(Part::text(CONTENT_FOOTER));
        ProcessedQuery::proceed(parts)
    }
}

/// Paths named by `@` tokens, unescaped, in order of appearance.
///
/// A token starts with `@` at the beginning of the input or after
/// whitespace and runs to the next unescaped whitespace. `\ ` keeps a
/// space inside the path. A bare `@` names nothing.
fn parse_references(input: &str) -> Vec<String> {
    let mut references = Vec::new();
    let mut chars = input.chars().peekable();
    let mut at_token_start = true;

    while let Some(c) = chars.next() {
        if c == '@' && at_token_start {
            let mut path = String::new();
            while let Some(&next) = chars.peek() {
                if next.is_whitespace() {
                    break;
                }
                chars.next();
                if next == '\\' {
                    if let Some(escaped) = chars.next() {
                        path.push(escaped);
                    }
                } else {
                    path.push(next);
                }
            }
            if !path.is_empty() {
                references.push(path);
            }
            at_token_start = false;
            continue;
        }
        at_token_start = c.is_whitespace();
    }

    references
}
