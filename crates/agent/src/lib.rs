//! The headless agent loop for ClawRun.
//!
//! One user query is driven through as many backend turns as the model
//! needs:
//!
//! 1. **Expand** the raw input (`@path` includes)
//! 2. **Send** the pending parts to the backend
//! 3. **Stream** the response, rendering content as it arrives
//! 4. **If tool calls**: execute them in order and send the results back (step 2)
//! 5. **Otherwise**: render the final output and stop
//!
//! The loop also stops on cancellation, when the turn budget is spent, or
//! on a backend error.

pub mod dispatcher;
pub mod loop_runner;
pub mod output;
pub mod preprocess;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use dispatcher::{ErrorChannel, SinkErrorChannel, ToolDispatcher, ToolErrorReport};
pub use loop_runner::{AgentLoop, RunOutcome};
pub use output::{OutputRenderer, OutputSink, renderer_for};
pub use preprocess::AtCommandProcessor;
