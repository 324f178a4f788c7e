//! Agent Core — orchestration layer for MCP Browser.
//!
//! Submodules:
//! - `orchestrator`: Bounded reasoning/invocation loop and its event stream
//! - `conversation`: Per-run history and round counter
//! - `finalizer`: Extracts or synthesizes the final HTML document
//! - `types`: Progress events and the run state machine
//! - `errors`: Agent-level error types

pub mod conversation;
pub mod errors;
pub mod finalizer;
pub mod orchestrator;
pub mod types;

// Re-exports for convenience
pub use conversation::ConversationState;
pub use errors::AgentError;
pub use finalizer::extract_or_wrap;
pub use orchestrator::{EventStream, Orchestrator, MAX_ITERATIONS};
pub use types::{ProgressEvent, RunState};
