//! Reasoning backends — one narrow interface, two wire protocols.
//!
//! This module handles all communication with the reasoning backend:
//! - The protocol-neutral conversation model ([`Turn`], [`BackendReply`])
//! - The Anthropic Messages API adapter
//! - The OpenAI-compatible chat-completions adapter (Ollama and friends)
//! - Backend configuration and config-text interpolation
//!
//! The orchestrator only sees [`ReasoningBackend`]; switching protocols is a
//! config change, not a code change.

pub mod anthropic;
pub mod backend;
pub mod client;
pub mod config;
pub mod errors;
pub mod response;
pub mod types;

// Re-exports for convenience
pub use anthropic::AnthropicClient;
pub use backend::{from_config, ReasoningBackend, REQUEST_TIMEOUT};
pub use client::OpenAiCompatClient;
pub use config::{BackendConfig, BackendKind};
pub use errors::InferenceError;
pub use types::{BackendReply, Invocation, Turn};
