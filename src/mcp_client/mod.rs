//! MCP Client — sessions with capability providers over MCP JSON-RPC.
//!
//! This module handles:
//! - Spawning process providers and dialing network providers
//! - JSON-RPC 2.0 over stdio, Streamable HTTP and HTTP+SSE
//! - Tool discovery and namespacing across all providers
//! - Routing namespaced tool calls back to their owning provider
//! - Per-provider failure isolation and status tracking
//!
//! The [`ConnectionManager`] is used by the orchestrator to build the
//! capability catalog and dispatch tool calls.

pub mod client;
pub mod discovery;
pub mod errors;
pub mod http;
pub mod lifecycle;
pub mod manager;
pub mod registry;
pub mod sse;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use client::{Connector, McpConnector, McpSession, ProviderSession};
pub use discovery::{CredentialSource, EnvCredentials};
pub use errors::McpError;
pub use manager::{ConnectionManager, StatusRecord};
pub use registry::{
    namespaced_id, split_namespaced, CapabilityCatalog, CapabilityDescriptor, NAMESPACE_SEPARATOR,
};
pub use types::{
    CredentialRef, McpToolDefinition, ProviderCategory, ProviderConfig, ProviderStatus,
    TransportConfig,
};
