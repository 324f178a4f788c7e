//! MCP Client error types.

use thiserror::Error;

/// Errors that can occur during provider session and capability operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// The operation referenced a provider id outside the current config set.
    #[error("unknown provider: '{id}'")]
    ProviderUnknown {
        id: String,
    },

    /// A namespaced capability id could not be split into provider + name.
    #[error("invalid namespaced tool name: '{name}'")]
    InvalidIdentifier {
        name: String,
    },

    /// Process spawn failed, or every network transport attempt failed.
    #[error("failed to connect to provider '{id}': {reason}")]
    ConnectionFailed {
        id: String,
        reason: String,
    },

    /// The initialization handshake failed after the transport was up.
    #[error("provider '{id}' initialization failed: {reason}")]
    InitFailed {
        id: String,
        reason: String,
    },

    /// JSON-RPC communication error (malformed message, I/O error, HTTP status).
    #[error("transport error for provider '{provider}': {reason}")]
    TransportError {
        provider: String,
        reason: String,
    },

    /// Provider returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    ServerError {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The tool ran but reported failure (`isError: true`).
    #[error("tool '{tool}' failed: {message}")]
    InvocationFailed {
        tool: String,
        message: String,
    },

    /// A request did not complete in time.
    #[error("'{operation}' on provider '{provider}' timed out after {timeout_ms}ms")]
    Timeout {
        provider: String,
        operation: String,
        timeout_ms: u64,
    },

    /// Configuration error (invalid id, missing field, bad config file).
    #[error("config error: {reason}")]
    ConfigError {
        reason: String,
    },
}

impl McpError {
    /// Whether this error means the session itself is unusable.
    ///
    /// A provider that answers with a JSON-RPC error or a failed tool result
    /// is still healthy; transport breakage and timeouts are not.
    pub fn is_session_fault(&self) -> bool {
        matches!(
            self,
            McpError::ConnectionFailed { .. }
                | McpError::InitFailed { .. }
                | McpError::TransportError { .. }
                | McpError::Timeout { .. }
        )
    }
}
