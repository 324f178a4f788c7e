//! Provider sessions.
//!
//! [`ProviderSession`] and [`Connector`] are the seam between the
//! [`ConnectionManager`](super::manager::ConnectionManager) and the wire.
//! [`McpConnector`] / [`McpSession`] are the production implementations that
//! speak MCP JSON-RPC; tests substitute in-memory fakes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Child;
use tokio::sync::Mutex;

use super::errors::McpError;
use super::lifecycle;
use super::transport::{extract_result, Transport};
use super::types::{CallToolResult, ListToolsResult, McpToolDefinition, ProviderConfig, ServerInfo};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Timeout for one `tools/list` page.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for one `tools/call`.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on `tools/list` pages, in case a provider loops its cursor.
const MAX_LIST_PAGES: usize = 64;

// ─── Traits ──────────────────────────────────────────────────────────────────

/// A live connection to exactly one provider.
#[async_trait]
pub trait ProviderSession: Send + Sync {
    /// Enumerate the provider's tools (un-namespaced).
    async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError>;

    /// Invoke a tool by its local name. Returns the raw result object.
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, McpError>;

    /// Release the session. Best-effort.
    async fn close(&self);
}

/// Creates sessions from provider configs.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ProviderConfig) -> Result<Arc<dyn ProviderSession>, McpError>;
}

// ─── McpConnector ────────────────────────────────────────────────────────────

/// Connector that spawns or dials real MCP providers.
#[derive(Debug, Default, Clone, Copy)]
pub struct McpConnector;

#[async_trait]
impl Connector for McpConnector {
    async fn connect(&self, config: &ProviderConfig) -> Result<Arc<dyn ProviderSession>, McpError> {
        let connected = lifecycle::connect(config).await?;
        Ok(Arc::new(McpSession {
            provider_id: config.id.clone(),
            transport: connected.transport,
            process: Mutex::new(connected.process),
            server_info: connected.init.server_info,
        }))
    }
}

// ─── McpSession ──────────────────────────────────────────────────────────────

/// An initialized MCP session over any transport.
pub struct McpSession {
    provider_id: String,
    transport: Transport,
    process: Mutex<Option<Child>>,
    server_info: Option<ServerInfo>,
}

impl McpSession {
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<serde_json::Value, McpError> {
        let response = tokio::time::timeout(timeout, self.transport.request(method, params))
            .await
            .map_err(|_| McpError::Timeout {
                provider: self.provider_id.clone(),
                operation: method.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })??;
        extract_result(response)
    }
}

#[async_trait]
impl ProviderSession for McpSession {
    async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = cursor
                .as_ref()
                .map(|c| serde_json::json!({ "cursor": c }));
            let result = self
                .request_with_timeout("tools/list", params, DISCOVERY_TIMEOUT)
                .await?;
            let page: ListToolsResult =
                serde_json::from_value(result).map_err(|e| McpError::TransportError {
                    provider: self.provider_id.clone(),
                    reason: format!("malformed tools/list result: {e}"),
                })?;

            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        tracing::warn!(provider = %self.provider_id, pages = MAX_LIST_PAGES, "tools/list pagination cut off");
        Ok(tools)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        let result = self
            .request_with_timeout("tools/call", Some(params), CALL_TIMEOUT)
            .await?;

        if let Ok(parsed) = serde_json::from_value::<CallToolResult>(result.clone()) {
            if parsed.is_error {
                return Err(McpError::InvocationFailed {
                    tool: name.to_string(),
                    message: parsed.text(),
                });
            }
        }
        Ok(result)
    }

    async fn close(&self) {
        let child = self.process.lock().await.take();
        match child {
            Some(mut child) => {
                lifecycle::shutdown_process(&self.provider_id, &self.transport, &mut child).await
            }
            None => self.transport.close().await,
        }
        tracing::debug!(provider = %self.provider_id, transport = self.transport.kind(), "session closed");
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
