//! JSON-RPC transports.
//!
//! - [`StdioTransport`]: line-delimited JSON over a child process's stdio
//! - [`HttpTransport`](super::http::HttpTransport): MCP Streamable HTTP
//! - [`SseTransport`](super::http::SseTransport): legacy MCP HTTP+SSE
//!
//! [`Transport`] dispatches over the three so sessions don't care which one
//! the handshake settled on.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::Mutex;

use super::errors::McpError;
use super::http::{HttpTransport, SseTransport};
use super::types::{error_codes, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

// ─── Request ID Generator ────────────────────────────────────────────────────

/// Global monotonic request ID counter.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique request ID.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// The wire a session settled on during its handshake.
pub enum Transport {
    Stdio(StdioTransport),
    StreamableHttp(HttpTransport),
    Sse(SseTransport),
}

impl Transport {
    /// Send a request and wait for the matching response.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        match self {
            Transport::Stdio(t) => t.request(method, params).await,
            Transport::StreamableHttp(t) => t.request(method, params).await,
            Transport::Sse(t) => t.request(method, params).await,
        }
    }

    /// Send a notification (no response expected).
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        match self {
            Transport::Stdio(t) => t.notify(method, params).await,
            Transport::StreamableHttp(t) => t.notify(method, params).await,
            Transport::Sse(t) => t.notify(method, params).await,
        }
    }

    /// Release transport resources. Best-effort; never fails.
    pub async fn close(&self) {
        match self {
            Transport::Stdio(t) => t.close().await,
            Transport::StreamableHttp(t) => t.close().await,
            Transport::Sse(t) => t.close(),
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Transport::Stdio(_) => "stdio",
            Transport::StreamableHttp(_) => "streamable-http",
            Transport::Sse(_) => "sse",
        }
    }
}

// ─── Stdio ───────────────────────────────────────────────────────────────────

struct StdioChannel {
    /// Taken on close so the child sees EOF.
    writer: Option<ChildStdin>,
    reader: BufReader<ChildStdout>,
}

/// Bi-directional JSON-RPC transport over a child process's stdio.
///
/// Write and read happen under one lock, so overlapping callers can't steal
/// each other's responses.
pub struct StdioTransport {
    provider_id: String,
    channel: Mutex<StdioChannel>,
}

impl StdioTransport {
    /// Create a new transport from a child process's stdin/stdout.
    pub fn new(provider_id: &str, stdin: ChildStdin, stdout: ChildStdout) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            channel: Mutex::new(StdioChannel {
                writer: Some(stdin),
                reader: BufReader::new(stdout),
            }),
        }
    }

    fn transport_error(&self, reason: String) -> McpError {
        McpError::TransportError {
            provider: self.provider_id.clone(),
            reason,
        }
    }

    /// Send a JSON-RPC request and wait for the matching response.
    ///
    /// Lines that aren't JSON-RPC responses (server logging, server-initiated
    /// requests, stale responses to timed-out calls) are skipped.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = next_request_id();
        let req = JsonRpcRequest::new(id, method, params);

        let mut json = serde_json::to_string(&req)
            .map_err(|e| self.transport_error(format!("failed to serialize request: {e}")))?;
        json.push('\n');

        let mut channel = self.channel.lock().await;
        let writer = channel
            .writer
            .as_mut()
            .ok_or_else(|| self.transport_error("stdin already closed".into()))?;
        writer
            .write_all(json.as_bytes())
            .await
            .map_err(|e| self.transport_error(format!("failed to write to stdin: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| self.transport_error(format!("failed to flush stdin: {e}")))?;

        let mut line_buf = String::new();
        loop {
            line_buf.clear();
            let bytes_read = channel
                .reader
                .read_line(&mut line_buf)
                .await
                .map_err(|e| self.transport_error(format!("failed to read from stdout: {e}")))?;

            if bytes_read == 0 {
                return Err(
                    self.transport_error("provider stdout closed (process may have exited)".into())
                );
            }

            let trimmed = line_buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(resp) if resp.answers(id) => return Ok(resp),
                _ => continue,
            }
        }
    }

    /// Send a JSON-RPC notification (no response expected).
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let notification = JsonRpcNotification::new(method, params);
        let mut json = serde_json::to_string(&notification).map_err(|e| {
            self.transport_error(format!("failed to serialize notification: {e}"))
        })?;
        json.push('\n');

        let mut channel = self.channel.lock().await;
        let writer = channel
            .writer
            .as_mut()
            .ok_or_else(|| self.transport_error("stdin already closed".into()))?;
        writer
            .write_all(json.as_bytes())
            .await
            .map_err(|e| self.transport_error(format!("failed to write notification: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| self.transport_error(format!("failed to flush notification: {e}")))?;

        Ok(())
    }

    /// Close the child's stdin. MCP servers exit on EOF.
    pub async fn close(&self) {
        self.channel.lock().await.writer.take();
    }
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting errors to `McpError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<serde_json::Value, McpError> {
    if let Some(err) = response.error {
        return Err(McpError::ServerError {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or(McpError::ServerError {
        code: error_codes::INTERNAL_ERROR,
        message: "response missing both result and error".into(),
        data: None,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
