//! Network transports for remote MCP providers.
//!
//! - [`HttpTransport`]: Streamable HTTP. Every message is a POST to the
//!   provider URL; the reply is either a JSON body or a short SSE stream.
//!   The provider may assign an `Mcp-Session-Id` that is echoed on every
//!   later request.
//! - [`SseTransport`]: the older HTTP+SSE pairing. A GET opens a long-lived
//!   event stream whose first `endpoint` event names the URL to POST
//!   messages to; responses arrive on the stream and are routed to waiting
//!   callers by request id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client as HttpClient, RequestBuilder, Response, Url};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::errors::McpError;
use super::sse::SseParser;
use super::transport::next_request_id;
use super::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout for provider endpoints.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Header carrying the Streamable HTTP session id.
const SESSION_HEADER: &str = "mcp-session-id";

/// Build the shared HTTP client for a provider.
fn build_client(provider_id: &str) -> Result<HttpClient, McpError> {
    HttpClient::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| McpError::ConnectionFailed {
            id: provider_id.to_string(),
            reason: format!("failed to build HTTP client: {e}"),
        })
}

/// Turn a non-2xx response into a transport error carrying the body.
async fn check_status(provider_id: &str, response: Response) -> Result<Response, McpError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(McpError::TransportError {
        provider: provider_id.to_string(),
        reason: format!("HTTP {}: {}", status.as_u16(), body.trim()),
    })
}

// ─── Streamable HTTP ─────────────────────────────────────────────────────────

/// MCP Streamable HTTP transport.
pub struct HttpTransport {
    provider_id: String,
    url: String,
    http: HttpClient,
    bearer: Option<String>,
    session_id: Mutex<Option<String>>,
}

impl HttpTransport {
    pub fn new(provider_id: &str, url: &str, bearer: Option<String>) -> Result<Self, McpError> {
        Ok(Self {
            provider_id: provider_id.to_string(),
            url: url.to_string(),
            http: build_client(provider_id)?,
            bearer,
            session_id: Mutex::new(None),
        })
    }

    fn transport_error(&self, reason: String) -> McpError {
        McpError::TransportError {
            provider: self.provider_id.clone(),
            reason,
        }
    }

    fn current_session_id(&self) -> Option<String> {
        self.session_id.lock().ok().and_then(|guard| guard.clone())
    }

    fn with_headers(&self, mut builder: RequestBuilder) -> RequestBuilder {
        if let Some(token) = &self.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(session) = self.current_session_id() {
            builder = builder.header(SESSION_HEADER, session);
        }
        builder
    }

    async fn post<T: serde::Serialize>(&self, message: &T) -> Result<Response, McpError> {
        let builder = self
            .http
            .post(&self.url)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(message);

        let response = self
            .with_headers(builder)
            .send()
            .await
            .map_err(|e| self.transport_error(format!("POST {} failed: {e}", self.url)))?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            if let Ok(mut guard) = self.session_id.lock() {
                *guard = Some(session.to_string());
            }
        }

        check_status(&self.provider_id, response).await
    }

    /// Send a JSON-RPC request and wait for the matching response.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = next_request_id();
        let response = self.post(&JsonRpcRequest::new(id, method, params)).await?;

        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        if !is_stream {
            return response
                .json::<JsonRpcResponse>()
                .await
                .map_err(|e| self.transport_error(format!("invalid JSON-RPC body: {e}")));
        }

        let mut parser = SseParser::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk =
                chunk.map_err(|e| self.transport_error(format!("event stream broke: {e}")))?;
            for event in parser.feed_bytes(&chunk) {
                if !event.is_message() {
                    continue;
                }
                if let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(&event.data) {
                    if resp.answers(id) {
                        return Ok(resp);
                    }
                }
            }
        }

        Err(self.transport_error(format!("event stream ended without a response to '{method}'")))
    }

    /// Send a JSON-RPC notification. Providers answer `202 Accepted`.
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        self.post(&JsonRpcNotification::new(method, params)).await?;
        Ok(())
    }

    /// Terminate the provider-side session, if one was assigned.
    pub async fn close(&self) {
        if self.current_session_id().is_none() {
            return;
        }
        let builder = self.with_headers(self.http.delete(&self.url));
        if let Err(e) = builder.send().await {
            tracing::debug!(provider = %self.provider_id, error = %e, "session DELETE failed");
        }
    }
}

// ─── HTTP + SSE ──────────────────────────────────────────────────────────────

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// Legacy MCP HTTP+SSE transport.
pub struct SseTransport {
    provider_id: String,
    endpoint: Url,
    http: HttpClient,
    bearer: Option<String>,
    pending: PendingMap,
    reader: JoinHandle<()>,
}

impl SseTransport {
    /// Open the event stream and wait for the provider's `endpoint` event.
    pub async fn connect(
        provider_id: &str,
        url: &str,
        bearer: Option<String>,
    ) -> Result<Self, McpError> {
        let transport_error = |reason: String| McpError::TransportError {
            provider: provider_id.to_string(),
            reason,
        };

        let base = Url::parse(url).map_err(|e| McpError::ConfigError {
            reason: format!("invalid URL '{url}' for provider '{provider_id}': {e}"),
        })?;
        let http = build_client(provider_id)?;

        let mut builder = http.get(base.clone()).header(ACCEPT, "text/event-stream");
        if let Some(token) = &bearer {
            builder = builder.bearer_auth(token);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(format!("GET {url} failed: {e}")))?;
        let response = check_status(provider_id, response).await?;

        let mut stream = response.bytes_stream();
        let mut parser = SseParser::new();
        let mut endpoint = None;

        'handshake: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transport_error(format!("event stream broke: {e}")))?;
            for event in parser.feed_bytes(&chunk) {
                if event.event.as_deref() == Some("endpoint") {
                    endpoint = Some(event.data);
                    break 'handshake;
                }
            }
        }

        let endpoint = endpoint
            .ok_or_else(|| transport_error("event stream closed before 'endpoint' event".into()))?;
        let endpoint = base
            .join(endpoint.trim())
            .map_err(|e| transport_error(format!("invalid endpoint '{endpoint}': {e}")))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader_pending = pending.clone();
        let reader_provider = provider_id.to_string();

        let reader = tokio::spawn(async move {
            while let Some(chunk) = stream.next().await {
                let Ok(chunk) = chunk else { break };
                for event in parser.feed_bytes(&chunk) {
                    if !event.is_message() {
                        continue;
                    }
                    let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(&event.data) else {
                        continue;
                    };
                    if resp.method.is_some() {
                        continue;
                    }
                    let waiter = reader_pending
                        .lock()
                        .ok()
                        .and_then(|mut map| map.remove(&resp.id));
                    if let Some(tx) = waiter {
                        let _ = tx.send(resp);
                    }
                }
            }
            tracing::debug!(provider = %reader_provider, "sse stream closed");
            // Dropping the senders wakes every waiting caller with an error
            if let Ok(mut map) = reader_pending.lock() {
                map.clear();
            }
        });

        Ok(Self {
            provider_id: provider_id.to_string(),
            endpoint,
            http,
            bearer,
            pending,
            reader,
        })
    }

    fn transport_error(&self, reason: String) -> McpError {
        McpError::TransportError {
            provider: self.provider_id.clone(),
            reason,
        }
    }

    async fn post<T: serde::Serialize>(&self, message: &T) -> Result<(), McpError> {
        let mut builder = self.http.post(self.endpoint.clone()).json(message);
        if let Some(token) = &self.bearer {
            builder = builder.bearer_auth(token);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| self.transport_error(format!("POST {} failed: {e}", self.endpoint)))?;
        check_status(&self.provider_id, response).await?;
        Ok(())
    }

    /// Post a request and wait for its response on the event stream.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = next_request_id();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .map_err(|e| self.transport_error(format!("pending map poisoned: {e}")))?
            .insert(id, tx);
        let _waiter = WaiterGuard {
            pending: &self.pending,
            id,
        };

        self.post(&JsonRpcRequest::new(id, method, params)).await?;

        rx.await
            .map_err(|_| self.transport_error("event stream closed while awaiting response".into()))
    }

    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        self.post(&JsonRpcNotification::new(method, params)).await
    }

    /// Stop reading the event stream.
    pub fn close(&self) {
        self.reader.abort();
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Removes a request's waiter from the pending map when the request ends,
/// including when the caller drops it on timeout.
struct WaiterGuard<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut map) = self.pending.lock() {
            map.remove(&self.id);
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
