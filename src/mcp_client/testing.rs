//! In-memory providers for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::client::{Connector, ProviderSession};
use super::errors::McpError;
use super::types::{McpToolDefinition, ProviderConfig};

/// How a fake provider behaves.
#[derive(Debug, Clone, Default)]
pub struct FakeProvider {
    pub tools: Vec<String>,
    pub refuse_connect: bool,
    pub fail_listing: bool,
    /// Local tool name → canned text result. Tools not listed here fail.
    pub results: HashMap<String, String>,
    pub connect_delay: Option<Duration>,
}

impl FakeProvider {
    pub fn with_tools(tools: &[&str]) -> Self {
        Self {
            tools: tools.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn answering(mut self, tool: &str, text: &str) -> Self {
        self.results.insert(tool.to_string(), text.to_string());
        self
    }

    pub fn unreachable() -> Self {
        Self {
            refuse_connect: true,
            ..Self::default()
        }
    }
}

/// Connector over a fixed table of fake providers.
#[derive(Default)]
pub struct FakeConnector {
    providers: HashMap<String, FakeProvider>,
    pub connects: AtomicUsize,
    pub closes: Arc<AtomicUsize>,
    pub calls: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
}

impl FakeConnector {
    pub fn new(providers: Vec<(&str, FakeProvider)>) -> Self {
        Self {
            providers: providers
                .into_iter()
                .map(|(id, p)| (id.to_string(), p))
                .collect(),
            ..Self::default()
        }
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Config entries for every fake provider, sorted by id.
    pub fn configs(&self) -> Vec<ProviderConfig> {
        let mut ids: Vec<&String> = self.providers.keys().collect();
        ids.sort();
        ids.into_iter()
            .map(|id| ProviderConfig::process(id, &format!("{id} provider"), "fake", vec![]))
            .collect()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, config: &ProviderConfig) -> Result<Arc<dyn ProviderSession>, McpError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let provider = self
            .providers
            .get(&config.id)
            .cloned()
            .unwrap_or_default();

        if let Some(delay) = provider.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if provider.refuse_connect {
            return Err(McpError::ConnectionFailed {
                id: config.id.clone(),
                reason: "connection refused".into(),
            });
        }

        Ok(Arc::new(FakeSession {
            provider_id: config.id.clone(),
            provider,
            closes: self.closes.clone(),
            calls: self.calls.clone(),
        }))
    }
}

struct FakeSession {
    provider_id: String,
    provider: FakeProvider,
    closes: Arc<AtomicUsize>,
    calls: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
}

#[async_trait]
impl ProviderSession for FakeSession {
    async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
        if self.provider.fail_listing {
            return Err(McpError::TransportError {
                provider: self.provider_id.clone(),
                reason: "tools/list exploded".into(),
            });
        }
        Ok(self
            .provider
            .tools
            .iter()
            .map(|name| McpToolDefinition {
                name: name.clone(),
                description: Some(format!("{name} via {}", self.provider_id)),
                input_schema: serde_json::json!({"type": "object"}),
            })
            .collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        self.calls
            .lock()
            .unwrap()
            .push((format!("{}/{name}", self.provider_id), arguments));
        match self.provider.results.get(name) {
            Some(text) => Ok(serde_json::json!({
                "content": [{"type": "text", "text": text}],
                "isError": false
            })),
            None => Err(McpError::InvocationFailed {
                tool: name.to_string(),
                message: "upstream returned 503".into(),
            }),
        }
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

// ─── Legacy HTTP+SSE Server ──────────────────────────────────────────────────

type FrameQueue = Arc<tokio::sync::Mutex<tokio::sync::mpsc::UnboundedReceiver<String>>>;

/// Local HTTP+SSE provider that keeps its event stream open.
///
/// `GET /sse` opens the stream and announces `/messages` as the POST
/// endpoint. Each POSTed request is answered on the stream after a stray
/// server notification; requests for method `hang` are never answered.
/// Any other route answers 405, so a Streamable HTTP attempt fails.
pub struct LegacySseServer {
    addr: std::net::SocketAddr,
    received: Arc<Mutex<Vec<serde_json::Value>>>,
    accept: tokio::task::JoinHandle<()>,
}

impl LegacySseServer {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let (frames_tx, frames_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
        let frames_rx: FrameQueue = Arc::new(tokio::sync::Mutex::new(frames_rx));

        let log = received.clone();
        let accept = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve_legacy(
                    socket,
                    frames_tx.clone(),
                    frames_rx.clone(),
                    log.clone(),
                ));
            }
        });

        Self {
            addr,
            received,
            accept,
        }
    }

    /// URL of the event stream.
    pub fn url(&self) -> String {
        format!("http://{}/sse", self.addr)
    }

    /// Methods of every message POSTed to the endpoint, in arrival order.
    pub fn methods(&self) -> Vec<String> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| m["method"].as_str().map(str::to_string))
            .collect()
    }
}

impl Drop for LegacySseServer {
    fn drop(&mut self) {
        self.accept.abort();
    }
}

async fn serve_legacy(
    mut socket: tokio::net::TcpStream,
    frames_tx: tokio::sync::mpsc::UnboundedSender<String>,
    frames_rx: FrameQueue,
    log: Arc<Mutex<Vec<serde_json::Value>>>,
) {
    use tokio::io::AsyncWriteExt;

    let Some((request_line, body)) = read_http_request(&mut socket).await else {
        return;
    };
    let mut parts = request_line.split_whitespace();
    let verb = parts.next().unwrap_or_default();
    let path = parts.next().unwrap_or_default();

    match (verb, path) {
        ("GET", "/sse") => {
            let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\n\
                        cache-control: no-cache\r\nconnection: close\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err()
                || socket
                    .write_all(b"event: endpoint\ndata: /messages?session=1\n\n")
                    .await
                    .is_err()
            {
                return;
            }
            let mut frames = frames_rx.lock().await;
            while let Some(frame) = frames.recv().await {
                if socket.write_all(frame.as_bytes()).await.is_err() {
                    break;
                }
            }
        }
        ("POST", p) if p.starts_with("/messages") => {
            let message: serde_json::Value = serde_json::from_slice(&body).unwrap_or_default();
            log.lock().unwrap().push(message.clone());

            let method = message["method"].as_str().unwrap_or_default();
            if !message["id"].is_null() && method != "hang" {
                let result = if method == "initialize" {
                    serde_json::json!({
                        "protocolVersion": "2024-11-05",
                        "capabilities": {"tools": {}},
                        "serverInfo": {"name": "legacy", "version": "0.1"}
                    })
                } else {
                    serde_json::json!({"method": method})
                };
                let notice = serde_json::json!({
                    "jsonrpc": "2.0", "method": "notifications/message", "params": {"level": "info"}
                });
                let reply = serde_json::json!({"jsonrpc": "2.0", "id": message["id"], "result": result});
                let _ = frames_tx.send(format!(
                    "event: message\ndata: {notice}\n\nevent: message\ndata: {reply}\n\n"
                ));
            }
            let _ = socket
                .write_all(b"HTTP/1.1 202 Accepted\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await;
        }
        _ => {
            let _ = socket
                .write_all(
                    b"HTTP/1.1 405 Method Not Allowed\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                )
                .await;
        }
    }
    let _ = socket.shutdown().await;
}

/// Read one request: the request line and the body sized by `content-length`.
async fn read_http_request(socket: &mut tokio::net::TcpStream) -> Option<(String, Vec<u8>)> {
    use tokio::io::AsyncReadExt;

    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let request_line = head.lines().next()?.to_string();
    Some((request_line, buf[header_end..].to_vec()))
}
