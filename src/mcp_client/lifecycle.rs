//! Provider connection lifecycle.
//!
//! Spawns process providers, negotiates network providers (Streamable HTTP
//! first, HTTP+SSE as fallback), runs the MCP initialize handshake, and shuts
//! processes down with a bounded grace period.

use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, Command};

use super::errors::McpError;
use super::http::{HttpTransport, SseTransport};
use super::transport::{extract_result, StdioTransport, Transport};
use super::types::{InitializeResult, ProviderConfig, TransportConfig, PROTOCOL_VERSION};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Timeout for the initialize handshake.
pub const INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Grace period for a process provider to exit after stdin closes.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Name this client reports in `clientInfo`.
const CLIENT_NAME: &str = "mcp-browser";

/// Cap on captured stderr attached to errors.
const STDERR_LIMIT: usize = 2000;

// ─── Connected ───────────────────────────────────────────────────────────────

/// A transport that has completed the initialize handshake.
pub struct Connected {
    pub transport: Transport,
    pub process: Option<Child>,
    pub init: InitializeResult,
}

/// Establish a session with a provider according to its transport config.
pub async fn connect(config: &ProviderConfig) -> Result<Connected, McpError> {
    match &config.transport {
        TransportConfig::Process { .. } => spawn_process(config).await,
        TransportConfig::Network { url } => connect_network(config, url).await,
    }
}

// ─── Process Providers ───────────────────────────────────────────────────────

/// Spawn a process provider and perform the initialize handshake.
pub async fn spawn_process(config: &ProviderConfig) -> Result<Connected, McpError> {
    let TransportConfig::Process { command, args, env } = &config.transport else {
        return Err(McpError::ConfigError {
            reason: format!("provider '{}' is not a process provider", config.id),
        });
    };
    let id = config.id.as_str();

    let mut cmd = Command::new(command);
    cmd.args(args);
    for (key, value) in env {
        cmd.env(key, value);
    }
    if let (Some(credential), Some(secret)) = (&config.credential, &config.resolved_credential) {
        cmd.env(&credential.env_var, secret);
    }

    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    cmd.stdin(std::process::Stdio::piped());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| McpError::ConnectionFailed {
        id: id.to_string(),
        reason: format!("failed to spawn '{command}': {e}"),
    })?;

    let stdin = child.stdin.take().ok_or_else(|| McpError::ConnectionFailed {
        id: id.to_string(),
        reason: "failed to capture stdin".into(),
    })?;
    let stdout = child.stdout.take().ok_or_else(|| McpError::ConnectionFailed {
        id: id.to_string(),
        reason: "failed to capture stdout".into(),
    })?;
    let stderr = child.stderr.take();

    let transport = Transport::Stdio(StdioTransport::new(id, stdin, stdout));

    match initialize_with_timeout(&transport, id).await {
        Ok(init) => {
            tracing::info!(
                provider = id,
                pid = child.id(),
                server = init.server_info.as_ref().and_then(|s| s.name.as_deref()),
                "process provider initialized"
            );
            Ok(Connected {
                transport,
                process: Some(child),
                init,
            })
        }
        Err(e) => {
            let _ = child.start_kill();
            let stderr_ctx = read_stderr_on_failure(stderr).await;
            if !stderr_ctx.is_empty() {
                tracing::warn!(provider = id, stderr = %stderr_ctx, "provider stderr captured on failure");
            }
            Err(McpError::InitFailed {
                id: id.to_string(),
                reason: format!("{}{}", failure_reason(e), format_stderr_suffix(&stderr_ctx)),
            })
        }
    }
}

/// Read whatever the failed process wrote to stderr, bounded in time and size.
async fn read_stderr_on_failure(stderr: Option<ChildStderr>) -> String {
    let Some(mut stderr) = stderr else {
        return String::new();
    };

    let mut buf = Vec::new();
    let read = tokio::time::timeout(Duration::from_millis(500), stderr.read_to_end(&mut buf)).await;
    if !matches!(read, Ok(Ok(_))) && buf.is_empty() {
        return String::new();
    }

    let mut text = String::from_utf8_lossy(&buf).trim().to_string();
    if text.len() > STDERR_LIMIT {
        let cut = (0..=STDERR_LIMIT)
            .rev()
            .find(|i| text.is_char_boundary(*i))
            .unwrap_or(0);
        text.truncate(cut);
        text.push_str("...(truncated)");
    }
    text
}

fn format_stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(" | stderr: {stderr}")
    }
}

/// Strip the provider prefix when a lower-level error already names it.
fn failure_reason(e: McpError) -> String {
    match e {
        McpError::TransportError { reason, .. } | McpError::InitFailed { reason, .. } => reason,
        other => other.to_string(),
    }
}

/// Close stdin and wait for the process to exit, killing it after the grace period.
pub async fn shutdown_process(provider_id: &str, transport: &Transport, child: &mut Child) {
    transport.close().await;
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait()).await {
        Ok(Ok(status)) => {
            tracing::debug!(provider = provider_id, %status, "provider process exited");
        }
        _ => {
            tracing::warn!(provider = provider_id, "provider did not exit in time, killing");
            let _ = child.kill().await;
        }
    }
}

// ─── Network Providers ───────────────────────────────────────────────────────

/// Connect to a network provider: Streamable HTTP, then HTTP+SSE.
///
/// Both attempts are one logical connection attempt; if both fail the error
/// carries both reasons.
pub async fn connect_network(config: &ProviderConfig, url: &str) -> Result<Connected, McpError> {
    let id = config.id.as_str();
    let bearer = config.resolved_credential.clone();

    let primary = async {
        let transport = Transport::StreamableHttp(HttpTransport::new(id, url, bearer.clone())?);
        let init = initialize_with_timeout(&transport, id).await?;
        Ok::<_, McpError>(Connected {
            transport,
            process: None,
            init,
        })
    }
    .await;

    let primary_err = match primary {
        Ok(connected) => {
            tracing::info!(provider = id, url, "connected via streamable http");
            return Ok(connected);
        }
        Err(e) => e,
    };

    tracing::debug!(provider = id, error = %primary_err, "streamable http failed, trying sse");

    let fallback = async {
        let sse = tokio::time::timeout(INIT_TIMEOUT, SseTransport::connect(id, url, bearer.clone()))
            .await
            .map_err(|_| McpError::Timeout {
                provider: id.to_string(),
                operation: "sse connect".into(),
                timeout_ms: INIT_TIMEOUT.as_millis() as u64,
            })??;
        let transport = Transport::Sse(sse);
        let init = initialize_with_timeout(&transport, id).await?;
        Ok::<_, McpError>(Connected {
            transport,
            process: None,
            init,
        })
    }
    .await;

    match fallback {
        Ok(connected) => {
            tracing::info!(provider = id, url, "connected via sse");
            Ok(connected)
        }
        Err(fallback_err) => Err(McpError::ConnectionFailed {
            id: id.to_string(),
            reason: format!(
                "streamable http: {}; sse: {}",
                failure_reason(primary_err),
                failure_reason(fallback_err)
            ),
        }),
    }
}

// ─── Handshake ───────────────────────────────────────────────────────────────

async fn initialize_with_timeout(
    transport: &Transport,
    provider_id: &str,
) -> Result<InitializeResult, McpError> {
    tokio::time::timeout(INIT_TIMEOUT, initialize(transport, provider_id))
        .await
        .map_err(|_| McpError::InitFailed {
            id: provider_id.to_string(),
            reason: format!("initialization timed out after {}s", INIT_TIMEOUT.as_secs()),
        })?
}

/// Perform the MCP initialize request followed by `notifications/initialized`.
pub async fn initialize(
    transport: &Transport,
    provider_id: &str,
) -> Result<InitializeResult, McpError> {
    let params = serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": CLIENT_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
    });

    let response = transport.request("initialize", Some(params)).await?;
    let result = extract_result(response)?;
    let init: InitializeResult =
        serde_json::from_value(result).map_err(|e| McpError::InitFailed {
            id: provider_id.to_string(),
            reason: format!("failed to parse initialize response: {e}"),
        })?;

    transport.notify("notifications/initialized", None).await?;

    tracing::debug!(
        provider = provider_id,
        transport = transport.kind(),
        protocol = init.protocol_version.as_deref(),
        "initialize handshake complete"
    );
    Ok(init)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
