//! The narrow interface every reasoning backend implements.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, RequestBuilder};

use super::anthropic::AnthropicClient;
use super::client::OpenAiCompatClient;
use super::config::{BackendConfig, BackendKind};
use super::errors::InferenceError;
use super::types::{BackendReply, Turn};
use crate::mcp_client::CapabilityCatalog;

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Total timeout for one backend request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ─── ReasoningBackend ────────────────────────────────────────────────────────

/// One request/response exchange with a reasoning backend.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// Send the full history and catalog; return the normalized reply.
    async fn call(
        &self,
        history: &[Turn],
        catalog: &CapabilityCatalog,
    ) -> Result<BackendReply, InferenceError>;

    /// Short label for logs.
    fn describe(&self) -> String;
}

/// Build the backend selected by `config`.
pub fn from_config(config: &BackendConfig) -> Result<Arc<dyn ReasoningBackend>, InferenceError> {
    config.validate()?;
    let backend: Arc<dyn ReasoningBackend> = match config.kind {
        BackendKind::Anthropic => Arc::new(AnthropicClient::from_config(config)?),
        BackendKind::OpenaiCompatible => Arc::new(OpenAiCompatClient::from_config(config)?),
    };
    tracing::info!(backend = %backend.describe(), "reasoning backend ready");
    Ok(backend)
}

// ─── HTTP Helpers ────────────────────────────────────────────────────────────

/// Build the HTTP client shared by both adapters.
pub(crate) fn build_http_client(endpoint: &str) -> Result<HttpClient, InferenceError> {
    HttpClient::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| InferenceError::ConnectionFailed {
            endpoint: endpoint.to_string(),
            reason: format!("failed to build HTTP client: {e}"),
        })
}

/// Send a prepared request and return the body of a 2xx response.
pub(crate) async fn send_for_body(
    endpoint: &str,
    request: RequestBuilder,
) -> Result<String, InferenceError> {
    let timeout_secs = REQUEST_TIMEOUT.as_secs();
    let response = request
        .send()
        .await
        .map_err(|e| InferenceError::from_reqwest(endpoint, timeout_secs, e))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| InferenceError::from_reqwest(endpoint, timeout_secs, e))?;

    if !status.is_success() {
        return Err(InferenceError::HttpError {
            status: status.as_u16(),
            body: body.trim().to_string(),
        });
    }
    Ok(body)
}
