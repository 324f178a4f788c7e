//! OpenAI-compatible chat-completions backend.
//!
//! Sends non-streaming `POST {base}/v1/chat/completions` requests with the
//! catalog in function-calling format. Works against Ollama, llama.cpp,
//! vLLM and OpenAI itself.

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use super::backend::{build_http_client, send_for_body, ReasoningBackend};
use super::config::BackendConfig;
use super::errors::InferenceError;
use super::response::parse_chat_completion;
use super::types::{
    BackendReply, ChatCompletionRequest, ChatMessage, FunctionCallResponse, Role,
    ToolCallResponse, Turn,
};
use crate::mcp_client::CapabilityCatalog;

/// API path appended to the configured origin.
const COMPLETIONS_PATH: &str = "/v1/chat/completions";

// ─── OpenAiCompatClient ──────────────────────────────────────────────────────

/// Client for an OpenAI-compatible endpoint.
pub struct OpenAiCompatClient {
    http: HttpClient,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
}

impl OpenAiCompatClient {
    /// Create a client from the backend config. Does NOT check connectivity.
    pub fn from_config(config: &BackendConfig) -> Result<Self, InferenceError> {
        let endpoint = format!("{}{COMPLETIONS_PATH}", config.resolved_base_url());
        Ok(Self {
            http: build_http_client(&endpoint)?,
            model: config.resolved_model()?,
            api_key: config.api_key().map(str::to_string),
            max_tokens: config.max_tokens,
            endpoint,
        })
    }

    /// Build the request body for a history and catalog.
    pub fn build_request(&self, history: &[Turn], catalog: &CapabilityCatalog) -> ChatCompletionRequest {
        let has_tools = !catalog.is_empty();
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: history.iter().map(to_chat_message).collect(),
            tools: has_tools.then(|| catalog.to_openai_tools()),
            tool_choice: has_tools.then(|| "auto".to_string()),
            max_tokens: Some(self.max_tokens),
            stream: false,
        }
    }
}

/// Map one history turn to its chat-completions message.
fn to_chat_message(turn: &Turn) -> ChatMessage {
    match turn {
        Turn::System(text) => ChatMessage::text(Role::System, text),
        Turn::User(text) => ChatMessage::text(Role::User, text),
        Turn::Assistant(reply) => match serde_json::from_value::<ChatMessage>(reply.raw.clone()) {
            Ok(msg) if msg.role == Role::Assistant => msg,
            _ => ChatMessage {
                role: Role::Assistant,
                content: Some(reply.text()).filter(|t| !t.is_empty()),
                tool_call_id: None,
                tool_calls: Some(
                    reply
                        .invocations
                        .iter()
                        .map(|inv| ToolCallResponse {
                            id: Some(inv.id.clone()),
                            r#type: "function".into(),
                            function: FunctionCallResponse {
                                name: inv.name.clone(),
                                arguments: serde_json::Value::String(inv.arguments.to_string()),
                            },
                        })
                        .collect(),
                ),
            },
        },
        Turn::ToolResult {
            call_id, content, ..
        } => ChatMessage {
            role: Role::Tool,
            content: Some(content.clone()),
            tool_call_id: Some(call_id.clone()),
            tool_calls: None,
        },
    }
}

#[async_trait]
impl ReasoningBackend for OpenAiCompatClient {
    async fn call(
        &self,
        history: &[Turn],
        catalog: &CapabilityCatalog,
    ) -> Result<BackendReply, InferenceError> {
        let body = self.build_request(history, catalog);

        tracing::debug!(
            model = %self.model,
            messages = body.messages.len(),
            tools = catalog.len(),
            "sending chat completion"
        );

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let text = send_for_body(&self.endpoint, request).await?;
        let reply = parse_chat_completion(&text)?;

        tracing::debug!(
            invocations = reply.invocations.len(),
            done = reply.done,
            "chat completion received"
        );
        Ok(reply)
    }

    fn describe(&self) -> String {
        format!("openai-compatible {} at {}", self.model, self.endpoint)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
