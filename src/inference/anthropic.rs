//! Anthropic Messages API backend.
//!
//! Single request/response exchanges against `POST {base}/v1/messages`.
//! The system directive goes in the top-level `system` field; consecutive
//! tool results are grouped into one `user` message of `tool_result` blocks.

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;

use super::backend::{build_http_client, send_for_body, ReasoningBackend};
use super::config::BackendConfig;
use super::errors::InferenceError;
use super::types::{BackendReply, Invocation, Turn};
use crate::mcp_client::CapabilityCatalog;

// ─── Constants ───────────────────────────────────────────────────────────────

/// API path appended to the configured origin.
const MESSAGES_PATH: &str = "/v1/messages";

/// Value of the `anthropic-version` header.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

// ─── Response Types ──────────────────────────────────────────────────────────

/// Response from the Messages API.
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

/// Content block in a response.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    /// Thinking and other block types are carried in `raw` only.
    #[serde(other)]
    Other,
}

// ─── AnthropicClient ─────────────────────────────────────────────────────────

/// Client for the Anthropic Messages API.
pub struct AnthropicClient {
    http: HttpClient,
    endpoint: String,
    model: String,
    api_key: String,
    max_tokens: u32,
}

impl AnthropicClient {
    /// Create a client from the backend config. Does NOT check connectivity.
    pub fn from_config(config: &BackendConfig) -> Result<Self, InferenceError> {
        let api_key = config
            .api_key()
            .ok_or_else(|| InferenceError::ConfigError {
                reason: "backend.api_key is required for the anthropic backend".into(),
            })?
            .to_string();
        let endpoint = format!("{}{MESSAGES_PATH}", config.resolved_base_url());
        Ok(Self {
            http: build_http_client(&endpoint)?,
            model: config.resolved_model()?,
            api_key,
            max_tokens: config.max_tokens,
            endpoint,
        })
    }

    /// Build the request body for a history and catalog.
    pub fn build_request(&self, history: &[Turn], catalog: &CapabilityCatalog) -> serde_json::Value {
        let mut system: Vec<&str> = Vec::new();
        let mut messages: Vec<serde_json::Value> = Vec::new();
        let mut pending_results: Vec<serde_json::Value> = Vec::new();

        for turn in history {
            if let Turn::ToolResult {
                call_id,
                content,
                is_error,
            } = turn
            {
                let mut block = serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": call_id,
                    "content": content,
                });
                if *is_error {
                    block["is_error"] = serde_json::Value::Bool(true);
                }
                pending_results.push(block);
                continue;
            }

            if !pending_results.is_empty() {
                messages.push(serde_json::json!({
                    "role": "user",
                    "content": std::mem::take(&mut pending_results),
                }));
            }

            match turn {
                Turn::System(text) => system.push(text),
                Turn::User(text) => messages.push(serde_json::json!({
                    "role": "user",
                    "content": text,
                })),
                Turn::Assistant(reply) => messages.push(serde_json::json!({
                    "role": "assistant",
                    "content": assistant_blocks(reply),
                })),
                Turn::ToolResult { .. } => {}
            }
        }

        if !pending_results.is_empty() {
            messages.push(serde_json::json!({
                "role": "user",
                "content": pending_results,
            }));
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = serde_json::Value::String(system.join("\n\n"));
        }
        if !catalog.is_empty() {
            body["tools"] = serde_json::Value::Array(catalog.to_anthropic_tools());
        }
        body
    }
}

/// The assistant content blocks to replay: the raw blocks when present,
/// otherwise rebuilt from the normalized reply.
fn assistant_blocks(reply: &BackendReply) -> serde_json::Value {
    if reply.raw.is_array() {
        return reply.raw.clone();
    }
    let mut blocks: Vec<serde_json::Value> = reply
        .segments
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| serde_json::json!({"type": "text", "text": s}))
        .collect();
    blocks.extend(reply.invocations.iter().map(|inv| {
        serde_json::json!({
            "type": "tool_use",
            "id": inv.id,
            "name": inv.name,
            "input": inv.arguments,
        })
    }));
    serde_json::Value::Array(blocks)
}

/// Parse a Messages API response body into a [`BackendReply`].
pub fn parse_messages_response(body: &str) -> Result<BackendReply, InferenceError> {
    let raw: serde_json::Value =
        serde_json::from_str(body).map_err(|e| InferenceError::MalformedResponse {
            reason: format!("failed to parse messages response: {e}"),
        })?;
    let resp: MessagesResponse =
        serde_json::from_value(raw.clone()).map_err(|e| InferenceError::MalformedResponse {
            reason: format!("unexpected messages response shape: {e}"),
        })?;

    let mut segments = Vec::new();
    let mut invocations = Vec::new();
    for block in resp.content {
        match block {
            ResponseBlock::Text { text } => segments.push(text),
            ResponseBlock::ToolUse { id, name, input } => invocations.push(Invocation {
                id,
                name,
                arguments: if input.is_null() {
                    serde_json::json!({})
                } else {
                    input
                },
            }),
            ResponseBlock::Other => {}
        }
    }

    let done = invocations.is_empty() || resp.stop_reason.as_deref() == Some("end_turn");
    Ok(BackendReply {
        segments,
        invocations,
        done,
        raw: raw.get("content").cloned().unwrap_or(serde_json::Value::Null),
    })
}

#[async_trait]
impl ReasoningBackend for AnthropicClient {
    async fn call(
        &self,
        history: &[Turn],
        catalog: &CapabilityCatalog,
    ) -> Result<BackendReply, InferenceError> {
        let body = self.build_request(history, catalog);

        tracing::debug!(
            model = %self.model,
            turns = history.len(),
            tools = catalog.len(),
            "sending messages request"
        );

        let request = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        let text = send_for_body(&self.endpoint, request).await?;
        let reply = parse_messages_response(&text)?;

        tracing::debug!(
            segments = reply.segments.len(),
            invocations = reply.invocations.len(),
            done = reply.done,
            "messages response received"
        );
        Ok(reply)
    }

    fn describe(&self) -> String {
        format!("anthropic {}", self.model)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::config::BackendKind;
    use crate::mcp_client::{CapabilityDescriptor, McpToolDefinition};

    fn client(base_url: &str) -> AnthropicClient {
        AnthropicClient::from_config(&BackendConfig {
            kind: BackendKind::Anthropic,
            api_key: Some("sk-ant-test".into()),
            base_url: Some(base_url.into()),
            ..BackendConfig::default()
        })
        .unwrap()
    }

    fn tool_result(id: &str, content: &str, is_error: bool) -> Turn {
        Turn::ToolResult {
            call_id: id.into(),
            content: content.into(),
            is_error,
        }
    }

    #[test]
    fn test_parse_text_and_tool_use() {
        let body = r#"{
            "id": "msg_1", "type": "message", "role": "assistant",
            "content": [
                {"type": "text", "text": "Let me search."},
                {"type": "tool_use", "id": "toolu_1", "name": "ddg__search", "input": {"query": "capital of France"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }"#;
        let reply = parse_messages_response(body).unwrap();
        assert_eq!(reply.segments, vec!["Let me search."]);
        assert_eq!(reply.invocations[0].id, "toolu_1");
        assert_eq!(reply.invocations[0].arguments["query"], "capital of France");
        assert!(!reply.done);
        assert_eq!(reply.raw.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_end_turn_is_done_even_with_tool_use() {
        let body = r#"{
            "content": [{"type": "tool_use", "id": "t", "name": "a__b", "input": {}}],
            "stop_reason": "end_turn"
        }"#;
        assert!(parse_messages_response(body).unwrap().done);
    }

    #[test]
    fn test_unknown_blocks_are_skipped() {
        let body = r#"{
            "content": [
                {"type": "thinking", "thinking": "hmm", "signature": "x"},
                {"type": "text", "text": "Done."}
            ],
            "stop_reason": "end_turn"
        }"#;
        let reply = parse_messages_response(body).unwrap();
        assert_eq!(reply.text(), "Done.");
        assert!(reply.done);
    }

    #[test]
    fn test_missing_content_is_malformed() {
        assert!(matches!(
            parse_messages_response(r#"{"type": "error"}"#),
            Err(InferenceError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_request_groups_tool_results() {
        let reply = parse_messages_response(
            r#"{"content": [
                {"type": "tool_use", "id": "t1", "name": "ddg__search", "input": {}},
                {"type": "tool_use", "id": "t2", "name": "web__fetch", "input": {}}
            ], "stop_reason": "tool_use"}"#,
        )
        .unwrap();
        let history = vec![
            Turn::System("directive".into()),
            Turn::User("query".into()),
            Turn::Assistant(reply),
            tool_result("t1", "ok", false),
            tool_result("t2", "Error executing tool: boom", true),
        ];

        let catalog = CapabilityCatalog::new(vec![CapabilityDescriptor::new(
            "ddg",
            "DuckDuckGo",
            McpToolDefinition {
                name: "search".into(),
                description: None,
                input_schema: serde_json::json!({"type": "object"}),
            },
        )]);
        let body = client("https://api.anthropic.com").build_request(&history, &catalog);

        assert_eq!(body["system"], "directive");
        assert_eq!(body["max_tokens"], 8192);
        assert_eq!(body["tools"][0]["name"], "ddg__search");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["content"][1]["id"], "t2");
        let results = messages[2]["content"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["tool_use_id"], "t1");
        assert!(results[0].get("is_error").is_none());
        assert_eq!(results[1]["is_error"], true);
    }

    #[tokio::test]
    async fn test_call_sends_version_and_key_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "sk-ant-test")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"content": [{"type": "text", "text": "Hi"}], "stop_reason": "end_turn"}"#)
            .create_async()
            .await;

        let reply = client(&server.url())
            .call(&[Turn::User("hello".into())], &CapabilityCatalog::default())
            .await
            .unwrap();
        assert_eq!(reply.text(), "Hi");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_surfaces_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_status(529)
            .with_body(r#"{"type": "error", "error": {"type": "overloaded_error"}}"#)
            .create_async()
            .await;

        let err = client(&server.url())
            .call(&[Turn::User("hello".into())], &CapabilityCatalog::default())
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::HttpError { status: 529, .. }));
    }
}
