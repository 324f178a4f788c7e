//! Shared types for the reasoning backends.
//!
//! [`Turn`], [`Invocation`] and [`BackendReply`] are the protocol-neutral
//! conversation model the orchestrator works with. The remaining types mirror
//! the OpenAI Chat Completions API and are used by the OpenAI-compatible
//! adapter for request building and response parsing.

use serde::{Deserialize, Serialize};

// ─── Conversation Model ──────────────────────────────────────────────────────

/// One entry in a run's conversation history.
#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    /// Fixed instructions for the backend.
    System(String),
    /// The user's query.
    User(String),
    /// An assistant response that requested invocations, replayed verbatim.
    Assistant(BackendReply),
    /// The outcome of one invocation.
    ToolResult {
        call_id: String,
        content: String,
        is_error: bool,
    },
}

/// A tool call requested by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Backend-assigned call id, echoed in the result turn.
    pub id: String,
    /// Namespaced tool name.
    pub name: String,
    pub arguments: serde_json::Value,
}

/// One backend response, normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendReply {
    /// Narrative text segments, in order. May contain empty strings.
    pub segments: Vec<String>,
    /// Requested invocations, in the order the backend listed them.
    pub invocations: Vec<Invocation>,
    /// The backend signalled a natural stop.
    pub done: bool,
    /// The assistant message in the backend's own wire format.
    pub raw: serde_json::Value,
}

impl BackendReply {
    /// Concatenated narrative text.
    pub fn text(&self) -> String {
        self.segments.concat()
    }

    /// Whether the run should finish with this reply.
    pub fn is_terminal(&self) -> bool {
        self.done || self.invocations.is_empty()
    }
}

// ─── OpenAI Request Types ────────────────────────────────────────────────────

/// A single message in the conversation.
///
/// Serialization notes for OpenAI-compatible local runtimes:
/// - `content` must be `""` (not `null`) for assistant messages with tool
///   calls. Ollama and llama.cpp mishandle `null` content.
/// - `tool_call_id` and `tool_calls` are skipped when `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default, serialize_with = "serialize_content")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallResponse>>,
}

impl ChatMessage {
    pub fn text(role: Role, content: &str) -> Self {
        Self {
            role,
            content: Some(content.to_string()),
            tool_call_id: None,
            tool_calls: None,
        }
    }
}

/// Emit `""` instead of `null` when `content` is `None`.
fn serialize_content<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(s) => serializer.serialize_str(s),
        None => serializer.serialize_str(""),
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Request body for `POST /v1/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

// ─── OpenAI Response Types ───────────────────────────────────────────────────

/// Tool call as carried in an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_tool_type")]
    pub r#type: String,
    pub function: FunctionCallResponse,
}

fn default_tool_type() -> String {
    "function".to_string()
}

/// Function call details in a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallResponse {
    pub name: String,
    /// JSON-encoded arguments. Some runtimes send an object instead.
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Non-streaming completion response.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChoice {
    pub message: serde_json::Value,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_content_serializes_as_empty_string() {
        let msg = ChatMessage {
            role: Role::Assistant,
            content: None,
            tool_call_id: None,
            tool_calls: Some(vec![]),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"], "");
        assert_eq!(json["role"], "assistant");
        assert!(json.get("tool_call_id").is_none());
    }

    #[test]
    fn test_assistant_message_with_null_content_deserializes() {
        let json = serde_json::json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "ddg__search", "arguments": "{\"q\":\"x\"}"}
            }]
        });
        let msg: ChatMessage = serde_json::from_value(json).unwrap();
        assert!(msg.content.is_none());
        assert_eq!(msg.tool_calls.unwrap()[0].function.name, "ddg__search");
    }

    #[test]
    fn test_reply_terminal_rules() {
        let mut reply = BackendReply {
            segments: vec!["a".into(), "b".into()],
            invocations: vec![],
            done: false,
            raw: serde_json::Value::Null,
        };
        assert_eq!(reply.text(), "ab");
        assert!(reply.is_terminal());

        reply.invocations.push(Invocation {
            id: "1".into(),
            name: "ddg__search".into(),
            arguments: serde_json::json!({}),
        });
        assert!(!reply.is_terminal());
        reply.done = true;
        assert!(reply.is_terminal());
    }
}
