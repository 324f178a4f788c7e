//! Parsing of non-streaming chat-completion responses.

use uuid::Uuid;

use super::errors::InferenceError;
use super::types::{BackendReply, ChatCompletionResponse, ChatMessage, Invocation};

/// Parse a `/v1/chat/completions` response body into a [`BackendReply`].
///
/// Uses the first choice. Tool-call arguments that are not valid JSON degrade
/// to `{}`; an object sent in place of the JSON string is accepted as-is.
pub fn parse_chat_completion(body: &str) -> Result<BackendReply, InferenceError> {
    let resp: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::MalformedResponse {
            reason: format!("failed to parse completion response: {e}"),
        })?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or(InferenceError::MalformedResponse {
            reason: "empty choices array".into(),
        })?;

    let message: ChatMessage =
        serde_json::from_value(choice.message.clone()).map_err(|e| {
            InferenceError::MalformedResponse {
                reason: format!("unexpected assistant message shape: {e}"),
            }
        })?;

    let text = message.content.clone().unwrap_or_default();
    let invocations: Vec<Invocation> = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| Invocation {
            id: tc
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{}", Uuid::new_v4())),
            arguments: parse_arguments(&tc.function.name, tc.function.arguments),
            name: tc.function.name,
        })
        .collect();

    let done = choice.finish_reason.as_deref() == Some("stop");

    let mut raw = choice.message;
    backfill_call_ids(&mut raw, &invocations);

    Ok(BackendReply {
        segments: vec![text],
        invocations,
        done,
        raw,
    })
}

/// Write the ids assigned to `invocations` into the raw `tool_calls`, so the
/// replayed assistant message pairs with the tool results that follow it.
fn backfill_call_ids(raw: &mut serde_json::Value, invocations: &[Invocation]) {
    let Some(calls) = raw.get_mut("tool_calls").and_then(|c| c.as_array_mut()) else {
        return;
    };
    for (call, invocation) in calls.iter_mut().zip(invocations) {
        let Some(call) = call.as_object_mut() else {
            continue;
        };
        let has_id = call
            .get("id")
            .and_then(|id| id.as_str())
            .is_some_and(|id| !id.is_empty());
        if !has_id {
            call.insert("id".into(), serde_json::Value::String(invocation.id.clone()));
        }
    }
}

/// Decode tool-call arguments, falling back to an empty object.
fn parse_arguments(tool: &str, raw: serde_json::Value) -> serde_json::Value {
    match raw {
        serde_json::Value::String(s) if s.trim().is_empty() => serde_json::json!({}),
        serde_json::Value::String(s) => match serde_json::from_str::<serde_json::Value>(&s) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(tool, error = %e, raw = %s, "unparseable tool arguments, using {{}}");
                serde_json::json!({})
            }
        },
        serde_json::Value::Null => serde_json::json!({}),
        other => other,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_only() {
        let body = r#"{
            "choices": [{
                "message": {"role": "assistant", "content": "Hello, world!"},
                "finish_reason": "stop"
            }]
        }"#;
        let reply = parse_chat_completion(body).unwrap();
        assert_eq!(reply.text(), "Hello, world!");
        assert!(reply.invocations.is_empty());
        assert!(reply.done);
    }

    #[test]
    fn test_parse_tool_calls() {
        let body = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "ddg__search", "arguments": "{\"query\": \"capital of France\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }"#;
        let reply = parse_chat_completion(body).unwrap();
        assert!(!reply.done);
        assert_eq!(reply.text(), "");
        assert_eq!(reply.invocations[0].id, "call_abc");
        assert_eq!(reply.invocations[0].name, "ddg__search");
        assert_eq!(reply.invocations[0].arguments["query"], "capital of France");
        assert!(reply.raw["tool_calls"].is_array());
    }

    #[test]
    fn test_unparseable_arguments_degrade_to_empty_object() {
        let body = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "",
                    "tool_calls": [
                        {"function": {"name": "web__fetch", "arguments": "{url: broken"}},
                        {"function": {"name": "web__fetch", "arguments": {"url": "https://example.org"}}}
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        }"#;
        let reply = parse_chat_completion(body).unwrap();
        assert_eq!(reply.invocations[0].arguments, serde_json::json!({}));
        assert!(reply.invocations[0].id.starts_with("call_"));
        assert_eq!(reply.invocations[1].arguments["url"], "https://example.org");
        assert_eq!(reply.raw["tool_calls"][0]["id"], reply.invocations[0].id.as_str());
        assert_eq!(reply.raw["tool_calls"][1]["id"], reply.invocations[1].id.as_str());
    }

    #[test]
    fn test_backend_ids_are_kept() {
        let body = r#"{"choices": [{
            "message": {"role": "assistant", "tool_calls": [
                {"id": "call_abc", "type": "function", "function": {"name": "a__b", "arguments": "{}"}}
            ]},
            "finish_reason": "tool_calls"
        }]}"#;
        let reply = parse_chat_completion(body).unwrap();
        assert_eq!(reply.invocations[0].id, "call_abc");
        assert_eq!(reply.raw["tool_calls"][0]["id"], "call_abc");
    }

    #[test]
    fn test_empty_choices_is_malformed() {
        let err = parse_chat_completion(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, InferenceError::MalformedResponse { .. }));
    }

    #[test]
    fn test_non_json_body_is_malformed() {
        assert!(parse_chat_completion("<html>gateway error</html>").is_err());
    }
}
