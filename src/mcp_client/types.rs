//! Shared types for the MCP client.
//!
//! JSON-RPC 2.0 message types, MCP protocol structures, and the provider
//! configuration model.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 notification (no id, no response).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    pub fn new(method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response message (success or error).
///
/// Server-initiated requests also carry an `id`; `method` is captured so the
/// readers can tell them apart from responses.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: u64,
    #[serde(default)]
    pub method: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Whether this message answers request `id`.
    pub fn answers(&self, id: u64) -> bool {
        self.id == id && self.method.is_none()
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

// ─── MCP Protocol Types ──────────────────────────────────────────────────────

/// MCP protocol revision this client speaks.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Tool definition as returned by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "inputSchema")]
    pub input_schema: serde_json::Value,
}

/// `tools/list` response payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<McpToolDefinition>,
    #[serde(default, alias = "nextCursor")]
    pub next_cursor: Option<String>,
}

/// `tools/call` response payload.
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default, alias = "isError")]
    pub is_error: bool,
}

impl CallToolResult {
    /// Concatenate the text items of the content array.
    pub fn text(&self) -> String {
        match self.content.as_array() {
            Some(items) => items
                .iter()
                .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("\n"),
            None => self.content.to_string(),
        }
    }
}

/// MCP initialize response payload.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    #[serde(default, alias = "protocolVersion")]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub capabilities: serde_json::Value,
    #[serde(default, alias = "serverInfo")]
    pub server_info: Option<ServerInfo>,
}

/// Server info returned in the initialize response.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

// ─── Provider Configuration ─────────────────────────────────────────────────

/// How the client reaches a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Child process speaking JSON-RPC over stdio.
    Process {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// Remote endpoint: Streamable HTTP first, HTTP+SSE as fallback.
    Network {
        url: String,
    },
}

/// Reference to a secret the provider needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRef {
    /// Environment variable the secret is injected as (process transport).
    pub env_var: String,
    /// Lookup key in the credential source. Defaults to `env_var`.
    #[serde(default)]
    pub key: Option<String>,
}

impl CredentialRef {
    pub fn lookup_key(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.env_var)
    }
}

/// Provider grouping shown to users.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderCategory {
    Search,
    Knowledge,
    Utility,
    #[default]
    Custom,
}

/// One configured capability provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub transport: TransportConfig,
    #[serde(default)]
    pub credential: Option<CredentialRef>,
    #[serde(default)]
    pub category: ProviderCategory,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Secret resolved at runtime; never persisted.
    #[serde(skip)]
    pub resolved_credential: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl ProviderConfig {
    /// Build a process-transport provider.
    pub fn process(id: &str, name: &str, command: &str, args: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            transport: TransportConfig::Process {
                command: command.to_string(),
                args,
                env: HashMap::new(),
            },
            credential: None,
            category: ProviderCategory::Custom,
            enabled: true,
            resolved_credential: None,
        }
    }

    /// Build a network-transport provider.
    pub fn network(id: &str, name: &str, url: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            transport: TransportConfig::Network {
                url: url.to_string(),
            },
            credential: None,
            category: ProviderCategory::Custom,
            enabled: true,
            resolved_credential: None,
        }
    }
}

/// Status snapshot for one configured provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub config: ProviderConfig,
    pub connected: bool,
    pub tool_count: usize,
    pub error: Option<String>,
}

// ─── Standard MCP Error Codes ────────────────────────────────────────────────

/// Well-known JSON-RPC error codes.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// The JSON sent is not a valid Request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_rpc_request_serialization() {
        let req = JsonRpcRequest::new(1, "initialize", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"method\":\"initialize\""));
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_notification_has_no_id() {
        let note = JsonRpcNotification::new("notifications/initialized", None);
        let json = serde_json::to_string(&note).unwrap();
        assert!(!json.contains("\"id\""));
        assert!(json.contains("notifications/initialized"));
    }

    #[test]
    fn test_json_rpc_error_response() {
        let json = r#"{
            "jsonrpc": "2.0",
            "id": 2,
            "error": {"code": -32601, "message": "Method not found"}
        }"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        assert!(resp.answers(2));
        let err = resp.error.unwrap();
        assert_eq!(err.code, error_codes::METHOD_NOT_FOUND);
    }

    #[test]
    fn test_server_request_is_not_an_answer() {
        let json = r#"{"jsonrpc": "2.0", "id": 7, "method": "ping"}"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        assert!(!resp.answers(7));
    }

    #[test]
    fn test_tool_definition_camel_case_schema() {
        let json = r#"{"name": "search", "inputSchema": {"type": "object"}}"#;
        let tool: McpToolDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(tool.input_schema["type"], "object");
        assert!(tool.description.is_none());
    }

    #[test]
    fn test_call_tool_result_text_joins_items() {
        let json = r#"{
            "content": [
                {"type": "text", "text": "first"},
                {"type": "image", "data": "..."},
                {"type": "text", "text": "second"}
            ],
            "isError": false
        }"#;
        let result: CallToolResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.text(), "first\nsecond");
        assert!(!result.is_error);
    }

    #[test]
    fn test_provider_config_yaml() {
        let yaml = r#"
            id: brave-search
            name: Brave Search
            category: search
            enabled: false
            transport:
              kind: process
              command: node
              args: ["-e", "require('x')"]
            credential:
              env_var: BRAVE_API_KEY
              key: braveApiKey
        "#;
        let config: ProviderConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.category, ProviderCategory::Search);
        assert!(!config.enabled);
        assert_eq!(config.credential.as_ref().unwrap().lookup_key(), "braveApiKey");
        assert!(matches!(config.transport, TransportConfig::Process { .. }));
    }

    #[test]
    fn test_provider_config_enabled_by_default() {
        let yaml = r#"
            id: wiki
            name: Wiki
            transport: { kind: network, url: "http://localhost:9000/mcp" }
        "#;
        let config: ProviderConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.enabled);
        assert_eq!(config.category, ProviderCategory::Custom);
    }

    #[test]
    fn test_resolved_credential_is_never_serialized() {
        let mut config = ProviderConfig::network("wiki", "Wiki", "http://localhost/mcp");
        config.resolved_credential = Some("secret".into());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
