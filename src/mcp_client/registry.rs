//! Capability catalog — namespaced tool definitions across all providers.
//!
//! Provides:
//! - The `{providerId}__{localName}` namespacing scheme and its inverse
//! - Provider-id validation that keeps the scheme unambiguous
//! - Serialization of the catalog into each backend's tool format

use super::errors::McpError;
use super::types::McpToolDefinition;

// ─── Namespacing ─────────────────────────────────────────────────────────────

/// Separator between provider id and local tool name.
pub const NAMESPACE_SEPARATOR: &str = "__";

/// Build the namespaced id for a provider's tool.
pub fn namespaced_id(provider_id: &str, local_name: &str) -> String {
    format!("{provider_id}{NAMESPACE_SEPARATOR}{local_name}")
}

/// Split a namespaced id on the first separator occurrence.
///
/// E.g., `"web-fetch__fetch_url"` → `("web-fetch", "fetch_url")`.
pub fn split_namespaced(name: &str) -> Result<(&str, &str), McpError> {
    name.split_once(NAMESPACE_SEPARATOR)
        .ok_or_else(|| McpError::InvalidIdentifier {
            name: name.to_string(),
        })
}

/// Reject provider ids that would make namespaced ids ambiguous.
///
/// An id containing the separator, or ending in `_` (so that `id + "__"`
/// contains `___` and the first split lands early), could not be recovered
/// by [`split_namespaced`].
pub fn validate_provider_id(id: &str) -> Result<(), McpError> {
    let problem = if id.is_empty() {
        Some("must not be empty")
    } else if id.contains(NAMESPACE_SEPARATOR) {
        Some("must not contain '__'")
    } else if id.ends_with('_') {
        Some("must not end with '_'")
    } else if id.chars().any(char::is_whitespace) {
        Some("must not contain whitespace")
    } else {
        None
    };

    match problem {
        Some(problem) => Err(McpError::ConfigError {
            reason: format!("invalid provider id '{id}': {problem}"),
        }),
        None => Ok(()),
    }
}

// ─── CapabilityDescriptor ────────────────────────────────────────────────────

/// One tool as presented to a reasoning backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityDescriptor {
    /// `{provider_id}__{local_name}`.
    pub namespaced_id: String,
    pub local_name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub provider_id: String,
    pub provider_name: String,
}

impl CapabilityDescriptor {
    pub fn new(provider_id: &str, provider_name: &str, tool: McpToolDefinition) -> Self {
        let input_schema = if tool.input_schema.is_object() {
            tool.input_schema
        } else {
            serde_json::json!({ "type": "object", "properties": {} })
        };
        Self {
            namespaced_id: namespaced_id(provider_id, &tool.name),
            description: tool.description.unwrap_or_default(),
            local_name: tool.name,
            input_schema,
            provider_id: provider_id.to_string(),
            provider_name: provider_name.to_string(),
        }
    }

    /// Description prefixed with the provider's display name.
    fn labelled_description(&self) -> String {
        if self.description.is_empty() {
            format!("[{}]", self.provider_name)
        } else {
            format!("[{}] {}", self.provider_name, self.description)
        }
    }
}

// ─── CapabilityCatalog ───────────────────────────────────────────────────────

/// The flattened, namespaced tool list from every healthy provider.
#[derive(Debug, Clone, Default)]
pub struct CapabilityCatalog {
    tools: Vec<CapabilityDescriptor>,
}

impl CapabilityCatalog {
    pub fn new(tools: Vec<CapabilityDescriptor>) -> Self {
        Self { tools }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapabilityDescriptor> {
        self.tools.iter()
    }

    /// Look up a descriptor by namespaced id.
    pub fn get(&self, namespaced_id: &str) -> Option<&CapabilityDescriptor> {
        self.tools.iter().find(|t| t.namespaced_id == namespaced_id)
    }

    /// Distinct provider ids, in catalog order.
    pub fn provider_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for tool in &self.tools {
            if !ids.contains(&tool.provider_id.as_str()) {
                ids.push(&tool.provider_id);
            }
        }
        ids
    }

    /// Tools in OpenAI function-calling format.
    pub fn to_openai_tools(&self) -> Vec<serde_json::Value> {
        self.tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.namespaced_id,
                        "description": t.labelled_description(),
                        "parameters": t.input_schema,
                    }
                })
            })
            .collect()
    }

    /// Tools in Anthropic Messages format.
    pub fn to_anthropic_tools(&self) -> Vec<serde_json::Value> {
        self.tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.namespaced_id,
                    "description": t.labelled_description(),
                    "input_schema": t.input_schema,
                })
            })
            .collect()
    }
}

impl FromIterator<CapabilityDescriptor> for CapabilityCatalog {
    fn from_iter<I: IntoIterator<Item = CapabilityDescriptor>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
