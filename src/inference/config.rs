//! Reasoning backend configuration.
//!
//! The `backend:` section of `mcp-browser.yaml` selects one of the two
//! supported protocols. Also hosts the `${VAR}` interpolation and `~`
//! expansion applied to the raw config text before parsing.

use serde::{Deserialize, Serialize};

use super::errors::InferenceError;

// ─── Defaults ────────────────────────────────────────────────────────────────

/// Default Anthropic API origin.
pub const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com";

/// Default OpenAI-compatible origin (a local Ollama).
pub const DEFAULT_OPENAI_COMPATIBLE_URL: &str = "http://localhost:11434";

/// Default Anthropic model.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-opus-4-6";

/// Default response token budget.
pub const DEFAULT_MAX_TOKENS: u32 = 8192;

// ─── BackendConfig ───────────────────────────────────────────────────────────

/// Which wire protocol the backend speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Anthropic Messages API.
    #[default]
    Anthropic,
    /// `POST {base}/v1/chat/completions` (Ollama, llama.cpp, vLLM, OpenAI).
    OpenaiCompatible,
}

/// Configuration for the reasoning backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
    /// Model identifier sent with every request.
    #[serde(default)]
    pub model: Option<String>,
    /// Anthropic: required. OpenAI-compatible: optional bearer token.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Endpoint origin, without the API path.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            model: None,
            api_key: None,
            base_url: None,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl BackendConfig {
    /// Endpoint origin with any trailing `/` removed.
    pub fn resolved_base_url(&self) -> String {
        let url = self
            .base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(match self.kind {
                BackendKind::Anthropic => DEFAULT_ANTHROPIC_URL,
                BackendKind::OpenaiCompatible => DEFAULT_OPENAI_COMPATIBLE_URL,
            });
        url.trim().trim_end_matches('/').to_string()
    }

    /// The model to request. OpenAI-compatible backends have no default.
    pub fn resolved_model(&self) -> Result<String, InferenceError> {
        match (self.model.as_deref().map(str::trim), self.kind) {
            (Some(model), _) if !model.is_empty() => Ok(model.to_string()),
            (_, BackendKind::Anthropic) => Ok(DEFAULT_ANTHROPIC_MODEL.to_string()),
            (_, BackendKind::OpenaiCompatible) => Err(InferenceError::ConfigError {
                reason: "backend.model is required for openai_compatible backends".into(),
            }),
        }
    }

    /// A non-empty API key, if configured.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    /// Check the config is usable before any request is made.
    pub fn validate(&self) -> Result<(), InferenceError> {
        self.resolved_model()?;
        if self.kind == BackendKind::Anthropic && self.api_key().is_none() {
            return Err(InferenceError::ConfigError {
                reason: "backend.api_key is required for the anthropic backend".into(),
            });
        }
        if self.max_tokens == 0 {
            return Err(InferenceError::ConfigError {
                reason: "backend.max_tokens must be positive".into(),
            });
        }
        reqwest::Url::parse(&self.resolved_base_url()).map_err(|e| InferenceError::ConfigError {
            reason: format!("invalid backend.base_url: {e}"),
        })?;
        Ok(())
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
pub fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve `VAR` or `VAR:-default`. Empty variables take the default.
fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((var_name, default)) => std::env::var(var_name)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| expand_tilde(default)),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
