//! Provider discovery — the built-in provider set, enabled-set selection and
//! credential resolution.
//!
//! Built-in providers are bundled Node scripts in `builtin_servers_dir`.
//! User-defined providers come from the config file. The enabled set is a
//! list of ids; stale ids are dropped, and an empty result falls back to the
//! built-in defaults.

use std::collections::HashSet;
use std::path::Path;

use super::errors::McpError;
use super::registry::validate_provider_id;
use super::types::{CredentialRef, ProviderCategory, ProviderConfig, TransportConfig};

// ─── Built-in Providers ──────────────────────────────────────────────────────

/// Platform-correct Node command.
pub fn default_node_command() -> &'static str {
    if cfg!(target_os = "windows") {
        "node.exe"
    } else {
        "node"
    }
}

/// Built-in provider definitions paired with whether they start enabled.
fn builtin_table(servers_dir: &Path, node: &str) -> Vec<(ProviderConfig, bool)> {
    let script = |name: &str| vec![servers_dir.join(name).to_string_lossy().into_owned()];

    let mut ddg = ProviderConfig::process(
        "duckduckgo-search",
        "DuckDuckGo Search",
        node,
        script("search.mjs"),
    );
    ddg.description = "Search the web via DuckDuckGo. No API key needed.".into();
    ddg.category = ProviderCategory::Search;

    let mut fetch = ProviderConfig::process("web-fetch", "Web Fetch", node, script("fetch-web.mjs"));
    fetch.description = "Fetch the content of public URLs. No API key needed.".into();
    fetch.category = ProviderCategory::Utility;

    let mut brave = ProviderConfig::process(
        "brave-search",
        "Brave Search",
        node,
        vec![
            "-e".into(),
            "require('@modelcontextprotocol/server-brave-search')".into(),
        ],
    );
    brave.description = "High-quality web search via Brave. Requires a Brave API key.".into();
    brave.category = ProviderCategory::Search;
    brave.credential = Some(CredentialRef {
        env_var: "BRAVE_API_KEY".into(),
        key: Some("braveApiKey".into()),
    });

    vec![(ddg, true), (fetch, true), (brave, false)]
}

/// The built-in providers, each with its default `enabled` flag.
pub fn builtin_providers(servers_dir: &Path, node: &str) -> Vec<ProviderConfig> {
    builtin_table(servers_dir, node)
        .into_iter()
        .map(|(mut config, enabled)| {
            config.enabled = enabled;
            config
        })
        .collect()
}

/// Ids of built-in providers enabled by default.
pub fn default_enabled_ids() -> Vec<String> {
    builtin_table(Path::new(""), default_node_command())
        .into_iter()
        .filter(|(_, enabled)| *enabled)
        .map(|(config, _)| config.id)
        .collect()
}

// ─── Enabled-Set Selection ───────────────────────────────────────────────────

/// Apply an explicit enabled-id list to a provider set.
///
/// With `None` each provider keeps its own `enabled` flag. Otherwise ids not
/// present in `all` are dropped; if none remain, the built-in defaults are
/// used. The returned configs have `enabled` set accordingly.
pub fn select_enabled(all: &[ProviderConfig], requested: Option<&[String]>) -> Vec<ProviderConfig> {
    let Some(requested) = requested else {
        return all.to_vec();
    };

    let known: HashSet<&str> = all.iter().map(|c| c.id.as_str()).collect();
    let mut valid: Vec<String> = requested
        .iter()
        .filter(|id| known.contains(id.as_str()))
        .cloned()
        .collect();

    let stale = requested.len() - valid.len();
    if stale > 0 {
        tracing::info!(stale, "ignoring unknown ids in enabled_providers");
    }
    if valid.is_empty() {
        valid = default_enabled_ids();
        tracing::info!(defaults = ?valid, "no valid enabled providers, using defaults");
    }

    all.iter()
        .map(|config| {
            let mut config = config.clone();
            config.enabled = valid.contains(&config.id);
            config
        })
        .collect()
}

// ─── Credentials ─────────────────────────────────────────────────────────────

/// Where provider secrets come from.
pub trait CredentialSource: Send + Sync {
    fn lookup(&self, key: &str) -> Option<String>;
}

/// Reads secrets from the process environment.
///
/// Tries the lookup key first, then the injected variable name, so
/// `BRAVE_API_KEY=... mcp-browser` works without extra configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

/// Fill in `resolved_credential` for every provider that declares one.
///
/// Missing secrets are logged; the provider still starts, and reports its own
/// error if it needs the key.
pub fn resolve_credentials(configs: &mut [ProviderConfig], source: &dyn CredentialSource) {
    for config in configs.iter_mut() {
        let Some(credential) = &config.credential else {
            continue;
        };
        let secret = source
            .lookup(credential.lookup_key())
            .or_else(|| source.lookup(&credential.env_var));
        if secret.is_none() && config.enabled {
            tracing::warn!(
                provider = %config.id,
                key = credential.lookup_key(),
                "no credential found for provider"
            );
        }
        config.resolved_credential = secret;
    }
}

// ─── Validation ──────────────────────────────────────────────────────────────

/// Check ids are valid and unique, and transports are usable.
pub fn validate_configs(configs: &[ProviderConfig]) -> Result<(), McpError> {
    let mut seen = HashSet::new();
    for config in configs {
        validate_provider_id(&config.id)?;
        if !seen.insert(config.id.as_str()) {
            return Err(McpError::ConfigError {
                reason: format!("duplicate provider id '{}'", config.id),
            });
        }
        match &config.transport {
            TransportConfig::Process { command, .. } if command.trim().is_empty() => {
                return Err(McpError::ConfigError {
                    reason: format!("provider '{}' has an empty command", config.id),
                });
            }
            TransportConfig::Network { url } => {
                reqwest::Url::parse(url).map_err(|e| McpError::ConfigError {
                    reason: format!("provider '{}' has an invalid url '{url}': {e}", config.id),
                })?;
            }
            _ => {}
        }
    }
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
