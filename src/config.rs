//! Application configuration: `mcp-browser.yaml`.
//!
//! Holds the reasoning backend settings and the provider set. Built-in
//! providers are merged with user-defined ones, the enabled-id list is
//! applied, and credentials are resolved before the set is handed to the
//! connection manager.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::inference::config::{expand_tilde, interpolate_env_vars};
use crate::inference::{BackendConfig, BackendKind};
use crate::mcp_client::discovery::{
    builtin_providers, default_node_command, resolve_credentials, select_enabled, validate_configs,
};
use crate::mcp_client::{CredentialSource, ProviderConfig};

/// Config file name searched for on disk.
pub const CONFIG_FILE_NAME: &str = "mcp-browser.yaml";

/// Env var pointing directly at a config file.
pub const CONFIG_ENV_VAR: &str = "MCP_BROWSER_CONFIG";

/// Env var consulted when the Anthropic backend has no configured key.
const ANTHROPIC_KEY_ENV_VAR: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("invalid provider configuration: {0}")]
    Providers(#[from] crate::mcp_client::McpError),
}

// ─── AppConfig ───────────────────────────────────────────────────────────────

/// Top-level config file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    /// Directory holding the bundled provider scripts.
    #[serde(default)]
    pub builtin_servers_dir: Option<String>,
    /// Ids to enable. `None` keeps each provider's own flag.
    #[serde(default)]
    pub enabled_providers: Option<Vec<String>>,
    /// User-defined providers, in addition to the built-ins.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl AppConfig {
    /// Load from `explicit`, or from the first config file found, or defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::current_dir()
                .ok()
                .and_then(|cwd| find_config_path(&cwd)),
        };

        let mut config = match path {
            Some(path) => {
                tracing::info!(path = %path.display(), "loading config");
                load_config(&path)?
            }
            None => {
                tracing::info!("no config file found, using defaults");
                Self::default()
            }
        };
        config.apply_env_fallbacks();
        Ok(config)
    }

    /// Fill the Anthropic key from the environment when the file has none.
    fn apply_env_fallbacks(&mut self) {
        if self.backend.kind == BackendKind::Anthropic && self.backend.api_key().is_none() {
            if let Ok(key) = std::env::var(ANTHROPIC_KEY_ENV_VAR) {
                self.backend.api_key = Some(key);
            }
        }
    }

    /// Directory of the bundled provider scripts.
    pub fn servers_dir(&self) -> PathBuf {
        match self.builtin_servers_dir.as_deref() {
            Some(dir) if !dir.trim().is_empty() => PathBuf::from(expand_tilde(dir.trim())),
            _ => crate::data_dir().join("servers"),
        }
    }

    /// The full provider set: built-ins plus user entries, with the enabled
    /// list applied and credentials resolved.
    pub fn all_providers(
        &self,
        credentials: &dyn CredentialSource,
    ) -> Result<Vec<ProviderConfig>, ConfigError> {
        let mut all = builtin_providers(&self.servers_dir(), default_node_command());
        all.extend(self.providers.iter().cloned());

        let mut selected = select_enabled(&all, self.enabled_providers.as_deref());
        resolve_credentials(&mut selected, credentials);
        validate_configs(&selected)?;

        tracing::debug!(
            total = selected.len(),
            enabled = selected.iter().filter(|c| c.enabled).count(),
            "provider set assembled"
        );
        Ok(selected)
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// Order: `MCP_BROWSER_CONFIG`, then `mcp-browser.yaml` in `start` or any
/// ancestor, then the data directory.
pub fn find_config_path(start: &Path) -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(expand_tilde(&path));
        if candidate.exists() {
            return Some(candidate);
        }
        tracing::warn!(path = %candidate.display(), "{CONFIG_ENV_VAR} points at a missing file");
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    let candidate = crate::data_dir().join(CONFIG_FILE_NAME);
    candidate.exists().then_some(candidate)
}

/// Read, interpolate and parse a config file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let interpolated = interpolate_env_vars(&raw);

    serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::mcp_client::TransportConfig;

    struct MapCredentials(HashMap<String, String>);

    impl CredentialSource for MapCredentials {
        fn lookup(&self, key: &str) -> Option<String> {
            self.0.get(key).cloned()
        }
    }

    fn no_credentials() -> MapCredentials {
        MapCredentials(HashMap::new())
    }

    const SAMPLE: &str = r#"
backend:
  kind: openai_compatible
  model: qwen2.5:14b
  base_url: http://localhost:11434
builtin_servers_dir: /opt/mcp-browser/servers
enabled_providers: [duckduckgo-search, wiki]
providers:
  - id: wiki
    name: Wikipedia
    category: knowledge
    transport: { kind: network, url: "https://example.org/mcp" }
"#;

    #[test]
    fn test_load_config_parses_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, SAMPLE).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.backend.kind, BackendKind::OpenaiCompatible);
        assert_eq!(config.backend.model.as_deref(), Some("qwen2.5:14b"));
        assert_eq!(config.providers.len(), 1);
        assert!(config.providers[0].enabled);
        assert!(matches!(
            config.providers[0].transport,
            TransportConfig::Network { ref url } if url == "https://example.org/mcp"
        ));
    }

    #[test]
    fn test_load_config_interpolates_env() {
        std::env::set_var("MCP_BROWSER_TEST_CFG_KEY", "sk-test");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "backend:\n  kind: anthropic\n  api_key: ${MCP_BROWSER_TEST_CFG_KEY}\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.backend.api_key(), Some("sk-test"));
        std::env::remove_var("MCP_BROWSER_TEST_CFG_KEY");
    }

    #[test]
    fn test_load_config_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "backend: [not, a, map]\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/mcp-browser.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_find_config_path_walks_upward() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "{}").unwrap();

        assert_eq!(find_config_path(&nested), Some(path));
    }

    #[test]
    fn test_all_providers_applies_enabled_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, SAMPLE).unwrap();
        let config = load_config(&path).unwrap();

        let providers = config.all_providers(&no_credentials()).unwrap();
        let enabled: Vec<&str> = providers
            .iter()
            .filter(|c| c.enabled)
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(enabled, vec!["duckduckgo-search", "wiki"]);

        let ddg = providers.iter().find(|c| c.id == "duckduckgo-search").unwrap();
        let TransportConfig::Process { args, .. } = &ddg.transport else {
            panic!("expected process transport");
        };
        assert!(args[0].starts_with("/opt/mcp-browser/servers"));
    }

    #[test]
    fn test_all_providers_defaults_without_list() {
        let config = AppConfig::default();
        let providers = config.all_providers(&no_credentials()).unwrap();
        let enabled: Vec<&str> = providers
            .iter()
            .filter(|c| c.enabled)
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(enabled, vec!["duckduckgo-search", "web-fetch"]);
        assert!(providers.iter().any(|c| c.id == "brave-search" && !c.enabled));
    }

    #[test]
    fn test_all_providers_resolves_credentials() {
        let config = AppConfig {
            enabled_providers: Some(vec!["brave-search".into()]),
            ..AppConfig::default()
        };
        let credentials = MapCredentials(HashMap::from([(
            "braveApiKey".to_string(),
            "brave-secret".to_string(),
        )]));

        let providers = config.all_providers(&credentials).unwrap();
        let brave = providers.iter().find(|c| c.id == "brave-search").unwrap();
        assert!(brave.enabled);
        assert_eq!(brave.resolved_credential.as_deref(), Some("brave-secret"));
    }

    #[test]
    fn test_all_providers_rejects_duplicate_ids() {
        let config = AppConfig {
            providers: vec![ProviderConfig::network(
                "web-fetch",
                "Shadow",
                "https://example.org/mcp",
            )],
            ..AppConfig::default()
        };
        let err = config.all_providers(&no_credentials()).unwrap_err();
        assert!(err.to_string().contains("duplicate provider id"));
    }
}
