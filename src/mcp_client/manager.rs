//! Connection manager — one lazily-created session per provider id.
//!
//! The manager owns the configured provider set, the session map and the
//! per-provider status records. It is shared behind an `Arc` by every run;
//! handshakes for different providers proceed concurrently while a
//! per-provider `OnceCell` guarantees at most one handshake per id.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;

use super::client::{Connector, ProviderSession};
use super::errors::McpError;
use super::registry::{split_namespaced, validate_provider_id, CapabilityCatalog, CapabilityDescriptor};
use super::types::{ProviderConfig, ProviderStatus};

type SessionCell = Arc<OnceCell<Arc<dyn ProviderSession>>>;

/// Handshakes per lookup when a concurrent eviction orphans the first one.
const SESSION_ATTEMPTS: usize = 2;

// ─── Status Records ──────────────────────────────────────────────────────────

/// Last known discovery outcome for one provider.
#[derive(Debug, Clone)]
pub struct StatusRecord {
    pub last_error: Option<String>,
    pub tool_count: usize,
    pub checked_at: DateTime<Utc>,
}

impl StatusRecord {
    fn healthy(tool_count: usize) -> Self {
        Self {
            last_error: None,
            tool_count,
            checked_at: Utc::now(),
        }
    }

    fn failed(message: String) -> Self {
        Self {
            last_error: Some(message),
            tool_count: 0,
            checked_at: Utc::now(),
        }
    }
}

#[derive(Default)]
struct ManagerState {
    /// Enabled providers, in configuration order.
    configs: Vec<ProviderConfig>,
    sessions: HashMap<String, SessionCell>,
    status: HashMap<String, StatusRecord>,
}

impl ManagerState {
    fn config(&self, id: &str) -> Option<&ProviderConfig> {
        self.configs.iter().find(|c| c.id == id)
    }

    /// Remove `id`'s session only if it is still `cell`.
    fn evict(&mut self, id: &str, cell: &SessionCell) -> bool {
        match self.sessions.get(id) {
            Some(current) if Arc::ptr_eq(current, cell) => {
                self.sessions.remove(id);
                true
            }
            _ => false,
        }
    }
}

/// Whether a config change requires a fresh session.
fn same_endpoint(a: &ProviderConfig, b: &ProviderConfig) -> bool {
    a.transport == b.transport && a.resolved_credential == b.resolved_credential
}

// ─── ConnectionManager ───────────────────────────────────────────────────────

/// Multiplexes many independently-failing providers behind one catalog.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    state: Mutex<ManagerState>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            state: Mutex::new(ManagerState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ─── Configuration ───────────────────────────────────────────────────

    /// Replace the provider set.
    ///
    /// Disabled entries count as absent. Sessions whose provider left the set
    /// (or whose endpoint changed) are closed best-effort; new providers are
    /// connected lazily on first use.
    pub async fn set_providers(&self, configs: Vec<ProviderConfig>) {
        let mut accepted: Vec<ProviderConfig> = Vec::new();
        for config in configs.into_iter().filter(|c| c.enabled) {
            if let Err(e) = validate_provider_id(&config.id) {
                tracing::warn!(provider = %config.id, error = %e, "skipping provider");
                continue;
            }
            if accepted.iter().any(|c| c.id == config.id) {
                tracing::warn!(provider = %config.id, "duplicate provider id, keeping first");
                continue;
            }
            accepted.push(config);
        }

        let stale: Vec<SessionCell> = {
            let mut state = self.state();
            let stale_ids: Vec<String> = state
                .sessions
                .keys()
                .filter(|id| {
                    let old = state.config(id);
                    let new = accepted.iter().find(|c| &c.id == *id);
                    !matches!((old, new), (Some(old), Some(new)) if same_endpoint(old, new))
                })
                .cloned()
                .collect();

            let stale = stale_ids
                .iter()
                .filter_map(|id| state.sessions.remove(id))
                .collect();
            state
                .status
                .retain(|id, _| accepted.iter().any(|c| &c.id == id));
            state.configs = accepted;
            tracing::info!(
                providers = state.configs.len(),
                closed = stale_ids.len(),
                "provider set updated"
            );
            stale
        };

        for cell in stale {
            if let Some(session) = cell.get() {
                session.close().await;
            }
        }
    }

    /// Ids of the configured (enabled) providers, in configuration order.
    pub fn provider_ids(&self) -> Vec<String> {
        self.state().configs.iter().map(|c| c.id.clone()).collect()
    }

    // ─── Sessions ────────────────────────────────────────────────────────

    /// Return the cached session for `provider_id`, connecting if needed.
    pub async fn get_or_create_session(
        &self,
        provider_id: &str,
    ) -> Result<Arc<dyn ProviderSession>, McpError> {
        self.session_cell(provider_id).await.map(|(session, _)| session)
    }

    async fn session_cell(
        &self,
        provider_id: &str,
    ) -> Result<(Arc<dyn ProviderSession>, SessionCell), McpError> {
        for _ in 0..SESSION_ATTEMPTS {
            let (config, cell) = {
                let mut state = self.state();
                let config = state
                    .config(provider_id)
                    .cloned()
                    .ok_or_else(|| McpError::ProviderUnknown {
                        id: provider_id.to_string(),
                    })?;
                let cell = state
                    .sessions
                    .entry(provider_id.to_string())
                    .or_default()
                    .clone();
                (config, cell)
            };

            let session = cell
                .get_or_try_init(|| async {
                    tracing::debug!(provider = provider_id, "connecting");
                    self.connector.connect(&config).await
                })
                .await?
                .clone();

            // The session may have been evicted or reconfigured while the handshake ran
            let still_current = matches!(
                self.state().sessions.get(provider_id),
                Some(current) if Arc::ptr_eq(current, &cell)
            );
            if still_current {
                return Ok((session, cell));
            }
            session.close().await;
            tracing::debug!(provider = provider_id, "session replaced during handshake");
        }

        Err(McpError::ConnectionFailed {
            id: provider_id.to_string(),
            reason: "session was replaced during every handshake attempt".into(),
        })
    }

    /// Drop and close `provider_id`'s session if it is still `cell`.
    async fn evict(&self, provider_id: &str, cell: &SessionCell) {
        let evicted = self.state().evict(provider_id, cell);
        if evicted {
            if let Some(session) = cell.get() {
                session.close().await;
            }
        }
    }

    // ─── Discovery ───────────────────────────────────────────────────────

    /// Discover tools from every configured provider.
    ///
    /// Never fails: a provider that cannot be reached or listed contributes
    /// nothing and has its error recorded.
    pub async fn list_capabilities(&self) -> CapabilityCatalog {
        let configs = self.state().configs.clone();

        let results = futures::future::join_all(
            configs.iter().map(|config| self.discover_provider(config)),
        )
        .await;

        let mut descriptors = Vec::new();
        for (config, result) in configs.iter().zip(results) {
            let record = match result {
                Ok(tools) => {
                    let record = StatusRecord::healthy(tools.len());
                    descriptors.extend(tools);
                    record
                }
                Err(e) => {
                    tracing::warn!(provider = %config.id, error = %e, "provider discovery failed");
                    StatusRecord::failed(e.to_string())
                }
            };
            let mut state = self.state();
            if state.config(&config.id).is_some() {
                state.status.insert(config.id.clone(), record);
            }
        }

        tracing::info!(
            tools = descriptors.len(),
            providers = configs.len(),
            "capability discovery complete"
        );
        CapabilityCatalog::new(descriptors)
    }

    async fn discover_provider(
        &self,
        config: &ProviderConfig,
    ) -> Result<Vec<CapabilityDescriptor>, McpError> {
        let (session, cell) = self.session_cell(&config.id).await?;
        match session.list_tools().await {
            Ok(tools) => Ok(tools
                .into_iter()
                .map(|tool| CapabilityDescriptor::new(&config.id, &config.name, tool))
                .collect()),
            Err(e) => {
                self.evict(&config.id, &cell).await;
                Err(e)
            }
        }
    }

    // ─── Invocation ──────────────────────────────────────────────────────

    /// Route a namespaced tool call to its provider.
    pub async fn invoke(
        &self,
        namespaced_id: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        let (provider_id, local_name) = split_namespaced(namespaced_id)?;
        let (session, cell) = self.session_cell(provider_id).await?;

        tracing::info!(provider = provider_id, tool = local_name, "invoking tool");
        let result = session.call_tool(local_name, arguments).await;

        if let Err(e) = &result {
            tracing::warn!(provider = provider_id, tool = local_name, error = %e, "tool call failed");
            if e.is_session_fault() {
                self.evict(provider_id, &cell).await;
            }
        }
        result
    }

    // ─── Shutdown ────────────────────────────────────────────────────────

    /// Close every live session and forget all session and error state.
    pub async fn close_all(&self) {
        let cells: Vec<(String, SessionCell)> = {
            let mut state = self.state();
            state.status.clear();
            state.sessions.drain().collect()
        };

        for (id, cell) in cells {
            if let Some(session) = cell.get() {
                tracing::debug!(provider = %id, "closing session");
                session.close().await;
            }
        }
    }

    // ─── Status Queries ──────────────────────────────────────────────────

    /// Last recorded failure for a provider, if any.
    pub fn connection_error(&self, provider_id: &str) -> Option<String> {
        self.state()
            .status
            .get(provider_id)
            .and_then(|r| r.last_error.clone())
    }

    /// Every recorded failure, keyed by provider id.
    pub fn connection_errors(&self) -> BTreeMap<String, String> {
        self.state()
            .status
            .iter()
            .filter_map(|(id, r)| r.last_error.clone().map(|e| (id.clone(), e)))
            .collect()
    }

    /// Tool count from the last discovery (0 if never discovered).
    pub fn tool_count(&self, provider_id: &str) -> usize {
        self.state()
            .status
            .get(provider_id)
            .map(|r| r.tool_count)
            .unwrap_or(0)
    }

    pub fn status_record(&self, provider_id: &str) -> Option<StatusRecord> {
        self.state().status.get(provider_id).cloned()
    }

    /// Whether a live session exists for the provider.
    pub fn is_connected(&self, provider_id: &str) -> bool {
        self.state()
            .sessions
            .get(provider_id)
            .is_some_and(|cell| cell.initialized())
    }

    /// Status snapshot for every configured provider.
    pub fn provider_status(&self) -> Vec<ProviderStatus> {
        let state = self.state();
        state
            .configs
            .iter()
            .map(|config| {
                let record = state.status.get(&config.id);
                ProviderStatus {
                    config: config.clone(),
                    connected: state
                        .sessions
                        .get(&config.id)
                        .is_some_and(|cell| cell.initialized()),
                    tool_count: record.map(|r| r.tool_count).unwrap_or(0),
                    error: record.and_then(|r| r.last_error.clone()),
                }
            })
            .collect()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
