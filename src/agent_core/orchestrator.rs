//! Orchestrator: the bounded reasoning/invocation loop.
//!
//! One run:
//! 1. **Discover**: fetch the namespaced capability catalog from the
//!    [`ConnectionManager`]. An empty catalog fails the run before any
//!    backend call, with a per-provider breakdown when one exists.
//! 2. **Reason**: send the full history and catalog to the backend.
//! 3. **Invoke**: dispatch each requested invocation in order and append
//!    its result (or error) to the history. A failed invocation is data for
//!    the next round, never a run failure.
//! 4. Repeat until the backend signals a final answer or [`MAX_ITERATIONS`]
//!    rounds are used, then finalize the answer into an HTML document.
//!
//! The run executes on its own tokio task and reports through an
//! [`EventStream`]. Dropping the stream aborts the task.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::inference::types::Invocation;
use crate::inference::ReasoningBackend;
use crate::mcp_client::{split_namespaced, CapabilityCatalog, ConnectionManager};

use super::conversation::ConversationState;
use super::errors::AgentError;
use super::finalizer::extract_or_wrap;
use super::types::{ProgressEvent, RunState};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Maximum reasoning rounds per run.
pub const MAX_ITERATIONS: u32 = 20;

/// Ceiling on capability discovery across all providers.
pub const CATALOG_TIMEOUT: Duration = Duration::from_secs(120);

/// Events buffered between the run task and its consumer.
const EVENT_BUFFER: usize = 64;

/// Prefix for error-flagged invocation results in the history.
const TOOL_ERROR_PREFIX: &str = "Error executing tool: ";

/// Fixed instructions sent as the first turn of every run.
pub const SYSTEM_DIRECTIVE: &str = "You are MCP Browser, an AI-powered information browser.
The user has asked a question. Use the available tools to gather accurate, up-to-date information.
After gathering enough information, synthesize a comprehensive answer.

Return your final answer as a complete, self-contained HTML document with the following requirements:
- Start exactly with <!DOCTYPE html>
- Use inline styles only (no external CSS links or <link> tags)
- Use a clean, modern sans-serif font (font-family: system-ui, -apple-system, sans-serif)
- max-width: 820px, margin: 0 auto, comfortable line-height (1.65), padding: 32px 24px
- Use proper headings (h1, h2, h3), paragraphs, lists, blockquotes
- Include source citations as clickable links where applicable
- Color scheme: white background, #1a1a2e headings, #333 body text, #0066cc links
- DO NOT include any JavaScript
- Return ONLY the HTML document as your final response, no other text around it";

// ─── Orchestrator ────────────────────────────────────────────────────────────

/// Drives runs against one connection manager and one reasoning backend.
///
/// Cheap to share: concurrent runs each get their own task and history.
#[derive(Clone)]
pub struct Orchestrator {
    manager: Arc<ConnectionManager>,
    backend: Arc<dyn ReasoningBackend>,
    max_iterations: u32,
}

impl Orchestrator {
    pub fn new(manager: Arc<ConnectionManager>, backend: Arc<dyn ReasoningBackend>) -> Self {
        Self {
            manager,
            backend,
            max_iterations: MAX_ITERATIONS,
        }
    }

    /// Override the round bound.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Start a run for `query`.
    ///
    /// Must be called within a tokio runtime. The returned stream yields
    /// progress events and ends right after the single terminal event.
    pub fn run(&self, query: &str) -> EventStream {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let run = Run {
            manager: self.manager.clone(),
            backend: self.backend.clone(),
            max_iterations: self.max_iterations,
            tx,
            state: RunState::Init,
        };
        let query = query.to_string();
        let handle = tokio::spawn(run.execute(query));

        EventStream {
            rx,
            handle,
            finished: false,
        }
    }
}

// ─── EventStream ─────────────────────────────────────────────────────────────

/// Ordered progress events of one run.
///
/// Single-consumer. Yields nothing after the terminal event. Dropping it
/// cancels the run, including any in-flight backend or tool call.
pub struct EventStream {
    rx: mpsc::Receiver<ProgressEvent>,
    handle: JoinHandle<()>,
    finished: bool,
}

impl Stream for EventStream {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ProgressEvent>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    self.finished = true;
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ─── Run ─────────────────────────────────────────────────────────────────────

/// State owned by one run task.
struct Run {
    manager: Arc<ConnectionManager>,
    backend: Arc<dyn ReasoningBackend>,
    max_iterations: u32,
    tx: mpsc::Sender<ProgressEvent>,
    state: RunState,
}

impl Run {
    async fn execute(mut self, query: String) {
        let terminal = match self.drive(&query).await {
            Ok(document) => {
                self.transition(RunState::Done);
                tracing::info!(bytes = document.len(), "run completed");
                ProgressEvent::Completion { document }
            }
            Err(e) => {
                self.transition(RunState::Failed);
                tracing::warn!(error = %e, "run failed");
                ProgressEvent::Failure {
                    message: e.to_string(),
                }
            }
        };
        self.emit(terminal).await;
    }

    /// Everything up to the terminal event. Returns the final document.
    async fn drive(&mut self, query: &str) -> Result<String, AgentError> {
        self.transition(RunState::AwaitingCapabilities);
        let catalog = self.fetch_catalog().await?;
        self.transition(RunState::Reasoning);

        let mut conversation = ConversationState::new(SYSTEM_DIRECTIVE, query, self.max_iterations);

        loop {
            let round = conversation.begin_round()?;
            tracing::info!(
                round,
                backend = %self.backend.describe(),
                tools = catalog.len(),
                "calling reasoning backend"
            );
            let reply = self.backend.call(conversation.history(), &catalog).await?;

            for segment in &reply.segments {
                if !segment.trim().is_empty() {
                    self.emit(ProgressEvent::ReasoningText {
                        text: segment.clone(),
                    })
                    .await;
                }
            }

            if reply.is_terminal() {
                tracing::info!(round, "backend returned final answer");
                return Ok(extract_or_wrap(&reply.text(), query));
            }

            self.transition(RunState::Invoking);
            let invocations = reply.invocations.clone();
            conversation.push_assistant(reply);
            tracing::info!(round, count = invocations.len(), "dispatching invocations");
            for invocation in invocations {
                self.dispatch(&mut conversation, invocation).await;
            }
            self.transition(RunState::Reasoning);
        }
    }

    async fn fetch_catalog(&self) -> Result<CapabilityCatalog, AgentError> {
        let catalog = tokio::time::timeout(CATALOG_TIMEOUT, self.manager.list_capabilities())
            .await
            .map_err(|_| AgentError::CatalogUnavailable {
                reason: format!(
                    "discovery did not finish within {}s",
                    CATALOG_TIMEOUT.as_secs()
                ),
            })?;

        if catalog.is_empty() {
            let breakdown = self.manager.connection_errors();
            return Err(if breakdown.is_empty() {
                AgentError::NoActiveProviders
            } else {
                AgentError::ProvidersUnavailable { breakdown }
            });
        }
        Ok(catalog)
    }

    /// Run one invocation and record its outcome in the history.
    async fn dispatch(&self, conversation: &mut ConversationState, invocation: Invocation) {
        let Invocation {
            id,
            name,
            arguments,
        } = invocation;
        let provider_id = split_namespaced(&name)
            .map(|(provider, _)| provider.to_string())
            .unwrap_or_else(|_| name.clone());

        self.emit(ProgressEvent::InvocationStart {
            name: name.clone(),
            provider_id,
            arguments: arguments.clone(),
        })
        .await;

        match self.manager.invoke(&name, arguments).await {
            Ok(result) => {
                self.emit(ProgressEvent::InvocationResult { name, ok: true })
                    .await;
                conversation.push_tool_result(&id, render_result(&result), false);
            }
            Err(e) => {
                self.emit(ProgressEvent::InvocationResult { name, ok: false })
                    .await;
                conversation.push_tool_result(&id, format!("{TOOL_ERROR_PREFIX}{e}"), true);
            }
        }
    }

    /// Send an event. A closed channel means the consumer is gone; the task
    /// is about to be aborted, so the event is dropped.
    async fn emit(&self, event: ProgressEvent) {
        if self.tx.send(event).await.is_err() {
            tracing::debug!("event consumer dropped");
        }
    }

    fn transition(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal run transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!(from = ?self.state, to = ?next, "run state");
        self.state = next;
    }
}

/// Text of an invocation result as appended to the history.
///
/// MCP `content` arrays of text items are joined with newlines; anything
/// else is pretty-printed JSON.
fn render_result(result: &serde_json::Value) -> String {
    let texts: Option<Vec<&str>> = result
        .get("content")
        .and_then(|c| c.as_array())
        .map(|items| {
            items
                .iter()
                .filter(|item| item.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
                .collect()
        });

    match texts {
        Some(texts) if !texts.is_empty() => texts.join("\n"),
        _ => serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string()),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
