//! Shared types for the agent core.
//!
//! The progress events a run emits and the run state machine.

use serde::{Deserialize, Serialize};

// ─── Progress Events ─────────────────────────────────────────────────────────

/// One step of observable progress in a run.
///
/// Serialized with a `type` tag, e.g.
/// `{"type":"invocation_result","name":"ddg__search","ok":true}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Narrative text from the backend. Never empty or whitespace-only.
    ReasoningText { text: String },
    /// An invocation is about to be dispatched.
    InvocationStart {
        name: String,
        provider_id: String,
        arguments: serde_json::Value,
    },
    /// An invocation finished.
    InvocationResult { name: String, ok: bool },
    /// Terminal: the final HTML document.
    Completion { document: String },
    /// Terminal: the run failed.
    Failure { message: String },
}

impl ProgressEvent {
    /// Whether this event ends the run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Completion { .. } | ProgressEvent::Failure { .. }
        )
    }
}

// ─── Run State ───────────────────────────────────────────────────────────────

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    AwaitingCapabilities,
    Reasoning,
    Invoking,
    Done,
    Failed,
}

impl RunState {
    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Init, AwaitingCapabilities)
                | (AwaitingCapabilities, Failed)
                | (AwaitingCapabilities, Reasoning)
                | (Reasoning, Done)
                | (Reasoning, Invoking)
                | (Reasoning, Failed)
                | (Invoking, Reasoning)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_tags() {
        let event = ProgressEvent::InvocationStart {
            name: "ddg__search".into(),
            provider_id: "ddg".into(),
            arguments: serde_json::json!({"q": "x"}),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "invocation_start");
        assert_eq!(json["provider_id"], "ddg");

        let done: ProgressEvent =
            serde_json::from_str(r#"{"type":"completion","document":"<!DOCTYPE html>"}"#).unwrap();
        assert!(done.is_terminal());
        assert!(!ProgressEvent::ReasoningText { text: "x".into() }.is_terminal());
    }

    #[test]
    fn test_state_transitions() {
        use RunState::*;
        assert!(Init.can_transition_to(AwaitingCapabilities));
        assert!(AwaitingCapabilities.can_transition_to(Failed));
        assert!(Reasoning.can_transition_to(Invoking));
        assert!(Invoking.can_transition_to(Reasoning));
        assert!(!Invoking.can_transition_to(Done));
        assert!(!Init.can_transition_to(Reasoning));
        assert!(!Done.can_transition_to(Reasoning));
        assert!(!Failed.can_transition_to(Reasoning));
        assert!(Done.is_terminal() && Failed.is_terminal());
    }
}
