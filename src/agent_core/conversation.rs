//! ConversationState — the per-run message history and round counter.
//!
//! History is append-only within a run. The round counter is monotonic and
//! bounded; asking for a round past the bound fails.

use crate::inference::types::{BackendReply, Turn};

use super::errors::AgentError;

/// History and round accounting for one run.
#[derive(Debug, Clone)]
pub struct ConversationState {
    history: Vec<Turn>,
    rounds: u32,
    max_rounds: u32,
}

impl ConversationState {
    /// Seed the history with the system directive and the user query.
    pub fn new(system_directive: &str, query: &str, max_rounds: u32) -> Self {
        Self {
            history: vec![
                Turn::System(system_directive.to_string()),
                Turn::User(query.to_string()),
            ],
            rounds: 0,
            max_rounds,
        }
    }

    /// Start the next round, or fail if the bound is used up.
    pub fn begin_round(&mut self) -> Result<u32, AgentError> {
        if self.rounds >= self.max_rounds {
            return Err(AgentError::IterationExhausted {
                max_rounds: self.max_rounds,
            });
        }
        self.rounds += 1;
        Ok(self.rounds)
    }

    pub fn push_assistant(&mut self, reply: BackendReply) {
        self.history.push(Turn::Assistant(reply));
    }

    pub fn push_tool_result(&mut self, call_id: &str, content: String, is_error: bool) {
        self.history.push(Turn::ToolResult {
            call_id: call_id.to_string(),
            content,
            is_error,
        });
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Rounds started so far.
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_history() {
        let state = ConversationState::new("directive", "query", 20);
        assert_eq!(
            state.history(),
            &[Turn::System("directive".into()), Turn::User("query".into())]
        );
        assert_eq!(state.rounds(), 0);
    }

    #[test]
    fn test_round_bound() {
        let mut state = ConversationState::new("d", "q", 3);
        assert_eq!(state.begin_round().unwrap(), 1);
        assert_eq!(state.begin_round().unwrap(), 2);
        assert_eq!(state.begin_round().unwrap(), 3);
        assert!(matches!(
            state.begin_round(),
            Err(AgentError::IterationExhausted { max_rounds: 3 })
        ));
        assert_eq!(state.rounds(), 3);
    }

    #[test]
    fn test_appends_in_order() {
        let mut state = ConversationState::new("d", "q", 20);
        state.push_assistant(BackendReply {
            segments: vec![],
            invocations: vec![],
            done: false,
            raw: serde_json::Value::Null,
        });
        state.push_tool_result("a", "first".into(), false);
        state.push_tool_result("b", "second".into(), true);

        let ids: Vec<&str> = state
            .history()
            .iter()
            .filter_map(|t| match t {
                Turn::ToolResult { call_id, .. } => Some(call_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
