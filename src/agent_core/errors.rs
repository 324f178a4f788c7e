//! Agent Core error types.
//!
//! `Display` output is the user-facing message carried by a run's failure
//! event.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::inference::InferenceError;

/// Terminal failures of an orchestration run.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Capability discovery did not finish.
    #[error("Could not load tools: {reason}")]
    CatalogUnavailable { reason: String },

    /// No providers are configured or enabled.
    #[error("No providers are active. Enable at least one provider in the configuration.")]
    NoActiveProviders,

    /// Providers are configured but none produced any capabilities.
    #[error(
        "No providers could connect:\n\n{}\n\nCheck that the provider commands are installed and the providers are enabled.",
        format_breakdown(breakdown)
    )]
    ProvidersUnavailable { breakdown: BTreeMap<String, String> },

    /// The reasoning backend failed.
    #[error("Reasoning backend error: {0}")]
    Backend(#[from] InferenceError),

    /// The round bound was reached without a final answer.
    #[error("Reached the maximum of {max_rounds} steps without a final answer.")]
    IterationExhausted { max_rounds: u32 },
}

/// One `• id: message` line per provider.
fn format_breakdown(breakdown: &BTreeMap<String, String>) -> String {
    breakdown
        .iter()
        .map(|(id, message)| format!("• {id}: {message}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakdown_lists_each_provider() {
        let err = AgentError::ProvidersUnavailable {
            breakdown: BTreeMap::from([
                ("web-fetch".to_string(), "spawn failed".to_string()),
                ("duckduckgo-search".to_string(), "timed out".to_string()),
            ]),
        };
        let message = err.to_string();
        assert!(message.starts_with("No providers could connect:"));
        assert!(message.contains("• duckduckgo-search: timed out\n• web-fetch: spawn failed"));
    }

    #[test]
    fn test_backend_error_wraps_inference_error() {
        let err: AgentError = InferenceError::Timeout { duration_secs: 120 }.into();
        assert_eq!(
            err.to_string(),
            "Reasoning backend error: inference timeout after 120s"
        );
    }

    #[test]
    fn test_exhaustion_message_cites_bound() {
        let err = AgentError::IterationExhausted { max_rounds: 20 };
        assert!(err.to_string().contains("maximum of 20 steps"));
    }
}
