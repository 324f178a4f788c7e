//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility; these types carry the context needed to
//! build meaningful log entries.

use thiserror::Error;

/// Errors that can occur while calling a reasoning backend.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the backend endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed {
        endpoint: String,
        reason: String,
    },

    /// The backend did not respond within the request timeout.
    #[error("inference timeout after {duration_secs}s")]
    Timeout {
        duration_secs: u64,
    },

    /// Non-2xx HTTP response from the backend.
    #[error("HTTP {status}: {body}")]
    HttpError {
        status: u16,
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("malformed response: {reason}")]
    MalformedResponse {
        reason: String,
    },

    /// Backend configuration is missing or invalid.
    #[error("config error: {reason}")]
    ConfigError {
        reason: String,
    },
}

impl InferenceError {
    /// Classify a `reqwest` send/receive failure.
    pub fn from_reqwest(endpoint: &str, timeout_secs: u64, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            InferenceError::Timeout {
                duration_secs: timeout_secs,
            }
        } else if err.is_decode() || err.is_body() {
            InferenceError::MalformedResponse {
                reason: err.to_string(),
            }
        } else {
            InferenceError::ConnectionFailed {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            }
        }
    }

    /// Extract the error body text, if this is an `HttpError`.
    pub fn error_body(&self) -> Option<&str> {
        match self {
            InferenceError::HttpError { body, .. } => Some(body),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display() {
        let err = InferenceError::HttpError {
            status: 401,
            body: "invalid x-api-key".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 401: invalid x-api-key");
        assert_eq!(err.error_body(), Some("invalid x-api-key"));
    }

    #[test]
    fn test_error_body_non_http() {
        let err = InferenceError::Timeout { duration_secs: 120 };
        assert!(err.error_body().is_none());
        assert_eq!(err.to_string(), "inference timeout after 120s");
    }
}
