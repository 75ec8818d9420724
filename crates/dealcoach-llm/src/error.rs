//! Error types for the LLM client.
//!
//! Every failure is classified as transient or permanent via
//! [`LlmError::is_transient`]; the completion retry loop only ever retries
//! transient failures.

/// A specialized `Result` type for LLM client operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors that can occur while talking to an LLM provider.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    /// The provider returned a non-success HTTP status.
    #[error("provider returned HTTP {status}: {message}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The response body, as far as it could be read.
        message: String,
    },

    /// The request did not complete within the client timeout.
    #[error("request timed out")]
    Timeout,

    /// The request failed before a usable response arrived.
    #[error("network error: {0}")]
    Network(String),

    /// The request was rejected before being sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The provider responded with a payload we could not interpret.
    #[error("unexpected provider response: {0}")]
    BadResponse(String),
}

impl LlmError {
    /// Creates a new `Status` error.
    #[must_use]
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Creates a new `Network` error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Creates a new `BadResponse` error.
    #[must_use]
    pub fn bad_response(message: impl Into<String>) -> Self {
        Self::BadResponse(message.into())
    }

    /// Returns `true` if this error is transient and the request may be
    /// retried: server errors (5xx), rate limiting (429), timeouts, and
    /// network failures.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Timeout | Self::Network(_) => true,
            Self::InvalidRequest(_) | Self::BadResponse(_) => false,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::BadResponse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_are_transient() {
        assert!(LlmError::status(500, "internal").is_transient());
        assert!(LlmError::status(503, "unavailable").is_transient());
        assert!(LlmError::status(429, "slow down").is_transient());
    }

    #[test]
    fn test_client_errors_are_permanent() {
        assert!(!LlmError::status(400, "bad request").is_transient());
        assert!(!LlmError::status(401, "unauthorized").is_transient());
        assert!(!LlmError::status(404, "not found").is_transient());
    }

    #[test]
    fn test_timeouts_and_network_failures_are_transient() {
        assert!(LlmError::Timeout.is_transient());
        assert!(LlmError::network("connection refused").is_transient());
    }

    #[test]
    fn test_malformed_payloads_are_permanent() {
        assert!(!LlmError::bad_response("no choices").is_transient());
        assert!(!LlmError::InvalidRequest("empty messages".to_string()).is_transient());
    }

    #[test]
    fn test_display_includes_status_and_body() {
        let err = LlmError::status(502, "bad gateway");
        let msg = err.to_string();
        assert!(msg.contains("502"));
        assert!(msg.contains("bad gateway"));
    }
}
