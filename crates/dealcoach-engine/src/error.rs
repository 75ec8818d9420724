//! Error types for the conversation engine.

use uuid::Uuid;

use crate::phase::Phase;

/// A specialized `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while running roleplay sessions.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// An illegal phase transition was attempted.
    ///
    /// State is left untouched when this is returned.
    #[error("cannot transition from {from} to {to}; allowed: {}", format_phases(allowed))]
    InvalidTransition {
        /// The phase the conversation was in.
        from: Phase,
        /// The rejected target phase.
        to: Phase,
        /// The legal targets from `from`.
        allowed: Vec<Phase>,
    },

    /// No persisted session exists with this id.
    #[error("session {0} not found")]
    SessionNotFound(Uuid),

    /// The session exists but has not been started (or was already ended).
    #[error("no active session {0}")]
    SessionNotActive(Uuid),

    /// The session reached the terminal phase and rejects further turns.
    #[error("session {0} is already complete")]
    SessionComplete(Uuid),

    /// The persisted session references a scenario the catalog does not have.
    #[error("scenario '{0}' not found")]
    UnknownScenario(String),

    /// The LLM call failed permanently or exhausted its retries.
    #[error(transparent)]
    Llm(#[from] dealcoach_llm::LlmError),

    /// The persistence collaborator failed.
    #[error("store error: {0}")]
    Store(String),

    /// Configuration could not be loaded or failed validation.
    #[error("invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    Config {
        /// Description of the problem.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },
}

fn format_phases(phases: &[Phase]) -> String {
    let names: Vec<&str> = phases.iter().map(|phase| phase.as_str()).collect();
    format!("[{}]", names.join(", "))
}

impl EngineError {
    /// Creates a new `InvalidTransition` error.
    #[must_use]
    pub fn invalid_transition(from: Phase, to: Phase, allowed: &[Phase]) -> Self {
        Self::InvalidTransition {
            from,
            to,
            allowed: allowed.to_vec(),
        }
    }

    /// Creates a new `Store` error.
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Creates a new `Config` error.
    #[must_use]
    pub fn config(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }
}
