//! Live session state and the active-session registry.
//!
//! An [`ActiveSession`] is the in-memory side of a running conversation: the
//! state machine plus the full LLM transcript. The [`SessionRegistry`] maps
//! session ids to sessions behind per-session async locks, so one session's
//! turn never serializes against another's. The registry's own map lock is a
//! plain mutex held only for map access, never across awaits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dealcoach_llm::ChatMessage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog;
use crate::error::{EngineError, Result};
use crate::phase::Phase;
use crate::state_machine::{ConversationStateMachine, StateSnapshot};

/// The in-memory state of one running conversation.
#[derive(Debug)]
pub struct ActiveSession {
    /// The session's persistent id.
    pub session_id: Uuid,
    /// The rep holding the conversation.
    pub user_id: Uuid,
    /// Phase tracking for this conversation.
    pub state_machine: ConversationStateMachine,
    /// Full transcript sent to the LLM; the system prompt is always first.
    pub conversation_history: Vec<ChatMessage>,
    /// The buyer system prompt built from the scenario.
    pub system_prompt: String,
}

/// What a session looked like when it ended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Total turns taken.
    pub total_turns: u32,
    /// Turns spent in each phase that was visited.
    pub phases_visited: HashMap<Phase, u32>,
    /// The phase the conversation ended in; `None` when the session was
    /// never active.
    pub final_phase: Option<Phase>,
}

/// Shared handle to a running session.
pub type SessionHandle = Arc<tokio::sync::Mutex<ActiveSession>>;

/// Registry of running sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, SessionHandle>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts (or restarts) a session for the given scenario.
    ///
    /// Builds the buyer system prompt from the scenario, rehydrates the
    /// state machine from `snapshot` when one is given, and replaces any
    /// existing entry for this id.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownScenario`] when the scenario id is not
    /// in the catalog.
    pub fn start(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        scenario_id: &str,
        snapshot: Option<StateSnapshot>,
    ) -> Result<SessionHandle> {
        let scenario = catalog::scenario(scenario_id)
            .ok_or_else(|| EngineError::UnknownScenario(scenario_id.to_string()))?;

        let system_prompt = build_system_prompt(scenario.buyer_persona, scenario.context);
        let state_machine =
            snapshot.map_or_else(ConversationStateMachine::new, ConversationStateMachine::from_snapshot);

        let session = ActiveSession {
            session_id,
            user_id,
            state_machine,
            conversation_history: vec![ChatMessage::system(&system_prompt)],
            system_prompt,
        };

        let handle = Arc::new(tokio::sync::Mutex::new(session));
        self.lock().insert(session_id, Arc::clone(&handle));
        Ok(handle)
    }

    /// Looks up a running session.
    #[must_use]
    pub fn get(&self, session_id: Uuid) -> Option<SessionHandle> {
        self.lock().get(&session_id).cloned()
    }

    /// Removes a session and summarizes it.
    ///
    /// An id with no running session yields the empty summary.
    pub async fn end(&self, session_id: Uuid) -> SessionSummary {
        let handle = self.lock().remove(&session_id);
        match handle {
            Some(handle) => {
                let session = handle.lock().await;
                SessionSummary {
                    total_turns: session.state_machine.turn_count(),
                    phases_visited: session.state_machine.phase_turn_counts().clone(),
                    final_phase: Some(session.state_machine.current_phase()),
                }
            }
            None => SessionSummary::default(),
        }
    }

    /// Number of sessions currently running.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.lock().len()
    }
}

/// Builds the fixed buyer system prompt for a scenario.
fn build_system_prompt(buyer_persona: &str, context: &str) -> String {
    format!(
        "You are a potential buyer in a sales roleplay training exercise.\n\n\
         YOUR PERSONA: {buyer_persona}\n\n\
         SITUATION: {context}\n\n\
         RULES:\n\
         - Stay in character at all times\n\
         - React naturally to what the sales rep says\n\
         - Don't make it too easy — challenge them appropriately\n\
         - If they ask good questions, reward them with useful information\n\
         - If they push too hard or miss cues, become more resistant\n\
         - Keep responses concise (2-4 sentences typically)\n\
         - Never break character or mention this is a simulation"
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_builds_prompted_session() {
        let registry = SessionRegistry::new();
        let session_id = Uuid::new_v4();
        let handle = registry
            .start(session_id, Uuid::new_v4(), "discovery_basics", None)
            .unwrap();

        let session = handle.lock().await;
        assert_eq!(session.state_machine.current_phase(), Phase::Greeting);
        assert_eq!(session.conversation_history.len(), 1);
        assert!(session.system_prompt.contains("VP of Sales"));
        assert!(session.system_prompt.contains("Stay in character"));
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn test_start_rejects_unknown_scenario() {
        let registry = SessionRegistry::new();
        let err = registry
            .start(Uuid::new_v4(), Uuid::new_v4(), "does_not_exist", None)
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownScenario(id) if id == "does_not_exist"));
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test]
    async fn test_start_rehydrates_from_snapshot() {
        let registry = SessionRegistry::new();
        let mut counts = HashMap::new();
        counts.insert(Phase::Negotiation, 2);
        let snapshot = StateSnapshot {
            current_phase: Phase::Negotiation,
            turn_count: 5,
            phase_turn_counts: counts,
        };

        let handle = registry
            .start(Uuid::new_v4(), Uuid::new_v4(), "objection_price", Some(snapshot))
            .unwrap();
        let session = handle.lock().await;
        assert_eq!(session.state_machine.current_phase(), Phase::Negotiation);
        assert_eq!(session.state_machine.turn_count(), 5);
    }

    #[test]
    fn test_restart_replaces_existing_entry() {
        let registry = SessionRegistry::new();
        let session_id = Uuid::new_v4();
        let first = registry
            .start(session_id, Uuid::new_v4(), "rapport_cold", None)
            .unwrap();
        let second = registry
            .start(session_id, Uuid::new_v4(), "rapport_cold", None)
            .unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(registry.active_count(), 1);
        let current = registry.get(session_id).unwrap();
        assert!(Arc::ptr_eq(&current, &second));
    }

    #[tokio::test]
    async fn test_end_summarizes_and_removes() {
        let registry = SessionRegistry::new();
        let session_id = Uuid::new_v4();
        let handle = registry
            .start(session_id, Uuid::new_v4(), "closing_momentum", None)
            .unwrap();
        {
            let mut session = handle.lock().await;
            session.state_machine.record_turn();
            session.state_machine.record_turn();
        }

        let summary = registry.end(session_id).await;
        assert_eq!(summary.total_turns, 2);
        assert_eq!(summary.final_phase, Some(Phase::Greeting));
        assert_eq!(summary.phases_visited.get(&Phase::Greeting), Some(&2));
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test]
    async fn test_end_unknown_session_yields_empty_summary() {
        let registry = SessionRegistry::new();
        let summary = registry.end(Uuid::new_v4()).await;
        assert_eq!(summary, SessionSummary::default());
        assert_eq!(summary.total_turns, 0);
        assert!(summary.final_phase.is_none());
    }
}
