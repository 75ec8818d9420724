//! The per-turn conversation pipeline.
//!
//! [`RoleplayService`] is the engine's front door: it starts sessions from
//! persistence, runs each rep message through context assembly, the LLM, and
//! keyword-based phase detection, and writes the results back to the store.
//! A turn runs under the session's lock, so concurrent messages for the same
//! session serialize instead of interleaving.

use std::sync::Arc;

use chrono::Utc;
use dealcoach_llm::{ChatMessage, CompletionOptions, LlmClient};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::phase::Phase;
use crate::session::{SessionHandle, SessionRegistry, SessionSummary};
use crate::state_machine::{ConversationStateMachine, DEFAULT_MAX_TURNS_PER_PHASE};
use crate::store::{SessionStatus, SessionStore, SessionUpdate, StoredMessage};

/// Sampling temperature for roleplay replies.
pub const ROLEPLAY_TEMPERATURE: f32 = 0.8;

/// Token cap for roleplay replies; buyers keep answers short.
pub const ROLEPLAY_MAX_TOKENS: u32 = 512;

/// Distinct keywords that must appear in a turn before a phase transition
/// is applied.
pub const TRANSITION_KEYWORD_THRESHOLD: usize = 2;

/// The result of one processed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// The simulated buyer's reply.
    pub reply: String,
    /// The phase the conversation is in after the turn.
    pub phase: Phase,
    /// 1-based turn number.
    pub turn_number: u32,
    /// `true` once the conversation reached the terminal phase.
    pub is_final: bool,
}

/// Runs roleplay conversations end to end.
pub struct RoleplayService {
    llm: Arc<LlmClient>,
    store: Arc<dyn SessionStore>,
    registry: SessionRegistry,
    max_turns_per_phase: u32,
}

impl RoleplayService {
    /// Creates a service with the default per-phase turn budget.
    #[must_use]
    pub fn new(llm: Arc<LlmClient>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            llm,
            store,
            registry: SessionRegistry::new(),
            max_turns_per_phase: DEFAULT_MAX_TURNS_PER_PHASE,
        }
    }

    /// Overrides how many turns a phase absorbs before the model is nudged
    /// to move on.
    #[must_use]
    pub fn with_max_turns_per_phase(mut self, max_turns_per_phase: u32) -> Self {
        self.max_turns_per_phase = max_turns_per_phase;
        self
    }

    /// The store this service persists through.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Looks up a running session.
    #[must_use]
    pub fn active_session(&self, session_id: Uuid) -> Option<SessionHandle> {
        self.registry.get(session_id)
    }

    /// Activates a persisted session and returns the phase it opens in.
    ///
    /// Sessions with a stored snapshot resume where they left off; fresh
    /// sessions open in [`Phase::Greeting`]. Starting an already-running
    /// session replaces its in-memory state.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SessionNotFound`] when no session exists with
    /// this id, or [`EngineError::UnknownScenario`] when the persisted
    /// scenario id is not in the catalog.
    pub async fn start_session(&self, session_id: Uuid) -> Result<Phase> {
        let persisted = self
            .store
            .load_session(session_id)
            .await?
            .ok_or(EngineError::SessionNotFound(session_id))?;

        let handle = self.registry.start(
            session_id,
            persisted.user_id,
            &persisted.scenario_id,
            persisted.snapshot,
        )?;
        let phase = handle.lock().await.state_machine.current_phase();

        self.store
            .update_session(
                session_id,
                SessionUpdate {
                    status: Some(SessionStatus::Active),
                    ..SessionUpdate::default()
                },
            )
            .await?;

        tracing::info!(%session_id, scenario = %persisted.scenario_id, %phase, "session started");
        Ok(phase)
    }

    /// Runs one rep message through the conversation.
    ///
    /// Records the turn, assembles the LLM context (system persona, current
    /// phase instruction, full history), detects phase transitions from the
    /// rep message plus the buyer reply, and persists the transcript and
    /// updated state.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SessionNotActive`] when the session was never
    /// started, [`EngineError::SessionComplete`] once it reached the terminal
    /// phase, or the underlying LLM/store failure.
    pub async fn process_message(&self, session_id: Uuid, message: &str) -> Result<TurnOutcome> {
        let handle = self
            .registry
            .get(session_id)
            .ok_or(EngineError::SessionNotActive(session_id))?;
        let mut session = handle.lock().await;

        if session.state_machine.is_terminal() {
            return Err(EngineError::SessionComplete(session_id));
        }

        session.state_machine.record_turn();
        let turn_number = session.state_machine.turn_count();
        let phase_before = session.state_machine.current_phase();

        session
            .conversation_history
            .push(ChatMessage::user(message));

        let context = phase_context(
            phase_before,
            session.state_machine.should_suggest_transition(self.max_turns_per_phase),
        );
        let mut llm_messages = Vec::with_capacity(session.conversation_history.len() + 1);
        if let Some(system) = session.conversation_history.first() {
            llm_messages.push(system.clone());
        }
        llm_messages.push(ChatMessage::system(context));
        llm_messages.extend(session.conversation_history.iter().skip(1).cloned());

        let options = CompletionOptions {
            model: None,
            temperature: ROLEPLAY_TEMPERATURE,
            max_tokens: ROLEPLAY_MAX_TOKENS,
        };
        let response = self.llm.complete(&llm_messages, &options).await?;
        let reply = response.content;

        session
            .conversation_history
            .push(ChatMessage::assistant(&reply));

        Self::detect_and_apply_transition(
            &mut session.state_machine,
            &format!("{} {}", message.to_lowercase(), reply.to_lowercase()),
        );
        let phase_after = session.state_machine.current_phase();

        let now = Utc::now();
        self.store
            .append_messages(&[
                StoredMessage {
                    session_id,
                    role: dealcoach_llm::Role::User,
                    content: message.to_string(),
                    phase: phase_before,
                    sequence_number: 2 * turn_number - 1,
                    created_at: now,
                },
                StoredMessage {
                    session_id,
                    role: dealcoach_llm::Role::Assistant,
                    content: reply.clone(),
                    phase: phase_after,
                    sequence_number: 2 * turn_number,
                    created_at: now,
                },
            ])
            .await?;
        self.store
            .update_session(
                session_id,
                SessionUpdate {
                    current_phase: Some(phase_after),
                    turn_count: Some(turn_number),
                    snapshot: Some(session.state_machine.snapshot()),
                    ..SessionUpdate::default()
                },
            )
            .await?;

        if phase_after != phase_before {
            tracing::info!(%session_id, from = %phase_before, to = %phase_after, "phase transition");
        }

        Ok(TurnOutcome {
            reply,
            phase: phase_after,
            turn_number,
            is_final: session.state_machine.is_terminal(),
        })
    }

    /// Ends a session, persisting its summary.
    ///
    /// Ending a session that is not running yields the empty summary and
    /// still marks the persisted record completed.
    ///
    /// # Errors
    ///
    /// Returns the underlying store failure.
    pub async fn end_session(&self, session_id: Uuid) -> Result<SessionSummary> {
        let summary = self.registry.end(session_id).await;
        self.store
            .update_session(
                session_id,
                SessionUpdate {
                    status: Some(SessionStatus::Completed),
                    evaluation_summary: Some(summary.clone()),
                    ..SessionUpdate::default()
                },
            )
            .await?;
        tracing::info!(%session_id, turns = summary.total_turns, "session ended");
        Ok(summary)
    }

    /// Applies the first phase whose keywords appear at least
    /// [`TRANSITION_KEYWORD_THRESHOLD`] times in the turn text.
    ///
    /// Candidates are scanned in canonical phase order and must be legal
    /// transitions from the current phase; `text` must already be lowercased.
    fn detect_and_apply_transition(state_machine: &mut ConversationStateMachine, text: &str) {
        let current = state_machine.current_phase();
        for candidate in Phase::ALL {
            if candidate == current || !state_machine.can_transition_to(candidate) {
                continue;
            }
            let hits = candidate
                .detection_keywords()
                .iter()
                .filter(|keyword| text.contains(**keyword))
                .count();
            if hits >= TRANSITION_KEYWORD_THRESHOLD {
                if let Err(err) = state_machine.transition_to(candidate) {
                    tracing::warn!(error = %err, "detected transition rejected");
                }
                break;
            }
        }
    }
}

impl std::fmt::Debug for RoleplayService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleplayService")
            .field("registry", &self.registry)
            .field("max_turns_per_phase", &self.max_turns_per_phase)
            .finish_non_exhaustive()
    }
}

/// The phase-context system message injected after the persona.
fn phase_context(phase: Phase, suggested: Option<Phase>) -> String {
    let mut context = format!("[Current phase: {phase}]\n{}", phase.instruction());
    if let Some(target) = suggested {
        context.push_str(&format!(
            "\n\n[INTERNAL: Consider naturally transitioning the conversation toward the {target} phase.]"
        ));
    }
    context
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::state_machine::StateSnapshot;
    use crate::store::{MemoryStore, PersistedSession};

    fn seeded_service(
        scenario_id: &str,
        snapshot: Option<StateSnapshot>,
    ) -> (RoleplayService, Arc<MemoryStore>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let session_id = Uuid::new_v4();
        store.insert_session(PersistedSession {
            id: session_id,
            user_id: Uuid::new_v4(),
            scenario_id: scenario_id.to_string(),
            status: SessionStatus::Created,
            current_phase: snapshot
                .as_ref()
                .map_or(Phase::Greeting, |s| s.current_phase),
            turn_count: snapshot.as_ref().map_or(0, |s| s.turn_count),
            snapshot,
            evaluation_summary: None,
        });

        let service = RoleplayService::new(
            Arc::new(LlmClient::mock()),
            Arc::clone(&store) as Arc<dyn SessionStore>,
        );
        (service, store, session_id)
    }

    #[tokio::test]
    async fn test_start_unknown_session_is_not_found() {
        let (service, _store, _id) = seeded_service("discovery_basics", None);
        let missing = Uuid::new_v4();
        let err = service.start_session(missing).await.unwrap_err();
        assert!(matches!(err, EngineError::SessionNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn test_start_marks_session_active() {
        let (service, store, session_id) = seeded_service("discovery_basics", None);
        let phase = service.start_session(session_id).await.unwrap();
        assert_eq!(phase, Phase::Greeting);
        assert_eq!(
            store.session(session_id).unwrap().status,
            SessionStatus::Active
        );
    }

    #[tokio::test]
    async fn test_start_resumes_from_snapshot() {
        let snapshot = StateSnapshot {
            current_phase: Phase::Negotiation,
            turn_count: 7,
            phase_turn_counts: HashMap::from([(Phase::Negotiation, 2)]),
        };
        let (service, _store, session_id) = seeded_service("objection_price", Some(snapshot));
        let phase = service.start_session(session_id).await.unwrap();
        assert_eq!(phase, Phase::Negotiation);
    }

    #[tokio::test]
    async fn test_message_without_start_is_not_active() {
        let (service, _store, session_id) = seeded_service("discovery_basics", None);
        let err = service.process_message(session_id, "hello").await.unwrap_err();
        assert!(matches!(err, EngineError::SessionNotActive(id) if id == session_id));
    }

    #[tokio::test]
    async fn test_terminal_session_rejects_further_turns() {
        let snapshot = StateSnapshot {
            current_phase: Phase::WrapUp,
            turn_count: 9,
            phase_turn_counts: HashMap::new(),
        };
        let (service, _store, session_id) = seeded_service("closing_momentum", Some(snapshot));
        service.start_session(session_id).await.unwrap();

        let err = service
            .process_message(session_id, "one more thing")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SessionComplete(id) if id == session_id));
    }

    #[tokio::test]
    async fn test_turn_persists_sequenced_transcript() {
        let (service, store, session_id) = seeded_service("discovery_basics", None);
        service.start_session(session_id).await.unwrap();

        let outcome = service
            .process_message(session_id, "Hi, thanks for making time today!")
            .await
            .unwrap();
        assert_eq!(outcome.turn_number, 1);
        assert_eq!(outcome.phase, Phase::Greeting);
        assert!(!outcome.is_final);
        assert!(!outcome.reply.is_empty());

        let messages = store.messages_for(session_id);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sequence_number, 1);
        assert_eq!(messages[0].role, dealcoach_llm::Role::User);
        assert_eq!(messages[1].sequence_number, 2);
        assert_eq!(messages[1].role, dealcoach_llm::Role::Assistant);
        assert_eq!(messages[1].content, outcome.reply);

        let persisted = store.session(session_id).unwrap();
        assert_eq!(persisted.turn_count, 1);
        assert!(persisted.snapshot.is_some());
    }

    #[tokio::test]
    async fn test_keyword_heavy_turn_moves_the_phase() {
        let (service, _store, session_id) = seeded_service("discovery_basics", None);
        service.start_session(session_id).await.unwrap();

        let outcome = service
            .process_message(
                session_id,
                "Tell me about your current process, and walk me through how your team handles coaching today.",
            )
            .await
            .unwrap();
        assert_eq!(outcome.phase, Phase::Discovery);
    }

    #[tokio::test]
    async fn test_single_keyword_is_below_threshold() {
        let (service, _store, session_id) = seeded_service("discovery_basics", None);
        service.start_session(session_id).await.unwrap();

        let outcome = service
            .process_message(session_id, "Good morning! Hope the week is treating you well.")
            .await
            .unwrap();
        assert_eq!(outcome.phase, Phase::Greeting);
    }

    #[tokio::test]
    async fn test_end_session_completes_persisted_record() {
        let (service, store, session_id) = seeded_service("rapport_cold", None);
        service.start_session(session_id).await.unwrap();
        service
            .process_message(session_id, "Hi! Appreciate you picking up.")
            .await
            .unwrap();

        let summary = service.end_session(session_id).await.unwrap();
        assert_eq!(summary.total_turns, 1);
        assert_eq!(summary.final_phase, Some(Phase::Greeting));

        let persisted = store.session(session_id).unwrap();
        assert_eq!(persisted.status, SessionStatus::Completed);
        assert_eq!(persisted.evaluation_summary, Some(summary));
        assert!(service.active_session(session_id).is_none());
    }
}
