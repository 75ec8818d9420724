//! End-to-end conversation tests against the offline provider.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::Arc;

use dealcoach_engine::{
    select_scenarios, EngineError, MemoryStore, PersistedSession, Phase, RoleplayService,
    SessionStatus, SessionStore, Severity, SkillGap, StateSnapshot,
};
use dealcoach_llm::{LlmClient, Role};
use uuid::Uuid;

/// Rep lines and the phase each turn should land in. The transitions rely
/// on the keyword heuristic crossing its two-keyword threshold.
const SCRIPT: [(&str, Phase); 6] = [
    (
        "Hi, thanks for taking the time today! How has your quarter been going?",
        Phase::Greeting,
    ),
    (
        "Tell me about your current process, and walk me through how your team handles coaching today.",
        Phase::Discovery,
    ),
    (
        "What's your budget and timeline, and who else is the decision maker on this?",
        Phase::Qualification,
    ),
    (
        "Let's talk pricing and discount options for an annual package.",
        Phase::Negotiation,
    ),
    (
        "What are the next steps to move forward? We're ready to sign and implement this quarter.",
        Phase::Closing,
    ),
    (
        "Thank you! I'll send over the summary and follow up soon.",
        Phase::WrapUp,
    ),
];

fn seeded_service(
    scenario_id: &str,
    snapshot: Option<StateSnapshot>,
) -> (RoleplayService, Arc<MemoryStore>, Uuid, Uuid) {
    let store = Arc::new(MemoryStore::new());
    let user_id = Uuid::new_v4();
    let session_id = Uuid::new_v4();
    store.insert_session(PersistedSession {
        id: session_id,
        user_id,
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
    (service, store, session_id, user_id)
}

#[tokio::test]
async fn test_fresh_session_starts_in_greeting() {
    let (service, store, session_id, _) = seeded_service("discovery_basics", None);
    let phase = service.start_session(session_id).await.unwrap();
    assert_eq!(phase, Phase::Greeting);
    assert_eq!(
        store.session(session_id).unwrap().status,
        SessionStatus::Active
    );
}

#[tokio::test]
async fn test_unknown_session_cannot_start() {
    let (service, _, _, _) = seeded_service("discovery_basics", None);
    let missing = Uuid::new_v4();
    let err = service.start_session(missing).await.unwrap_err();
    assert!(matches!(err, EngineError::SessionNotFound(id) if id == missing));
}

#[tokio::test]
async fn test_session_with_retired_scenario_cannot_start() {
    let (service, _, session_id, _) = seeded_service("retired_scenario", None);
    let err = service.start_session(session_id).await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownScenario(id) if id == "retired_scenario"));
}

#[tokio::test]
async fn test_message_before_start_is_rejected() {
    let (service, _, session_id, _) = seeded_service("discovery_basics", None);
    let err = service.process_message(session_id, "hello").await.unwrap_err();
    assert!(matches!(err, EngineError::SessionNotActive(id) if id == session_id));
}

#[tokio::test]
async fn test_scripted_conversation_walks_every_phase() {
    let (service, store, session_id, _) = seeded_service("discovery_basics", None);
    service.start_session(session_id).await.unwrap();

    for (index, (line, expected_phase)) in SCRIPT.iter().enumerate() {
        let turn = u32::try_from(index).unwrap() + 1;
        let outcome = service.process_message(session_id, line).await.unwrap();
        assert_eq!(outcome.turn_number, turn, "turn {turn}");
        assert_eq!(outcome.phase, *expected_phase, "turn {turn}");
        assert_eq!(outcome.is_final, *expected_phase == Phase::WrapUp);
        assert!(!outcome.reply.is_empty());
    }

    // The terminal phase rejects further turns.
    let err = service
        .process_message(session_id, "one more thing")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SessionComplete(id) if id == session_id));

    let summary = service.end_session(session_id).await.unwrap();
    assert_eq!(summary.total_turns, 6);
    assert_eq!(summary.final_phase, Some(Phase::WrapUp));

    let persisted = store.session(session_id).unwrap();
    assert_eq!(persisted.status, SessionStatus::Completed);
    assert_eq!(persisted.current_phase, Phase::WrapUp);
    assert_eq!(persisted.evaluation_summary, Some(summary));

    // Turn t stores the rep line at 2t-1 and the buyer reply at 2t.
    let messages = store.messages_for(session_id);
    assert_eq!(messages.len(), 12);
    for (index, message) in messages.iter().enumerate() {
        let sequence = u32::try_from(index).unwrap() + 1;
        assert_eq!(message.sequence_number, sequence);
        let expected_role = if sequence % 2 == 1 { Role::User } else { Role::Assistant };
        assert_eq!(message.role, expected_role);
    }
    // Buyer replies carry the post-transition phase.
    for (turn, (_, expected_phase)) in SCRIPT.iter().enumerate() {
        assert_eq!(messages[turn * 2 + 1].phase, *expected_phase);
    }
}

#[tokio::test]
async fn test_session_resumes_from_persisted_snapshot() {
    let snapshot = StateSnapshot {
        current_phase: Phase::Negotiation,
        turn_count: 7,
        phase_turn_counts: HashMap::from([
            (Phase::Greeting, 2),
            (Phase::Discovery, 3),
            (Phase::Negotiation, 2),
        ]),
    };
    let (service, _, session_id, _) = seeded_service("objection_price", Some(snapshot));

    let phase = service.start_session(session_id).await.unwrap();
    assert_eq!(phase, Phase::Negotiation);

    let outcome = service
        .process_message(session_id, "Where do we stand on the numbers?")
        .await
        .unwrap();
    assert_eq!(outcome.turn_number, 8);
}

#[tokio::test]
async fn test_stored_gaps_drive_scenario_recommendations() {
    let (_, store, _, user_id) = seeded_service("discovery_basics", None);
    let gap = |skill: &str, score: f64, severity: Severity, resolved: bool| SkillGap {
        id: Uuid::new_v4(),
        user_id,
        skill_name: skill.to_string(),
        severity,
        score,
        is_resolved: resolved,
    };
    store.insert_skill_gap(gap("discovery", 2.0, Severity::Critical, false));
    store.insert_skill_gap(gap("closing", 4.0, Severity::High, false));
    store.insert_skill_gap(gap("rapport_building", 5.5, Severity::Medium, false));
    store.insert_skill_gap(gap("negotiation", 1.0, Severity::Critical, true));

    let gaps = store.unresolved_skill_gaps(user_id).await.unwrap();
    let skills: Vec<_> = gaps.iter().map(|g| g.skill_name.as_str()).collect();
    assert_eq!(skills, vec!["discovery", "closing", "rapport_building"]);

    let selected = select_scenarios(&gaps, 2);
    let ids: Vec<_> = selected.iter().map(|s| s.scenario_id).collect();
    assert_eq!(ids, vec!["rapport_cold", "discovery_basics"]);
}
