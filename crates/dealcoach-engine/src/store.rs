//! The persistence collaborator contract.
//!
//! The engine reads and writes sessions through the [`SessionStore`] trait
//! and never assumes a particular backing store. [`MemoryStore`] is the
//! in-process implementation used by tests and the demo binary.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dealcoach_llm::Role;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::phase::Phase;
use crate::selector::SkillGap;
use crate::session::SessionSummary;
use crate::state_machine::StateSnapshot;

/// Lifecycle status of a persisted session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Assigned but never connected to.
    Created,
    /// A live conversation is (or was) in progress.
    Active,
    /// Ended; the summary is final.
    Completed,
}

/// A roleplay session as the store knows it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSession {
    /// Stable identifier.
    pub id: Uuid,
    /// The rep training in this session.
    pub user_id: Uuid,
    /// Which catalog scenario this session runs.
    pub scenario_id: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Last known phase.
    pub current_phase: Phase,
    /// Last known turn count.
    pub turn_count: u32,
    /// State machine snapshot for rehydration, if any turns were taken.
    pub snapshot: Option<StateSnapshot>,
    /// Final summary, present once the session completed.
    pub evaluation_summary: Option<SessionSummary>,
}

/// One persisted conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    /// The session this message belongs to.
    pub session_id: Uuid,
    /// Who authored it.
    pub role: Role,
    /// The message text.
    pub content: String,
    /// The phase the conversation was in when it was stored.
    pub phase: Phase,
    /// Position within the session: turn `t` stores the user message at
    /// `2t - 1` and the assistant reply at `2t`.
    pub sequence_number: u32,
    /// When the message was stored.
    pub created_at: DateTime<Utc>,
}

/// Partial update applied to a persisted session.
///
/// `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    /// New lifecycle status.
    pub status: Option<SessionStatus>,
    /// New current phase.
    pub current_phase: Option<Phase>,
    /// New turn count.
    pub turn_count: Option<u32>,
    /// New state machine snapshot.
    pub snapshot: Option<StateSnapshot>,
    /// Final summary.
    pub evaluation_summary: Option<SessionSummary>,
}

/// What the engine needs from persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads one session by id, or `None` if it does not exist.
    async fn load_session(&self, session_id: Uuid) -> Result<Option<PersistedSession>>;

    /// Appends messages to a session's transcript.
    async fn append_messages(&self, messages: &[StoredMessage]) -> Result<()>;

    /// Applies a partial update to a session. Updating a session that does
    /// not exist is a no-op.
    async fn update_session(&self, session_id: Uuid, update: SessionUpdate) -> Result<()>;

    /// The user's unresolved skill gaps, ascending by score (worst first).
    async fn unresolved_skill_gaps(&self, user_id: Uuid) -> Result<Vec<SkillGap>>;
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    sessions: HashMap<Uuid, PersistedSession>,
    messages: HashMap<Uuid, Vec<StoredMessage>>,
    skill_gaps: Vec<SkillGap>,
}

/// In-process store for tests and the demo binary.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts (or replaces) a session.
    pub fn insert_session(&self, session: PersistedSession) {
        self.lock().sessions.insert(session.id, session);
    }

    /// Inserts a skill gap.
    pub fn insert_skill_gap(&self, gap: SkillGap) {
        self.lock().skill_gaps.push(gap);
    }

    /// Reads back one session.
    #[must_use]
    pub fn session(&self, session_id: Uuid) -> Option<PersistedSession> {
        self.lock().sessions.get(&session_id).cloned()
    }

    /// Reads back a session's transcript in append order.
    #[must_use]
    pub fn messages_for(&self, session_id: Uuid) -> Vec<StoredMessage> {
        self.lock()
            .messages
            .get(&session_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load_session(&self, session_id: Uuid) -> Result<Option<PersistedSession>> {
        Ok(self.lock().sessions.get(&session_id).cloned())
    }

    async fn append_messages(&self, messages: &[StoredMessage]) -> Result<()> {
        let mut inner = self.lock();
        for message in messages {
            inner
                .messages
                .entry(message.session_id)
                .or_default()
                .push(message.clone());
        }
        Ok(())
    }

    async fn update_session(&self, session_id: Uuid, update: SessionUpdate) -> Result<()> {
        let mut inner = self.lock();
        if let Some(session) = inner.sessions.get_mut(&session_id) {
            if let Some(status) = update.status {
                session.status = status;
            }
            if let Some(phase) = update.current_phase {
                session.current_phase = phase;
            }
            if let Some(turn_count) = update.turn_count {
                session.turn_count = turn_count;
            }
            if let Some(snapshot) = update.snapshot {
                session.snapshot = Some(snapshot);
            }
            if let Some(summary) = update.evaluation_summary {
                session.evaluation_summary = Some(summary);
            }
        }
        Ok(())
    }

    async fn unresolved_skill_gaps(&self, user_id: Uuid) -> Result<Vec<SkillGap>> {
        let mut gaps: Vec<SkillGap> = self
            .lock()
            .skill_gaps
            .iter()
            .filter(|gap| gap.user_id == user_id && !gap.is_resolved)
            .cloned()
            .collect();
        gaps.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(gaps)
    }
}
