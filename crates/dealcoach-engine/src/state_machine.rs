//! The per-session conversation state machine.
//!
//! Tracks the current phase, turn counts, and per-phase turn distribution,
//! and enforces the static transition graph. The machine itself is not
//! synchronized; callers run it under the per-session lock handed out by the
//! session registry, which makes transition-plus-observers an atomic unit.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::phase::Phase;

/// Default number of turns spent in one phase before a transition is
/// suggested to the model.
pub const DEFAULT_MAX_TURNS_PER_PHASE: u32 = 4;

/// Callback invoked after every successful transition, in registration order.
pub type TransitionObserver = Box<dyn Fn(Phase, Phase) + Send + Sync>;

/// Serializable snapshot of a state machine, used to rehydrate a session
/// from persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// The phase the conversation is in.
    pub current_phase: Phase,
    /// Total turns taken so far.
    pub turn_count: u32,
    /// Turns taken per phase.
    #[serde(default)]
    pub phase_turn_counts: HashMap<Phase, u32>,
}

/// Tracks where a single conversation is in the phase graph.
pub struct ConversationStateMachine {
    current_phase: Phase,
    turn_count: u32,
    phase_turn_counts: HashMap<Phase, u32>,
    observers: Vec<TransitionObserver>,
}

impl Default for ConversationStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConversationStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationStateMachine")
            .field("current_phase", &self.current_phase)
            .field("turn_count", &self.turn_count)
            .field("phase_turn_counts", &self.phase_turn_counts)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl ConversationStateMachine {
    /// Creates a machine at the start of a conversation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current_phase: Phase::Greeting,
            turn_count: 0,
            phase_turn_counts: HashMap::new(),
            observers: Vec::new(),
        }
    }

    /// Rebuilds a machine from a persisted snapshot.
    ///
    /// Observers are not part of the snapshot and start empty.
    #[must_use]
    pub fn from_snapshot(snapshot: StateSnapshot) -> Self {
        Self {
            current_phase: snapshot.current_phase,
            turn_count: snapshot.turn_count,
            phase_turn_counts: snapshot.phase_turn_counts,
            observers: Vec::new(),
        }
    }

    /// The phase the conversation is currently in.
    #[must_use]
    pub const fn current_phase(&self) -> Phase {
        self.current_phase
    }

    /// Total turns taken so far.
    #[must_use]
    pub const fn turn_count(&self) -> u32 {
        self.turn_count
    }

    /// Turns taken per phase.
    #[must_use]
    pub const fn phase_turn_counts(&self) -> &HashMap<Phase, u32> {
        &self.phase_turn_counts
    }

    /// Registers an observer to run after every successful transition.
    pub fn on_transition(&mut self, observer: TransitionObserver) {
        self.observers.push(observer);
    }

    /// The phases the conversation may legally move to right now.
    #[must_use]
    pub const fn allowed_transitions(&self) -> &'static [Phase] {
        self.current_phase.allowed_transitions()
    }

    /// Returns `true` if moving to `target` is legal from the current phase.
    #[must_use]
    pub fn can_transition_to(&self, target: Phase) -> bool {
        self.allowed_transitions().contains(&target)
    }

    /// Returns `true` once the conversation has reached the terminal phase.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.current_phase.is_terminal()
    }

    /// Moves the conversation to `target`.
    ///
    /// All-or-nothing: an illegal target leaves every piece of state
    /// untouched. On success the target's turn counter is initialized and
    /// observers run in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] naming the rejected target
    /// and the legal set.
    pub fn transition_to(&mut self, target: Phase) -> Result<()> {
        if !self.can_transition_to(target) {
            return Err(EngineError::invalid_transition(
                self.current_phase,
                target,
                self.allowed_transitions(),
            ));
        }

        let previous = self.current_phase;
        self.current_phase = target;
        self.phase_turn_counts.entry(target).or_insert(0);

        for observer in &self.observers {
            observer(previous, target);
        }
        Ok(())
    }

    /// Records one conversation turn against the current phase.
    pub fn record_turn(&mut self) {
        self.turn_count += 1;
        *self.phase_turn_counts.entry(self.current_phase).or_insert(0) += 1;
    }

    /// Suggests the first legal transition target once the current phase has
    /// absorbed `max_turns_per_phase` turns, or `None` while under the
    /// threshold or when the phase is terminal.
    #[must_use]
    pub fn should_suggest_transition(&self, max_turns_per_phase: u32) -> Option<Phase> {
        let current_turns = self
            .phase_turn_counts
            .get(&self.current_phase)
            .copied()
            .unwrap_or(0);
        if current_turns < max_turns_per_phase {
            return None;
        }
        self.allowed_transitions().first().copied()
    }

    /// Captures the serializable state of the machine.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            current_phase: self.current_phase,
            turn_count: self.turn_count,
            phase_turn_counts: self.phase_turn_counts.clone(),
        }
    }
}
