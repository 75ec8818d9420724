//! Conversation orchestration for simulated sales-training roleplay.
//!
//! The engine drives a rep-versus-simulated-buyer conversation through a
//! fixed graph of sales phases (greeting through wrap-up), assembling the
//! LLM context for each turn, detecting phase transitions from keywords,
//! and persisting the transcript as it goes. After a session ends, the
//! evaluator scores the transcript against a rubric and turns weak skills
//! into gaps, which the selector converts into scenario recommendations for
//! the rep's next session.
//!
//! The main entry points are [`pipeline::RoleplayService`] for running
//! conversations, [`evaluation::Evaluator`] for scoring them, and
//! [`selector::select_scenarios`] for picking what to practice next.

pub mod catalog;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod phase;
pub mod pipeline;
pub mod selector;
pub mod session;
pub mod state_machine;
pub mod store;

pub use catalog::{Difficulty, ScenarioConfig};
pub use config::{Config, LlmProvider};
pub use error::{EngineError, Result};
pub use evaluation::{EvaluationOutcome, EvaluationReport, Evaluator};
pub use phase::Phase;
pub use pipeline::{RoleplayService, TurnOutcome};
pub use selector::{select_scenarios, Severity, SkillGap};
pub use session::{SessionRegistry, SessionSummary};
pub use state_machine::{ConversationStateMachine, StateSnapshot, DEFAULT_MAX_TURNS_PER_PHASE};
pub use store::{MemoryStore, PersistedSession, SessionStatus, SessionStore, StoredMessage};
