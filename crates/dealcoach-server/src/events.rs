//! The WebSocket wire protocol.
//!
//! Both directions use JSON objects tagged with a snake_case `type` field.

use dealcoach_engine::{Phase, SessionSummary};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events the server pushes to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// The session is live; sent once after a successful connect.
    SessionStarted {
        /// The session the socket is bound to.
        session_id: Uuid,
        /// The phase the conversation opens in.
        phase: Phase,
    },
    /// The simulated buyer started (or stopped) composing a reply.
    Typing {
        /// `true` while a reply is being generated.
        is_typing: bool,
    },
    /// One buyer reply.
    Message {
        /// The reply text.
        content: String,
        /// The phase after the turn.
        phase: Phase,
        /// 1-based turn number.
        turn_number: u32,
        /// `true` once the conversation reached the terminal phase.
        is_final: bool,
    },
    /// The session ended; carries the final summary.
    SessionEnded {
        /// Turn totals and final phase.
        evaluation_summary: SessionSummary,
    },
    /// Periodic keep-alive.
    Heartbeat,
    /// Reply to a client `ping`.
    Pong,
    /// Something went wrong; the socket closes after this.
    Error {
        /// Human-readable description.
        message: String,
    },
}

/// Events the client sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// One rep message to run through the conversation.
    Message {
        /// The message text.
        content: String,
    },
    /// Application-level keep-alive; answered with `pong`.
    Ping,
    /// Ends the session gracefully.
    EndSession,
}
