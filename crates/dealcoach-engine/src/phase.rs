//! Conversation phases and their static data.
//!
//! A sales roleplay moves through a fixed graph of phases, from the opening
//! greeting to the terminal wrap-up. The graph, the per-phase buyer
//! instructions fed to the LLM, and the keyword sets used to detect phase
//! changes are all static data colocated here.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A phase of the sales conversation.
///
/// Declaration order is the canonical scan order used by the transition
/// heuristic and the offline provider; [`Phase::ALL`] preserves it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Opening pleasantries; every session starts here.
    #[default]
    Greeting,
    /// Uncovering the buyer's needs and pain points.
    Discovery,
    /// Establishing budget, timeline, and decision makers.
    Qualification,
    /// Working through the buyer's objections.
    ObjectionHandling,
    /// Negotiating price and terms.
    Negotiation,
    /// Driving toward commitment and next steps.
    Closing,
    /// Terminal phase; the conversation is over.
    WrapUp,
}

impl Phase {
    /// All phases in canonical order.
    pub const ALL: [Self; 7] = [
        Self::Greeting,
        Self::Discovery,
        Self::Qualification,
        Self::ObjectionHandling,
        Self::Negotiation,
        Self::Closing,
        Self::WrapUp,
    ];

    /// The phases this phase may legally transition to.
    #[must_use]
    pub const fn allowed_transitions(self) -> &'static [Self] {
        match self {
            Self::Greeting => &[Self::Discovery],
            Self::Discovery => &[Self::Qualification, Self::ObjectionHandling],
            Self::Qualification => &[Self::ObjectionHandling, Self::Negotiation],
            Self::ObjectionHandling => &[Self::Negotiation, Self::Qualification],
            Self::Negotiation => &[Self::Closing, Self::ObjectionHandling],
            Self::Closing => &[Self::WrapUp, Self::Negotiation],
            Self::WrapUp => &[],
        }
    }

    /// Returns `true` for the terminal phase.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::WrapUp)
    }

    /// The snake_case name used on the wire and in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Discovery => "discovery",
            Self::Qualification => "qualification",
            Self::ObjectionHandling => "objection_handling",
            Self::Negotiation => "negotiation",
            Self::Closing => "closing",
            Self::WrapUp => "wrap_up",
        }
    }

    /// The buyer instruction injected into the LLM context for this phase.
    #[must_use]
    pub const fn instruction(self) -> &'static str {
        match self {
            Self::Greeting => {
                "You are a potential buyer. Start with a professional greeting. \
                 Be slightly skeptical but open to hearing the pitch. \
                 Mention you're busy and have 15 minutes."
            }
            Self::Discovery => {
                "The sales rep should be asking discovery questions. \
                 Answer questions about your business needs, but don't volunteer too much. \
                 If they don't ask about budget or timeline, don't mention it."
            }
            Self::Qualification => {
                "Provide some qualifying information when asked. \
                 You have a budget of $50k-100k, timeline of Q2. \
                 You're evaluating 2 other vendors. Drop hints but make them work for details."
            }
            Self::ObjectionHandling => {
                "Raise an objection: 'We tried something similar before and it didn't work.' \
                 Or: 'Your competitor offers this for 30% less.' \
                 Test how the rep handles pushback. Be firm but fair."
            }
            Self::Negotiation => {
                "You're interested but need a better deal. \
                 Push on price, ask for additional features or support. \
                 Mention your other vendor options as leverage."
            }
            Self::Closing => {
                "If the rep has addressed your concerns well, be open to moving forward. \
                 Ask about next steps, contract terms, implementation timeline. \
                 If they haven't earned the close, stall: 'I need to think about it.'"
            }
            Self::WrapUp => {
                "The conversation is ending. Summarize your impression. \
                 Give a clear signal: either you'll move forward, need more time, or pass."
            }
        }
    }

    /// Keywords whose presence in a turn signals movement into this phase.
    ///
    /// Greeting has none: no phase transitions back into it.
    #[must_use]
    pub const fn detection_keywords(self) -> &'static [&'static str] {
        match self {
            Self::Greeting => &[],
            Self::Discovery => &[
                "tell me about",
                "what challenges",
                "how do you currently",
                "walk me through",
            ],
            Self::Qualification => &["budget", "timeline", "decision maker", "who else"],
            Self::ObjectionHandling => {
                &["concern", "worried", "not sure", "competitor", "expensive"]
            }
            Self::Negotiation => &["pricing", "discount", "deal", "package", "terms"],
            Self::Closing => &["next steps", "move forward", "sign", "start", "implement"],
            Self::WrapUp => &["thank you", "follow up", "send over", "talk soon"],
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
