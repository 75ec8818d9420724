//! The static scenario catalog.
//!
//! Five training scenarios, each targeting specific sales skills, plus the
//! skill-to-scenario map the selector consumes. Catalog declaration order is
//! meaningful: the selector breaks score ties by it.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Serialize;

/// Difficulty rating of a training scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Suitable for new reps.
    Beginner,
    /// Assumes basic fluency.
    Intermediate,
    /// Multi-stakeholder, high-pressure situations.
    Advanced,
}

/// A training scenario: who the simulated buyer is and what the rep should
/// practice.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioConfig {
    /// Stable identifier used in persistence and the skill map.
    pub scenario_id: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    /// What the rep practices here.
    pub description: &'static str,
    /// Skills this scenario trains.
    pub target_skills: &'static [&'static str],
    /// Difficulty rating.
    pub difficulty: Difficulty,
    /// Who the simulated buyer is.
    pub buyer_persona: &'static str,
    /// The situation the conversation opens in.
    pub context: &'static str,
}

static SCENARIO_CATALOG: Lazy<Vec<ScenarioConfig>> = Lazy::new(|| {
    vec![
        ScenarioConfig {
            scenario_id: "discovery_basics",
            name: "Discovery Deep Dive",
            description: "Practice asking the right discovery questions to uncover needs",
            target_skills: &["discovery", "active_listening"],
            difficulty: Difficulty::Beginner,
            buyer_persona: "VP of Sales at mid-market SaaS company, open but busy",
            context: "First meeting. The buyer responded to an outbound email. They have 15 minutes.",
        },
        ScenarioConfig {
            scenario_id: "objection_price",
            name: "Price Objection Battleground",
            description: "Handle aggressive price pushback from a skeptical buyer",
            target_skills: &["objection_handling", "negotiation"],
            difficulty: Difficulty::Intermediate,
            buyer_persona: "CFO who's been burned by expensive software before, very price-sensitive",
            context: "Second call. They liked the demo but are pushing hard on price. Competitor quoted 30% less.",
        },
        ScenarioConfig {
            scenario_id: "negotiation_complex",
            name: "Multi-Stakeholder Negotiation",
            description: "Navigate complex deal with multiple decision makers",
            target_skills: &["negotiation", "closing", "discovery"],
            difficulty: Difficulty::Advanced,
            buyer_persona: "Procurement lead who needs sign-off from CTO and CFO",
            context: "Third call. They want to buy but need to justify to leadership. Budget is tight.",
        },
        ScenarioConfig {
            scenario_id: "closing_momentum",
            name: "Close the Deal",
            description: "Practice closing techniques when buyer is warm but hesitant",
            target_skills: &["closing", "objection_handling"],
            difficulty: Difficulty::Intermediate,
            buyer_persona: "Director of Operations who likes the product but fears change management",
            context: "Final call. They've done a trial, results are good. But they keep stalling.",
        },
        ScenarioConfig {
            scenario_id: "rapport_cold",
            name: "Cold Call Warm-Up",
            description: "Build rapport quickly with a cold prospect",
            target_skills: &["rapport_building", "discovery"],
            difficulty: Difficulty::Beginner,
            buyer_persona: "Head of Marketing, wasn't expecting your call, mildly annoyed",
            context: "Cold call. You have 60 seconds to earn their attention.",
        },
    ]
});

static SKILL_TO_SCENARIOS: Lazy<HashMap<&'static str, &'static [&'static str]>> =
    Lazy::new(|| {
        HashMap::from([
            (
                "discovery",
                &["discovery_basics", "rapport_cold"] as &'static [&'static str],
            ),
            ("active_listening", &["discovery_basics"] as _),
            ("objection_handling", &["objection_price", "closing_momentum"] as _),
            ("negotiation", &["objection_price", "negotiation_complex"] as _),
            ("closing", &["negotiation_complex", "closing_momentum"] as _),
            ("rapport_building", &["rapport_cold"] as _),
        ])
    });

/// The full catalog in declaration (tie-break) order.
#[must_use]
pub fn catalog() -> &'static [ScenarioConfig] {
    &SCENARIO_CATALOG
}

/// Looks up one scenario by id.
#[must_use]
pub fn scenario(scenario_id: &str) -> Option<&'static ScenarioConfig> {
    SCENARIO_CATALOG
        .iter()
        .find(|config| config.scenario_id == scenario_id)
}

/// The scenario ids that train a given skill; empty for unknown skills.
#[must_use]
pub fn scenarios_for_skill(skill: &str) -> &'static [&'static str] {
    SKILL_TO_SCENARIOS.get(skill).copied().unwrap_or(&[])
}
