//! Skill-gap driven scenario selection.
//!
//! Given a user's unresolved skill gaps, ranks catalog scenarios by urgency:
//! each gap contributes `(10 - score) * severity_weight` to every scenario
//! that trains the gapped skill, contributions are summed per scenario, and
//! the top scenarios win. Score ties break by catalog declaration order.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{self, ScenarioConfig};

/// How urgent a skill gap is.
///
/// Unknown severity strings deserialize to `Low` (weight 1) rather than
/// failing, so records written by other systems never block selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Severity {
    /// Minor weakness.
    #[default]
    Low,
    /// Noticeable weakness.
    Medium,
    /// Costs deals.
    High,
    /// Blocks the rep's effectiveness.
    Critical,
}

impl Severity {
    /// The scoring weight applied to gaps of this severity.
    #[must_use]
    pub const fn weight(self) -> f64 {
        match self {
            Self::Low => 1.0,
            Self::Medium => 2.0,
            Self::High => 3.0,
            Self::Critical => 4.0,
        }
    }

    /// The lowercase name used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Parses a string into a `Severity`, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Severity {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_str_case_insensitive(&s).unwrap_or_default())
    }
}

/// A diagnosed weakness in one sales skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillGap {
    /// Stable identifier.
    pub id: Uuid,
    /// The rep this gap belongs to.
    pub user_id: Uuid,
    /// The skill found wanting, e.g. `"discovery"`.
    pub skill_name: String,
    /// How urgent the gap is.
    pub severity: Severity,
    /// Demonstrated proficiency, 0 (worst) to 10 (best).
    pub score: f64,
    /// Whether later evaluations showed the gap closed.
    pub is_resolved: bool,
}

/// Ranks catalog scenarios against a set of skill gaps.
///
/// Resolved gaps and gaps in skills no scenario trains contribute nothing.
/// Returns at most `max_scenarios` scenarios, most urgent first; ties keep
/// catalog declaration order.
#[must_use]
pub fn select_scenarios(gaps: &[SkillGap], max_scenarios: usize) -> Vec<&'static ScenarioConfig> {
    let mut scores: HashMap<&'static str, f64> = HashMap::new();
    for gap in gaps.iter().filter(|gap| !gap.is_resolved) {
        let weight = gap.severity.weight();
        for scenario_id in catalog::scenarios_for_skill(&gap.skill_name) {
            *scores.entry(scenario_id).or_insert(0.0) += (10.0 - gap.score) * weight;
        }
    }

    // Candidates are gathered in catalog order; the stable sort then keeps
    // that order for equal scores.
    let mut ranked: Vec<(&'static ScenarioConfig, f64)> = catalog::catalog()
        .iter()
        .filter_map(|config| scores.get(config.scenario_id).map(|&score| (config, score)))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    ranked
        .into_iter()
        .take(max_scenarios)
        .map(|(config, _)| config)
        .collect()
}
