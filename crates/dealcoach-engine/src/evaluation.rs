//! Post-session performance evaluation.
//!
//! Feeds the full transcript to the LLM with a rubric prompt, parses the
//! JSON verdict, and derives skill gaps from sub-threshold skill scores. A
//! reply that is not valid JSON degrades to a raw-text outcome instead of
//! failing the session teardown.

use std::sync::Arc;

use dealcoach_llm::{ChatMessage, CompletionOptions, LlmClient};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::selector::{Severity, SkillGap};

/// Sampling temperature for evaluation; low, the verdict should be stable.
pub const EVALUATION_TEMPERATURE: f32 = 0.3;

/// Token cap for the evaluation reply.
pub const EVALUATION_MAX_TOKENS: u32 = 2048;

/// Skill scores below this produce a [`SkillGap`].
pub const SKILL_GAP_THRESHOLD: f64 = 6.0;

const EVALUATION_SYSTEM_PROMPT: &str = r#"You are an expert sales call evaluator. Analyze the following sales call transcript and evaluate the salesperson's performance.

Return a JSON object with this exact structure:
{
    "overall_score": <float 0-10>,
    "rubric_results": {
        "asked_about_budget": {
            "question": "Did the rep ask about budget?",
            "answer": true/false,
            "confidence": <float 0-1>,
            "evidence": "quote from transcript"
        },
        "identified_decision_maker": {
            "question": "Did the rep identify the decision maker?",
            "answer": true/false,
            "confidence": <float 0-1>,
            "evidence": "quote"
        },
        "asked_timeline": {
            "question": "Did the rep ask about timeline?",
            "answer": true/false,
            "confidence": <float 0-1>,
            "evidence": "quote"
        },
        "handled_objections": {
            "question": "Did the rep handle objections effectively?",
            "answer": true/false,
            "confidence": <float 0-1>,
            "evidence": "quote"
        },
        "clear_next_steps": {
            "question": "Did the rep establish clear next steps?",
            "answer": true/false,
            "confidence": <float 0-1>,
            "evidence": "quote"
        },
        "active_listening": {
            "question": "Did the rep demonstrate active listening?",
            "answer": true/false,
            "confidence": <float 0-1>,
            "evidence": "quote"
        }
    },
    "skill_scores": {
        "discovery": {
            "skill_name": "discovery",
            "category": "qualification",
            "score": <float 0-10>,
            "max_score": 10.0,
            "feedback": "specific feedback"
        },
        "objection_handling": {
            "skill_name": "objection_handling",
            "category": "negotiation",
            "score": <float 0-10>,
            "max_score": 10.0,
            "feedback": "specific feedback"
        },
        "negotiation": {
            "skill_name": "negotiation",
            "category": "negotiation",
            "score": <float 0-10>,
            "max_score": 10.0,
            "feedback": "specific feedback"
        },
        "closing": {
            "skill_name": "closing",
            "category": "closing",
            "score": <float 0-10>,
            "max_score": 10.0,
            "feedback": "specific feedback"
        },
        "rapport_building": {
            "skill_name": "rapport_building",
            "category": "communication",
            "score": <float 0-10>,
            "max_score": 10.0,
            "feedback": "specific feedback"
        },
        "active_listening": {
            "skill_name": "active_listening",
            "category": "communication",
            "score": <float 0-10>,
            "max_score": 10.0,
            "feedback": "specific feedback"
        }
    },
    "strengths": ["strength 1", "strength 2"],
    "weaknesses": ["weakness 1", "weakness 2"],
    "recommended_scenarios": ["scenario_id_1", "scenario_id_2"]
}

Be specific and reference actual parts of the transcript. Return ONLY valid JSON."#;

/// One yes/no rubric verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricResult {
    /// The question the evaluator answered.
    pub question: String,
    /// The verdict.
    pub answer: bool,
    /// Evaluator confidence, 0 to 1.
    pub confidence: f64,
    /// Supporting quote from the transcript.
    pub evidence: String,
}

/// One scored skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillScore {
    /// The skill, e.g. `"discovery"`.
    pub skill_name: String,
    /// Coarse grouping, e.g. `"negotiation"`.
    pub category: String,
    /// Demonstrated proficiency, 0 to 10.
    pub score: f64,
    /// The scale ceiling.
    pub max_score: f64,
    /// Evaluator feedback for this skill.
    pub feedback: String,
}

/// The evaluator's full structured verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Aggregate performance, 0 to 10.
    pub overall_score: f64,
    /// Yes/no rubric verdicts keyed by rubric id.
    pub rubric_results: std::collections::HashMap<String, RubricResult>,
    /// Per-skill scores keyed by skill name.
    pub skill_scores: std::collections::HashMap<String, SkillScore>,
    /// What went well.
    pub strengths: Vec<String>,
    /// What needs work.
    pub weaknesses: Vec<String>,
    /// Scenario ids the evaluator suggests practicing.
    #[serde(default)]
    pub recommended_scenarios: Vec<String>,
}

/// The result of one evaluation run.
///
/// Evaluation is best-effort: if the model returns something that is not
/// the requested JSON, `report` is `None` and `raw` still carries the text.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    /// The parsed verdict, when the reply was valid.
    pub report: Option<EvaluationReport>,
    /// The model's raw reply.
    pub raw: String,
    /// `true` when the reply could not be parsed.
    pub parse_failed: bool,
}

/// Runs transcript evaluations.
#[derive(Debug, Clone)]
pub struct Evaluator {
    llm: Arc<LlmClient>,
}

impl Evaluator {
    /// Creates an evaluator on top of an existing client.
    #[must_use]
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    /// Evaluates a full transcript.
    ///
    /// # Errors
    ///
    /// Returns the underlying LLM failure. A malformed reply is not an
    /// error; it yields an outcome with `parse_failed` set.
    pub async fn evaluate_transcript(&self, transcript: &str) -> Result<EvaluationOutcome> {
        let messages = [
            ChatMessage::system(EVALUATION_SYSTEM_PROMPT),
            ChatMessage::user(format!("Transcript:\n\n{transcript}")),
        ];
        let options = CompletionOptions {
            model: None,
            temperature: EVALUATION_TEMPERATURE,
            max_tokens: EVALUATION_MAX_TOKENS,
        };

        let response = self.llm.complete(&messages, &options).await?;
        Ok(parse_evaluation(response.content))
    }
}

/// Parses a model reply into an outcome, stripping a code fence if present.
fn parse_evaluation(raw: String) -> EvaluationOutcome {
    let candidate = strip_code_fence(raw.trim());
    match serde_json::from_str::<EvaluationReport>(candidate) {
        Ok(report) => EvaluationOutcome {
            report: Some(report),
            raw,
            parse_failed: false,
        },
        Err(err) => {
            tracing::warn!(error = %err, "evaluation reply was not valid JSON");
            EvaluationOutcome {
                report: None,
                raw,
                parse_failed: true,
            }
        }
    }
}

/// Strips a Markdown code fence (```json ... ```), returning the inner text.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some((_, body)) = rest.split_once('\n') else {
        return text;
    };
    match body.rsplit_once("```") {
        Some((inner, _)) => inner,
        None => body,
    }
}

/// Derives skill gaps from a report's sub-threshold skill scores.
///
/// Severity follows the score: below 3 is critical, below 5 high, otherwise
/// medium. The result is sorted by skill name so callers see a stable order.
#[must_use]
pub fn skill_gaps_from_report(user_id: Uuid, report: &EvaluationReport) -> Vec<SkillGap> {
    let mut gaps: Vec<SkillGap> = report
        .skill_scores
        .values()
        .filter(|skill| skill.score < SKILL_GAP_THRESHOLD)
        .map(|skill| {
            let severity = if skill.score < 3.0 {
                Severity::Critical
            } else if skill.score < 5.0 {
                Severity::High
            } else {
                Severity::Medium
            };
            SkillGap {
                id: Uuid::new_v4(),
                user_id,
                skill_name: skill.skill_name.clone(),
                severity,
                score: skill.score,
                is_resolved: false,
            }
        })
        .collect();
    gaps.sort_by(|a, b| a.skill_name.cmp(&b.skill_name));
    gaps
}
