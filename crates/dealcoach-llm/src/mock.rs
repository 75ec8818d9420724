//! Offline backend with canned buyer and evaluator responses.
//!
//! Lets the whole engine run without a provider: evaluation requests are
//! recognized by the word "evaluator" in a system message and answered with a
//! fixed structured analysis; roleplay requests read the `[Current phase: ..]`
//! system message and pick one of three canned buyer utterances for that
//! phase.

use std::sync::{Arc, Mutex, PoisonError};

use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::StreamExt;
use rand::seq::SliceRandom;

use crate::client::{ChatMessage, LlmResponse, Role, Usage};
use crate::error::{LlmError, Result};

/// Canned buyer utterances keyed by phase name.
///
/// Scanned in declaration order; the first phase name found in a
/// `Current phase:` system message wins.
const ROLEPLAY_RESPONSES: &[(&str, [&str; 3])] = &[
    (
        "greeting",
        [
            "Hi. Yeah, I got your email. Look, I've got about 15 minutes before my next \
             meeting, so let's make this quick. What exactly does your platform do?",
            "Hey there. I'll be honest, I wasn't really expecting this call but your email \
             caught my eye. I'm curious but skeptical. Pitch me.",
            "Hello. Before you start — I've seen a dozen demos this quarter already. What \
             makes yours different? And please, no buzzwords.",
        ],
    ),
    (
        "discovery",
        [
            "Well, our main challenge is that ramp time for new reps is about 6 months right \
             now. We lose deals because junior reps don't know how to handle objections. But \
             I'm not sure another tool is the answer — we tried Gong last year.",
            "Hmm, good question. We're running a team of 40 SDRs and the conversion rate has \
             been dropping. I think the issue is discovery calls — reps aren't asking the \
             right questions. But how would AI actually fix that?",
            "Our pipeline is healthy but win rates are down 15% this quarter. The VP of Sales \
             thinks it's a coaching problem. Personally, I think it's a hiring problem. But \
             I'm open to hearing your take.",
        ],
    ),
    (
        "qualification",
        [
            "Budget... I'd say somewhere in the $50K to $80K range annually, but our CFO will \
             need to sign off on anything over $30K. Timeline-wise, we're looking at Q2 if we \
             move forward. We're also talking to two other vendors.",
            "We don't have a hard budget yet — still in exploration mode. But if the ROI is \
             clear, I can probably get $60-100K approved. Decision would be me plus our CRO. \
             She's the tough one.",
            "I can authorize up to $40K myself. Anything above that goes to procurement, and \
             that's a 6-week process. So if you're thinking of closing this month, that's not \
             realistic.",
        ],
    ),
    (
        "objection_handling",
        [
            "Look, we tried AI coaching before — spent $80K on a platform that nobody used \
             after month two. How is this different? I need more than promises.",
            "Your competitor quoted us 30% less for basically the same thing. I get that you \
             think you're better, but from where I'm sitting, features look pretty similar. \
             Why should I pay more?",
            "I'm worried about adoption. My team is already drowning in tools. Salesforce, \
             Outreach, Gong, Slack — adding another thing feels like it'll just create more \
             friction.",
        ],
    ),
    (
        "negotiation",
        [
            "Okay, I'm interested. But I need you to work with me on price. If we commit to \
             an annual contract, can you do better than list price? And I want the analytics \
             module included, not as an add-on.",
            "Here's the thing — I like what I see, but I need to justify this to the CFO. Can \
             we do a 90-day pilot with a smaller team first? If the numbers look good, we'll \
             roll out company-wide.",
            "We're close. But I've got the competing offer at 30% less sitting on my desk. I \
             want to go with you, but I need you to sharpen your pencil. What can you do?",
        ],
    ),
    (
        "closing",
        [
            "Alright, you've addressed most of my concerns. What does the implementation \
             timeline look like? And walk me through the contract terms — I want to \
             understand the commitment.",
            "I'll be honest, I need to think about this. Can you send me a summary of what we \
             discussed? I want to run it by my CRO before making any commitments.",
            "I like it. I think we can move forward. What are the next steps on your end? \
             I'll need a formal proposal to take to procurement by Friday.",
        ],
    ),
    (
        "wrap_up",
        [
            "Good conversation. I'm cautiously optimistic. Send me that proposal and let's \
             set up a call with my CRO next week. No promises, but you're in the running.",
            "Thanks for your time. Honestly, I'm more interested than I expected to be. Let \
             me digest everything and I'll get back to you by Thursday. If I don't, ping me — \
             I get busy.",
            "Alright, I think we're done for today. I'll be straight with you — you're my \
             top choice right now, but I have one more demo tomorrow. Send me the pricing \
             breakdown and let's go from there.",
        ],
    ),
];

/// Fixed structured analysis returned for evaluation requests.
const EVALUATION_JSON: &str = r#"{
    "overall_score": 5.8,
    "rubric_results": {
        "asked_about_budget": {
            "question": "Did the rep ask about budget?",
            "answer": false,
            "confidence": 0.92,
            "evidence": "No budget-related questions found in transcript"
        },
        "identified_decision_maker": {
            "question": "Did the rep identify the decision maker?",
            "answer": true,
            "confidence": 0.87,
            "evidence": "Rep asked: 'Who else would be involved in evaluating this?'"
        },
        "asked_timeline": {
            "question": "Did the rep ask about timeline?",
            "answer": false,
            "confidence": 0.95,
            "evidence": "No timeline questions were asked"
        },
        "handled_objections": {
            "question": "Did the rep handle objections effectively?",
            "answer": true,
            "confidence": 0.78,
            "evidence": "Rep acknowledged the concern but pivot was weak"
        },
        "clear_next_steps": {
            "question": "Did the rep establish clear next steps?",
            "answer": false,
            "confidence": 0.91,
            "evidence": "Call ended without defined follow-up"
        },
        "active_listening": {
            "question": "Did the rep demonstrate active listening?",
            "answer": true,
            "confidence": 0.83,
            "evidence": "Rep paraphrased buyer's concerns twice"
        }
    },
    "skill_scores": {
        "discovery": {
            "skill_name": "discovery",
            "category": "qualification",
            "score": 4.0,
            "max_score": 10.0,
            "feedback": "Missed critical discovery questions about budget, timeline, and current pain points"
        },
        "objection_handling": {
            "skill_name": "objection_handling",
            "category": "negotiation",
            "score": 6.5,
            "max_score": 10.0,
            "feedback": "Acknowledged objections but failed to reframe value proposition effectively"
        },
        "negotiation": {
            "skill_name": "negotiation",
            "category": "negotiation",
            "score": 5.0,
            "max_score": 10.0,
            "feedback": "Gave discount too early without getting anything in return"
        },
        "closing": {
            "skill_name": "closing",
            "category": "closing",
            "score": 3.0,
            "max_score": 10.0,
            "feedback": "No close attempt. Ended call without next steps or commitment"
        },
        "rapport_building": {
            "skill_name": "rapport_building",
            "category": "communication",
            "score": 7.5,
            "max_score": 10.0,
            "feedback": "Good opening, built initial trust. Could mirror more."
        },
        "active_listening": {
            "skill_name": "active_listening",
            "category": "communication",
            "score": 6.0,
            "max_score": 10.0,
            "feedback": "Paraphrased some points but interrupted buyer twice during critical moments"
        }
    },
    "strengths": [
        "Strong rapport building — buyer felt comfortable quickly",
        "Good product knowledge when explaining features"
    ],
    "weaknesses": [
        "Missed budget and timeline questions entirely",
        "No closing attempt or defined next steps",
        "Offered discount before buyer even asked — left money on the table"
    ],
    "recommended_scenarios": ["discovery_basics", "closing_momentum", "objection_price"]
}"#;

#[derive(Debug, Clone, Default)]
pub(crate) struct MockBackend {
    queued_failures: Arc<Mutex<Vec<LlmError>>>,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn with_queued_failures(failures: Vec<LlmError>) -> Self {
        Self {
            queued_failures: Arc::new(Mutex::new(failures)),
        }
    }

    fn next_failure(&self) -> Option<LlmError> {
        let mut queued = self
            .queued_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if queued.is_empty() {
            None
        } else {
            Some(queued.remove(0))
        }
    }

    pub(crate) async fn complete(&self, messages: &[ChatMessage]) -> Result<LlmResponse> {
        if let Some(err) = self.next_failure() {
            return Err(err);
        }
        Ok(respond(messages))
    }

    pub(crate) fn stream(self, messages: Vec<ChatMessage>) -> BoxStream<'static, Result<String>> {
        let (tx, rx) = mpsc::unbounded();
        tokio::spawn(async move {
            match self.complete(&messages).await {
                Ok(response) => {
                    for word in response.content.split_whitespace() {
                        if tx.unbounded_send(Ok(format!("{word} "))).is_err() {
                            break;
                        }
                    }
                }
                Err(err) => {
                    let _ = tx.unbounded_send(Err(err));
                }
            }
        });
        rx.boxed()
    }
}

fn respond(messages: &[ChatMessage]) -> LlmResponse {
    let is_evaluation = messages
        .iter()
        .any(|m| m.role == Role::System && m.content.to_lowercase().contains("evaluator"));
    if is_evaluation {
        return LlmResponse {
            content: EVALUATION_JSON.to_string(),
            model: "mock".to_string(),
            usage: Usage::default(),
        };
    }

    let mut phase = "greeting";
    for message in messages {
        if message.role == Role::System && message.content.contains("Current phase:") {
            let lowered = message.content.to_lowercase();
            for entry in ROLEPLAY_RESPONSES {
                if lowered.contains(entry.0) {
                    phase = entry.0;
                    break;
                }
            }
        }
    }

    let replies = ROLEPLAY_RESPONSES
        .iter()
        .find(|entry| entry.0 == phase)
        .map_or(&ROLEPLAY_RESPONSES[0].1, |entry| &entry.1);
    let content = replies
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or_default();

    LlmResponse {
        content: content.to_string(),
        model: "mock".to_string(),
        usage: Usage {
            prompt_tokens: 150,
            completion_tokens: 80,
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_evaluator_system_message_gets_structured_analysis() {
        let backend = MockBackend::new();
        let messages = vec![
            ChatMessage::system("You are an expert sales call evaluator."),
            ChatMessage::user("Transcript:\n\nrep: hi"),
        ];
        let response = backend.complete(&messages).await.unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&response.content).unwrap();
        assert!((parsed["overall_score"].as_f64().unwrap() - 5.8).abs() < f64::EPSILON);
        assert_eq!(response.usage, Usage::default());
    }

    #[tokio::test]
    async fn test_phase_marker_selects_canned_reply_set() {
        let backend = MockBackend::new();
        let messages = vec![
            ChatMessage::system("You are a potential buyer."),
            ChatMessage::system("[Current phase: negotiation]\nPush on price."),
            ChatMessage::user("Can we talk numbers?"),
        ];
        let response = backend.complete(&messages).await.unwrap();

        let negotiation = ROLEPLAY_RESPONSES
            .iter()
            .find(|entry| entry.0 == "negotiation")
            .unwrap();
        assert!(negotiation.1.contains(&response.content.as_str()));
        assert_eq!(response.usage.prompt_tokens, 150);
    }

    #[tokio::test]
    async fn test_missing_phase_marker_defaults_to_greeting() {
        let backend = MockBackend::new();
        let messages = vec![ChatMessage::user("hello?")];
        let response = backend.complete(&messages).await.unwrap();

        let greeting = ROLEPLAY_RESPONSES
            .iter()
            .find(|entry| entry.0 == "greeting")
            .unwrap();
        assert!(greeting.1.contains(&response.content.as_str()));
    }
}
