//! Provider-agnostic LLM chat client for Dealcoach.
//!
//! A single [`LlmClient`] fronts one of three backends, chosen once at
//! construction: an OpenAI-compatible chat-completions endpoint (which covers
//! LM Studio and other local servers), the Anthropic messages API, or an
//! offline stand-in that replays canned buyer and evaluator responses.
//!
//! [`LlmClient::complete`] retries transient failures on a fixed delay
//! schedule; [`LlmClient::stream`] is a single pass with no mid-stream retry.

mod anthropic;
pub mod client;
pub mod error;
mod mock;
mod openai;
mod sse;

pub use client::{
    ChatMessage, CompletionOptions, LlmClient, LlmResponse, Role, Usage, RETRY_DELAYS,
};
pub use error::{LlmError, Result};
