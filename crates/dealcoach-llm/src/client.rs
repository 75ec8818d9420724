//! The chat-completion client and its message types.

use std::time::Duration;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::anthropic::AnthropicBackend;
use crate::error::Result;
use crate::mock::MockBackend;
use crate::openai::OpenAiBackend;

/// Delays applied between completion attempts.
///
/// The schedule length is the total number of attempts: a transient failure
/// on attempt `n` sleeps `RETRY_DELAYS[n]` before the next attempt, and the
/// final attempt's failure is returned as-is.
pub const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions to the model.
    System,
    /// The human participant.
    User,
    /// The model's own output.
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message in a chat transcript.
///
/// Serializes to the `{"role": ..., "content": ...}` shape both supported
/// providers accept on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who authored this message.
    pub role: Role,
    /// The message text.
    pub content: String,
}

impl ChatMessage {
    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt.
    #[serde(default)]
    pub prompt_tokens: u32,
    /// Tokens produced in the completion.
    #[serde(default)]
    pub completion_tokens: u32,
}

/// A completed (non-streaming) chat response.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// The assistant's reply text.
    pub content: String,
    /// The model that produced the reply.
    pub model: String,
    /// Token accounting, zeroed when the provider reports none.
    pub usage: Usage,
}

/// Per-request completion parameters.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    /// Model override; `None` uses the client's default model.
    pub model: Option<String>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

/// The provider behind a client, fixed at construction.
#[derive(Debug, Clone)]
enum Backend {
    OpenAi(OpenAiBackend),
    Anthropic(AnthropicBackend),
    Mock(MockBackend),
}

impl Backend {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        model: &str,
        options: &CompletionOptions,
    ) -> Result<LlmResponse> {
        match self {
            Self::OpenAi(backend) => backend.complete(messages, model, options).await,
            Self::Anthropic(backend) => backend.complete(messages, model, options).await,
            Self::Mock(backend) => backend.complete(messages).await,
        }
    }

    fn stream(
        self,
        messages: Vec<ChatMessage>,
        model: String,
        options: CompletionOptions,
    ) -> BoxStream<'static, Result<String>> {
        match self {
            Self::OpenAi(backend) => backend.stream(&messages, &model, &options),
            Self::Anthropic(backend) => backend.stream(&messages, &model, &options),
            Self::Mock(backend) => backend.stream(messages),
        }
    }
}

/// Chat-completion client with a provider chosen once at construction.
///
/// Cloning is cheap; clones share the underlying HTTP connection pool.
#[derive(Debug, Clone)]
pub struct LlmClient {
    backend: Backend,
    default_model: String,
}

impl LlmClient {
    /// Creates a client for an OpenAI-compatible chat-completions endpoint.
    ///
    /// `base_url` is the API root (e.g. `http://localhost:1234/v1`); a
    /// trailing slash is tolerated.
    #[must_use]
    pub fn openai(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            backend: Backend::OpenAi(OpenAiBackend::new(base_url, api_key)),
            default_model: default_model.into(),
        }
    }

    /// Creates a client for the Anthropic messages API.
    #[must_use]
    pub fn anthropic(api_key: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            backend: Backend::Anthropic(AnthropicBackend::new(api_key)),
            default_model: default_model.into(),
        }
    }

    /// Creates an offline client that replays canned responses.
    ///
    /// Useful for demos and tests: no network, no credentials.
    #[must_use]
    pub fn mock() -> Self {
        Self {
            backend: Backend::Mock(MockBackend::new()),
            default_model: "mock".to_string(),
        }
    }

    /// Requests a full completion, retrying transient failures.
    ///
    /// Attempts the request up to [`RETRY_DELAYS`]`.len()` times, sleeping the
    /// scheduled delay between attempts. Non-transient failures are returned
    /// immediately; the final attempt's failure is returned as-is.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`crate::LlmError`] once retries are exhausted
    /// or a permanent failure occurs.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<LlmResponse> {
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let mut attempt = 0;
        loop {
            match self.backend.complete(messages, &model, options).await {
                Ok(response) => {
                    tracing::debug!(model = %response.model, attempt, "completion succeeded");
                    return Ok(response);
                }
                Err(err) if err.is_transient() && attempt + 1 < RETRY_DELAYS.len() => {
                    tracing::warn!(attempt, error = %err, "transient completion failure, retrying");
                    tokio::time::sleep(RETRY_DELAYS[attempt]).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Streams a completion as text fragments.
    ///
    /// This is a single pass: there is no mid-stream retry. A failure after
    /// partial output is delivered as one final `Err` item, after which the
    /// stream ends.
    #[must_use]
    pub fn stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> BoxStream<'static, Result<String>> {
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        self.backend
            .clone()
            .stream(messages.to_vec(), model, options.clone())
    }
}

#[cfg(test)]
impl LlmClient {
    /// Offline client whose first completions fail with the given errors.
    pub(crate) fn mock_with_failures(failures: Vec<crate::error::LlmError>) -> Self {
        Self {
            backend: Backend::Mock(MockBackend::with_queued_failures(failures)),
            default_model: "mock".to_string(),
        }
    }
}
