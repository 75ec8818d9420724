//! Anthropic messages API backend.
//!
//! The messages API takes the system prompt as a top-level `system` field
//! rather than as a message, so system messages are lifted out of the
//! transcript before sending.

use std::time::Duration;

use futures::stream::BoxStream;
use serde::Deserialize;
use serde_json::json;

use crate::client::{ChatMessage, CompletionOptions, LlmResponse, Role, Usage};
use crate::error::{LlmError, Result};
use crate::sse;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub(crate) struct AnthropicBackend {
    client: reqwest::Client,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug, Default, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl AnthropicBackend {
    pub(crate) fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
        }
    }

    /// Builds the request body, lifting the system prompt out of the
    /// transcript. When several system messages are present the last wins,
    /// matching the wire format's single `system` field.
    fn request_body(
        messages: &[ChatMessage],
        model: &str,
        options: &CompletionOptions,
        stream: bool,
    ) -> serde_json::Value {
        let mut system = String::new();
        let mut chat: Vec<&ChatMessage> = Vec::new();
        for message in messages {
            if message.role == Role::System {
                system = message.content.clone();
            } else {
                chat.push(message);
            }
        }

        let mut body = json!({
            "model": model,
            "messages": chat,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "stream": stream,
        });
        if !system.is_empty() {
            body["system"] = serde_json::Value::String(system);
        }
        body
    }

    fn request(&self, body: &serde_json::Value) -> reqwest::RequestBuilder {
        self.client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
    }

    pub(crate) async fn complete(
        &self,
        messages: &[ChatMessage],
        model: &str,
        options: &CompletionOptions,
    ) -> Result<LlmResponse> {
        let body = Self::request_body(messages, model, options, false);
        let response = self.request(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::status(status.as_u16(), message));
        }

        let parsed: MessagesResponse = response.json().await?;
        let content = parsed
            .content
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::bad_response("response had no content blocks"))?;

        Ok(LlmResponse {
            content: content.text,
            model: parsed.model,
            usage: Usage {
                prompt_tokens: parsed.usage.input_tokens,
                completion_tokens: parsed.usage.output_tokens,
            },
        })
    }

    pub(crate) fn stream(
        self,
        messages: &[ChatMessage],
        model: &str,
        options: &CompletionOptions,
    ) -> BoxStream<'static, Result<String>> {
        let body = Self::request_body(messages, model, options, true);
        let request = self.request(&body);

        sse::spawn(request, |event| {
            if event.get("type")?.as_str()? != "content_block_delta" {
                return None;
            }
            event
                .get("delta")?
                .get("text")?
                .as_str()
                .map(str::to_string)
        })
    }
}
