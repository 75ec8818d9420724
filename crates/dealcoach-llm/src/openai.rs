//! OpenAI-compatible chat-completions backend.
//!
//! Also serves LM Studio and other local servers that speak the same API;
//! only the base URL differs.

use std::time::Duration;

use futures::stream::BoxStream;
use serde::Deserialize;
use serde_json::json;

use crate::client::{ChatMessage, CompletionOptions, LlmResponse, Usage};
use crate::error::{LlmError, Result};
use crate::sse;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub(crate) struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

impl OpenAiBackend {
    pub(crate) fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn request_body(
        messages: &[ChatMessage],
        model: &str,
        options: &CompletionOptions,
        stream: bool,
    ) -> serde_json::Value {
        json!({
            "model": model,
            "messages": messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "stream": stream,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    pub(crate) async fn complete(
        &self,
        messages: &[ChatMessage],
        model: &str,
        options: &CompletionOptions,
    ) -> Result<LlmResponse> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&Self::request_body(messages, model, options, false))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::status(status.as_u16(), message));
        }

        let completion: ChatCompletion = response.json().await?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::bad_response("completion had no choices"))?;

        Ok(LlmResponse {
            content: choice.message.content,
            model: completion.model.unwrap_or_else(|| model.to_string()),
            usage: completion.usage.unwrap_or_default(),
        })
    }

    pub(crate) fn stream(
        self,
        messages: &[ChatMessage],
        model: &str,
        options: &CompletionOptions,
    ) -> BoxStream<'static, Result<String>> {
        let request = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&Self::request_body(messages, model, options, true));

        sse::spawn(request, |event| {
            event
                .get("choices")?
                .get(0)?
                .get("delta")?
                .get("content")?
                .as_str()
                .map(str::to_string)
        })
    }
}
