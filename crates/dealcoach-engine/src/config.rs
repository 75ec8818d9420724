//! Configuration loading and validation.
//!
//! Configuration lives in an optional `dealcoach.json` next to the binary
//! (or wherever `--config` points). A missing file means defaults; a present
//! but malformed file is an error with a suggestion attached. API keys are
//! never read from the file, only from the environment.

use std::path::Path;
use std::time::Duration;

use dealcoach_llm::LlmClient;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::state_machine::DEFAULT_MAX_TURNS_PER_PHASE;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "dealcoach.json";

/// Which LLM provider backs the roleplay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LlmProvider {
    /// Offline canned responses; no network, no credentials.
    #[default]
    Mock,
    /// Any OpenAI-compatible chat-completions endpoint.
    OpenAi,
    /// The Anthropic messages API.
    Anthropic,
}

impl LlmProvider {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

impl Serialize for LlmProvider {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LlmProvider {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(serde::de::Error::custom(format!(
                "unknown llmProvider '{other}' (expected mock, openai, or anthropic)"
            ))),
        }
    }
}

/// Runtime configuration for the server and the demo.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Which provider backs the roleplay LLM calls.
    pub llm_provider: LlmProvider,
    /// Default model name passed to the provider.
    pub model: String,
    /// Base URL for OpenAI-compatible endpoints.
    pub openai_base_url: String,
    /// Address the WebSocket server binds to.
    pub bind_address: String,
    /// Turns a phase absorbs before a transition is suggested to the model.
    pub max_turns_per_phase: u32,
    /// Seconds between WebSocket heartbeats.
    pub heartbeat_interval_secs: u64,
    /// Seconds of client silence before a connection is dropped.
    pub idle_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_provider: LlmProvider::default(),
            model: "gemma-2-9b-it-sppo-iter3".to_string(),
            openai_base_url: "http://localhost:1234/v1".to_string(),
            bind_address: "127.0.0.1:8000".to_string(),
            max_turns_per_phase: DEFAULT_MAX_TURNS_PER_PHASE,
            heartbeat_interval_secs: 30,
            idle_timeout_secs: 300,
        }
    }
}

impl Config {
    /// Loads configuration from [`CONFIG_FILE_NAME`] in the working
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when the file exists but cannot be
    /// parsed, or when validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from_file(Path::new(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific path; an absent file yields the
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when the file exists but cannot be
    /// read or parsed, or when validation fails.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let config = match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str::<Self>(&contents).map_err(|err| {
                EngineError::config(
                    format!("failed to parse {}: {err}", path.display()),
                    "check the file for JSON syntax errors and camelCase field names",
                )
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
            Err(err) => {
                return Err(EngineError::config(
                    format!("failed to read {}: {err}", path.display()),
                    "check the file's permissions",
                ));
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates field values.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(EngineError::config(
                "model must not be empty",
                "set \"model\" to the model name your provider serves",
            ));
        }
        if self.bind_address.trim().is_empty() {
            return Err(EngineError::config(
                "bindAddress must not be empty",
                "set \"bindAddress\" to host:port, e.g. \"127.0.0.1:8000\"",
            ));
        }
        if self.max_turns_per_phase == 0 {
            return Err(EngineError::config(
                "maxTurnsPerPhase must be greater than 0",
                "set \"maxTurnsPerPhase\" to a small positive number, e.g. 4",
            ));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(EngineError::config(
                "heartbeatIntervalSecs must be greater than 0",
                "set \"heartbeatIntervalSecs\" to e.g. 30",
            ));
        }
        if self.idle_timeout_secs <= self.heartbeat_interval_secs {
            return Err(EngineError::config(
                "idleTimeoutSecs must be greater than heartbeatIntervalSecs",
                "raise \"idleTimeoutSecs\" above the heartbeat interval, e.g. 300",
            ));
        }
        Ok(())
    }

    /// The heartbeat interval as a `Duration`.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// The idle timeout as a `Duration`.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Builds the LLM client this configuration describes.
    ///
    /// Credentials come from the environment: `DEALCOACH_OPENAI_API_KEY`
    /// (defaults to `lm-studio` for local endpoints) and
    /// `DEALCOACH_ANTHROPIC_API_KEY`.
    #[must_use]
    pub fn llm_client(&self) -> LlmClient {
        match self.llm_provider {
            LlmProvider::Mock => LlmClient::mock(),
            LlmProvider::OpenAi => {
                let api_key = std::env::var("DEALCOACH_OPENAI_API_KEY")
                    .unwrap_or_else(|_| "lm-studio".to_string());
                LlmClient::openai(&self.openai_base_url, api_key, &self.model)
            }
            LlmProvider::Anthropic => {
                let api_key = std::env::var("DEALCOACH_ANTHROPIC_API_KEY").unwrap_or_default();
                LlmClient::anthropic(api_key, &self.model)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.llm_provider, LlmProvider::Mock);
        assert_eq!(config.model, "gemma-2-9b-it-sppo-iter3");
        assert_eq!(config.bind_address, "127.0.0.1:8000");
        assert_eq!(config.max_turns_per_phase, 4);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.idle_timeout(), Duration::from_secs(300));
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = Config::load_from_file(Path::new("/nonexistent/dealcoach.json")).unwrap();
        assert_eq!(config.llm_provider, LlmProvider::Mock);
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"llmProvider": "openai", "model": "gpt-4o-mini"}"#).unwrap();
        assert_eq!(config.llm_provider, LlmProvider::OpenAi);
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.bind_address, "127.0.0.1:8000");
    }

    #[test]
    fn test_provider_parses_case_insensitively() {
        let config: Config = serde_json::from_str(r#"{"llmProvider": "Anthropic"}"#).unwrap();
        assert_eq!(config.llm_provider, LlmProvider::Anthropic);
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let result = serde_json::from_str::<Config>(r#"{"llmProvider": "bard"}"#);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("unknown llmProvider 'bard'"));
    }

    #[test]
    fn test_provider_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&LlmProvider::OpenAi).unwrap(),
            "\"openai\""
        );
    }

    #[test]
    fn test_validation_rejects_zero_turn_budget() {
        let config = Config {
            max_turns_per_phase: 0,
            ..Config::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("maxTurnsPerPhase"));
        assert!(err.contains("Suggestion"));
    }

    #[test]
    fn test_validation_rejects_idle_timeout_below_heartbeat() {
        let config = Config {
            heartbeat_interval_secs: 60,
            idle_timeout_secs: 60,
            ..Config::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("idleTimeoutSecs"));
    }

    #[test]
    fn test_validation_rejects_empty_model() {
        let config = Config {
            model: "  ".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
