//! Text-generation clients for the adventure narrator.
//!
//! This crate provides a single [`TextGenerator`] interface with:
//! - A Claude (Anthropic Messages API) client
//! - An OpenAI-compatible client (OpenAI and OpenRouter)
//! - A templated fallback that never fails
//! - Continuation tokens that keep multi-turn conversation context
//!
//! The provider is chosen once, at startup, from a [`GeneratorConfig`].

mod anthropic;
mod config;
mod conversation;
mod fallback;
mod openai;

pub use anthropic::ClaudeClient;
pub use config::{GeneratorConfig, Provider};
pub use conversation::ConversationStore;
pub use fallback::FallbackClient;
pub use openai::{OpenAiClient, OpenAiFlavor};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while generating text.
#[derive(Debug, Error)]
pub enum Error {
    #[error("API key not configured for {0}")]
    NoApiKey(&'static str),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// Map a failed send, reporting the client's timeout when it fired.
    pub(crate) fn from_send(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            Error::Timeout(timeout)
        } else {
            e.into()
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Network(format!("timeout: {e}"))
        } else if e.is_decode() {
            Error::Parse(e.to_string())
        } else {
            Error::Network(e.to_string())
        }
    }
}

/// A text-generation backend.
///
/// Implementations accept a prompt plus an optional continuation token and
/// return free text together with the token to use for the next turn.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for the request.
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, Error>;

    /// Short provider name, used in logs.
    fn name(&self) -> &str;
}

/// A request to generate narrative text.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// System prompt (context bundle rendered as text).
    pub system: Option<String>,
    /// The user-turn prompt.
    pub prompt: String,
    /// Continuation token from a previous generation.
    pub continuation: Option<String>,
    /// Deterministic text to use when no model is available.
    pub fallback: Option<String>,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    /// Create a new request with the given prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_continuation(mut self, token: Option<String>) -> Self {
        self.continuation = token;
        self
    }

    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Generated text plus the continuation token for the next turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub continuation: String,
}

/// A plain-text message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = GenerationRequest::new("Look around")
            .with_system("You narrate a world")
            .with_continuation(Some("conv-1".to_string()))
            .with_fallback("Nothing happens.")
            .with_max_tokens(512)
            .with_temperature(0.7);

        assert_eq!(request.prompt, "Look around");
        assert_eq!(request.system.as_deref(), Some("You narrate a world"));
        assert_eq!(request.continuation.as_deref(), Some("conv-1"));
        assert_eq!(request.fallback.as_deref(), Some("Nothing happens."));
        assert_eq!(request.max_tokens, Some(512));
        assert_eq!(request.temperature, Some(0.7));
    }

    #[test]
    fn test_message_creation() {
        let user_msg = Message::user("Hello");
        assert_eq!(user_msg.role, Role::User);
        assert_eq!(user_msg.role.as_str(), "user");

        let assistant_msg = Message::assistant("Hi there");
        assert_eq!(assistant_msg.role, Role::Assistant);
        assert_eq!(assistant_msg.content, "Hi there");
    }
}
