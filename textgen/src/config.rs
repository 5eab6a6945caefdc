//! Provider selection.

use crate::{ClaudeClient, Error, FallbackClient, OpenAiClient, OpenAiFlavor, TextGenerator};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// The available text-generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenRouter,
    OpenAi,
    Claude,
    Fallback,
}

impl Provider {
    fn api_key_var(&self) -> Option<&'static str> {
        match self {
            Provider::OpenRouter => Some("OPENROUTER_API_KEY"),
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::Claude => Some("ANTHROPIC_API_KEY"),
            Provider::Fallback => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenRouter => "openrouter",
            Provider::OpenAi => "openai",
            Provider::Claude => "claude",
            Provider::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openrouter" => Ok(Provider::OpenRouter),
            "openai" => Ok(Provider::OpenAi),
            "claude" | "anthropic" => Ok(Provider::Claude),
            "fallback" | "none" | "" => Ok(Provider::Fallback),
            other => Err(Error::Config(format!("Unknown provider: {other}"))),
        }
    }
}

/// Configuration for building a [`TextGenerator`].
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub provider: Provider,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Duration,
}

impl GeneratorConfig {
    /// Create a config for a provider with default settings.
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            api_key: None,
            model: None,
            base_url: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Read the provider choice from the environment.
    ///
    /// `TEXTGEN_PROVIDER` picks the backend explicitly. Without it the first
    /// provider with an API key set wins (Claude, OpenRouter, OpenAI), and
    /// the fallback generator is used when no key is present.
    pub fn from_env() -> Result<Self, Error> {
        let provider = match std::env::var("TEXTGEN_PROVIDER") {
            Ok(name) => name.parse()?,
            Err(_) => [Provider::Claude, Provider::OpenRouter, Provider::OpenAi]
                .into_iter()
                .find(|p| {
                    p.api_key_var()
                        .is_some_and(|var| std::env::var(var).is_ok())
                })
                .unwrap_or(Provider::Fallback),
        };

        let mut config = Self::new(provider);
        config.api_key = provider
            .api_key_var()
            .and_then(|var| std::env::var(var).ok());
        config.model = std::env::var("TEXTGEN_MODEL").ok();
        if let Ok(secs) = std::env::var("TEXTGEN_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|_| Error::Config(format!("Invalid TEXTGEN_TIMEOUT_SECS: {secs}")))?;
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the configured generator.
    pub fn build(self) -> Result<Box<dyn TextGenerator>, Error> {
        let generator: Box<dyn TextGenerator> = match self.provider {
            Provider::Fallback => Box::new(FallbackClient::new()),
            Provider::Claude => {
                let key = self.api_key.ok_or(Error::NoApiKey("claude"))?;
                let mut client = ClaudeClient::new(key, self.timeout)?;
                if let Some(model) = self.model {
                    client = client.with_model(model);
                }
                if let Some(base_url) = self.base_url {
                    client = client.with_base_url(base_url);
                }
                Box::new(client)
            }
            Provider::OpenAi | Provider::OpenRouter => {
                let flavor = if self.provider == Provider::OpenAi {
                    OpenAiFlavor::OpenAi
                } else {
                    OpenAiFlavor::OpenRouter
                };
                let key = self.api_key.ok_or(Error::NoApiKey(self.provider.name()))?;
                let mut client = OpenAiClient::new(flavor, key, self.timeout)?;
                if let Some(model) = self.model {
                    client = client.with_model(model);
                }
                if let Some(base_url) = self.base_url {
                    client = client.with_base_url(base_url);
                }
                Box::new(client)
            }
        };
        tracing::info!(provider = generator.name(), "text generator ready");
        Ok(generator)
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::new(Provider::Fallback)
    }
}
