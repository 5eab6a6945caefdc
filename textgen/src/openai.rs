//! OpenAI-compatible chat completions client (OpenAI and OpenRouter).

use crate::{ConversationStore, Error, Generation, GenerationRequest, TextGenerator};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const OPENAI_BASE: &str = "https://api.openai.com/v1";
const OPENROUTER_BASE: &str = "https://openrouter.ai/api/v1";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";
const OPENROUTER_DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Which OpenAI-compatible service the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAiFlavor {
    OpenAi,
    OpenRouter,
}

impl OpenAiFlavor {
    fn base_url(&self) -> &'static str {
        match self {
            OpenAiFlavor::OpenAi => OPENAI_BASE,
            OpenAiFlavor::OpenRouter => OPENROUTER_BASE,
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            OpenAiFlavor::OpenAi => OPENAI_DEFAULT_MODEL,
            OpenAiFlavor::OpenRouter => OPENROUTER_DEFAULT_MODEL,
        }
    }

    fn env_key(&self) -> &'static str {
        match self {
            OpenAiFlavor::OpenAi => "OPENAI_API_KEY",
            OpenAiFlavor::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    fn name(&self) -> &'static str {
        match self {
            OpenAiFlavor::OpenAi => "openai",
            OpenAiFlavor::OpenRouter => "openrouter",
        }
    }
}

/// Chat completions client for OpenAI and OpenRouter.
pub struct OpenAiClient {
    client: reqwest::Client,
    flavor: OpenAiFlavor,
    api_key: String,
    model: String,
    base_url: String,
    app_title: Option<String>,
    conversations: ConversationStore,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(
        flavor: OpenAiFlavor,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            flavor,
            api_key: api_key.into(),
            model: flavor.default_model().to_string(),
            base_url: flavor.base_url().to_string(),
            app_title: None,
            conversations: ConversationStore::new(),
            timeout,
        })
    }

    /// Create an OpenAI client.
    pub fn openai(api_key: impl Into<String>, timeout: Duration) -> Result<Self, Error> {
        Self::new(OpenAiFlavor::OpenAi, api_key, timeout)
    }

    /// Create an OpenRouter client.
    pub fn openrouter(api_key: impl Into<String>, timeout: Duration) -> Result<Self, Error> {
        Self::new(OpenAiFlavor::OpenRouter, api_key, timeout)
    }

    /// Create a client reading the flavor's API key from the environment.
    pub fn from_env(flavor: OpenAiFlavor, timeout: Duration) -> Result<Self, Error> {
        let api_key =
            std::env::var(flavor.env_key()).map_err(|_| Error::NoApiKey(flavor.name()))?;
        Self::new(flavor, api_key, timeout)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Application title reported to OpenRouter.
    pub fn with_app_title(mut self, title: impl Into<String>) -> Self {
        self.app_title = Some(title.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn flavor(&self) -> OpenAiFlavor {
        self.flavor
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| Error::Config(format!("Invalid API key: {e}")))?,
        );
        if self.flavor == OpenAiFlavor::OpenRouter {
            if let Some(title) = &self.app_title {
                headers.insert(
                    "X-Title",
                    HeaderValue::from_str(title)
                        .map_err(|e| Error::Config(format!("Invalid app title: {e}")))?,
                );
            }
        }
        Ok(headers)
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, Error> {
        let (token, history) = self
            .conversations
            .resume(request.continuation.as_deref())
            .await;

        let mut messages = Vec::with_capacity(history.len() + 2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.extend(history.iter().map(|m| ChatMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        }));
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        let api_request = ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .headers(self.build_headers()?)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::from_send(e, self.timeout))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        let text = chat
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::Parse("response contained no choices".to_string()))?;

        self.conversations
            .record(&token, &request.prompt, &text)
            .await;

        Ok(Generation {
            text,
            continuation: token,
        })
    }

    fn name(&self) -> &str {
        self.flavor.name()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
