//! Minimal Anthropic Messages API client.

use crate::{ConversationStore, Error, Generation, GenerationRequest, TextGenerator};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_BASE: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: usize = 1024;

/// Claude API client.
pub struct ClaudeClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    conversations: ConversationStore,
    timeout: Duration,
}

impl ClaudeClient {
    /// Create a new Claude client with the given API key and request timeout.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: API_BASE.to_string(),
            conversations: ConversationStore::new(),
            timeout,
        })
    }

    /// Create a Claude client from the ANTHROPIC_API_KEY environment variable.
    pub fn from_env(timeout: Duration) -> Result<Self, Error> {
        let api_key =
            std::env::var("ANTHROPIC_API_KEY").map_err(|_| Error::NoApiKey("claude"))?;
        Self::new(api_key, timeout)
    }

    /// Set the default model for this client.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the client at a different API base (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| Error::Config(format!("Invalid API key: {e}")))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        Ok(headers)
    }
}

#[async_trait]
impl TextGenerator for ClaudeClient {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, Error> {
        let (token, history) = self
            .conversations
            .resume(request.continuation.as_deref())
            .await;

        let mut messages: Vec<ApiMessage> = history
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str(),
                content: m.content.clone(),
            })
            .collect();
        messages.push(ApiMessage {
            role: "user",
            content: request.prompt.clone(),
        });

        let api_request = ApiRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: request.system.clone(),
            messages,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
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

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        let text = api_response.text();
        if text.trim().is_empty() {
            return Err(Error::Parse("response contained no text".to_string()));
        }

        self.conversations
            .record(&token, &request.prompt, &text)
            .await;

        Ok(Generation {
            text,
            continuation: token,
        })
    }

    fn name(&self) -> &str {
        "claude"
    }
}

// ============================================================================
// Internal API types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ApiContent>,
}

impl ApiResponse {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ApiContent::Text { text } => Some(text.as_str()),
                ApiContent::Other => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContent {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ClaudeClient::new("test-key", Duration::from_secs(5)).unwrap();
        assert_eq!(client.model(), DEFAULT_MODEL);
        assert_eq!(client.name(), "claude");
    }

    #[test]
    fn test_client_with_model() {
        let client = ClaudeClient::new("test-key", Duration::from_secs(5))
            .unwrap()
            .with_model("claude-3-5-haiku-20241022");
        assert_eq!(client.model(), "claude-3-5-haiku-20241022");
    }

    #[test]
    fn test_response_text_skips_non_text_blocks() {
        let body = r#"{
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "The gate "},
                {"type": "text", "text": "creaks open."}
            ]
        }"#;
        let response: ApiResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.text(), "The gate creaks open.");
    }

    #[tokio::test]
    async fn test_stalled_server_reports_timeout() {
        // Accepts connections into the backlog but never answers.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let timeout = Duration::from_millis(200);
        let client = ClaudeClient::new("test-key", timeout)
            .unwrap()
            .with_base_url(format!("http://{addr}"));

        let err = client
            .generate(GenerationRequest::new("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(t) if t == timeout), "got {err:?}");
    }

    #[test]
    fn test_invalid_api_key_header() {
        let client = ClaudeClient::new("bad\nkey", Duration::from_secs(5)).unwrap();
        assert!(matches!(client.build_headers(), Err(Error::Config(_))));
    }
}
