//! Templated generator used when no model is configured.

use crate::{Error, Generation, GenerationRequest, TextGenerator};
use async_trait::async_trait;
use uuid::Uuid;

const DEFAULT_NARRATIVE: &str =
    "The world holds its breath for a moment, then carries on around you.";

/// Deterministic generator that echoes the request's fallback text.
///
/// Never fails.
#[derive(Debug, Clone, Default)]
pub struct FallbackClient;

impl FallbackClient {
    pub fn new() -> Self {
        Self
    }

    /// The text this client produces for a request.
    pub fn narrate(request: &GenerationRequest) -> String {
        request
            .fallback
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_NARRATIVE.to_string())
    }
}

#[async_trait]
impl TextGenerator for FallbackClient {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, Error> {
        let continuation = request
            .continuation
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Ok(Generation {
            text: Self::narrate(&request),
            continuation,
        })
    }

    fn name(&self) -> &str {
        "fallback"
    }
}
