pub mod fallback;
pub mod gemini;

#[cfg(feature = "test-support")]
pub mod scripted;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::model::types::Document;

/// A single prompt, optionally with a document attached inline.
#[derive(Debug, Clone, Copy)]
pub struct GenerateRequest<'a> {
    pub system: Option<&'a str>,
    pub prompt: &'a str,
    pub document: Option<&'a Document>,
    /// Ask the provider for a JSON response body when it supports it.
    pub json: bool,
}

impl<'a> GenerateRequest<'a> {
    pub fn text(prompt: &'a str) -> Self {
        Self {
            system: None,
            prompt,
            document: None,
            json: false,
        }
    }
}

/// A generative-AI backend addressed by model name and credential.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn generate(
        &self,
        request: GenerateRequest<'_>,
        model: &str,
        credential: &str,
    ) -> Result<String, ProviderError>;

    async fn embed(
        &self,
        text: &str,
        model: &str,
        credential: &str,
    ) -> Result<Vec<f32>, ProviderError>;
}
