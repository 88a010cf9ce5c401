//! Deterministic provider for tests: replies are scripted per model and every
//! call is recorded.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::provider::{GenerateRequest, Provider};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub model: String,
    pub credential: String,
    pub prompt: String,
    pub had_document: bool,
}

#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<HashMap<String, VecDeque<Result<String, ProviderError>>>>,
    embeddings: Mutex<HashMap<String, Result<Vec<f32>, ProviderError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next result `model` returns from `generate`. Once a model's
    /// queue is empty it keeps failing with `NotFound`.
    pub fn push(&self, model: &str, reply: Result<String, ProviderError>) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Embedding returned for any text containing `needle`.
    pub fn embed_as(&self, needle: &str, result: Result<Vec<f32>, ProviderError>) -> &Self {
        self.embeddings
            .lock()
            .unwrap()
            .insert(needle.to_string(), result);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, model: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.model == model)
            .count()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn generate(
        &self,
        request: GenerateRequest<'_>,
        model: &str,
        credential: &str,
    ) -> Result<String, ProviderError> {
        self.calls.lock().unwrap().push(RecordedCall {
            model: model.to_string(),
            credential: credential.to_string(),
            prompt: request.prompt.to_string(),
            had_document: request.document.is_some(),
        });
        self.replies
            .lock()
            .unwrap()
            .get_mut(model)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(ProviderError::NotFound(model.to_string())))
    }

    async fn embed(
        &self,
        text: &str,
        model: &str,
        credential: &str,
    ) -> Result<Vec<f32>, ProviderError> {
        self.calls.lock().unwrap().push(RecordedCall {
            model: model.to_string(),
            credential: credential.to_string(),
            prompt: text.to_string(),
            had_document: false,
        });
        self.embeddings
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| text.contains(needle.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or_else(|| Err(ProviderError::Other("no embedding scripted".to_string())))
    }
}
