use thiserror::Error;

/// Failure classes reported by a generative-AI provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("model not found: {0}")]
    NotFound(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("provider error: {0}")]
    Other(String),
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Other(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum CallError {
    #[error("all AI providers are unavailable right now{}", last.as_ref().map(|e| format!(" (last error: {e})")).unwrap_or_default())]
    AllProvidersExhausted { last: Option<ProviderError> },
    #[error(transparent)]
    Provider(ProviderError),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Call(#[from] CallError),
    #[error("the AI response did not contain any JSON")]
    NoJsonFound,
    #[error("the AI response contained malformed JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("no usable questions could be generated")]
    EmptyResult,
}

#[derive(Debug, Error)]
pub enum QuizError {
    #[error("a quiz is already running in this chat")]
    AlreadyActive,
    #[error("there is no quiz running in this chat")]
    NotFound,
    #[error("a quiz needs at least one question")]
    NoQuestions,
    #[error(transparent)]
    Generation(#[from] GenerationError),
}
