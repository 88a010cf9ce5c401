use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::warn;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ProviderError;
use crate::provider::{GenerateRequest, Provider};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: Option<Content>,
}

#[derive(Debug, Serialize)]
struct EmbedContentRequest<'a> {
    content: EmbedContent<'a>,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: [EmbedPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: Embedding,
}

#[derive(Debug, Deserialize)]
struct Embedding {
    values: Vec<f32>,
}

/// Google Gemini over its REST API.
#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    fn endpoint(&self, model: &str, method: &str, credential: &str) -> Result<Url, ProviderError> {
        let raw = format!("{}/models/{model}:{method}", self.base_url);
        Url::parse_with_params(&raw, &[("key", credential)])
            .map_err(|e| ProviderError::Other(format!("invalid endpoint {raw}: {e}")))
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<R, ProviderError> {
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify(status, body));
        }
        Ok(response.json().await?)
    }
}

/// Maps an HTTP failure onto the classes the fallback caller acts on.
pub fn classify(status: StatusCode, body: String) -> ProviderError {
    let lowered = body.to_lowercase();
    if status == StatusCode::NOT_FOUND || lowered.contains("is not found") {
        ProviderError::NotFound(body)
    } else if status == StatusCode::TOO_MANY_REQUESTS
        || lowered.contains("resource_exhausted")
        || lowered.contains("quota")
    {
        ProviderError::RateLimited(body)
    } else {
        warn!("Gemini request failed with {status}");
        ProviderError::Other(format!("{status}: {body}"))
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    async fn generate(
        &self,
        request: GenerateRequest<'_>,
        model: &str,
        credential: &str,
    ) -> Result<String, ProviderError> {
        let mut parts = vec![Part {
            text: Some(request.prompt.to_string()),
            inline_data: None,
        }];
        if let Some(document) = request.document {
            parts.push(Part {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: document.mime_type.clone(),
                    data: STANDARD.encode(&document.bytes),
                }),
            });
        }

        let body = GenerateContentRequest {
            contents: vec![Content { parts }],
            system_instruction: request.system.map(|system| Content {
                parts: vec![Part {
                    text: Some(system.to_string()),
                    inline_data: None,
                }],
            }),
            generation_config: GenerationConfig {
                temperature: 0.7,
                response_mime_type: request.json.then_some("application/json"),
            },
        };

        let url = self.endpoint(model, "generateContent", credential)?;
        let response: GenerateContentResponse = self.post(url, &body).await?;

        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ProviderError::Other("empty response from model".to_string()));
        }
        Ok(text)
    }

    async fn embed(
        &self,
        text: &str,
        model: &str,
        credential: &str,
    ) -> Result<Vec<f32>, ProviderError> {
        let body = EmbedContentRequest {
            content: EmbedContent {
                parts: [EmbedPart { text }],
            },
        };
        let url = self.endpoint(model, "embedContent", credential)?;
        let response: EmbedContentResponse = self.post(url, &body).await?;
        Ok(response.embedding.values)
    }
}
