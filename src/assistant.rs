use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::error::CallError;
use crate::model::types::ChatId;
use crate::provider::fallback::FallbackCaller;
use crate::provider::{GenerateRequest, Provider};

pub const PASSAGE_CHARS: usize = 1200;
pub const MAX_PASSAGES: usize = 32;
pub const CONTEXT_PASSAGES: usize = 3;

const SYSTEM_PROMPT: &str = "You are a friendly study assistant inside a group chat. \
Answer briefly and plainly. When study material is provided, prefer it over general knowledge.";

#[derive(Debug, Clone)]
struct Passage {
    text: String,
    embedding: Vec<f32>,
}

/// Answers free-form chat messages, grounded in the last document a chat
/// generated a quiz from.
pub struct Assistant {
    replies: FallbackCaller,
    embeddings: FallbackCaller,
    provider: Arc<dyn Provider>,
    knowledge: Mutex<HashMap<ChatId, Vec<Passage>>>,
}

impl Assistant {
    pub fn new(
        replies: FallbackCaller,
        embeddings: FallbackCaller,
        provider: Arc<dyn Provider>,
    ) -> Self {
        Self {
            replies,
            embeddings,
            provider,
            knowledge: Mutex::new(HashMap::new()),
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CallError> {
        let provider = &self.provider;
        self.embeddings
            .call(|attempt| async move {
                provider
                    .embed(text, &attempt.model, &attempt.credential)
                    .await
            })
            .await
    }

    /// Replaces what the chat knows with passages from `text`. Returns how
    /// many passages were indexed; passages that fail to embed are dropped.
    pub async fn index_document(&self, chat_id: &str, text: &str) -> usize {
        let mut passages = Vec::new();
        for chunk in chunk_text(text, PASSAGE_CHARS).into_iter().take(MAX_PASSAGES) {
            match self.embed(&chunk).await {
                Ok(embedding) => passages.push(Passage {
                    text: chunk,
                    embedding,
                }),
                Err(e) => {
                    warn!("Failed to embed passage for chat {chat_id}: {e}");
                    break;
                }
            }
        }

        let count = passages.len();
        info!("Indexed {count} passages for chat {chat_id}");
        let mut knowledge = self.knowledge.lock().await;
        if passages.is_empty() {
            knowledge.remove(chat_id);
        } else {
            knowledge.insert(chat_id.to_string(), passages);
        }
        count
    }

    pub async fn forget(&self, chat_id: &str) {
        self.knowledge.lock().await.remove(chat_id);
    }

    pub async fn passage_count(&self, chat_id: &str) -> usize {
        self.knowledge
            .lock()
            .await
            .get(chat_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    async fn context_for(&self, chat_id: &str, question: &str) -> Vec<String> {
        if self.passage_count(chat_id).await == 0 {
            return Vec::new();
        }
        let query = match self.embed(question).await {
            Ok(query) => query,
            Err(e) => {
                warn!("Answering without document context in chat {chat_id}: {e}");
                return Vec::new();
            }
        };

        let knowledge = self.knowledge.lock().await;
        let Some(passages) = knowledge.get(chat_id) else {
            return Vec::new();
        };
        let mut ranked: Vec<(f32, &Passage)> = passages
            .iter()
            .map(|p| (cosine(&query, &p.embedding), p))
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
        ranked
            .into_iter()
            .take(CONTEXT_PASSAGES)
            .map(|(score, p)| {
                debug!("Context passage scored {score:.3}");
                p.text.clone()
            })
            .collect()
    }

    pub async fn reply(&self, chat_id: &str, text: &str) -> Result<String, CallError> {
        let context = self.context_for(chat_id, text).await;
        let prompt = if context.is_empty() {
            text.to_string()
        } else {
            format!(
                "Study material:\n{}\n\nQuestion: {text}",
                context.join("\n---\n")
            )
        };

        let request = GenerateRequest {
            system: Some(SYSTEM_PROMPT),
            ..GenerateRequest::text(&prompt)
        };
        let provider = &self.provider;
        let reply = self
            .replies
            .call(|attempt| async move {
                provider
                    .generate(request, &attempt.model, &attempt.credential)
                    .await
            })
            .await?;
        Ok(reply.trim().to_string())
    }
}

/// 0.0 for mismatched lengths or zero vectors.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Splits on paragraph breaks, packing paragraphs into chunks of at most
/// `max_chars`. A paragraph longer than that is cut on character boundaries.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let chars: Vec<char> = paragraph.chars().collect();
        for piece in chars.chunks(max_chars.max(1)) {
            let piece: String = piece.iter().collect();
            let len = current.chars().count();
            if len > 0 && len + 2 + piece.chars().count() > max_chars {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(&piece);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
