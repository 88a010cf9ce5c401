//! Entry point for front-ends: one chat command in, one engine call out.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use serde_json::Value;

use crate::assistant::Assistant;
use crate::error::{CallError, QuizError};
use crate::model::types::{Document, GenerationSettings, Vote};
use crate::registry::SessionRegistry;
use crate::session::{DEFAULT_PAUSE, SessionSettings};
use crate::source::{self, QuestionSource};

#[derive(Debug, Clone, Copy)]
pub struct QuizDefaults {
    pub timer_seconds: u32,
    pub pause: Duration,
    pub quantity: usize,
}

impl Default for QuizDefaults {
    fn default() -> Self {
        Self {
            timer_seconds: 30,
            pause: DEFAULT_PAUSE,
            quantity: 10,
        }
    }
}

pub enum QuizRequest {
    /// Questions written by a person, in any shape the normalizer accepts.
    Authored { questions: Vec<Value>, topic: String },
    Generated {
        document: Document,
        settings: GenerationSettings,
    },
}

pub struct QuizEngine {
    registry: Arc<SessionRegistry>,
    source: QuestionSource,
    assistant: Arc<Assistant>,
    defaults: QuizDefaults,
}

impl QuizEngine {
    pub fn new(
        registry: Arc<SessionRegistry>,
        source: QuestionSource,
        assistant: Arc<Assistant>,
        defaults: QuizDefaults,
    ) -> Self {
        Self {
            registry,
            source,
            assistant,
            defaults,
        }
    }

    pub fn defaults(&self) -> QuizDefaults {
        self.defaults
    }

    fn settings(&self, timer_seconds: Option<u32>) -> SessionSettings {
        let mut settings = SessionSettings::from_seconds(
            timer_seconds
                .filter(|s| *s > 0)
                .unwrap_or(self.defaults.timer_seconds),
        );
        settings.pause = self.defaults.pause;
        settings
    }

    pub async fn start_quiz(
        &self,
        chat_id: &str,
        request: QuizRequest,
        timer_seconds: Option<u32>,
    ) -> Result<(), QuizError> {
        let settings = self.settings(timer_seconds);
        match request {
            QuizRequest::Authored { questions, topic } => {
                let questions = source::from_records(&questions);
                self.registry
                    .start(chat_id, questions, settings, &topic)
                    .await
            }
            QuizRequest::Generated { document, settings: generation } => {
                // Hold the chat while generating so a second start is refused
                let reservation = self.registry.reserve(chat_id).await?;
                let generated = match self.source.generate(&document, &generation).await {
                    Ok(generated) => generated,
                    Err(e) => {
                        warn!("Quiz generation failed in chat {chat_id}: {e}");
                        self.registry.release(reservation).await;
                        return Err(e.into());
                    }
                };
                info!(
                    "Generated {} questions for chat {chat_id}",
                    generated.questions.len()
                );
                self.registry
                    .launch(reservation, generated.questions, settings, &generation.topic)
                    .await?;

                if !generated.document_text.is_empty() {
                    let assistant = Arc::clone(&self.assistant);
                    let chat = chat_id.to_string();
                    tokio::spawn(async move {
                        assistant.index_document(&chat, &generated.document_text).await;
                    });
                }
                Ok(())
            }
        }
    }

    pub async fn stop_quiz(&self, chat_id: &str) -> Result<(), QuizError> {
        self.registry.stop(chat_id).await
    }

    pub async fn is_active(&self, chat_id: &str) -> bool {
        self.registry.is_active(chat_id).await
    }

    /// Votes for chats without a running quiz are dropped.
    pub async fn ingest_vote(&self, chat_id: &str, vote: Vote) -> bool {
        self.registry.route_vote(chat_id, vote).await
    }

    pub async fn reply(&self, chat_id: &str, text: &str) -> Result<String, CallError> {
        self.assistant.reply(chat_id, text).await
    }
}
