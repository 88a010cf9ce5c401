use std::sync::Arc;

use log::{info, warn};
use serde_json::Value;

use crate::error::GenerationError;
use crate::model::types::{Document, GenerationSettings, Question};
use crate::normalizer;
use crate::provider::fallback::FallbackCaller;
use crate::provider::{GenerateRequest, Provider};
use crate::transport::DocumentExtractor;

/// Extracted text beyond this is cut before it goes into the prompt.
pub const MAX_DOCUMENT_CHARS: usize = 30_000;
pub const MAX_QUESTIONS: usize = 50;

const SYSTEM_PROMPT: &str = "You write multiple-choice quiz questions from study material. \
Reply with strict JSON only: no prose, no markdown fences.";

/// Questions produced from a document, plus the text they were drawn from.
#[derive(Debug, Clone)]
pub struct Generated {
    pub questions: Vec<Question>,
    pub document_text: String,
}

/// Authored questions, in whatever loose shape they came in.
pub fn from_records(records: &[Value]) -> Vec<Question> {
    normalizer::normalize_all(records)
}

pub struct QuestionSource {
    caller: FallbackCaller,
    provider: Arc<dyn Provider>,
    extractor: Arc<dyn DocumentExtractor>,
}

impl QuestionSource {
    pub fn new(
        caller: FallbackCaller,
        provider: Arc<dyn Provider>,
        extractor: Arc<dyn DocumentExtractor>,
    ) -> Self {
        Self {
            caller,
            provider,
            extractor,
        }
    }

    pub async fn generate(
        &self,
        document: &Document,
        settings: &GenerationSettings,
    ) -> Result<Generated, GenerationError> {
        let quantity = settings.quantity.clamp(1, MAX_QUESTIONS);
        let document_text = self.extractor.extract_text(&document.bytes);

        // Text we could read goes into the prompt; anything else goes inline
        let (prompt, inline) = if document_text.is_empty() {
            (build_prompt(settings, quantity, None), Some(document))
        } else {
            let excerpt = truncate_chars(&document_text, MAX_DOCUMENT_CHARS);
            (build_prompt(settings, quantity, Some(excerpt)), None)
        };
        info!(
            "Generating {quantity} {} questions on {:?} ({} chars of text, inline document: {})",
            settings.difficulty.as_str(),
            settings.topic,
            document_text.len(),
            inline.is_some()
        );

        let request = GenerateRequest {
            system: Some(SYSTEM_PROMPT),
            prompt: &prompt,
            document: inline,
            json: true,
        };
        let provider = &self.provider;
        let response = self
            .caller
            .call(|attempt| async move {
                provider
                    .generate(request, &attempt.model, &attempt.credential)
                    .await
            })
            .await?;

        let mut questions = parse_questions(&response)?;
        questions.truncate(quantity);
        Ok(Generated {
            questions,
            document_text,
        })
    }
}

fn build_prompt(settings: &GenerationSettings, quantity: usize, text: Option<&str>) -> String {
    let material = match text {
        Some(text) => format!("Study material:\n\"\"\"\n{text}\n\"\"\""),
        None => "The study material is the attached document.".to_string(),
    };
    format!(
        r#"Write {quantity} {difficulty} multiple-choice questions about "{topic}".

{material}

Respond with a JSON object in exactly this format:
{{
  "quizzes": [
    {{
      "question": "Question text",
      "options": ["first", "second", "third", "fourth"],
      "correctAnswer": "the exact text of the correct option",
      "explanation": "one or two sentences on why it is correct"
    }}
  ]
}}

Rules:
- exactly 4 options per question, each under 100 characters
- exactly one correct option
- questions must be answerable from the material"#,
        difficulty = settings.difficulty.as_str(),
        topic = settings.topic,
    )
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Parses a model response into canonical questions. Prose and code fences
/// around the JSON are tolerated.
pub fn parse_questions(response: &str) -> Result<Vec<Question>, GenerationError> {
    let json = extract_json_object(response).ok_or(GenerationError::NoJsonFound)?;
    let parsed: Value = serde_json::from_str(json)?;

    let records = ["quizzes", "questions"]
        .iter()
        .find_map(|key| parsed.get(*key).and_then(Value::as_array))
        .cloned()
        .unwrap_or_else(|| {
            warn!("AI response has no quizzes array");
            Vec::new()
        });

    let questions: Vec<Question> = records
        .iter()
        .filter(|record| record.is_object())
        .map(normalizer::normalize)
        .collect();
    if questions.is_empty() {
        return Err(GenerationError::EmptyResult);
    }
    Ok(questions)
}

/// Returns the first balanced `{ ... }` in `text`, skipping braces inside
/// JSON strings. Falls back to first `{` through last `}` if nothing balances.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
