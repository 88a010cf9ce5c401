use std::sync::Arc;

use pollquiz::error::{CallError, GenerationError, ProviderError};
use pollquiz::model::types::{Difficulty, Document, GenerationSettings};
use pollquiz::provider::scripted::ScriptedProvider;
use pollquiz::source::{QuestionSource, extract_json_object, parse_questions};
use pollquiz::transport::PlainTextExtractor;

use crate::{MODELS, caller};

const TWO_QUIZZES: &str = r#"{
  "quizzes": [
    { "question": "Capital of India?", "options": ["Mumbai", "Delhi", "Chennai", "Kolkata"], "correctAnswer": "Delhi", "explanation": "Seat of government." },
    { "question": "2+2?", "options": ["3", "4", "5", "6"], "correctAnswer": "B" }
  ]
}"#;

fn settings(quantity: usize) -> GenerationSettings {
    GenerationSettings {
        topic: "Basics".to_string(),
        quantity,
        difficulty: Difficulty::Easy,
    }
}

fn source(provider: Arc<ScriptedProvider>) -> QuestionSource {
    QuestionSource::new(caller(&MODELS), provider, Arc::new(PlainTextExtractor))
}

fn text_document(text: &str) -> Document {
    Document {
        bytes: text.as_bytes().to_vec(),
        mime_type: "text/plain".to_string(),
    }
}

#[test]
fn json_is_found_inside_prose_and_fences() {
    let wrapped = format!("Sure! Here you go:\n```json\n{TWO_QUIZZES}\n```\nEnjoy {{the quiz}}");
    assert_eq!(extract_json_object(&wrapped), Some(TWO_QUIZZES));
}

#[test]
fn braces_inside_strings_do_not_end_the_object() {
    let text = r#"noise {"a": "close } early", "b": "escaped \" quote {"} trailing"#;
    assert_eq!(
        extract_json_object(text),
        Some(r#"{"a": "close } early", "b": "escaped \" quote {"}"#)
    );
    assert_eq!(extract_json_object("no json here"), None);
}

#[test]
fn parsed_questions_are_normalized() {
    let questions = parse_questions(TWO_QUIZZES).unwrap();
    assert_eq!(questions.len(), 2);
    assert_eq!(questions[0].correct_index, 1);
    assert_eq!(questions[0].explanation, "Seat of government.");
    assert_eq!(questions[1].correct_option(), "4");
}

#[test]
fn a_questions_key_is_accepted_too() {
    let questions = parse_questions(r#"{"questions": [{"question": "Only one"}]}"#).unwrap();
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0].options.len(), 4);
}

#[test]
fn malformed_responses_map_to_distinct_errors() {
    assert!(matches!(
        parse_questions("I could not do that."),
        Err(GenerationError::NoJsonFound)
    ));
    assert!(matches!(
        parse_questions(r#"{"quizzes": []}"#),
        Err(GenerationError::EmptyResult)
    ));
    assert!(matches!(
        parse_questions(r#"{"something": "else"}"#),
        Err(GenerationError::EmptyResult)
    ));
    assert!(matches!(
        parse_questions(r#"{"quizzes": [1, 2,]}"#),
        Err(GenerationError::InvalidJson(_))
    ));
}

#[tokio::test]
async fn generation_uses_document_text_and_respects_quantity() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.push(MODELS[0], Ok(TWO_QUIZZES.to_string()));

    let generated = source(provider.clone())
        .generate(&text_document("India's capital is Delhi."), &settings(1))
        .await
        .unwrap();

    assert_eq!(generated.questions.len(), 1);
    assert_eq!(generated.document_text, "India's capital is Delhi.");
    let calls = provider.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].prompt.contains("India's capital is Delhi."));
    assert!(calls[0].prompt.contains("\"quizzes\""));
    assert!(calls[0].prompt.contains("1 easy"));
    assert!(!calls[0].had_document);
}

#[tokio::test]
async fn binary_documents_are_sent_inline() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.push(MODELS[0], Ok(TWO_QUIZZES.to_string()));
    let pdf = Document {
        bytes: vec![0x25, 0x50, 0x44, 0x46, 0x00, 0xff],
        mime_type: "application/pdf".to_string(),
    };

    let generated = source(provider.clone())
        .generate(&pdf, &settings(5))
        .await
        .unwrap();

    assert_eq!(generated.questions.len(), 2);
    assert!(generated.document_text.is_empty());
    assert!(provider.calls()[0].had_document);
}

#[tokio::test]
async fn generation_falls_back_to_the_next_model() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.push(MODELS[0], Err(ProviderError::NotFound("retired".into())));
    provider.push(MODELS[1], Ok(TWO_QUIZZES.to_string()));

    let generated = source(provider.clone())
        .generate(&text_document("notes"), &settings(2))
        .await
        .unwrap();

    assert_eq!(generated.questions.len(), 2);
    assert_eq!(provider.calls_to(MODELS[0]), 1);
    assert_eq!(provider.calls_to(MODELS[1]), 1);
}

#[tokio::test]
async fn exhausted_providers_surface_as_generation_error() {
    let provider = Arc::new(ScriptedProvider::new());

    let result = source(provider)
        .generate(&text_document("notes"), &settings(2))
        .await;

    assert!(matches!(
        result,
        Err(GenerationError::Call(CallError::AllProvidersExhausted { .. }))
    ));
}
