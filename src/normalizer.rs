//! Turns loosely shaped question records into canonical [`Question`]s.
//!
//! AI output and hand-written quiz files disagree on field names, option
//! counts and how the answer is expressed. Normalization never fails: every
//! missing or unusable field degrades to a default.

use log::warn;
use serde_json::Value;

use crate::model::types::{OPTION_COUNT, Question};

const TEXT_KEYS: &[&str] = &["question", "questionText", "question_text", "text"];
const INDEX_KEYS: &[&str] = &["correct_index", "correctIndex"];
const ANSWER_KEYS: &[&str] = &["correctAnswer", "correct_answer", "answer"];
const EXPLANATION_KEYS: &[&str] = &["explanation", "answer_explanation", "answerExplanation"];

pub fn normalize(raw: &Value) -> Question {
    let text = first_string(raw, TEXT_KEYS)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled question".to_string());
    let options = normalize_options(raw.get("options"));
    let correct_index = resolve_correct_index(raw, &options);
    let explanation = first_string(raw, EXPLANATION_KEYS).unwrap_or_default();

    Question {
        text,
        options,
        correct_index,
        explanation,
    }
}

pub fn normalize_all(raw: &[Value]) -> Vec<Question> {
    raw.iter().map(normalize).collect()
}

fn first_string(raw: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find_map(value_as_text)
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn placeholder(index: usize) -> String {
    format!("Option {}", (b'A' + index as u8) as char)
}

fn normalize_options(raw: Option<&Value>) -> Vec<String> {
    let mut options: Vec<String> = match raw {
        Some(Value::Array(items)) => items
            .iter()
            .take(OPTION_COUNT)
            .map(|item| value_as_text(item).unwrap_or_default())
            .collect(),
        // Some models return {"A": "...", "B": "..."} instead of an array
        Some(Value::Object(map)) => map
            .values()
            .take(OPTION_COUNT)
            .map(|item| value_as_text(item).unwrap_or_default())
            .collect(),
        _ => Vec::new(),
    };

    for (i, option) in options.iter_mut().enumerate() {
        if option.is_empty() {
            *option = placeholder(i);
        }
    }
    while options.len() < OPTION_COUNT {
        options.push(placeholder(options.len()));
    }
    options
}

fn numeric_index(value: &Value) -> Option<usize> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
        .and_then(|n| usize::try_from(n).ok())
        .filter(|n| *n < OPTION_COUNT)
}

fn resolve_correct_index(raw: &Value, options: &[String]) -> usize {
    // Numeric index, either field
    if let Some(index) = INDEX_KEYS
        .iter()
        .chain(ANSWER_KEYS)
        .filter_map(|key| raw.get(*key))
        .find_map(numeric_index)
    {
        return index;
    }

    let Some(answer) = first_string(raw, ANSWER_KEYS).filter(|a| !a.is_empty()) else {
        warn!("Question has no usable answer, defaulting to the first option");
        return 0;
    };

    if let Some(index) = options.iter().position(|o| o.trim() == answer) {
        return index;
    }

    if let Some(letter) = answer_letter(&answer) {
        let index = (letter as u8 - b'A') as usize;
        if index < OPTION_COUNT {
            return index;
        }
        warn!("Answer letter {letter} is out of range, defaulting to the first option");
        return 0;
    }

    let needle = answer.to_lowercase();
    if let Some(index) = options.iter().position(|o| {
        let option = o.trim().to_lowercase();
        option.contains(&needle) || needle.contains(&option)
    }) {
        return index;
    }

    warn!("Could not match answer {answer:?} to any option, defaulting to the first option");
    0
}

/// The letter of "A" / "b" / "C)" / "(d)" style answers, uppercased.
fn answer_letter(answer: &str) -> Option<char> {
    let letter = answer
        .trim_matches(|c: char| c == '(' || c == ')' || c == '.' || c.is_whitespace());
    let mut chars = letter.chars();
    let (Some(c), None) = (chars.next(), chars.next()) else {
        return None;
    };
    c.is_ascii_alphabetic().then(|| c.to_ascii_uppercase())
}
