use pollquiz::normalizer::{normalize, normalize_all};
use serde_json::json;

#[test]
fn canonical_record_passes_through() {
    let q = normalize(&json!({
        "question": "Capital of India?",
        "options": ["Mumbai", "Delhi", "Chennai", "Kolkata"],
        "correct_index": 1,
        "explanation": "Delhi is the capital."
    }));
    assert_eq!(q.text, "Capital of India?");
    assert_eq!(q.options, vec!["Mumbai", "Delhi", "Chennai", "Kolkata"]);
    assert_eq!(q.correct_index, 1);
    assert_eq!(q.explanation, "Delhi is the capital.");
}

#[test]
fn missing_fields_still_produce_a_valid_question() {
    for raw in [
        json!({}),
        json!({ "question": "No options" }),
        json!({ "question": "No answer", "options": ["a", "b"] }),
        json!({ "options": "not an array", "correctAnswer": null }),
    ] {
        let q = normalize(&raw);
        assert_eq!(q.options.len(), 4, "options for {raw}");
        assert!(q.correct_index < 4, "index for {raw}");
        assert!(q.options.iter().all(|o| !o.is_empty()));
    }
}

#[test]
fn short_option_lists_are_padded_with_placeholders() {
    let q = normalize(&json!({ "question": "Pick", "options": ["Yes", "", "No"] }));
    assert_eq!(q.options, vec!["Yes", "Option B", "No", "Option D"]);
    assert_eq!(q.text, "Pick");
}

#[test]
fn long_option_lists_are_truncated() {
    let q = normalize(&json!({ "question": "Pick", "options": ["1", "2", "3", "4", "5", "6"] }));
    assert_eq!(q.options, vec!["1", "2", "3", "4"]);
}

#[test]
fn answer_text_resolves_to_its_option() {
    let q = normalize(&json!({
        "questionText": "Largest planet?",
        "options": ["Mars", "Jupiter", "Venus", "Earth"],
        "correctAnswer": "Jupiter"
    }));
    assert_eq!(q.text, "Largest planet?");
    assert_eq!(q.correct_index, 1);
}

#[test]
fn letter_answers_resolve_by_position() {
    let options = json!(["red", "green", "blue", "yellow"]);
    for (answer, expected) in [("C", 2), ("b", 1), ("(d)", 3), ("A.", 0)] {
        let q = normalize(&json!({
            "question": "Colour?",
            "options": options,
            "correctAnswer": answer
        }));
        assert_eq!(q.correct_index, expected, "answer {answer}");
    }
}

#[test]
fn numeric_answers_are_indices() {
    let q = normalize(&json!({
        "question": "2+2?",
        "options": ["3", "4", "5", "6"],
        "correctAnswer": 1
    }));
    assert_eq!(q.correct_index, 1);
}

#[test]
fn out_of_range_index_falls_back_to_answer_text_or_zero() {
    let q = normalize(&json!({
        "question": "Out of range",
        "options": ["a", "b", "c", "d"],
        "correct_index": 9
    }));
    assert_eq!(q.correct_index, 0);
}

#[test]
fn partial_answer_text_matches_by_containment() {
    let q = normalize(&json!({
        "question": "Who wrote Hamlet?",
        "options": ["Marlowe", "William Shakespeare", "Jonson", "Kyd"],
        "answer": "shakespeare"
    }));
    assert_eq!(q.correct_index, 1);
}

#[test]
fn unmatched_answer_defaults_to_first_option() {
    let q = normalize(&json!({
        "question": "Nothing matches",
        "options": ["alpha", "beta", "gamma", "delta"],
        "correctAnswer": "omega"
    }));
    assert_eq!(q.correct_index, 0);
}

#[test]
fn letters_past_the_last_option_default_to_first_option() {
    // "E" must not fall through to matching the "e" in "Rome"
    for answer in ["E", "(f)"] {
        let q = normalize(&json!({
            "question": "Capital of Italy?",
            "options": ["Paris", "Rome", "Oslo", "Bern"],
            "correctAnswer": answer
        }));
        assert_eq!(q.correct_index, 0, "answer {answer}");
    }
}

#[test]
fn options_given_as_an_object_are_accepted() {
    let q = normalize(&json!({
        "question": "Object options",
        "options": { "A": "one", "B": "two", "C": "three", "D": "four" },
        "correctAnswer": "three",
        "answer_explanation": "Counting."
    }));
    assert_eq!(q.options.len(), 4);
    assert_eq!(q.correct_option(), "three");
    assert_eq!(q.explanation, "Counting.");
}

#[test]
fn normalize_all_keeps_order() {
    let qs = normalize_all(&[json!({ "question": "first" }), json!({ "question": "second" })]);
    let texts: Vec<&str> = qs.iter().map(|q| q.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second"]);
    assert_eq!(normalize(&json!({})).text, "Untitled question");
}
