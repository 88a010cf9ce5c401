use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::types::Difficulty;

/// Messages a chat member sends to the gateway. The first message on a
/// connection must be `Join`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Join { chat_id: String, member_id: String },

    /// Start a quiz from authored questions. Each entry is normalized, so the
    /// loose shapes AI tools emit are accepted too.
    #[serde(rename_all = "camelCase")]
    StartQuiz {
        questions: Vec<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timer_seconds: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    GenerateQuiz {
        /// Base64 encoded document bytes.
        document: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        topic: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quantity: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        difficulty: Option<Difficulty>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timer_seconds: Option<u32>,
    },

    StopQuiz,

    #[serde(rename_all = "camelCase")]
    Vote { poll_id: String, option: String },

    #[serde(rename_all = "camelCase")]
    Ask { text: String },

    Status,
}
