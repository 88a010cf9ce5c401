use log::{debug, error};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;

use crate::server::Tx;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Joined { chat_id: String, member_id: String },
    #[serde(rename_all = "camelCase")]
    Poll {
        poll_id: String,
        question: String,
        options: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Text {
        text: String,
        #[serde(default)]
        mentions: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    QuizStatus { chat_id: String, active: bool },
    #[serde(rename_all = "camelCase")]
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        ServerMessage::Text {
            text: text.into(),
            mentions: Vec::new(),
        }
    }
}

pub fn send_msg(tx: &Tx, msg: ServerMessage) {
    debug!("Sending server message: {msg:?}");
    let msg = serde_json::to_string(&msg).unwrap_or_else(|e| {
        format!("Catastrophic! Serde error when trying to serialize serverside: {e}")
    });
    tx.send(Message::text(msg.clone())).unwrap_or_else(|e| {
        error!("Sending server message through channel failed: {e}");
        error!("Tried to send message: {msg}");
    })
}
