use serde::{Deserialize, Serialize};

pub type ChatId = String;
pub type VoterId = String;
pub type PollId = String;

pub const OPTION_COUNT: usize = 4;

// === Question ===
// Canonical form: exactly four options and a correct index that always
// points at one of them. Anything looser goes through the normalizer first.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub text: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    #[serde(default)]
    pub explanation: String,
}

impl Question {
    pub fn correct_option(&self) -> &str {
        self.options
            .get(self.correct_index)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

// === Session Types ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Active,
    Stopped,
    Finished,
}

/// Snapshot of the question behind an open poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRecord {
    pub chat_id: ChatId,
    pub question_index: usize,
    pub correct_index: usize,
    pub options: Vec<String>,
}

/// A vote event as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub poll_id: PollId,
    pub voter_id: VoterId,
    pub selected: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Correct,
    Incorrect,
    AlreadyCredited,
    Stale,
    UnknownPoll,
    Empty,
}

// === Scoreboard ===

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    pub voter_id: VoterId,
    pub score: u32,
    /// Sequence number of the credit that brought the voter to `score`.
    /// Earlier wins ties.
    #[serde(skip)]
    pub reached_at: u64,
}

// === Generation Settings ===

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

/// Source document handed over by the transport.
#[derive(Debug, Clone)]
pub struct Document {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub topic: String,
    pub quantity: usize,
    pub difficulty: Difficulty,
}
