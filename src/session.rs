//! One quiz running in one chat.
//!
//! [`QuizSession`] holds the state and the transitions; [`run`] drives it as
//! a task that owns the session outright. Votes arrive over a channel and
//! the question timer is a `select!` arm, so opening, voting and closing are
//! serialized without a lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::error::QuizError;
use crate::model::types::{
    ChatId, PollId, PollRecord, Question, ScoreEntry, SessionStatus, Vote, VoteOutcome, VoterId,
};
use crate::timer::{CancelListener, question_window};
use crate::transport::Transport;

pub const DEFAULT_PAUSE: Duration = Duration::from_secs(2);
pub const SCOREBOARD_SIZE: usize = 10;
pub const MAX_MESSAGE_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub question_duration: Duration,
    /// Gap between closing one question and opening the next.
    pub pause: Duration,
}

impl SessionSettings {
    pub fn from_seconds(timer_seconds: u32) -> Self {
        Self {
            question_duration: Duration::from_secs(timer_seconds.into()),
            pause: DEFAULT_PAUSE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The given question is up next.
    Next(usize),
    Finished,
    /// Close was for a question that is not the current one, or the session is over.
    Ignored,
}

pub struct QuizSession {
    chat_id: ChatId,
    topic: String,
    questions: Vec<Question>,
    current_index: usize,
    settings: SessionSettings,
    scores: HashMap<VoterId, ScoreEntry>,
    credited_votes: HashSet<(usize, VoterId)>,
    active_poll: Option<PollId>,
    polls: HashMap<PollId, PollRecord>,
    status: SessionStatus,
    credit_seq: u64,
    transport: Arc<dyn Transport>,
}

impl QuizSession {
    pub fn new(
        chat_id: impl Into<ChatId>,
        questions: Vec<Question>,
        settings: SessionSettings,
        topic: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, QuizError> {
        if questions.is_empty() {
            return Err(QuizError::NoQuestions);
        }
        Ok(Self {
            chat_id: chat_id.into(),
            topic: topic.into(),
            questions,
            current_index: 0,
            settings,
            scores: HashMap::new(),
            credited_votes: HashSet::new(),
            active_poll: None,
            polls: HashMap::new(),
            status: SessionStatus::Active,
            credit_seq: 0,
            transport,
        })
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn active_poll(&self) -> Option<&str> {
        self.active_poll.as_deref()
    }

    pub fn score_of(&self, voter_id: &str) -> u32 {
        self.scores.get(voter_id).map(|e| e.score).unwrap_or(0)
    }

    /// Highest score first; among equal scores, whoever got there first.
    pub fn scoreboard(&self) -> Vec<ScoreEntry> {
        let mut entries: Vec<ScoreEntry> = self.scores.values().cloned().collect();
        entries.sort_by(|a, b| b.score.cmp(&a.score).then(a.reached_at.cmp(&b.reached_at)));
        entries
    }

    async fn say(&self, text: &str, mentions: &[String]) {
        if let Err(e) = self.transport.send_text(&self.chat_id, text, mentions).await {
            warn!("Failed to send message to chat {}: {e:#}", self.chat_id);
        }
    }

    pub async fn announce(&self) {
        let text = format!(
            "🎯 Quiz started: {}\n{} questions, {} seconds each. Vote in the polls!",
            self.topic,
            self.questions.len(),
            self.settings.question_duration.as_secs()
        );
        self.say(&text, &[]).await;
    }

    /// Sends the poll for `index` and returns how long it should stay open.
    /// `None` means the poll could not be sent and the question is skipped.
    pub async fn open_question(&mut self, index: usize) -> Option<Duration> {
        if self.status != SessionStatus::Active || index != self.current_index {
            warn!(
                "Refusing to open question {index} in chat {} (current {}, {:?})",
                self.chat_id, self.current_index, self.status
            );
            return None;
        }
        let question = &self.questions[index];
        let label = format!("Q{}/{}: {}", index + 1, self.questions.len(), question.text);

        let started = Instant::now();
        let poll_id = match self
            .transport
            .send_poll(&self.chat_id, &label, &question.options)
            .await
        {
            Ok(poll_id) => poll_id,
            Err(e) => {
                warn!(
                    "Failed to send poll for question {} in chat {}, skipping it: {e:#}",
                    index + 1,
                    self.chat_id
                );
                return None;
            }
        };
        let window = question_window(self.settings.question_duration, started.elapsed());

        self.polls.insert(
            poll_id.clone(),
            PollRecord {
                chat_id: self.chat_id.clone(),
                question_index: index,
                correct_index: question.correct_index,
                options: question.options.clone(),
            },
        );
        info!(
            "Opened question {} of {} in chat {} as poll {poll_id} for {window:?}",
            index + 1,
            self.questions.len(),
            self.chat_id
        );
        self.active_poll = Some(poll_id);
        Some(window)
    }

    /// Grades a vote. A voter is graded once per question: their first vote
    /// on a poll counts and everything after it is ignored.
    pub fn record_vote(&mut self, vote: &Vote) -> VoteOutcome {
        if vote.selected.trim().is_empty() {
            return VoteOutcome::Empty;
        }
        let Some(record) = self.polls.get(&vote.poll_id) else {
            debug!("Vote for unknown poll {} in chat {}", vote.poll_id, self.chat_id);
            return VoteOutcome::UnknownPoll;
        };
        if self.status != SessionStatus::Active || record.question_index != self.current_index {
            return VoteOutcome::Stale;
        }
        if !self
            .credited_votes
            .insert((record.question_index, vote.voter_id.clone()))
        {
            return VoteOutcome::AlreadyCredited;
        }

        let correct = record
            .options
            .get(record.correct_index)
            .map(String::as_str)
            .unwrap_or_default();
        if !answers_match(&vote.selected, correct) {
            debug!("{} answered question {} wrong", vote.voter_id, record.question_index + 1);
            return VoteOutcome::Incorrect;
        }

        self.credit_seq += 1;
        let entry = self
            .scores
            .entry(vote.voter_id.clone())
            .or_insert_with(|| ScoreEntry {
                voter_id: vote.voter_id.clone(),
                score: 0,
                reached_at: 0,
            });
        entry.score += 1;
        entry.reached_at = self.credit_seq;
        debug!(
            "{} answered question {} right, now at {}",
            vote.voter_id,
            record.question_index + 1,
            entry.score
        );
        VoteOutcome::Correct
    }

    pub async fn close_question(&mut self, index: usize) -> Progress {
        if self.status != SessionStatus::Active || index != self.current_index {
            return Progress::Ignored;
        }
        if let Some(poll_id) = self.active_poll.take() {
            self.polls.remove(&poll_id);
        }
        info!("Closed question {} in chat {}", index + 1, self.chat_id);

        self.current_index += 1;
        if self.current_index < self.questions.len() {
            return Progress::Next(self.current_index);
        }

        self.status = SessionStatus::Finished;
        self.publish_results().await;
        self.release();
        info!("Quiz finished in chat {}", self.chat_id);
        Progress::Finished
    }

    /// Returns `false` if the session had already ended.
    pub fn stop(&mut self) -> bool {
        if self.status != SessionStatus::Active {
            return false;
        }
        self.status = SessionStatus::Stopped;
        self.release();
        info!("Quiz stopped in chat {}", self.chat_id);
        true
    }

    fn release(&mut self) {
        self.polls.clear();
        self.active_poll = None;
    }

    async fn publish_results(&self) {
        let total = self.questions.len();
        let top: Vec<ScoreEntry> = self.scoreboard().into_iter().take(SCOREBOARD_SIZE).collect();

        let mut board = format!("🏁 Quiz finished: {}\n\n🏆 Scoreboard", self.topic);
        if top.is_empty() {
            board.push_str("\nNobody answered correctly this time.");
        }
        for (rank, entry) in top.iter().enumerate() {
            board.push_str(&format!(
                "\n{}. @{}: {}/{total}",
                rank + 1,
                entry.voter_id,
                entry.score
            ));
        }
        let mentions: Vec<String> = top.into_iter().map(|e| e.voter_id).collect();
        self.say(&board, &mentions).await;

        for chunk in chunk_messages(&self.answer_key(), MAX_MESSAGE_CHARS) {
            self.say(&chunk, &[]).await;
        }
    }

    fn answer_key(&self) -> Vec<String> {
        let mut entries = vec!["📖 Answer key".to_string()];
        entries.extend(self.questions.iter().enumerate().map(|(i, q)| {
            let mut entry = format!("Q{}. {}\n✅ {}", i + 1, q.text, q.correct_option());
            if !q.explanation.is_empty() {
                entry.push_str(&format!("\n💡 {}", q.explanation));
            }
            entry
        }));
        entries
    }
}

/// Case-insensitive, trimmed comparison. Also accepts either side being a
/// substring of the other when the contained side is longer than two
/// characters, since transports truncate long option labels.
pub fn answers_match(selected: &str, correct: &str) -> bool {
    let selected = selected.trim().to_lowercase();
    let correct = correct.trim().to_lowercase();
    if selected == correct {
        return true;
    }
    (selected.chars().count() > 2 && correct.contains(&selected))
        || (correct.chars().count() > 2 && selected.contains(&correct))
}

/// Packs entries into messages of at most `max_chars` characters, splitting
/// only between entries unless one entry alone is too long.
pub fn chunk_messages(entries: &[String], max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for entry in entries {
        for piece in split_long(entry, max_chars) {
            let piece_len = piece.chars().count();
            if !current.is_empty() && current_len + 2 + piece_len > max_chars {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if !current.is_empty() {
                current.push_str("\n\n");
                current_len += 2;
            }
            current.push_str(&piece);
            current_len += piece_len;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn split_long(entry: &str, max_chars: usize) -> Vec<String> {
    if max_chars == 0 || entry.chars().count() <= max_chars {
        return vec![entry.to_string()];
    }
    entry
        .chars()
        .collect::<Vec<_>>()
        .chunks(max_chars)
        .map(|piece| piece.iter().collect())
        .collect()
}

/// Drives a session from its first question to the end, or until cancelled.
pub async fn run(
    mut session: QuizSession,
    mut votes: mpsc::UnboundedReceiver<Vote>,
    mut cancel: CancelListener,
) -> SessionStatus {
    session.announce().await;

    loop {
        let index = session.current_index();
        if cancel.is_cancelled() {
            session.stop();
            break;
        }

        if let Some(window) = session.open_question(index).await {
            let deadline = tokio::time::sleep(window);
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        session.stop();
                        return session.status();
                    }
                    _ = &mut deadline => break,
                    Some(vote) = votes.recv() => {
                        let outcome = session.record_vote(&vote);
                        debug!("Vote from {} on {}: {outcome:?}", vote.voter_id, vote.poll_id);
                    }
                }
            }
        }

        if index + 1 >= session.question_count() {
            // The registry reads a closed vote channel as "ended", so the
            // chat frees up while results are still being published
            votes.close();
        }
        match session.close_question(index).await {
            Progress::Next(_) => {
                if !cancel.sleep(session.settings.pause).await {
                    session.stop();
                    break;
                }
            }
            Progress::Finished | Progress::Ignored => break,
        }
    }

    session.status()
}
