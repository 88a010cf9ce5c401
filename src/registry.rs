use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{error, info, warn};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::error::QuizError;
use crate::model::types::{ChatId, Question, Vote};
use crate::session::{self, QuizSession, SessionSettings};
use crate::timer::CancelHandle;
use crate::transport::Transport;

struct SessionHandle {
    votes: mpsc::UnboundedSender<Vote>,
    cancel: CancelHandle,
    task: JoinHandle<()>,
}

enum Slot {
    /// Claimed while questions are being generated.
    Preparing,
    Running(SessionHandle),
}

struct Entry {
    id: u64,
    slot: Slot,
}

impl Entry {
    /// A session that stopped taking votes is only publishing or exiting.
    fn is_live(&self) -> bool {
        match &self.slot {
            Slot::Preparing => true,
            Slot::Running(handle) => !handle.votes.is_closed(),
        }
    }
}

/// Proof that a chat was claimed by [`SessionRegistry::reserve`].
#[derive(Debug)]
pub struct Reservation {
    chat_id: ChatId,
    id: u64,
}

impl Reservation {
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }
}

/// Maps each chat to at most one quiz session.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ChatId, Entry>>,
    next_id: AtomicU64,
    transport: Arc<dyn Transport>,
}

impl SessionRegistry {
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            transport,
        })
    }

    pub async fn is_active(&self, chat_id: &str) -> bool {
        self.sessions
            .lock()
            .await
            .get(chat_id)
            .is_some_and(Entry::is_live)
    }

    pub async fn active_count(&self) -> usize {
        self.sessions
            .lock()
            .await
            .values()
            .filter(|e| e.is_live())
            .count()
    }

    /// Claims `chat_id` so nothing else can start there while questions are
    /// prepared. Release it with [`Self::release`] if preparing fails.
    pub async fn reserve(&self, chat_id: &str) -> Result<Reservation, QuizError> {
        let mut sessions = self.sessions.lock().await;
        if sessions.get(chat_id).is_some_and(Entry::is_live) {
            return Err(QuizError::AlreadyActive);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        sessions.insert(
            chat_id.to_string(),
            Entry {
                id,
                slot: Slot::Preparing,
            },
        );
        Ok(Reservation {
            chat_id: chat_id.to_string(),
            id,
        })
    }

    pub async fn release(&self, reservation: Reservation) {
        let mut sessions = self.sessions.lock().await;
        if let Some(entry) = sessions.get(&reservation.chat_id)
            && entry.id == reservation.id
            && matches!(entry.slot, Slot::Preparing)
        {
            sessions.remove(&reservation.chat_id);
        }
    }

    pub async fn start(
        self: &Arc<Self>,
        chat_id: &str,
        questions: Vec<Question>,
        settings: SessionSettings,
        topic: &str,
    ) -> Result<(), QuizError> {
        let reservation = self.reserve(chat_id).await?;
        self.launch(reservation, questions, settings, topic).await
    }

    /// Starts the session on a reserved chat. Fails with `NotFound` if the
    /// reservation was stopped in the meantime.
    pub async fn launch(
        self: &Arc<Self>,
        reservation: Reservation,
        questions: Vec<Question>,
        settings: SessionSettings,
        topic: &str,
    ) -> Result<(), QuizError> {
        let Reservation { chat_id, id } = reservation;
        let mut sessions = self.sessions.lock().await;

        match sessions.get(&chat_id) {
            Some(entry) if entry.id == id && matches!(entry.slot, Slot::Preparing) => {}
            Some(entry) if entry.id == id => return Err(QuizError::AlreadyActive),
            _ => {
                info!("Quiz for chat {chat_id} was stopped before it started");
                return Err(QuizError::NotFound);
            }
        }

        let session = match QuizSession::new(
            chat_id.clone(),
            questions,
            settings,
            topic,
            self.transport.clone(),
        ) {
            Ok(session) => session,
            Err(e) => {
                sessions.remove(&chat_id);
                return Err(e);
            }
        };

        let (votes_tx, votes_rx) = mpsc::unbounded_channel();
        let (cancel, listener) = CancelHandle::new();
        let run = tokio::spawn(session::run(session, votes_rx, listener));

        let registry = Arc::clone(self);
        let chat = chat_id.clone();
        let task = tokio::spawn(async move {
            match run.await {
                Ok(status) => info!("Session for chat {chat} ended: {status:?}"),
                Err(e) if e.is_panic() => error!("Session for chat {chat} panicked: {e}"),
                Err(e) => warn!("Session for chat {chat} aborted: {e}"),
            }
            registry.forget(&chat, id).await;
        });

        info!("Quiz started in chat {chat_id}");
        sessions.insert(
            chat_id,
            Entry {
                id,
                slot: Slot::Running(SessionHandle {
                    votes: votes_tx,
                    cancel,
                    task,
                }),
            },
        );
        Ok(())
    }

    async fn forget(&self, chat_id: &str, id: u64) {
        let mut sessions = self.sessions.lock().await;
        if sessions.get(chat_id).is_some_and(|e| e.id == id) {
            sessions.remove(chat_id);
        }
    }

    /// Hands a vote to the chat's session. Votes for chats without a running
    /// quiz are dropped.
    pub async fn route_vote(&self, chat_id: &str, vote: Vote) -> bool {
        let sessions = self.sessions.lock().await;
        match sessions.get(chat_id).map(|e| &e.slot) {
            Some(Slot::Running(handle)) => handle.votes.send(vote).is_ok(),
            _ => false,
        }
    }

    /// Stops the chat's quiz. Once this returns the session task has exited,
    /// so no further poll is sent for it.
    pub async fn stop(&self, chat_id: &str) -> Result<(), QuizError> {
        let entry = self.sessions.lock().await.remove(chat_id);
        // A finishing session is left to publish its results
        let entry = entry.filter(Entry::is_live);
        match entry.map(|e| e.slot) {
            Some(Slot::Running(handle)) => {
                handle.cancel.cancel();
                if let Err(e) = handle.task.await {
                    error!("Session task for chat {chat_id} failed while stopping: {e}");
                }
                Ok(())
            }
            Some(Slot::Preparing) => {
                info!("Cancelled quiz preparation in chat {chat_id}");
                Ok(())
            }
            None => Err(QuizError::NotFound),
        }
    }
}
