use anyhow::Result;
use async_trait::async_trait;

use crate::model::types::PollId;

/// Outbound side of the messaging platform. Sessions emit every side effect
/// through this.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a single-choice poll and returns the id votes will reference.
    async fn send_poll(&self, chat_id: &str, question: &str, options: &[String]) -> Result<PollId>;

    /// Sends a text message. `mentions` lists voter ids to notify.
    async fn send_text(&self, chat_id: &str, text: &str, mentions: &[String]) -> Result<()>;
}

/// Turns an uploaded document into plain text. Best effort: returns an empty
/// string rather than failing.
pub trait DocumentExtractor: Send + Sync {
    fn extract_text(&self, bytes: &[u8]) -> String;
}

/// Accepts UTF-8 text documents (txt, md, csv, json). Binary formats come
/// back empty and are sent to the provider inline instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl DocumentExtractor for PlainTextExtractor {
    fn extract_text(&self, bytes: &[u8]) -> String {
        match std::str::from_utf8(bytes) {
            Ok(text) if !text.contains('\0') => text.trim().to_string(),
            _ => String::new(),
        }
    }
}

#[cfg(feature = "test-support")]
pub use recording::{Outbound, RecordingTransport};

#[cfg(feature = "test-support")]
mod recording {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;

    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use tokio::sync::broadcast;

    use super::Transport;
    use crate::model::types::PollId;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Outbound {
        Poll {
            chat_id: String,
            poll_id: PollId,
            question: String,
            options: Vec<String>,
        },
        Text {
            chat_id: String,
            text: String,
            mentions: Vec<String>,
        },
    }

    /// Keeps every outbound message and hands out sequential poll ids
    /// (`poll-1`, `poll-2`, …).
    pub struct RecordingTransport {
        sent: Mutex<Vec<Outbound>>,
        next_poll: AtomicUsize,
        fail_polls: AtomicBool,
        text_delay_ms: AtomicU64,
        events: broadcast::Sender<Outbound>,
    }

    impl Default for RecordingTransport {
        fn default() -> Self {
            let (events, _) = broadcast::channel(256);
            Self {
                sent: Mutex::new(Vec::new()),
                next_poll: AtomicUsize::new(1),
                fail_polls: AtomicBool::new(false),
                text_delay_ms: AtomicU64::new(0),
                events,
            }
        }
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn sent(&self) -> Vec<Outbound> {
            self.sent.lock().unwrap().clone()
        }

        pub fn polls(&self) -> Vec<Outbound> {
            self.sent()
                .into_iter()
                .filter(|m| matches!(m, Outbound::Poll { .. }))
                .collect()
        }

        pub fn texts(&self) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter_map(|m| match m {
                    Outbound::Text { text, .. } => Some(text),
                    Outbound::Poll { .. } => None,
                })
                .collect()
        }

        /// Makes every following `send_poll` fail.
        pub fn fail_polls(&self, fail: bool) {
            self.fail_polls.store(fail, Ordering::SeqCst);
        }

        /// Makes every following `send_text` take `delay` before it lands.
        pub fn delay_texts(&self, delay: Duration) {
            let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            self.text_delay_ms.store(millis, Ordering::SeqCst);
        }

        pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
            self.events.subscribe()
        }

        fn record(&self, msg: Outbound) {
            self.sent.lock().unwrap().push(msg.clone());
            let _ = self.events.send(msg);
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send_poll(
            &self,
            chat_id: &str,
            question: &str,
            options: &[String],
        ) -> Result<PollId> {
            if self.fail_polls.load(Ordering::SeqCst) {
                bail!("poll sending disabled");
            }
            let poll_id = format!("poll-{}", self.next_poll.fetch_add(1, Ordering::SeqCst));
            self.record(Outbound::Poll {
                chat_id: chat_id.to_string(),
                poll_id: poll_id.clone(),
                question: question.to_string(),
                options: options.to_vec(),
            });
            Ok(poll_id)
        }

        async fn send_text(&self, chat_id: &str, text: &str, mentions: &[String]) -> Result<()> {
            let delay = self.text_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            self.record(Outbound::Text {
                chat_id: chat_id.to_string(),
                text: text.to_string(),
                mentions: mentions.to_vec(),
            });
            Ok(())
        }
    }
}
