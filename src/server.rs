use crate::{
    engine::QuizEngine,
    handler::member::join_chat,
    model::{
        client_message::ClientMessage,
        server_message::{ServerMessage, send_msg},
        types::{ChatId, PollId},
    },
    transport::Transport,
};
use anyhow::{Result as AnyResult, bail};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::*;
use rand::Rng;
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{Mutex, mpsc},
};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error, Message, Result},
};

pub type Tx = mpsc::UnboundedSender<Message>;
pub type Rx = mpsc::UnboundedReceiver<Message>;

pub const POLL_ID_LEN: usize = 8;

fn generate_poll_id() -> PollId {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(POLL_ID_LEN)
        .map(char::from)
        .collect()
}

/// Connected members, grouped by chat. Doubles as the engine's transport:
/// everything a session sends is broadcast to the whole chat.
#[derive(Default)]
pub struct ChatHub {
    chats: Mutex<HashMap<ChatId, HashMap<String, Tx>>>,
}

impl ChatHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn join(&self, chat_id: &str, member_id: &str, tx: Tx) {
        let mut chats = self.chats.lock().await;
        let members = chats.entry(chat_id.to_string()).or_default();
        if members.insert(member_id.to_string(), tx).is_some() {
            info!("Member {member_id} reconnected to chat {chat_id}");
        }
    }

    /// Removes the member only while `tx` is still their registered
    /// connection, so an old socket closing can't evict a reconnect.
    pub async fn leave(&self, chat_id: &str, member_id: &str, tx: &Tx) {
        let mut chats = self.chats.lock().await;
        if let Some(members) = chats.get_mut(chat_id) {
            if !members.get(member_id).is_some_and(|stored| stored.same_channel(tx)) {
                debug!("Member {member_id} already reconnected to chat {chat_id}");
                return;
            }
            members.remove(member_id);
            if members.is_empty() {
                chats.remove(chat_id);
            }
        }
    }

    /// Returns how many members the message went to.
    async fn broadcast(&self, chat_id: &str, msg: ServerMessage) -> usize {
        let chats = self.chats.lock().await;
        let Some(members) = chats.get(chat_id) else {
            return 0;
        };
        for tx in members.values() {
            send_msg(tx, msg.clone());
        }
        members.len()
    }
}

#[async_trait]
impl Transport for ChatHub {
    async fn send_poll(
        &self,
        chat_id: &str,
        question: &str,
        options: &[String],
    ) -> AnyResult<PollId> {
        let poll_id = generate_poll_id();
        let msg = ServerMessage::Poll {
            poll_id: poll_id.clone(),
            question: question.to_string(),
            options: options.to_vec(),
        };
        if self.broadcast(chat_id, msg).await == 0 {
            bail!("no members connected to chat {chat_id}");
        }
        Ok(poll_id)
    }

    async fn send_text(&self, chat_id: &str, text: &str, mentions: &[String]) -> AnyResult<()> {
        let msg = ServerMessage::Text {
            text: text.to_string(),
            mentions: mentions.to_vec(),
        };
        if self.broadcast(chat_id, msg).await == 0 {
            bail!("no members connected to chat {chat_id}");
        }
        Ok(())
    }
}

pub struct AppState {
    pub hub: Arc<ChatHub>,
    pub engine: QuizEngine,
}

async fn accept_connection(peer: SocketAddr, stream: TcpStream, app_state: Arc<AppState>) {
    if let Err(e) = handle_connection(peer, stream, app_state).await {
        match e {
            Error::ConnectionClosed | Error::AlreadyClosed | Error::Protocol(_) => (),
            err => error!("Error processing connection: {err}"),
        }
    }
}

async fn handle_connection(
    peer: SocketAddr,
    stream: TcpStream,
    app_state: Arc<AppState>,
) -> Result<()> {
    let mut ws_stream = accept_async(stream).await?;
    info!("New WebSocket connection: {peer}");

    if let Some(msg) = ws_stream.next().await {
        let msg = msg?;
        if let Ok(text) = msg.to_text() {
            debug!("Received message: {text}");
            let error_message = match serde_json::from_str::<ClientMessage>(text) {
                Ok(ClientMessage::Join { chat_id, member_id }) => {
                    join_chat(app_state, ws_stream, chat_id, member_id).await;
                    return Ok(());
                }
                Ok(other) => {
                    warn!("Expected Join from new connection, instead got: {other:?}");
                    ServerMessage::error("First message must be Join")
                }
                Err(e) => {
                    warn!("Failed to parse message: {e}");
                    ServerMessage::error(format!("Invalid JSON: {e}"))
                }
            };
            let msg = serde_json::to_string(&error_message).unwrap_or_default();
            ws_stream.send(Message::text(msg)).await?;
        }
    }

    Ok(())
}

pub async fn start_ws_server(listener: TcpListener, app_state: Arc<AppState>) {
    match listener.local_addr() {
        Ok(addr) => info!("Listening on: {addr}"),
        Err(e) => warn!("Listening on an unknown address: {e}"),
    }

    while let Ok((stream, peer)) = listener.accept().await {
        debug!("Peer address: {peer}");
        tokio::spawn(accept_connection(peer, stream, app_state.clone()));
    }
}
