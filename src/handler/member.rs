use crate::{
    engine::QuizRequest,
    error::QuizError,
    model::{
        client_message::ClientMessage,
        server_message::{ServerMessage, send_msg},
        types::{Document, GenerationSettings, Vote},
    },
    server::{AppState, Rx, Tx},
    transport::Transport,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use futures_util::{SinkExt, StreamExt};
use log::*;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{WebSocketStream, tungstenite::Message};

pub const PING_INTERVAL: Duration = Duration::from_secs(5);
pub const PONG_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_TOPIC: &str = "General knowledge";
const DEFAULT_MIME_TYPE: &str = "text/plain";

pub async fn join_chat(
    app_state: Arc<AppState>,
    ws_stream: WebSocketStream<TcpStream>,
    chat_id: String,
    member_id: String,
) {
    let (tx, rx) = mpsc::unbounded_channel::<Message>();
    app_state.hub.join(&chat_id, &member_id, tx.clone()).await;
    info!("Member {member_id} joined chat {chat_id}");

    send_msg(
        &tx,
        ServerMessage::Joined {
            chat_id: chat_id.clone(),
            member_id: member_id.clone(),
        },
    );
    handle_member(ws_stream, app_state, rx, tx, chat_id, member_id).await;
}

fn user_message(e: &QuizError) -> String {
    match e {
        QuizError::Generation(e) => format!("Couldn't generate the quiz: {e}"),
        e => e.to_string(),
    }
}

fn start_generated(
    app_state: &Arc<AppState>,
    chat_id: &str,
    member_tx: &Tx,
    document: String,
    mime_type: Option<String>,
    settings: GenerationSettings,
    timer_seconds: Option<u32>,
) {
    let bytes = match STANDARD.decode(document.trim()) {
        Ok(bytes) if !bytes.is_empty() => bytes,
        Ok(_) => {
            send_msg(member_tx, ServerMessage::error("The document is empty"));
            return;
        }
        Err(e) => {
            warn!("Undecodable document from chat {chat_id}: {e}");
            send_msg(
                member_tx,
                ServerMessage::error("The document must be base64 encoded"),
            );
            return;
        }
    };
    let document = Document {
        bytes,
        mime_type: mime_type.unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
    };
    send_msg(
        member_tx,
        ServerMessage::text(format!(
            "⏳ Generating {} questions on {}...",
            settings.quantity, settings.topic
        )),
    );

    // Generation can take a while; keep serving this member meanwhile
    let app_state = Arc::clone(app_state);
    let chat_id = chat_id.to_string();
    let member_tx = member_tx.clone();
    tokio::spawn(async move {
        let request = QuizRequest::Generated { document, settings };
        if let Err(e) = app_state
            .engine
            .start_quiz(&chat_id, request, timer_seconds)
            .await
        {
            warn!("Generated quiz did not start in chat {chat_id}: {e}");
            send_msg(&member_tx, ServerMessage::error(user_message(&e)));
        }
    });
}

fn answer_question(
    app_state: &Arc<AppState>,
    chat_id: &str,
    member_id: &str,
    member_tx: &Tx,
    text: String,
) {
    let app_state = Arc::clone(app_state);
    let chat_id = chat_id.to_string();
    let member_id = member_id.to_string();
    let member_tx = member_tx.clone();
    tokio::spawn(async move {
        match app_state.engine.reply(&chat_id, &text).await {
            Ok(reply) => {
                if let Err(e) = app_state
                    .hub
                    .send_text(&chat_id, &reply, &[member_id])
                    .await
                {
                    warn!("Failed to deliver reply in chat {chat_id}: {e:#}");
                }
            }
            Err(e) => {
                warn!("Assistant failed in chat {chat_id}: {e}");
                send_msg(&member_tx, ServerMessage::error(e.to_string()));
            }
        }
    });
}

async fn process_member_message(
    text: &str,
    app_state: &Arc<AppState>,
    chat_id: &str,
    member_id: &str,
    member_tx: &Tx,
) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Failed to parse message from {member_id}: {e}");
            send_msg(
                member_tx,
                ServerMessage::error(format!("Failed to parse message: {e}")),
            );
            return;
        }
    };
    let engine = &app_state.engine;

    match message {
        ClientMessage::Join { .. } => {
            send_msg(member_tx, ServerMessage::error("Already joined a chat"));
        }
        ClientMessage::StartQuiz {
            questions,
            timer_seconds,
            topic,
        } => {
            let request = QuizRequest::Authored {
                questions,
                topic: topic.unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
            };
            if let Err(e) = engine.start_quiz(chat_id, request, timer_seconds).await {
                send_msg(member_tx, ServerMessage::error(user_message(&e)));
            }
        }
        ClientMessage::GenerateQuiz {
            document,
            mime_type,
            topic,
            quantity,
            difficulty,
            timer_seconds,
        } => {
            let settings = GenerationSettings {
                topic,
                quantity: quantity.unwrap_or(engine.defaults().quantity),
                difficulty: difficulty.unwrap_or_default(),
            };
            start_generated(
                app_state,
                chat_id,
                member_tx,
                document,
                mime_type,
                settings,
                timer_seconds,
            );
        }
        ClientMessage::StopQuiz => match engine.stop_quiz(chat_id).await {
            Ok(()) => {
                let notice = format!("🛑 Quiz stopped by {member_id}");
                if let Err(e) = app_state.hub.send_text(chat_id, &notice, &[]).await {
                    warn!("Failed to announce stop in chat {chat_id}: {e:#}");
                }
            }
            Err(e) => send_msg(member_tx, ServerMessage::error(user_message(&e))),
        },
        ClientMessage::Vote { poll_id, option } => {
            let vote = Vote {
                poll_id,
                voter_id: member_id.to_string(),
                selected: option,
            };
            if !engine.ingest_vote(chat_id, vote).await {
                debug!("Dropped vote from {member_id}: no quiz running in chat {chat_id}");
            }
        }
        ClientMessage::Ask { text } => {
            answer_question(app_state, chat_id, member_id, member_tx, text);
        }
        ClientMessage::Status => {
            send_msg(
                member_tx,
                ServerMessage::QuizStatus {
                    chat_id: chat_id.to_string(),
                    active: engine.is_active(chat_id).await,
                },
            );
        }
    }
}

async fn handle_member(
    ws_stream: WebSocketStream<TcpStream>,
    app_state: Arc<AppState>,
    mut rx: Rx,
    member_tx: Tx,
    chat_id: String,
    member_id: String,
) {
    let (mut ws_write, mut ws_read) = ws_stream.split();
    let mut last_pong = Instant::now();
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);

    loop {
        tokio::select! {
            // Outgoing messages from channel
            Some(msg) = rx.recv() => {
                if ws_write.send(msg).await.is_err() {
                    break;
                }
            }

            msg_result = ws_read.next() => {
                match msg_result {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                    }
                    Some(Ok(Message::Text(text))) => {
                        debug!("Received message from {member_id}: {text}");
                        process_member_message(
                            &text,
                            &app_state,
                            &chat_id,
                            &member_id,
                            &member_tx,
                        )
                        .await;
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                        break;
                    }
                    _ => {} // Ping is answered by tungstenite, Binary is ignored
                }
            }

            _ = ping_interval.tick() => {
                if last_pong.elapsed() >= PONG_TIMEOUT {
                    info!("Member {member_id} connection timed out (no pong received)");
                    break;
                }
                if ws_write.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
        }
    }

    info!("Member {member_id} left chat {chat_id}");
    app_state.hub.leave(&chat_id, &member_id, &member_tx).await;
}
