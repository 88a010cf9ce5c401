use std::sync::Arc;
use std::time::Duration;

use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use pollquiz::assistant::Assistant;
use pollquiz::engine::{QuizDefaults, QuizEngine};
use pollquiz::model::client_message::ClientMessage;
use pollquiz::model::server_message::ServerMessage;
use pollquiz::model::types::{PollId, Question};
use pollquiz::provider::Provider;
use pollquiz::provider::fallback::{FallbackCaller, RetryPolicy};
use pollquiz::provider::scripted::ScriptedProvider;
use pollquiz::registry::SessionRegistry;
use pollquiz::server::{AppState, ChatHub, start_ws_server};
use pollquiz::session::SessionSettings;
use pollquiz::source::QuestionSource;
use pollquiz::transport::{Outbound, PlainTextExtractor, Transport};
use serde::{Serialize, de::DeserializeOwned};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};


pub const MODELS: [&str; 2] = ["model-a", "model-b"];
pub const EMBEDDING_MODEL: &str = "embed-a";
pub const KEYS: [&str; 2] = ["key-1", "key-2"];

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn question(text: &str, options: [&str; 4], correct_index: usize) -> Question {
    Question {
        text: text.to_string(),
        options: options.iter().map(|o| o.to_string()).collect(),
        correct_index,
        explanation: String::new(),
    }
}

pub fn fast_settings(question_ms: u64) -> SessionSettings {
    SessionSettings {
        question_duration: Duration::from_millis(question_ms),
        pause: Duration::from_millis(5),
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_rate_limit_retries: 2,
        backoff: Duration::from_millis(5),
    }
}

pub fn caller(models: &[&str]) -> FallbackCaller {
    let models: Vec<String> = models.iter().map(|m| m.to_string()).collect();
    let keys = KEYS.iter().map(|k| k.to_string()).collect();
    FallbackCaller::for_models(&models, keys, fast_retry())
}

pub fn assistant(provider: Arc<ScriptedProvider>) -> Assistant {
    Assistant::new(caller(&MODELS), caller(&[EMBEDDING_MODEL]), provider)
}

pub fn engine(
    provider: Arc<ScriptedProvider>,
    transport: Arc<dyn Transport>,
    defaults: QuizDefaults,
) -> QuizEngine {
    let registry = SessionRegistry::new(transport);
    let source = QuestionSource::new(
        caller(&MODELS),
        provider.clone() as Arc<dyn Provider>,
        Arc::new(PlainTextExtractor),
    );
    QuizEngine::new(registry, source, Arc::new(assistant(provider)), defaults)
}

/// Next thing the transport sent, failing the test after two seconds.
pub async fn next_event(events: &mut broadcast::Receiver<Outbound>) -> Outbound {
    match tokio::time::timeout(RECV_TIMEOUT, events.recv()).await {
        Ok(Ok(event)) => event,
        Ok(Err(e)) => panic!("Transport event channel failed: {e}"),
        Err(_) => panic!("Timeout waiting for transport event (waited {RECV_TIMEOUT:?})"),
    }
}

/// Skips texts until the next poll arrives.
pub async fn next_poll(events: &mut broadcast::Receiver<Outbound>) -> (PollId, String) {
    loop {
        if let Outbound::Poll {
            poll_id, question, ..
        } = next_event(events).await
        {
            return (poll_id, question);
        }
    }
}

/// Skips polls and texts until a text containing `needle` arrives.
pub async fn text_containing(events: &mut broadcast::Receiver<Outbound>, needle: &str) -> String {
    loop {
        if let Outbound::Text { text, .. } = next_event(events).await
            && text.contains(needle)
        {
            return text;
        }
    }
}

pub struct TestServer {
    pub ws_port: u16,
    pub provider: Arc<ScriptedProvider>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with_provider(Arc::new(ScriptedProvider::new())).await
    }

    pub async fn start_with_provider(provider: Arc<ScriptedProvider>) -> Self {
        init_logs();
        let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ws_port = ws_listener.local_addr().unwrap().port();

        let hub = Arc::new(ChatHub::new());
        let defaults = QuizDefaults {
            timer_seconds: 1,
            pause: Duration::from_millis(5),
            quantity: 3,
        };
        let app_state = Arc::new(AppState {
            hub: hub.clone(),
            engine: engine(provider.clone(), hub, defaults),
        });
        tokio::spawn(async move {
            start_ws_server(ws_listener, app_state).await;
        });

        // Give the server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        Self { ws_port, provider }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.ws_port)
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct TestClient {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
}

impl TestClient {
    pub async fn connect(url: &str) -> Self {
        let (ws_stream, _) = connect_async(url).await.expect("Failed to connect");
        let (write, read) = ws_stream.split();
        Self { write, read }
    }

    /// Connect and join `chat_id` as `member_id`.
    pub async fn join(server: &TestServer, chat_id: &str, member_id: &str) -> Self {
        let mut client = Self::connect(&server.ws_url()).await;
        client
            .send_json(&ClientMessage::Join {
                chat_id: chat_id.to_string(),
                member_id: member_id.to_string(),
            })
            .await;
        match client.recv_json().await {
            ServerMessage::Joined {
                chat_id: joined, ..
            } => assert_eq!(joined, chat_id),
            other => panic!("Expected Joined message, got {other:?}"),
        }
        client
    }

    pub async fn send_json<T: Serialize>(&mut self, msg: &T) {
        let json = serde_json::to_string(msg).unwrap();
        self.write.send(Message::Text(json.into())).await.unwrap();
    }

    pub async fn send_raw_text(&mut self, text: &str) {
        self.write
            .send(Message::Text(text.to_string().into()))
            .await
            .unwrap();
    }

    pub async fn recv_json<T: DeserializeOwned>(&mut self) -> T {
        loop {
            match tokio::time::timeout(RECV_TIMEOUT, self.read.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => return serde_json::from_str(&text).unwrap(),
                // Heartbeat pings are answered by tungstenite
                Ok(Some(Ok(_))) => continue,
                Ok(Some(Err(e))) => panic!("WebSocket error: {e}"),
                Ok(None) => panic!("WebSocket stream closed"),
                Err(_) => {
                    panic!("Timeout waiting for message from server (waited {RECV_TIMEOUT:?})")
                }
            }
        }
    }

    /// Reads messages until `pick` accepts one.
    pub async fn recv_until<T>(&mut self, mut pick: impl FnMut(ServerMessage) -> Option<T>) -> T {
        loop {
            if let Some(found) = pick(self.recv_json().await) {
                return found;
            }
        }
    }
}
