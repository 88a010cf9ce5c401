use std::sync::Arc;
use std::time::Duration;

use pollquiz::error::QuizError;
use pollquiz::model::types::Vote;
use pollquiz::registry::SessionRegistry;
use pollquiz::transport::RecordingTransport;

use crate::{fast_settings, init_logs, next_poll, question, text_containing};

fn questions(count: usize) -> Vec<pollquiz::model::types::Question> {
    (0..count)
        .map(|i| question(&format!("Question {i}"), ["a", "b", "c", "d"], 0))
        .collect()
}

#[tokio::test]
async fn one_session_per_chat() {
    let transport = Arc::new(RecordingTransport::new());
    let registry = SessionRegistry::new(transport);

    registry
        .start("chat-1", questions(2), fast_settings(5_000), "Topic")
        .await
        .unwrap();
    let second = registry
        .start("chat-1", questions(2), fast_settings(5_000), "Topic")
        .await;
    assert!(matches!(second, Err(QuizError::AlreadyActive)));

    // Other chats are independent
    registry
        .start("chat-2", questions(1), fast_settings(5_000), "Topic")
        .await
        .unwrap();
    assert_eq!(registry.active_count().await, 2);

    registry.stop("chat-1").await.unwrap();
    registry.stop("chat-2").await.unwrap();
}

#[tokio::test]
async fn stop_cancels_the_timer_and_frees_the_chat() {
    init_logs();
    let transport = Arc::new(RecordingTransport::new());
    let mut events = transport.subscribe();
    let registry = SessionRegistry::new(transport.clone());

    registry
        .start("chat-1", questions(3), fast_settings(100), "Topic")
        .await
        .unwrap();
    next_poll(&mut events).await;

    registry.stop("chat-1").await.unwrap();
    assert!(!registry.is_active("chat-1").await);

    // Long enough for the cancelled question to have closed and the next opened
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(transport.polls().len(), 1);

    assert!(matches!(
        registry.stop("chat-1").await,
        Err(QuizError::NotFound)
    ));
    registry
        .start("chat-1", questions(1), fast_settings(5_000), "Again")
        .await
        .unwrap();
    registry.stop("chat-1").await.unwrap();
}

#[tokio::test]
async fn finished_session_releases_the_chat() {
    let transport = Arc::new(RecordingTransport::new());
    let mut events = transport.subscribe();
    let registry = SessionRegistry::new(transport.clone());

    registry
        .start("chat-1", questions(3), fast_settings(20), "Topic")
        .await
        .unwrap();

    for expected in 1..=3 {
        let (_, label) = next_poll(&mut events).await;
        assert!(label.starts_with(&format!("Q{expected}/3:")), "got {label}");
    }
    text_containing(&mut events, "Answer key").await;

    // The session task removes its own entry right after publishing
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!registry.is_active("chat-1").await);
    assert_eq!(transport.polls().len(), 3);
}

#[tokio::test]
async fn chat_is_free_while_results_are_still_being_sent() {
    let transport = Arc::new(RecordingTransport::new());
    let mut events = transport.subscribe();
    let registry = SessionRegistry::new(transport.clone());

    registry
        .start("chat-1", questions(1), fast_settings(20), "Topic")
        .await
        .unwrap();
    next_poll(&mut events).await;
    transport.delay_texts(Duration::from_millis(300));

    // The only question has closed and the scoreboard is on its way
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(transport.texts().iter().all(|t| !t.contains("Scoreboard")));
    assert!(!registry.is_active("chat-1").await);
    assert_eq!(registry.active_count().await, 0);
    assert!(matches!(
        registry.stop("chat-1").await,
        Err(QuizError::NotFound)
    ));

    registry
        .start("chat-1", questions(1), fast_settings(5_000), "Next")
        .await
        .unwrap();
    text_containing(&mut events, "Answer key").await;
    // The old session's cleanup leaves the new one alone
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(registry.is_active("chat-1").await);
    registry.stop("chat-1").await.unwrap();
}

#[tokio::test]
async fn votes_reach_the_running_session_only() {
    let transport = Arc::new(RecordingTransport::new());
    let mut events = transport.subscribe();
    let registry = SessionRegistry::new(transport);
    let vote = |poll_id: &str| Vote {
        poll_id: poll_id.to_string(),
        voter_id: "voter".to_string(),
        selected: "a".to_string(),
    };

    assert!(!registry.route_vote("chat-1", vote("poll-1")).await);

    registry
        .start("chat-1", questions(1), fast_settings(150), "Topic")
        .await
        .unwrap();
    let (poll_id, _) = next_poll(&mut events).await;
    assert!(registry.route_vote("chat-1", vote(&poll_id)).await);
    assert!(!registry.route_vote("chat-2", vote(&poll_id)).await);

    let board = text_containing(&mut events, "Scoreboard").await;
    assert!(board.contains("@voter: 1/1"));
}

#[tokio::test]
async fn reservation_blocks_starts_until_released() {
    let transport = Arc::new(RecordingTransport::new());
    let registry = SessionRegistry::new(transport);

    let reservation = registry.reserve("chat-1").await.unwrap();
    assert!(registry.is_active("chat-1").await);
    assert!(matches!(
        registry
            .start("chat-1", questions(1), fast_settings(5_000), "Topic")
            .await,
        Err(QuizError::AlreadyActive)
    ));

    registry.release(reservation).await;
    assert!(!registry.is_active("chat-1").await);
}

#[tokio::test]
async fn stopping_during_preparation_cancels_the_launch() {
    let transport = Arc::new(RecordingTransport::new());
    let registry = SessionRegistry::new(transport.clone());

    let reservation = registry.reserve("chat-1").await.unwrap();
    registry.stop("chat-1").await.unwrap();

    let launched = registry
        .launch(reservation, questions(1), fast_settings(5_000), "Topic")
        .await;
    assert!(matches!(launched, Err(QuizError::NotFound)));
    assert!(!registry.is_active("chat-1").await);
    assert!(transport.polls().is_empty());
}
