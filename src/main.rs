use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use log::*;
use pollquiz::{
    assistant::Assistant,
    config::Config,
    engine::{QuizDefaults, QuizEngine},
    provider::{Provider, fallback::FallbackCaller, gemini::GeminiProvider},
    registry::SessionRegistry,
    server::{AppState, ChatHub, start_ws_server},
    source::QuestionSource,
    transport::PlainTextExtractor,
};
use tokio::net::TcpListener;

async fn health_check() -> &'static str {
    "OK"
}

fn build_state(config: &Config) -> Arc<AppState> {
    let provider: Arc<dyn Provider> = Arc::new(GeminiProvider::new(config.base_url.clone()));
    let caller = |models: &[String]| {
        FallbackCaller::for_models(models, config.api_keys.clone(), config.retry)
    };

    let hub = Arc::new(ChatHub::new());
    let registry = SessionRegistry::new(hub.clone());
    let source = QuestionSource::new(
        caller(&config.models),
        provider.clone(),
        Arc::new(PlainTextExtractor),
    );
    let assistant = Arc::new(Assistant::new(
        caller(&config.models),
        caller(&config.embedding_models),
        provider,
    ));
    let defaults = QuizDefaults {
        timer_seconds: config.timer_seconds,
        pause: config.pause,
        ..QuizDefaults::default()
    };

    Arc::new(AppState {
        hub,
        engine: QuizEngine::new(registry, source, assistant, defaults),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();
    env_logger::init();
    if let Err(e) = dotenv {
        // A missing .env is fine; the environment may already be set
        debug!("No .env loaded: {e}");
    }
    info!("Starting pollquiz");

    std::panic::set_hook(Box::new(|panic| {
        error!("Unexpected panic: {panic}");
    }));

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        "Using models {:?} with {} API key(s)",
        config.models,
        config.api_keys.len()
    );
    let app_state = build_state(&config);

    let ws_listener = TcpListener::bind(config.ws_addr)
        .await
        .with_context(|| format!("Can't listen on {}", config.ws_addr))?;
    let health_listener = TcpListener::bind(config.health_addr)
        .await
        .with_context(|| format!("Can't listen on {}", config.health_addr))?;
    let health_app = Router::new().route("/health", get(health_check));

    tokio::select! {
        _ = start_ws_server(ws_listener, app_state) => {},
        result = axum::serve(health_listener, health_app) => {
            result.context("Health server failed")?;
        },
    }

    Ok(())
}
