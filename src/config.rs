use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::provider::fallback::RetryPolicy;

const DEFAULT_MODELS: &str = "gemini-2.0-flash,gemini-1.5-flash";
const DEFAULT_EMBEDDING_MODELS: &str = "text-embedding-004";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_keys: Vec<String>,
    pub models: Vec<String>,
    pub embedding_models: Vec<String>,
    pub base_url: Option<String>,
    pub ws_addr: SocketAddr,
    pub health_addr: SocketAddr,
    pub timer_seconds: u32,
    pub pause: Duration,
    pub retry: RetryPolicy,
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick
    /// up a `.env` file.
    pub fn from_env() -> Result<Self> {
        let api_keys = list(&env::var("GEMINI_API_KEYS").context("GEMINI_API_KEYS is not set")?);
        if api_keys.is_empty() {
            bail!("GEMINI_API_KEYS must list at least one key");
        }
        let models = list(&var_or("GEMINI_MODELS", DEFAULT_MODELS));
        if models.is_empty() {
            bail!("GEMINI_MODELS must list at least one model");
        }

        Ok(Self {
            api_keys,
            models,
            embedding_models: list(&var_or("EMBEDDING_MODELS", DEFAULT_EMBEDDING_MODELS)),
            base_url: env::var("GEMINI_BASE_URL").ok().filter(|v| !v.is_empty()),
            ws_addr: parse("WS_ADDR", "0.0.0.0:9002")?,
            health_addr: parse("HEALTH_ADDR", "0.0.0.0:8080")?,
            timer_seconds: parse("QUIZ_TIMER_SECONDS", "30")?,
            pause: Duration::from_millis(parse("QUIZ_PAUSE_MS", "2000")?),
            retry: RetryPolicy {
                max_rate_limit_retries: parse("RATE_LIMIT_RETRIES", "3")?,
                backoff: Duration::from_secs(parse("RATE_LIMIT_BACKOFF_SECS", "2")?),
            },
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = var_or(key, default);
    raw.trim()
        .parse()
        .with_context(|| format!("Invalid value for {key}: {raw:?}"))
}

fn list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
