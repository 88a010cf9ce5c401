use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use log::{debug, info, warn};
use tokio_retry::RetryIf;

use crate::error::{CallError, ProviderError};

/// One entry of the ordered fallback list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub model: String,
    pub credential_index: usize,
}

/// What a unit of work is called with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub model: String,
    pub credential: String,
    pub credential_index: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries of the same candidate after a rate limit.
    pub max_rate_limit_retries: usize,
    /// Pause before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_rate_limit_retries: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    fn schedule(&self) -> impl Iterator<Item = Duration> {
        let backoff = self.backoff;
        (1..=self.max_rate_limit_retries as u32).map(move |n| backoff * n)
    }
}

/// Runs work against an ordered list of models, rotating through a pool of
/// credentials when a provider reports rate limiting.
///
/// The rotation offset belongs to this instance, so independent callers
/// (generation, replies, embeddings) never disturb each other.
#[derive(Debug)]
pub struct FallbackCaller {
    candidates: Vec<Candidate>,
    credentials: Vec<String>,
    rotation: AtomicUsize,
    policy: RetryPolicy,
}

impl FallbackCaller {
    pub fn new(candidates: Vec<Candidate>, credentials: Vec<String>, policy: RetryPolicy) -> Self {
        Self {
            candidates,
            credentials,
            rotation: AtomicUsize::new(0),
            policy,
        }
    }

    /// Every model paired with the first credential; rotation takes it from there.
    pub fn for_models(models: &[String], credentials: Vec<String>, policy: RetryPolicy) -> Self {
        let candidates = models
            .iter()
            .map(|model| Candidate {
                model: model.clone(),
                credential_index: 0,
            })
            .collect();
        Self::new(candidates, credentials, policy)
    }

    fn attempt_for(&self, candidate: &Candidate) -> Attempt {
        let credential_index = if self.credentials.is_empty() {
            0
        } else {
            (candidate.credential_index + self.rotation.load(Ordering::Relaxed))
                % self.credentials.len()
        };
        Attempt {
            model: candidate.model.clone(),
            credential: self
                .credentials
                .get(credential_index)
                .cloned()
                .unwrap_or_default(),
            credential_index,
        }
    }

    fn rotate(&self) {
        if self.credentials.len() > 1 {
            let previous = self.rotation.fetch_add(1, Ordering::Relaxed);
            info!(
                "Rotating API credential ({} -> {})",
                previous % self.credentials.len(),
                (previous + 1) % self.credentials.len()
            );
        }
    }

    pub async fn call<T, F, Fut>(&self, mut work: F) -> Result<T, CallError>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut last = None;

        for candidate in &self.candidates {
            let mut rate_limits = 0;
            let result = RetryIf::spawn(
                self.policy.schedule(),
                || {
                    let attempt = self.attempt_for(candidate);
                    debug!(
                        "Calling model {} with credential #{}",
                        attempt.model, attempt.credential_index
                    );
                    work(attempt)
                },
                |e: &ProviderError| {
                    if e.is_rate_limited() {
                        warn!("Model {} rate limited: {e}", candidate.model);
                        rate_limits += 1;
                        // The last rate limit ends this candidate, nothing to rotate for
                        if rate_limits <= self.policy.max_rate_limit_retries {
                            self.rotate();
                        }
                        true
                    } else {
                        false
                    }
                },
            )
            .await;

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_not_found() => {
                    warn!("Model {} not found, trying next candidate", candidate.model);
                    last = Some(e);
                }
                Err(e) if e.is_rate_limited() => {
                    warn!(
                        "Model {} still rate limited after {} retries, trying next candidate",
                        candidate.model, self.policy.max_rate_limit_retries
                    );
                    last = Some(e);
                }
                Err(e) => return Err(CallError::Provider(e)),
            }
        }

        Err(CallError::AllProvidersExhausted { last })
    }
}
