//! Sequential fallback chains.
//!
//! A chain is an ordered list of providers. Each one is tried at most once,
//! in order, under a per-call timeout; the first result that passes the
//! caller's acceptance check wins. Failures, timeouts and rejected results
//! all advance the chain. Cancellation stops it before the next attempt.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::providers::{AiProvider, ProviderError};
use crate::types::TaskKind;

/// History is capped at this many events and trimmed to half when exceeded.
const HISTORY_CAP: usize = 1000;

// ---------------------------------------------------------------------------
// Attempts
// ---------------------------------------------------------------------------

/// What happened when one provider was tried.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed(ProviderError),
    TimedOut,
    /// The provider answered but the answer was rejected (too short, blank).
    Inadequate,
    Cancelled,
}

/// One provider invocation within a chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub task: TaskKind,
    pub provider_id: String,
    pub outcome: AttemptOutcome,
    pub elapsed_ms: u64,
}

impl Attempt {
    pub fn succeeded(&self) -> bool {
        self.outcome == AttemptOutcome::Succeeded
    }
}

// ---------------------------------------------------------------------------
// Fallback reasons & history
// ---------------------------------------------------------------------------

/// Why the chain moved past a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    RateLimit,
    ServerError,
    Timeout,
    AuthFailed,
    EmptyResponse,
    Inadequate,
}

impl FallbackReason {
    pub fn from_error(error: &ProviderError) -> Self {
        match error {
            ProviderError::RateLimit => Self::RateLimit,
            ProviderError::Timeout => Self::Timeout,
            ProviderError::InvalidKey => Self::AuthFailed,
            ProviderError::EmptyResponse => Self::EmptyResponse,
            ProviderError::Network(_)
            | ProviderError::Parse(_)
            | ProviderError::Cancelled
            | ProviderError::Other(_) => Self::ServerError,
        }
    }

    /// `None` for outcomes that do not advance the chain.
    pub fn from_outcome(outcome: &AttemptOutcome) -> Option<Self> {
        match outcome {
            AttemptOutcome::Failed(e) => Some(Self::from_error(e)),
            AttemptOutcome::TimedOut => Some(Self::Timeout),
            AttemptOutcome::Inadequate => Some(Self::Inadequate),
            AttemptOutcome::Succeeded | AttemptOutcome::Cancelled => None,
        }
    }
}

/// A recorded hop from one provider to the next, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackEvent {
    pub at: DateTime<Utc>,
    pub task: TaskKind,
    pub from_provider: String,
    /// `None` when the failing provider was the last in the chain.
    pub to_provider: Option<String>,
    pub reason: FallbackReason,
}

#[derive(Debug, Default)]
pub struct FallbackHistory {
    events: RwLock<Vec<FallbackEvent>>,
}

impl FallbackHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: FallbackEvent) {
        let mut events = self.events.write();
        events.push(event);
        if events.len() > HISTORY_CAP {
            let drain_end = events.len() - HISTORY_CAP / 2;
            events.drain(..drain_end);
        }
    }

    pub fn events(&self) -> Vec<FallbackEvent> {
        self.events.read().clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }
}

// ---------------------------------------------------------------------------
// ChainRunner
// ---------------------------------------------------------------------------

/// Result of running one chain.
#[derive(Debug)]
pub struct ChainOutcome<T> {
    /// Winning provider id and its accepted value.
    pub winner: Option<(String, T)>,
    pub attempts: Vec<Attempt>,
}

impl<T> ChainOutcome<T> {
    pub fn was_cancelled(&self) -> bool {
        self.attempts
            .last()
            .is_some_and(|a| a.outcome == AttemptOutcome::Cancelled)
    }
}

enum Step<T> {
    Done(Result<T, ProviderError>),
    Elapsed,
    Cancelled,
}

/// Runs chains with a shared per-call timeout and a shared fallback history.
pub struct ChainRunner {
    timeout: RwLock<Duration>,
    history: Arc<FallbackHistory>,
}

impl ChainRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout: RwLock::new(timeout),
            history: Arc::new(FallbackHistory::new()),
        }
    }

    pub fn timeout(&self) -> Duration {
        *self.timeout.read()
    }

    /// Applies to chains started after the call.
    pub fn set_timeout(&self, timeout: Duration) {
        *self.timeout.write() = timeout;
    }

    pub fn history(&self) -> &Arc<FallbackHistory> {
        &self.history
    }

    /// Try each provider in `chain` once, in order.
    ///
    /// `call` performs the request; `accept` decides whether a successful
    /// value is good enough to stop. A provider is never invoked twice.
    pub async fn run<T, F, Fut, A>(
        &self,
        task: TaskKind,
        chain: &[Arc<dyn AiProvider>],
        cancel: &CancellationToken,
        call: F,
        accept: A,
    ) -> ChainOutcome<T>
    where
        F: Fn(Arc<dyn AiProvider>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
        A: Fn(&T) -> bool,
    {
        let mut attempts = Vec::with_capacity(chain.len());
        let timeout = self.timeout();

        for (idx, provider) in chain.iter().enumerate() {
            let provider_id = provider.id().to_string();

            if cancel.is_cancelled() {
                debug!(task = ?task, provider = %provider_id, "Chain cancelled before attempt");
                attempts.push(Attempt {
                    task,
                    provider_id,
                    outcome: AttemptOutcome::Cancelled,
                    elapsed_ms: 0,
                });
                break;
            }

            let started = Instant::now();
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Step::Cancelled,
                res = tokio::time::timeout(timeout, call(Arc::clone(provider))) => match res {
                    Ok(inner) => Step::Done(inner),
                    Err(_) => Step::Elapsed,
                },
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let (outcome, value) = match step {
                Step::Cancelled => (AttemptOutcome::Cancelled, None),
                Step::Elapsed => (AttemptOutcome::TimedOut, None),
                Step::Done(Err(e)) => (AttemptOutcome::Failed(e), None),
                Step::Done(Ok(v)) if accept(&v) => (AttemptOutcome::Succeeded, Some(v)),
                Step::Done(Ok(_)) => (AttemptOutcome::Inadequate, None),
            };

            match &outcome {
                AttemptOutcome::Succeeded => {
                    debug!(task = ?task, provider = %provider_id, elapsed_ms, "Provider answered");
                }
                AttemptOutcome::Cancelled => {
                    info!(task = ?task, provider = %provider_id, "Chain cancelled mid-attempt");
                }
                other => {
                    warn!(
                        task = ?task,
                        provider = %provider_id,
                        elapsed_ms,
                        outcome = ?other,
                        "Provider attempt failed, falling back"
                    );
                    if let Some(reason) = FallbackReason::from_outcome(other) {
                        self.history.record(FallbackEvent {
                            at: Utc::now(),
                            task,
                            from_provider: provider_id.clone(),
                            to_provider: chain.get(idx + 1).map(|p| p.id().to_string()),
                            reason,
                        });
                    }
                }
            }

            let stop = matches!(outcome, AttemptOutcome::Cancelled);
            attempts.push(Attempt {
                task,
                provider_id: provider_id.clone(),
                outcome,
                elapsed_ms,
            });

            if let Some(v) = value {
                return ChainOutcome {
                    winner: Some((provider_id, v)),
                    attempts,
                };
            }
            if stop {
                break;
            }
        }

        ChainOutcome {
            winner: None,
            attempts,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
