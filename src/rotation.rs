//! Retry loop that rotates API keys on rate limiting.
//!
//! [`KeyDispatcher`] wraps a [`KeyRotationManager`] and a sticky preferred
//! index. The lock is only held while selecting or recording, never across
//! the outbound request.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::classify::{FailureKind, FailureMarkers};
use crate::config::RotationConfig;
use crate::error::{AskError, Result};
use crate::keys::{KeyRotationManager, StatusSummary};

/// Why a single attempt failed, as reported by the request code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    /// HTTP status, or `None` when no response arrived.
    pub status: Option<u16>,
    pub message: String,
}

impl AttemptFailure {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    fn into_error(self) -> AskError {
        match self.status {
            Some(status) => AskError::Api {
                status,
                message: self.message,
            },
            None => AskError::Network(self.message),
        }
    }
}

/// A successful result plus how much rotation it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched<T> {
    pub value: T,
    /// Index of the key that succeeded.
    pub key_index: usize,
    /// Number of rate-limited attempts before the success.
    pub rotations: usize,
}

impl<T> Dispatched<T> {
    /// True when at least one key had to be skipped.
    pub fn rotated(&self) -> bool {
        self.rotations > 0
    }
}

struct DispatchState {
    manager: KeyRotationManager,
    preferred: usize,
}

/// Shared entry point for requests that need an API key.
pub struct KeyDispatcher {
    state: Mutex<DispatchState>,
    markers: FailureMarkers,
}

impl KeyDispatcher {
    pub fn new(keys: Vec<String>, config: RotationConfig) -> Self {
        Self::with_markers(keys, config, FailureMarkers::default())
    }

    pub fn with_markers(keys: Vec<String>, config: RotationConfig, markers: FailureMarkers) -> Self {
        Self {
            state: Mutex::new(DispatchState {
                manager: KeyRotationManager::new(keys, config),
                preferred: 0,
            }),
            markers,
        }
    }

    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn key_count(&self) -> usize {
        self.lock().manager.len()
    }

    pub fn summary(&self) -> StatusSummary {
        self.lock().manager.summarize()
    }

    pub fn estimated_wait(&self) -> Option<Duration> {
        self.lock().manager.estimated_wait()
    }

    /// Index the next request will try first.
    pub fn preferred(&self) -> usize {
        self.lock().preferred
    }

    fn exhausted(manager: &KeyRotationManager) -> AskError {
        let retry_after = manager.estimated_wait().unwrap_or(Duration::ZERO);
        let summary = manager.summarize();
        warn!(
            retry_after_secs = retry_after.as_secs(),
            blocked = summary.blocked,
            near_limit = summary.near_limit,
            "all API keys exhausted"
        );
        AskError::AllCredentialsExhausted {
            retry_after,
            summary,
        }
    }

    /// Run `attempt` with a selected key, rotating on rate limits.
    ///
    /// Each key is tried at most once per call. Failures that are not rate
    /// limits are returned immediately and leave key state alone. When no
    /// untried key is usable the result is exhaustion if no key at all is
    /// usable, otherwise the last rate-limit message.
    pub async fn dispatch<T, F, Fut>(&self, mut attempt: F) -> Result<Dispatched<T>>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = std::result::Result<T, AttemptFailure>>,
    {
        let max_attempts = self.key_count();
        if max_attempts == 0 {
            return Err(AskError::NoCredentials);
        }

        let mut rotations = 0;
        let mut last_rate_limit = String::new();
        let mut tried: Vec<usize> = Vec::with_capacity(max_attempts);

        while tried.len() < max_attempts {
            let selected = {
                let guard = self.lock();
                guard
                    .manager
                    .select_excluding(guard.preferred, &tried)
                    .and_then(|i| guard.manager.key(i).map(|k| (i, k.to_string())))
            };
            // Nothing untried is usable; decided below.
            let Some((index, key)) = selected else {
                break;
            };
            tried.push(index);
            debug!(index, "dispatching request");

            match attempt(key).await {
                Ok(value) => {
                    let mut guard = self.lock();
                    guard.manager.record_outcome(index, false);
                    guard.preferred = index;
                    if rotations > 0 {
                        info!(index, rotations, "request succeeded after key rotation");
                    }
                    return Ok(Dispatched {
                        value,
                        key_index: index,
                        rotations,
                    });
                }
                Err(failure) => match self.markers.classify(failure.status, &failure.message) {
                    FailureKind::RateLimited => {
                        self.lock().manager.record_outcome(index, true);
                        rotations += 1;
                        info!(index, "rate limited, rotating to next key");
                        last_rate_limit = failure.message;
                    }
                    FailureKind::InvalidCredential => {
                        warn!(index, status = ?failure.status, "API key rejected");
                        return Err(AskError::InvalidCredential(failure.message));
                    }
                    FailureKind::Other => return Err(failure.into_error()),
                },
            }
        }

        let guard = self.lock();
        if guard.manager.select_credential(guard.preferred).is_none() {
            return Err(Self::exhausted(&guard.manager));
        }
        Err(AskError::RateLimited(last_rate_limit))
    }
}
