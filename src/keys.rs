//! Per-key rate-limit tracking and key selection.
//!
//! Each API key carries a rolling request window and an optional cooldown.
//! Expiry of both is evaluated lazily whenever state is read, so no
//! background timer is needed.
//!
//! # State Machine
//!
//! ```text
//! ┌───────┐ used  ┌───────────┐ >= 80% of limit ┌───────────┐
//! │ Fresh ├──────►│ Available ├────────────────►│ NearLimit │
//! └───────┘       └──▲─────┬──┘                 └─────┬─────┘
//!                    │     │ rate limited             │ rate limited
//!   cooldown elapsed │     ▼                          │
//!   or success       │  ┌─────────┐                   │
//!                    └──┤ Blocked │◄──────────────────┘
//!                       └─────────┘
//! ```
//!
//! Methods suffixed with `_at` take the current instant explicitly; the
//! unsuffixed variants use [`Instant::now`].

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::RotationConfig;

/// Usage and penalty state for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialState {
    pub is_blocked: bool,
    /// End of the cooldown; `None` while blocked means the end could not be
    /// represented and the block lasts until the next success.
    pub blocked_until: Option<Instant>,
    pub request_count: u32,
    pub window_start: Instant,
    pub last_used: Instant,
}

impl CredentialState {
    fn new(now: Instant) -> Self {
        Self {
            is_blocked: false,
            blocked_until: None,
            request_count: 0,
            window_start: now,
            last_used: now,
        }
    }

    fn window_expired(&self, window: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) >= window
    }

    /// Request count after applying the window reset rule.
    fn effective_count(&self, window: Duration, now: Instant) -> u32 {
        if self.window_expired(window, now) {
            0
        } else {
            self.request_count
        }
    }

    fn block_active(&self, now: Instant) -> bool {
        self.is_blocked && self.blocked_until.is_none_or(|until| now < until)
    }

    /// Time until the current window rolls over.
    fn window_left(&self, window: Duration, now: Instant) -> Duration {
        self.window_start
            .checked_add(window)
            .map_or(Duration::MAX, |end| end.saturating_duration_since(now))
    }
}

/// Where a key sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    /// Never used this session.
    Fresh,
    /// Used, under the near-limit threshold, not blocked.
    Available,
    /// At or above 80% of the per-window limit.
    NearLimit,
    /// Cooling down after a rate-limited response.
    Blocked,
}

/// Key counts by status. Fresh keys count as available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusSummary {
    pub available: usize,
    pub blocked: usize,
    pub near_limit: usize,
}

impl StatusSummary {
    pub fn total(&self) -> usize {
        self.available + self.blocked + self.near_limit
    }
}

/// Tracks a fixed, ordered pool of API keys.
pub struct KeyRotationManager {
    config: RotationConfig,
    keys: Vec<String>,
    states: Vec<Option<CredentialState>>,
}

impl std::fmt::Debug for KeyRotationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRotationManager")
            .field("config", &self.config)
            .field("keys", &format_args!("<{} redacted>", self.keys.len()))
            .field("states", &self.states)
            .finish()
    }
}

impl KeyRotationManager {
    pub fn new(keys: Vec<String>, config: RotationConfig) -> Self {
        let states = vec![None; keys.len()];
        Self {
            config,
            keys,
            states,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn config(&self) -> &RotationConfig {
        &self.config
    }

    /// The key at `index`, if in range.
    pub fn key(&self, index: usize) -> Option<&str> {
        self.keys.get(index).map(String::as_str)
    }

    /// Raw state for `index`; `None` until the key is first used.
    pub fn state(&self, index: usize) -> Option<&CredentialState> {
        self.states.get(index).and_then(Option::as_ref)
    }

    pub fn is_available_at(&self, index: usize, now: Instant) -> bool {
        if index >= self.keys.len() {
            return false;
        }
        match self.state(index) {
            None => true,
            Some(state) => {
                !state.block_active(now)
                    && state.effective_count(self.config.window, now) < self.config.rpm_limit
            }
        }
    }

    /// Pick a key for the next request.
    ///
    /// Returns `preferred` when it is usable, otherwise the lowest usable
    /// index, otherwise `None`. Does not mutate state.
    pub fn select_credential_at(&self, preferred: usize, now: Instant) -> Option<usize> {
        self.select_excluding_at(preferred, &[], now)
    }

    pub fn select_credential(&self, preferred: usize) -> Option<usize> {
        self.select_credential_at(preferred, Instant::now())
    }

    /// Like [`select_credential_at`](Self::select_credential_at), but never
    /// returns an index listed in `excluded`.
    pub fn select_excluding_at(
        &self,
        preferred: usize,
        excluded: &[usize],
        now: Instant,
    ) -> Option<usize> {
        let usable = |i: usize| !excluded.contains(&i) && self.is_available_at(i, now);
        if usable(preferred) {
            return Some(preferred);
        }
        let selected = (0..self.keys.len()).find(|&i| usable(i));
        debug!(preferred, ?selected, "preferred key unavailable");
        selected
    }

    pub fn select_excluding(&self, preferred: usize, excluded: &[usize]) -> Option<usize> {
        self.select_excluding_at(preferred, excluded, Instant::now())
    }

    /// Count an attempt against `index` and apply or clear its cooldown.
    pub fn record_outcome_at(&mut self, index: usize, was_rate_limited: bool, now: Instant) {
        let Some(slot) = self.states.get_mut(index) else {
            warn!(index, keys = self.keys.len(), "outcome recorded for unknown key index");
            return;
        };
        let state = slot.get_or_insert_with(|| CredentialState::new(now));

        if state.window_expired(self.config.window, now) {
            state.request_count = 0;
            state.window_start = now;
        }
        state.request_count = state.request_count.saturating_add(1);
        state.last_used = now;

        if was_rate_limited {
            state.is_blocked = true;
            state.blocked_until = now.checked_add(self.config.cooldown);
            warn!(
                index,
                cooldown_secs = self.config.cooldown.as_secs(),
                "key rate limited, cooling down"
            );
        } else {
            state.is_blocked = false;
            state.blocked_until = None;
        }
    }

    pub fn record_outcome(&mut self, index: usize, was_rate_limited: bool) {
        self.record_outcome_at(index, was_rate_limited, Instant::now());
    }

    pub fn status_at(&self, index: usize, now: Instant) -> Option<KeyStatus> {
        if index >= self.keys.len() {
            return None;
        }
        let Some(state) = self.state(index) else {
            return Some(KeyStatus::Fresh);
        };
        let status = if state.block_active(now) {
            KeyStatus::Blocked
        } else if state.effective_count(self.config.window, now)
            >= self.config.near_limit_threshold()
        {
            KeyStatus::NearLimit
        } else {
            KeyStatus::Available
        };
        Some(status)
    }

    pub fn status(&self, index: usize) -> Option<KeyStatus> {
        self.status_at(index, Instant::now())
    }

    pub fn summarize_at(&self, now: Instant) -> StatusSummary {
        let mut summary = StatusSummary::default();
        for index in 0..self.keys.len() {
            match self.status_at(index, now) {
                Some(KeyStatus::Blocked) => summary.blocked += 1,
                Some(KeyStatus::NearLimit) => summary.near_limit += 1,
                Some(KeyStatus::Fresh | KeyStatus::Available) | None => summary.available += 1,
            }
        }
        summary
    }

    pub fn summarize(&self) -> StatusSummary {
        self.summarize_at(Instant::now())
    }

    /// Shortest time until some key becomes usable again.
    ///
    /// `None` when a key is usable now or the pool is empty.
    pub fn estimated_wait_at(&self, now: Instant) -> Option<Duration> {
        if (0..self.keys.len()).any(|i| self.is_available_at(i, now)) {
            return None;
        }
        self.states
            .iter()
            .flatten()
            .map(|state| {
                let block_left = if state.block_active(now) {
                    state
                        .blocked_until
                        .map_or(Duration::MAX, |until| until.saturating_duration_since(now))
                } else {
                    Duration::ZERO
                };
                let window_left =
                    if state.effective_count(self.config.window, now) >= self.config.rpm_limit {
                        state.window_left(self.config.window, now)
                    } else {
                        Duration::ZERO
                    };
                block_left.max(window_left)
            })
            .min()
    }

    pub fn estimated_wait(&self) -> Option<Duration> {
        self.estimated_wait_at(Instant::now())
    }
}
