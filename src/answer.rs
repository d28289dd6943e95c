//! AI answers for search queries.
//!
//! [`AnswerService`] decides whether a query deserves an answer, serves
//! repeats from an in-memory cache, and otherwise asks Gemini through the
//! key dispatcher.

use std::time::Duration;

use moka::future::Cache;
use tracing::debug;

use crate::error::Result;
use crate::gemini::{AiAnswer, GeminiClient, build_prompt, parse_answer};
use crate::keys::StatusSummary;
use crate::query::should_use_ai;
use crate::rotation::{Dispatched, KeyDispatcher};

/// Maximum number of cached answers.
pub const MAX_CACHE_ENTRIES: u64 = 100;

/// How long a cached answer stays valid.
pub const CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// An answer plus whether it needed key rotation.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOutcome {
    pub answer: AiAnswer,
    pub cached: bool,
    pub rotated: bool,
}

pub struct AnswerService {
    dispatcher: KeyDispatcher,
    gemini: GeminiClient,
    cache: Cache<String, AiAnswer>,
}

impl AnswerService {
    pub fn new(dispatcher: KeyDispatcher, gemini: GeminiClient) -> Self {
        Self {
            dispatcher,
            gemini,
            cache: Cache::builder()
                .max_capacity(MAX_CACHE_ENTRIES)
                .time_to_live(CACHE_TTL)
                .build(),
        }
    }

    /// Answer `query`, or `Ok(None)` when it is not AI-worthy or no keys exist.
    pub async fn answer(&self, query: &str) -> Result<Option<AnswerOutcome>> {
        if !should_use_ai(query) {
            debug!("query not suited for an AI answer");
            return Ok(None);
        }

        let cache_key = query.to_lowercase();
        if let Some(answer) = self.cache.get(&cache_key).await {
            debug!("answer served from cache");
            return Ok(Some(AnswerOutcome {
                answer,
                cached: true,
                rotated: false,
            }));
        }

        if self.dispatcher.key_count() == 0 {
            return Ok(None);
        }

        let prompt = build_prompt(query);
        let prompt = prompt.as_str();
        let gemini = &self.gemini;
        let Dispatched {
            value: response,
            rotations,
            ..
        } = self
            .dispatcher
            .dispatch(move |key| async move { gemini.generate(prompt, &key).await })
            .await?;

        let answer = parse_answer(query, &response)?;
        self.cache.insert(cache_key, answer.clone()).await;

        Ok(Some(AnswerOutcome {
            answer,
            cached: false,
            rotated: rotations > 0,
        }))
    }

    pub fn clear_cache(&self) {
        self.cache.invalidate_all();
    }

    /// `(entries, capacity)`. Entry count may lag recent inserts slightly.
    pub fn cache_stats(&self) -> (u64, u64) {
        (self.cache.entry_count(), MAX_CACHE_ENTRIES)
    }

    pub fn key_summary(&self) -> StatusSummary {
        self.dispatcher.summary()
    }

    pub fn dispatcher(&self) -> &KeyDispatcher {
        &self.dispatcher
    }

    #[cfg(test)]
    async fn sync_cache(&self) {
        self.cache.run_pending_tasks().await;
    }
}
