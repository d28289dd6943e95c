//! Error types for askweb.
//!
//! Messages never include API keys.

use std::time::Duration;

use crate::keys::StatusSummary;

/// Errors surfaced by the search and answer layers.
#[derive(Debug, thiserror::Error)]
pub enum AskError {
    /// Every key is blocked or at its window limit.
    #[error(
        "all API keys exhausted, retry in {}s ({} available, {} blocked, {} near limit)",
        .retry_after.as_secs().max(1),
        .summary.available,
        .summary.blocked,
        .summary.near_limit
    )]
    AllCredentialsExhausted {
        retry_after: Duration,
        summary: StatusSummary,
    },

    /// A single attempt was rejected as rate limited.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The key was rejected for a reason other than rate limiting.
    #[error("invalid API key: {0}")]
    InvalidCredential(String),

    /// Transport failure before a response was received.
    #[error("network error: {0}")]
    Network(String),

    /// Non-success response that is neither a rate limit nor a key problem.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response body could not be interpreted.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Request rejected before anything was sent.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No API keys were configured.
    #[error("no API keys configured")]
    NoCredentials,
}

impl From<reqwest::Error> for AskError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest embeds the request URL, which carries the key as a query parameter.
        AskError::Network(err.without_url().to_string())
    }
}

/// Convenience type alias for askweb results.
pub type Result<T> = std::result::Result<T, AskError>;
