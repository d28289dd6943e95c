//! # askweb
//!
//! Web search with AI answers, backed by a pool of Gemini API keys.
//!
//! The core is [`keys::KeyRotationManager`]: it tracks a per-key request
//! window and cooldown and picks which key the next request uses.
//! [`rotation::KeyDispatcher`] wraps it in the retry loop that rotates on
//! rate limits and passes every other failure straight back.
//!
//! [`chat::Conversation`] is the multi-turn mode: it talks to the search
//! proxy's chat endpoint and keeps the transcript for follow-ups.
//!
//! ```no_run
//! # async fn example() -> askweb::Result<()> {
//! use askweb::{GeminiClient, KeyDispatcher, RotationConfig};
//! use askweb::answer::AnswerService;
//!
//! let dispatcher = KeyDispatcher::new(vec!["key-a".into(), "key-b".into()], RotationConfig::default());
//! let service = AnswerService::new(dispatcher, GeminiClient::default());
//! if let Some(outcome) = service.answer("what is ownership in rust").await? {
//!     println!("{}", outcome.answer.answer);
//! }
//! # Ok(())
//! # }
//! ```

pub mod answer;
pub mod app;
pub mod chat;
pub mod classify;
pub mod config;
pub mod error;
pub mod gemini;
pub mod globals;
pub mod keys;
pub mod output;
pub mod query;
pub mod rotation;
pub mod search;
pub mod suggest;

pub use chat::{ChatClient, Conversation};
pub use classify::{FailureKind, FailureMarkers};
pub use config::{AppConfig, RotationConfig};
pub use error::{AskError, Result};
pub use gemini::{AiAnswer, GeminiClient};
pub use keys::{CredentialState, KeyRotationManager, KeyStatus, StatusSummary};
pub use rotation::{AttemptFailure, Dispatched, KeyDispatcher};
