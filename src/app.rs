//! Application state and core logic

use futures::future::OptionFuture;
use tracing::{info, warn};

use crate::answer::AnswerService;
use crate::config::AppConfig;
use crate::error::AskError;
use crate::gemini::{AiAnswer, GeminiClient};
use crate::keys::StatusSummary;
use crate::rotation::KeyDispatcher;
use crate::search::{SearchPage, SearchResult, SearchType, search_page};

/// What the user asked for
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub query: String,
    pub page: usize,
    pub search_type: SearchType,
    pub with_search: bool,
    pub with_answer: bool,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            page: 1,
            search_type: SearchType::Web,
            with_search: true,
            with_answer: true,
        }
    }
}

/// Human-readable conditions shown under the results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A key hit its limit but another one answered.
    Slower,
    /// Every key is cooling down.
    Unavailable { retry_after_secs: u64 },
    /// A key was rejected outright.
    ConfigurationError(String),
    /// The AI answer failed for another reason.
    AnswerFailed(String),
    /// The search proxy failed.
    SearchFailed(String),
    /// Search succeeded but returned nothing.
    NoResults,
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::Slower => "AI answer: still working, just slower (switched API key)".to_string(),
            Notice::Unavailable { retry_after_secs } => format!(
                "AI answer temporarily unavailable, try again in {}s",
                retry_after_secs
            ),
            Notice::ConfigurationError(msg) => {
                format!("AI answer configuration error: {}", msg)
            }
            Notice::AnswerFailed(msg) => format!("AI answer failed: {}", msg),
            Notice::SearchFailed(msg) => format!("Search failed: {}", msg),
            Notice::NoResults => "No results found".to_string(),
        }
    }

    fn from_answer_error(err: AskError) -> Self {
        match err {
            AskError::AllCredentialsExhausted { retry_after, .. } => Notice::Unavailable {
                // Round up so "0s" is never shown.
                retry_after_secs: retry_after
                    .as_secs()
                    .saturating_add(u64::from(retry_after.subsec_nanos() > 0)),
            },
            AskError::InvalidCredential(msg) => Notice::ConfigurationError(msg),
            AskError::NoCredentials | AskError::Config(_) => {
                Notice::ConfigurationError(err.to_string())
            }
            other => Notice::AnswerFailed(other.to_string()),
        }
    }
}

/// Everything produced for one query
#[derive(Debug, Clone, Default)]
pub struct QueryOutcome {
    pub page: usize,
    pub results: Vec<SearchResult>,
    pub has_more: bool,
    pub answer: Option<AiAnswer>,
    pub answer_cached: bool,
    pub notices: Vec<Notice>,
}

/// Main application structure
pub struct App {
    search_url: String,
    answers: AnswerService,
}

impl App {
    /// Create new app instance
    pub fn new(config: &AppConfig) -> Self {
        info!(keys = config.api_keys.len(), model = %config.gemini_model, "starting");
        let dispatcher = KeyDispatcher::new(config.api_keys.clone(), config.rotation.clone());
        let gemini = GeminiClient::new(&config.gemini_url, &config.gemini_model);
        Self {
            search_url: config.search_url.clone(),
            answers: AnswerService::new(dispatcher, gemini),
        }
    }

    /// Run search and AI answer concurrently
    pub async fn run_query(&self, request: &QueryRequest) -> QueryOutcome {
        let search: OptionFuture<_> = request
            .with_search
            .then(|| search_page(&self.search_url, &request.query, request.search_type, request.page))
            .into();
        let answer: OptionFuture<_> = request
            .with_answer
            .then(|| self.answers.answer(&request.query))
            .into();

        let (search, answer) = futures::join!(search, answer);

        let mut outcome = QueryOutcome {
            page: request.page.max(1),
            ..Default::default()
        };

        match search {
            Some(Ok(SearchPage { items, has_more, .. })) => {
                if items.is_empty() {
                    outcome.notices.push(Notice::NoResults);
                }
                outcome.results = items;
                outcome.has_more = has_more;
            }
            Some(Err(e)) => {
                warn!(error = %e, "search failed");
                outcome.notices.push(Notice::SearchFailed(e.to_string()));
            }
            None => {}
        }

        match answer {
            Some(Ok(Some(answer))) => {
                if answer.rotated {
                    outcome.notices.push(Notice::Slower);
                }
                outcome.answer_cached = answer.cached;
                outcome.answer = Some(answer.answer);
            }
            Some(Ok(None)) | None => {}
            Some(Err(e)) => {
                warn!(error = %e, "AI answer failed");
                outcome.notices.push(Notice::from_answer_error(e));
            }
        }

        outcome
    }

    /// Current key pool status
    pub fn key_summary(&self) -> StatusSummary {
        self.answers.key_summary()
    }

    pub fn key_count(&self) -> usize {
        self.answers.dispatcher().key_count()
    }
}
