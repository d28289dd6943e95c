//! Conversational AI mode over the proxy's `/ai-chat` endpoint.
//!
//! The proxy holds the model credentials for this mode, so no key rotation
//! happens here. [`Conversation`] keeps the transcript and sends the earlier
//! turns along with every new question.

use std::time::{Duration, SystemTime};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AskError, Result};
use crate::globals::get_http_client;

/// Sources requested per answer
pub const MAX_SOURCES: u32 = 5;

const CHAT_TIMEOUT: Duration = Duration::from_secs(30);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One prior turn as sent to the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest<'a> {
    query: &'a str,
    conversation_history: &'a [ConversationMessage],
    max_sources: u32,
}

/// A web page the answer cites as `[n]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSource {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub citation_number: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<ChatSource>,
    #[serde(default)]
    pub related_questions: Vec<String>,
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub tokens_used: Option<u32>,
    /// Server-side time spent, as reported by the backend
    #[serde(default)]
    pub processing_time: f64,
}

#[derive(Debug, Deserialize)]
struct ChatErrorBody {
    error: Option<String>,
}

/// Client for the chat backend
#[derive(Debug, Clone)]
pub struct ChatClient {
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Ask `query` with the earlier turns in `history`.
    ///
    /// A failed response surfaces the backend's `error` field when present.
    pub async fn send_message(
        &self,
        query: &str,
        history: &[ConversationMessage],
    ) -> Result<ChatResponse> {
        let body = ChatRequest {
            query,
            conversation_history: history,
            max_sources: MAX_SOURCES,
        };

        let response = get_http_client()
            .post(format!("{}/ai-chat", self.base_url))
            .timeout(CHAT_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ChatErrorBody>(&text)
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| format!("Request failed with status code {}", status.as_u16()));
            return Err(AskError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| AskError::Parse(format!("failed to parse chat response: {}", e.without_url())))
    }

    /// Ask the same question again for a fresh answer.
    pub async fn regenerate(
        &self,
        query: &str,
        history: &[ConversationMessage],
    ) -> Result<ChatResponse> {
        self.send_message(query, history).await
    }

    /// True when `GET /health` answers 200 within five seconds.
    pub async fn health_check(&self) -> bool {
        let result = get_http_client()
            .get(format!("{}/health", self.base_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await;
        match result {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                debug!(error = %e.without_url(), "chat health check failed");
                false
            }
        }
    }
}

/// A transcript entry
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub sources: Vec<ChatSource>,
    pub related_questions: Vec<String>,
    pub confidence: Option<f64>,
    pub tokens: Option<u32>,
    /// Set on assistant entries that record a failed request.
    pub error: Option<String>,
    pub timestamp: SystemTime,
}

impl ChatMessage {
    fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
            sources: Vec::new(),
            related_questions: Vec::new(),
            confidence: None,
            tokens: None,
            error: None,
            timestamp: SystemTime::now(),
        }
    }

    fn assistant(response: &ChatResponse) -> Self {
        Self {
            role: Role::Assistant,
            content: response.answer.clone(),
            sources: response.sources.clone(),
            related_questions: response.related_questions.clone(),
            confidence: Some(response.confidence),
            tokens: response.tokens_used,
            error: None,
            timestamp: SystemTime::now(),
        }
    }

    fn failed(error: String) -> Self {
        Self {
            role: Role::Assistant,
            content: format!("Sorry, I encountered an error: {error}"),
            sources: Vec::new(),
            related_questions: Vec::new(),
            confidence: None,
            tokens: None,
            error: Some(error),
            timestamp: SystemTime::now(),
        }
    }
}

/// A running conversation with the chat backend
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    conversation_id: Option<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Id the backend assigned on its latest reply.
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Turns sent as context with the next question. Failed replies are
    /// left out.
    pub fn history(&self) -> Vec<ConversationMessage> {
        self.messages
            .iter()
            .filter(|m| m.error.is_none())
            .map(|m| ConversationMessage {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }

    /// Send `query` and append both the question and the reply.
    ///
    /// On failure an error entry is appended and the error returned.
    pub async fn ask(&mut self, client: &ChatClient, query: &str) -> Result<ChatResponse> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AskError::InvalidInput("empty question".into()));
        }

        let history = self.history();
        self.messages.push(ChatMessage::user(query));

        match client.send_message(query, &history).await {
            Ok(response) => {
                if !response.conversation_id.is_empty() {
                    self.conversation_id = Some(response.conversation_id.clone());
                }
                self.messages.push(ChatMessage::assistant(&response));
                Ok(response)
            }
            Err(e) => {
                warn!(error = %e, "AI chat request failed");
                self.messages.push(ChatMessage::failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Drop the latest reply and ask its question again.
    pub async fn regenerate(&mut self, client: &ChatClient) -> Result<ChatResponse> {
        if self.messages.len() < 2 {
            return Err(AskError::InvalidInput("nothing to regenerate".into()));
        }
        let Some(index) = self.messages.iter().rposition(|m| m.role == Role::User) else {
            return Err(AskError::InvalidInput("nothing to regenerate".into()));
        };
        let query = self.messages[index].content.clone();
        self.messages.truncate(index);
        self.ask(client, &query).await
    }

    /// Start over.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.conversation_id = None;
    }
}

/// What a line typed in chat mode asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Ask(String),
    Regenerate,
    New,
    Quit,
    Skip,
}

impl ChatCommand {
    /// A bare number picks from the latest related questions.
    pub fn parse(input: &str, related: &[String]) -> Self {
        let input = input.trim();
        match input {
            "" => ChatCommand::Skip,
            "/quit" | "/exit" => ChatCommand::Quit,
            "/regen" | "/regenerate" => ChatCommand::Regenerate,
            "/new" => ChatCommand::New,
            _ => {
                let picked = input
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| related.get(i));
                match picked {
                    Some(question) => ChatCommand::Ask(question.clone()),
                    None => ChatCommand::Ask(input.to_string()),
                }
            }
        }
    }
}
