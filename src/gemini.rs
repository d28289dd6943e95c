//! Gemini `generateContent` client
//!
//! Sends one prompt per request and turns the `ANSWER:` / `SOURCES:`
//! formatted reply into an [`AiAnswer`]. Key selection is left to the
//! caller; see [`crate::rotation::KeyDispatcher`].

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::config::{DEFAULT_GEMINI_MODEL, DEFAULT_GEMINI_URL};
use crate::error::{AskError, Result};
use crate::globals::get_http_client;
use crate::query::is_japanese;
use crate::rotation::AttemptFailure;

/// Answer shown in the AI panel.
#[derive(Debug, Clone, PartialEq)]
pub struct AiAnswer {
    pub answer: String,
    /// Topic names suggested as sources (not URLs).
    pub sources: Vec<String>,
    /// Heuristic quality score in `[0.1, 1.0]`.
    pub confidence: f64,
    pub query: String,
    pub timestamp: SystemTime,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
    top_p: f64,
    top_k: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_output_tokens: 1000,
            top_p: 0.8,
            top_k: 40,
        }
    }
}

/// Raw `generateContent` reply.
#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateResponse {
    /// Text of the first candidate; `None` when no candidate content came back.
    pub fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        Some(
            content
                .parts
                .first()
                .and_then(|p| p.text.clone())
                .unwrap_or_default(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

/// Thin client for one Gemini model.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    base_url: String,
    model: String,
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new(DEFAULT_GEMINI_URL, DEFAULT_GEMINI_MODEL)
    }
}

impl GeminiClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send `prompt` with `api_key`.
    ///
    /// Failures carry the HTTP status and the API's own error message so
    /// the caller can tell rate limits from other errors.
    pub async fn generate(
        &self,
        prompt: &str,
        api_key: &str,
    ) -> std::result::Result<GenerateResponse, AttemptFailure> {
        let client = get_http_client();

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url,
            self.model,
            urlencoding::encode(api_key)
        );

        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig::default(),
        };

        let response = client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AttemptFailure::transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(|b| b.error)
                .and_then(|e| e.message)
                .unwrap_or_else(|| format!("HTTP error! status: {}", status.as_u16()));
            return Err(AttemptFailure::http(status.as_u16(), message));
        }

        response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| AttemptFailure::http(status.as_u16(), format!("invalid response body: {}", e.without_url())))
    }
}

/// Build the answer prompt, in Japanese when the query is Japanese.
pub fn build_prompt(query: &str) -> String {
    if is_japanese(query) {
        format!(
            "以下の質問に対して、包括的で正確で役立つ回答を日本語で提供してください: \"{query}\"

要件:
1. 明確で構造化された回答を提供する
2. 簡潔だが情報豊富である（2-4文を目標とする）
3. 特定のトピックに関する質問の場合は、主要な事実を提供する
4. 「方法」に関する質問の場合は、段階的なガイダンスを提供する
5. 比較に関する質問の場合は、主要な違いを強調する
6. 回答の最後に「SOURCES:」を付けて、2-3の関連するソース提案を提供する（トピック名のみ、URLは不要）

重要な制限事項:
- 成人向けコンテンツ、性的な内容、ポルノ、アダルト関連の質問には一切回答しないでください
- 性的な用語、身体部位、性的行為に関する質問には回答しないでください
- そのような質問の場合は「申し訳ございませんが、この質問にはお答えできません」と回答してください
- 教育的な目的であっても、性的な内容に関する質問には回答しないでください

回答形式:
ANSWER: [ここに回答]
SOURCES: [ソース1, ソース2, ソース3]"
        )
    } else {
        format!(
            "Please provide a comprehensive, accurate, and helpful answer to the following question: \"{query}\"

Requirements:
1. Give a clear, well-structured answer
2. Be concise but informative (aim for 2-4 sentences)
3. If the question is about a specific topic, provide key facts
4. If it's a \"how to\" question, provide step-by-step guidance
5. If it's a comparison question, highlight key differences
6. End your response with \"SOURCES:\" followed by 2-3 relevant source suggestions (just the topic names, not URLs)

Important restrictions:
- Do NOT answer questions related to adult content, sexual content, pornography, or any adult-related topics
- Do NOT answer questions about sexual terms, body parts, or sexual activities
- If the question is about such content, respond with \"I'm sorry, but I cannot answer that question\"
- Even if the question seems educational, do NOT answer questions about sexual content

Format your response as:
ANSWER: [your answer here]
SOURCES: [source 1, source 2, source 3]"
        )
    }
}

/// Split model output into answer text and source list.
fn split_answer(text: &str) -> (String, Vec<String>) {
    let answer = match text.find("ANSWER:") {
        Some(start) => {
            let rest = &text[start + "ANSWER:".len()..];
            let end = rest.find("SOURCES:").unwrap_or(rest.len());
            rest[..end].trim().to_string()
        }
        None => text.trim().to_string(),
    };

    let sources = text
        .find("SOURCES:")
        .map(|start| text[start + "SOURCES:".len()..].trim())
        .map(|s| s.trim_start_matches('[').trim_end_matches(']'))
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    (answer, sources)
}

fn confidence(answer: &str, sources: &[String]) -> f64 {
    let mut score: f64 = 0.8;
    if answer.chars().count() < 50 {
        score -= 0.2;
    }
    if sources.is_empty() {
        score -= 0.1;
    }
    if answer.contains("I don't know") || answer.contains("I cannot") {
        score -= 0.3;
    }
    score.clamp(0.1, 1.0)
}

/// Turn a raw reply into an [`AiAnswer`] for `query`.
pub fn parse_answer(query: &str, response: &GenerateResponse) -> Result<AiAnswer> {
    let text = response
        .text()
        .ok_or_else(|| AskError::Parse("No response received from Gemini".into()))?;
    let (answer, sources) = split_answer(&text);
    let confidence = confidence(&answer, &sources);

    Ok(AiAnswer {
        answer,
        sources,
        confidence,
        query: query.to_string(),
        timestamp: SystemTime::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GENERATE_PATH: &str = "/v1beta/models/gemini-2.0-flash-lite:generateContent";

    fn reply(text: &str) -> serde_json::Value {
        json!({
            "candidates": [{
                "content": { "parts": [{ "text": text }], "role": "model" },
                "finishReason": "STOP"
            }]
        })
    }

    #[test]
    fn split_answer_and_sources() {
        let (answer, sources) = split_answer(
            "ANSWER: Rust is a systems language.\nSOURCES: Rust Book, Rust Reference , ",
        );
        assert_eq!(answer, "Rust is a systems language.");
        assert_eq!(sources, vec!["Rust Book", "Rust Reference"]);
    }

    #[test]
    fn split_answer_bracketed_sources() {
        let (_, sources) = split_answer("ANSWER: x\nSOURCES: [A, B]");
        assert_eq!(sources, vec!["A", "B"]);
    }

    #[test]
    fn split_answer_without_markers() {
        let (answer, sources) = split_answer("  just text  ");
        assert_eq!(answer, "just text");
        assert!(sources.is_empty());
    }

    #[test]
    fn confidence_heuristics() {
        let long = "a".repeat(60);
        let sources = vec!["s".to_string()];
        assert!((confidence(&long, &sources) - 0.8).abs() < 1e-9);
        assert!((confidence("short", &sources) - 0.6).abs() < 1e-9);
        assert!((confidence(&long, &[]) - 0.7).abs() < 1e-9);
        assert!((confidence("I cannot", &[]) - 0.2).abs() < 1e-9);
        let uncertain = format!("I don't know {}", "x".repeat(60));
        assert!((confidence(&uncertain, &[]) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn confidence_never_below_floor() {
        assert!(confidence("I cannot", &[]) >= 0.1);
    }

    #[test]
    fn prompt_language_follows_query() {
        assert!(build_prompt("what is rust").starts_with("Please provide"));
        assert!(build_prompt("Rustとは").starts_with("以下の質問"));
        assert!(build_prompt("what is rust").contains("\"what is rust\""));
    }

    #[test]
    fn missing_candidates_is_parse_error() {
        let response: GenerateResponse = serde_json::from_value(json!({})).unwrap();
        let err = parse_answer("q", &response).unwrap_err();
        assert!(matches!(err, AskError::Parse(_)));
        assert!(err.to_string().contains("No response received from Gemini"));
    }

    #[tokio::test]
    async fn request_format_and_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(query_param("key", "test-key"))
            .and(body_partial_json(json!({
                "generationConfig": {
                    "temperature": 0.3,
                    "maxOutputTokens": 1000,
                    "topP": 0.8,
                    "topK": 40
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply(
                "ANSWER: Ownership is Rust's memory model.\nSOURCES: The Rust Book",
            )))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new(server.uri(), DEFAULT_GEMINI_MODEL);
        let response = client
            .generate(&build_prompt("what is ownership"), "test-key")
            .await
            .unwrap();
        let answer = parse_answer("what is ownership", &response).unwrap();
        assert_eq!(answer.answer, "Ownership is Rust's memory model.");
        assert_eq!(answer.sources, vec!["The Rust Book"]);
        assert_eq!(answer.query, "what is ownership");
    }

    #[tokio::test]
    async fn rate_limit_status_and_message_surface() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {
                    "code": 429,
                    "message": "Resource has been exhausted (e.g. check quota).",
                    "status": "RESOURCE_EXHAUSTED"
                }
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::new(server.uri(), DEFAULT_GEMINI_MODEL);
        let failure = client.generate("p", "k").await.unwrap_err();
        assert_eq!(failure.status, Some(429));
        assert_eq!(failure.message, "Resource has been exhausted (e.g. check quota).");
    }

    #[tokio::test]
    async fn error_without_json_body_uses_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = GeminiClient::new(server.uri(), DEFAULT_GEMINI_MODEL);
        let failure = client.generate("p", "k").await.unwrap_err();
        assert_eq!(failure.status, Some(502));
        assert_eq!(failure.message, "HTTP error! status: 502");
    }

    #[tokio::test]
    async fn trailing_slash_in_base_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("hello")))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new(format!("{}/", server.uri()), DEFAULT_GEMINI_MODEL);
        let response = client.generate("p", "k").await.unwrap();
        assert_eq!(response.text().as_deref(), Some("hello"));
    }
}
