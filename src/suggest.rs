//! Query auto-suggestions from the RapidAPI suggestion service

use crate::error::{AskError, Result};
use crate::globals::get_http_client;

/// Client for `GET /suggestqueries`
#[derive(Clone)]
pub struct SuggestClient {
    base_url: String,
    host: String,
    api_key: String,
}

impl std::fmt::Debug for SuggestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuggestClient")
            .field("base_url", &self.base_url)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl SuggestClient {
    pub fn new(
        base_url: impl Into<String>,
        host: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            host: host.into(),
            api_key: api_key.into(),
        }
    }

    /// Suggested completions for `query`. A blank query returns nothing
    /// without a request.
    pub async fn suggest(&self, query: &str) -> Result<Vec<String>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/suggestqueries?query={}",
            self.base_url,
            urlencoding::encode(query)
        );

        let response = get_http_client()
            .get(&url)
            .header("X-RapidAPI-Key", &self.api_key)
            .header("X-RapidAPI-Host", &self.host)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AskError::Api {
                status: status.as_u16(),
                message: format!("suggestion service returned status: {status}"),
            });
        }

        let suggestions: Option<Vec<String>> = response
            .json()
            .await
            .map_err(|e| AskError::Parse(format!("failed to parse suggestions: {e}")))?;
        Ok(suggestions.unwrap_or_default())
    }
}
