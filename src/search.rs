//! Search proxy integration
//!
//! Uses the global HTTP client for connection pooling and reuse.

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{AskError, Result};
use crate::globals::get_http_client;

/// Results per page returned by the proxy
pub const PAGE_SIZE: usize = 10;

/// The proxy serves at most this many results per query
pub const MAX_START_INDEX: usize = 100;

/// Which result vertical to query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchType {
    #[default]
    Web,
    Image,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Web => "web",
            SearchType::Image => "image",
        }
    }
}

/// One search hit, flattened from the proxy's custom-search item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// Web results only
    pub title: Option<String>,
    /// Web results only
    pub snippet: Option<String>,
    pub link: String,
    /// `pagemap.cse_thumbnail[0].src`, else the link
    pub thumbnail: String,
    /// `pagemap.cse_image[0].src`, else the link
    pub image: String,
    /// Host name of the link, when it parses as a URL
    pub source: Option<String>,
}

impl SearchResult {
    fn from_raw(item: RawItem, search_type: SearchType) -> Self {
        let (title, snippet) = match search_type {
            SearchType::Web => (item.title, item.snippet),
            SearchType::Image => (None, None),
        };
        let pagemap = item.pagemap.unwrap_or_default();
        let thumbnail = first_src(pagemap.cse_thumbnail).unwrap_or_else(|| item.link.clone());
        let image = first_src(pagemap.cse_image).unwrap_or_else(|| item.link.clone());
        let source = Url::parse(&item.link)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string));

        Self {
            title,
            snippet,
            link: item.link,
            thumbnail,
            image,
            source,
        }
    }
}

fn first_src(images: Vec<PageMapImage>) -> Option<String> {
    images
        .into_iter()
        .next()
        .and_then(|image| image.src)
        .filter(|src| !src.is_empty())
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    link: String,
    #[serde(default)]
    pagemap: Option<PageMap>,
}

#[derive(Debug, Default, Deserialize)]
struct PageMap {
    #[serde(default)]
    cse_thumbnail: Vec<PageMapImage>,
    #[serde(default)]
    cse_image: Vec<PageMapImage>,
}

#[derive(Debug, Deserialize)]
struct PageMapImage {
    #[serde(default)]
    src: Option<String>,
}

/// One page of results
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    pub page: usize,
    pub items: Vec<SearchResult>,
    pub has_more: bool,
}

/// 1-based start index for `page` (also 1-based).
pub fn start_index(page: usize) -> usize {
    page.saturating_sub(1) * PAGE_SIZE + 1
}

/// Fetch one page of results from the proxy at `base_url`.
///
/// Pages beyond [`MAX_START_INDEX`] are not requested.
pub async fn search_page(
    base_url: &str,
    query: &str,
    search_type: SearchType,
    page: usize,
) -> Result<SearchPage> {
    let page = page.max(1);
    let start = start_index(page);
    if start > MAX_START_INDEX {
        return Ok(SearchPage {
            page,
            items: Vec::new(),
            has_more: false,
        });
    }

    let client = get_http_client();

    let url = format!(
        "{}/search?query={}&searchType={}&start={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(query),
        search_type.as_str(),
        start
    );

    let response = client
        .get(&url)
        .header("Accept", "application/json")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(AskError::Api {
            status: status.as_u16(),
            message: format!("search proxy returned status: {status}"),
        });
    }

    let search_response: SearchResponse = response
        .json()
        .await
        .map_err(|e| AskError::Parse(format!("failed to parse search response: {e}")))?;

    let items: Vec<SearchResult> = search_response
        .items
        .into_iter()
        .take(PAGE_SIZE)
        .map(|item| SearchResult::from_raw(item, search_type))
        .collect();
    let has_more = items.len() == PAGE_SIZE && start_index(page + 1) <= MAX_START_INDEX;

    Ok(SearchPage {
        page,
        items,
        has_more,
    })
}

/// "Load more" bookkeeping across successive pages of one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub query: String,
    pub search_type: SearchType,
    next_page: Option<usize>,
    loaded: usize,
}

impl Pagination {
    pub fn new(query: impl Into<String>, search_type: SearchType) -> Self {
        Self::starting_at(query, search_type, 1)
    }

    pub fn starting_at(query: impl Into<String>, search_type: SearchType, page: usize) -> Self {
        Self {
            query: query.into(),
            search_type,
            next_page: Some(page.max(1)),
            loaded: 0,
        }
    }

    /// Page to request next, or `None` once the results ran out.
    pub fn next_page(&self) -> Option<usize> {
        self.next_page
    }

    /// Number of results received so far.
    pub fn loaded(&self) -> usize {
        self.loaded
    }

    /// Record a fetched page and advance.
    pub fn advance(&mut self, page: &SearchPage) {
        self.loaded += page.items.len();
        self.next_page = page.has_more.then_some(page.page + 1);
    }

    /// Fetch the next page, if any, and advance.
    pub async fn load_more(&mut self, base_url: &str) -> Result<Option<SearchPage>> {
        let Some(page) = self.next_page else {
            return Ok(None);
        };
        let result = search_page(base_url, &self.query, self.search_type, page).await?;
        self.advance(&result);
        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn items(n: usize) -> serde_json::Value {
        let items: Vec<_> = (0..n)
            .map(|i| {
                json!({
                    "kind": "customsearch#result",
                    "title": format!("Result {i}"),
                    "snippet": format!("Snippet {i}"),
                    "link": format!("https://example.com/{i}"),
                    "displayLink": "example.com",
                    "pagemap": {
                        "cse_thumbnail": [{ "src": format!("https://t.example/{i}.jpg"), "width": "120" }],
                        "cse_image": [{ "src": format!("https://i.example/{i}.jpg") }]
                    }
                })
            })
            .collect();
        json!({ "kind": "customsearch#search", "items": items })
    }

    #[tokio::test]
    async fn test_image_items_read_from_pagemap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("searchType", "image"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {
                        "title": "Cat",
                        "snippet": "a cat",
                        "link": "https://cats.example.com/a",
                        "pagemap": {
                            "cse_thumbnail": [{ "src": "https://t/1.jpg" }],
                            "cse_image": [{ "src": "https://i/1.jpg" }]
                        }
                    },
                    { "title": "Bare", "link": "https://bare.example.org/b.png" }
                ]
            })))
            .mount(&server)
            .await;

        let page = search_page(&server.uri(), "cat", SearchType::Image, 1)
            .await
            .unwrap();
        let cat = &page.items[0];
        assert_eq!(cat.image, "https://i/1.jpg");
        assert_eq!(cat.thumbnail, "https://t/1.jpg");
        assert_eq!(cat.source.as_deref(), Some("cats.example.com"));
        assert_eq!(cat.title, None);
        assert_eq!(cat.snippet, None);

        // Missing pagemap falls back to the link itself.
        let bare = &page.items[1];
        assert_eq!(bare.image, "https://bare.example.org/b.png");
        assert_eq!(bare.thumbnail, "https://bare.example.org/b.png");
        assert_eq!(bare.source.as_deref(), Some("bare.example.org"));
    }

    #[tokio::test]
    async fn test_web_items_keep_title_and_snippet() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(items(1)))
            .mount(&server)
            .await;

        let page = search_page(&server.uri(), "q", SearchType::Web, 1)
            .await
            .unwrap();
        let item = &page.items[0];
        assert_eq!(item.title.as_deref(), Some("Result 0"));
        assert_eq!(item.snippet.as_deref(), Some("Snippet 0"));
        assert_eq!(item.image, "https://i.example/0.jpg");
        assert_eq!(item.source.as_deref(), Some("example.com"));
    }

    #[tokio::test]
    async fn test_unparseable_link_has_no_source() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{ "title": "Odd", "link": "not a url" }]
            })))
            .mount(&server)
            .await;

        let page = search_page(&server.uri(), "q", SearchType::Web, 1)
            .await
            .unwrap();
        assert_eq!(page.items[0].source, None);
        assert_eq!(page.items[0].image, "not a url");
    }

    #[test]
    fn test_start_index() {
        assert_eq!(start_index(1), 1);
        assert_eq!(start_index(2), 11);
        assert_eq!(start_index(10), 91);
        assert_eq!(start_index(11), 101);
        assert_eq!(start_index(0), 1);
    }

    #[test]
    fn test_pagination_advance() {
        let mut pagination = Pagination::new("rust", SearchType::Web);
        assert_eq!(pagination.next_page(), Some(1));

        pagination.advance(&SearchPage {
            page: 1,
            items: vec![],
            has_more: true,
        });
        assert_eq!(pagination.next_page(), Some(2));

        pagination.advance(&SearchPage {
            page: 2,
            items: vec![],
            has_more: false,
        });
        assert_eq!(pagination.next_page(), None);
    }

    #[tokio::test]
    async fn test_search_page_request_and_has_more() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("query", "rust lang"))
            .and(query_param("searchType", "web"))
            .and(query_param("start", "11"))
            .respond_with(ResponseTemplate::new(200).set_body_json(items(10)))
            .expect(1)
            .mount(&server)
            .await;

        let page = search_page(&server.uri(), "rust lang", SearchType::Web, 2)
            .await
            .unwrap();
        assert_eq!(page.page, 2);
        assert_eq!(page.items.len(), 10);
        assert_eq!(page.items[0].title.as_deref(), Some("Result 0"));
        assert!(page.has_more);
    }

    #[tokio::test]
    async fn test_short_page_ends_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("searchType", "image"))
            .respond_with(ResponseTemplate::new(200).set_body_json(items(3)))
            .mount(&server)
            .await;

        let mut pagination = Pagination::new("cats", SearchType::Image);
        let page = pagination.load_more(&server.uri()).await.unwrap().unwrap();
        assert_eq!(page.items.len(), 3);
        assert!(!page.has_more);
        assert_eq!(pagination.loaded(), 3);
        assert!(pagination.load_more(&server.uri()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_last_page_has_no_more() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("start", "91"))
            .respond_with(ResponseTemplate::new(200).set_body_json(items(10)))
            .mount(&server)
            .await;

        let page = search_page(&server.uri(), "q", SearchType::Web, 10)
            .await
            .unwrap();
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn test_page_past_limit_skips_request() {
        // Unreachable address: any request would fail.
        let page = search_page("http://127.0.0.1:9", "q", SearchType::Web, 11)
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn test_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = search_page(&server.uri(), "q", SearchType::Web, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, AskError::Api { status: 503, .. }));
    }
}
