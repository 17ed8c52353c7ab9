//! NewsAPI client
//!
//! [`NewsFetcher`] pulls one page of articles from a NewsAPI-compatible
//! service. Headlines are filtered by country and category; a custom query
//! switches to keyword search over all articles, because the headlines
//! endpoint does not combine `q` with those filters.

use crate::article::{parse_feed, FeedArticle};
use crate::{Article, Error, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Query that means "no keyword search"
pub const DEFAULT_QUERY: &str = "top headlines";

/// Largest page NewsAPI serves to the ingestion path
pub const MAX_PAGE_SIZE: usize = 20;

/// Settings for [`NewsFetcher`]
#[derive(Debug, Clone)]
pub struct NewsApiConfig {
    /// Base URL without the endpoint, e.g. `https://newsapi.org/v2`
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl Default for NewsApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://newsapi.org/v2".to_string(),
            api_key: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// One page request against the feed
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FetchRequest {
    pub query: Option<String>,
    pub country: String,
    pub category: String,
    pub page_size: usize,
    pub page: usize,
}

impl Default for FetchRequest {
    fn default() -> Self {
        Self {
            query: None,
            country: "us".to_string(),
            category: "sports".to_string(),
            page_size: 10,
            page: 1,
        }
    }
}

impl FetchRequest {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(Error::Validation(format!(
                "page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        if self.page == 0 {
            return Err(Error::Validation("page must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Keyword query, if this request is a keyword search
    pub fn keyword(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty() && *q != DEFAULT_QUERY)
    }
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    articles: Vec<FeedArticle>,
}

#[derive(Debug, Deserialize)]
struct FeedErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Blocking NewsAPI client. No retries; retryable failures are flagged on the
/// returned error.
pub struct NewsFetcher {
    client: Client,
    headlines_url: String,
    everything_url: String,
    api_key: String,
}

impl NewsFetcher {
    pub fn new(config: NewsApiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(Error::InvalidConfig("news API key is required".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build news client: {}", e)))?;

        let base = config.base_url.trim_end_matches('/');
        Ok(Self {
            client,
            headlines_url: format!("{}/top-headlines", base),
            everything_url: format!("{}/everything", base),
            api_key: config.api_key.trim().to_string(),
        })
    }

    /// Endpoint and query parameters for `request`
    fn plan(&self, request: &FetchRequest) -> (&str, Vec<(&'static str, String)>) {
        let mut params = vec![
            ("apiKey", self.api_key.clone()),
            ("pageSize", request.page_size.to_string()),
            ("page", request.page.to_string()),
        ];
        match request.keyword() {
            Some(q) => {
                params.push(("q", q.to_string()));
                params.push(("sortBy", "relevancy".to_string()));
                (self.everything_url.as_str(), params)
            }
            None => {
                params.push(("country", request.country.clone()));
                params.push(("category", request.category.clone()));
                (self.headlines_url.as_str(), params)
            }
        }
    }

    /// Fetch one page and convert it to articles, dropping invalid records.
    pub fn fetch(&self, request: &FetchRequest) -> Result<Vec<Article>> {
        request.validate()?;
        let (url, params) = self.plan(request);
        debug!(url, page = request.page, page_size = request.page_size, "fetching news");

        let resp = self.client.get(url).query(&params).send().map_err(|e| {
            let retryable = e.is_timeout() || e.is_connect() || e.is_request() || e.is_body();
            Error::feed(format!("news request failed: {}", e), retryable)
        })?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp
                .json::<FeedErrorBody>()
                .ok()
                .and_then(|body| match (body.code, body.message) {
                    (Some(code), Some(message)) => Some(format!("{}: {}", code, message)),
                    (code, message) => message.or(code),
                })
                .unwrap_or_else(|| "no details".to_string());
            return Err(Error::feed(
                format!("news API returned {}: {}", status, detail),
                status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
            ));
        }

        let body: FeedResponse = resp
            .json()
            .map_err(|e| Error::feed(format!("failed to parse news response: {}", e), false))?;
        let received = body.articles.len();
        let articles = parse_feed(body.articles);
        info!(received, valid = articles.len(), "fetched news page");
        Ok(articles)
    }
}
