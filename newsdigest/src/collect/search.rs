use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{snippet, CollectionPort};
use crate::article::{RawArticle, TimeWindow};
use crate::errors::CollectionError;

const SNIPPET_CHARS: usize = 500;

/// News search API source (Tavily-compatible `/search` endpoint).
pub struct SearchCollector {
    api_url: String,
    api_key: String,
    max_results: usize,
    include_domains: Vec<String>,
    exclude_domains: Vec<String>,
    client: Client,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    topic: &'static str,
    days: i64,
    max_results: usize,
    #[serde(skip_serializing_if = "is_empty")]
    include_domains: &'a [String],
    #[serde(skip_serializing_if = "is_empty")]
    exclude_domains: &'a [String],
    include_images: bool,
}

fn is_empty(domains: &&[String]) -> bool {
    domains.is_empty()
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
    published_date: Option<String>,
    #[serde(default)]
    images: Vec<String>,
    image: Option<String>,
}

impl SearchResult {
    fn image_url(&self) -> Option<String> {
        self.images
            .first()
            .or(self.image.as_ref())
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
    }
}

impl SearchCollector {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, CollectionError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(CollectionError::Config("search API key is empty".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("newsdigest/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            api_url: api_url.into(),
            api_key,
            max_results: 10,
            include_domains: Vec::new(),
            exclude_domains: Vec::new(),
            client,
        })
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_domains(mut self, include: Vec<String>, exclude: Vec<String>) -> Self {
        self.include_domains = include;
        self.exclude_domains = exclude;
        self
    }
}

/// Search APIs report dates as RFC 3339, RFC 2822 or a bare day.
fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|d| d.and_utc())
        })
}

#[async_trait::async_trait]
impl CollectionPort for SearchCollector {
    fn id(&self) -> &str {
        "search"
    }

    async fn collect(&self, keyword: &str, window: TimeWindow) -> Result<Vec<RawArticle>, CollectionError> {
        let body = SearchRequest {
            query: keyword,
            topic: "news",
            days: window.days(),
            max_results: self.max_results,
            include_domains: &self.include_domains,
            exclude_domains: &self.exclude_domains,
            include_images: true,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectionError::Status(status));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| CollectionError::Parse(e.to_string()))?;

        let articles: Vec<RawArticle> = parsed
            .results
            .into_iter()
            .filter(|r| !r.url.trim().is_empty())
            .map(|r| RawArticle {
                source_id: "search".to_string(),
                published_at: r.published_date.as_deref().and_then(parse_published),
                title: r.title.trim().to_string(),
                body_snippet: snippet(&r.content, SNIPPET_CHARS),
                image_url: r.image_url(),
                url: r.url,
                matched_keywords: [keyword.to_string()].into(),
            })
            .filter(|a| window.contains(a.published_at))
            .collect();

        debug!(keyword, results = articles.len(), "search: results in window");
        Ok(articles)
    }
}
