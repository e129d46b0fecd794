use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use feed_rs::parser;
use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{mentions, snippet, CollectionPort};
use crate::article::{RawArticle, TimeWindow};
use crate::errors::CollectionError;

const SNIPPET_CHARS: usize = 500;

/// A feed entry reduced to what the pipeline compares and summarizes.
#[derive(Debug, Clone)]
struct FeedItem {
    title: String,
    url: String,
    text: String,
    published_at: Option<DateTime<Utc>>,
}

impl FeedItem {
    fn from_entry(entry: &Entry) -> Option<Self> {
        let url = entry.links.first().map(|l| l.href.clone()).unwrap_or_default();
        let title = entry.title.as_ref().map(|t| t.content.clone()).unwrap_or_default();
        if url.is_empty() {
            debug!("Skipping entry without URL: {:?}", title);
            return None;
        }

        let html = entry
            .content
            .as_ref()
            .and_then(|c| c.body.clone())
            .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()))
            .unwrap_or_default();
        // Feeds mix plain text and HTML; plain text goes through unchanged
        let text = html2text::from_read(html.as_bytes(), 120).unwrap_or(html);

        Some(Self {
            title: title.trim().to_string(),
            url,
            text,
            published_at: entry.published.or(entry.updated),
        })
    }
}

/// RSS/Atom source filtered locally by keyword and window.
///
/// A run asks once per keyword, so the parsed feed is kept until the next
/// run starts and every keyword of a run sees the same entries.
pub struct FeedCollector {
    id: String,
    url: String,
    client: Client,
    max_retries: u32,
    backoff: Duration,
    cache: Mutex<Option<Arc<Vec<FeedItem>>>>,
}

impl FeedCollector {
    pub fn new(name: &str, url: impl Into<String>, timeout_secs: u64) -> Result<Self, CollectionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("newsdigest/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            id: format!("feed:{}", name),
            url: url.into(),
            client,
            max_retries: 3,
            backoff: Duration::from_secs(1),
            cache: Mutex::new(None),
        })
    }

    /// Attempts per fetch (at least one) and the first backoff delay, doubled on every retry.
    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.backoff = backoff;
        self
    }

    async fn items(&self) -> Result<Arc<Vec<FeedItem>>, CollectionError> {
        let mut cache = self.cache.lock().await;
        if let Some(items) = cache.as_ref() {
            return Ok(items.clone());
        }

        let bytes = self.fetch().await?;
        let feed = parser::parse(bytes.as_slice()).map_err(|e| CollectionError::Parse(e.to_string()))?;
        let items: Arc<Vec<FeedItem>> = Arc::new(feed.entries.iter().filter_map(FeedItem::from_entry).collect());
        info!(source = %self.id, entries = items.len(), "feed: fetched");

        *cache = Some(items.clone());
        Ok(items)
    }

    /// Delay before retry `attempt` (the first retry is attempt 2): 1x, 2x, 4x...
    fn backoff_before(&self, attempt: u32) -> Duration {
        self.backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(2)))
    }

    /// Fetch the raw feed, retrying server errors, rate limits and network failures.
    /// Client errors (4xx) are permanent and returned at once.
    async fn fetch(&self) -> Result<Vec<u8>, CollectionError> {
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=self.max_retries {
            if attempt > 1 {
                let backoff = self.backoff_before(attempt);
                info!("Retrying feed fetch for {} (attempt {}/{}) after {:?}...", self.url, attempt, self.max_retries, backoff);
                tokio::time::sleep(backoff).await;
            }

            match self.client.get(&self.url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let bytes = response.bytes().await?;
                        return Ok(bytes.to_vec());
                    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                        last_error = format!("status {}", status);
                    } else {
                        return Err(CollectionError::Status(status));
                    }
                }
                Err(e) => {
                    last_error = format!("network error during fetch: {}", e);
                }
            }
        }

        Err(CollectionError::RetriesExhausted {
            attempts: self.max_retries,
            last: last_error,
        })
    }
}

#[async_trait::async_trait]
impl CollectionPort for FeedCollector {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start_run(&self) {
        if self.cache.lock().await.take().is_some() {
            debug!(source = %self.id, "feed: dropped entries cached by the previous run");
        }
    }

    async fn collect(&self, keyword: &str, window: TimeWindow) -> Result<Vec<RawArticle>, CollectionError> {
        let items = self.items().await?;

        let articles: Vec<RawArticle> = items
            .iter()
            .filter(|item| window.contains(item.published_at))
            .filter(|item| mentions(keyword, &[&item.title, &item.text]))
            .map(|item| RawArticle {
                source_id: self.id.clone(),
                url: item.url.clone(),
                title: item.title.clone(),
                body_snippet: snippet(&item.text, SNIPPET_CHARS),
                published_at: item.published_at,
                matched_keywords: [keyword.to_string()].into(),
                image_url: None,
            })
            .collect();

        debug!(source = %self.id, keyword, matched = articles.len(), "feed: filtered entries");
        Ok(articles)
    }
}
