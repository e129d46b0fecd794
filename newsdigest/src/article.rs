use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An article as produced by a collector, before any normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawArticle {
    /// Which collector produced the record
    pub source_id: String,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub body_snippet: String,
    pub published_at: Option<DateTime<Utc>>,
    pub matched_keywords: BTreeSet<String>,
    /// Lead image, from the source itself or the page's `og:image`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl RawArticle {
    pub fn new(
        source_id: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        keyword: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            url: url.into(),
            title: title.into(),
            body_snippet: String::new(),
            published_at: None,
            matched_keywords: BTreeSet::from([keyword.into()]),
            image_url: None,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.body_snippet = snippet.into();
        self
    }

    pub fn published(mut self, at: DateTime<Utc>) -> Self {
        self.published_at = Some(at);
        self
    }

    pub fn with_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    pub fn has_snippet(&self) -> bool {
        !self.body_snippet.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStatus {
    Ok,
    Failed,
}

/// A cluster representative together with the outcome of its summarization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizedArticle {
    pub article: RawArticle,
    pub summary_text: String,
    pub summary_status: SummaryStatus,
}

impl SummarizedArticle {
    pub fn ok(article: RawArticle, summary_text: impl Into<String>) -> Self {
        Self {
            article,
            summary_text: summary_text.into(),
            summary_status: SummaryStatus::Ok,
        }
    }

    pub fn failed(article: RawArticle) -> Self {
        Self {
            article,
            summary_text: String::new(),
            summary_status: SummaryStatus::Failed,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.summary_status == SummaryStatus::Failed
    }
}

/// Per-keyword grouping. Sections are views: one article may appear under several keywords.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section<T> {
    pub keyword: String,
    pub articles: Vec<T>,
}

impl<T> Section<T> {
    pub fn new(keyword: impl Into<String>, articles: Vec<T>) -> Self {
        Self {
            keyword: keyword.into(),
            articles,
        }
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

/// Collection window handed over by the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window ending at `end` and reaching `hours` back.
    pub fn lookback(end: DateTime<Utc>, hours: u64) -> Self {
        Self {
            start: end - Duration::hours(hours as i64),
            end,
        }
    }

    /// Unknown publication dates are accepted; sources are not trusted to provide them.
    pub fn contains(&self, at: Option<DateTime<Utc>>) -> bool {
        match at {
            Some(t) => t >= self.start && t <= self.end,
            None => true,
        }
    }

    /// Window length in whole days, rounded up, at least one.
    pub fn days(&self) -> i64 {
        let secs = (self.end - self.start).num_seconds().max(0);
        ((secs + 86_399) / 86_400).max(1)
    }
}

/// Char-boundary safe truncation with a trailing ellipsis.
pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_contains_and_days() {
        let end = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let window = TimeWindow::lookback(end, 36);

        assert!(window.contains(Some(end - Duration::hours(1))));
        assert!(!window.contains(Some(end - Duration::hours(37))));
        assert!(window.contains(None));
        assert_eq!(window.days(), 2);
        assert_eq!(TimeWindow::new(end, end).days(), 1);
    }

    #[test]
    fn whitespace_snippet_counts_as_empty() {
        let a = RawArticle::new("feed", "https://a.example/x", "Title", "rust").with_snippet("  \n ");
        assert!(!a.has_snippet());
        assert!(a.clone().with_snippet("body").has_snippet());
    }

    #[test]
    fn summary_status_serializes_lowercase() {
        let a = RawArticle::new("feed", "https://a.example/x", "Title", "rust");
        let json = serde_json::to_string(&SummarizedArticle::failed(a)).unwrap();
        assert!(json.contains("\"summary_status\":\"failed\""));
        assert!(json.contains("\"summary_text\":\"\""));
    }

    #[test]
    fn truncation_is_char_safe() {
        let long = "é".repeat(400);
        let cut = truncate(&long, 300);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), 300);
        assert_eq!(truncate("short", 300), "short");
    }
}
