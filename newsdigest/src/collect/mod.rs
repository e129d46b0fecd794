use crate::article::{RawArticle, TimeWindow};
use crate::errors::CollectionError;

pub mod feed;
pub mod image;
pub mod search;

pub use feed::FeedCollector;
pub use image::{ImageLookup, OgImageFetcher};
pub use search::SearchCollector;

/// A source of articles. A failing source only loses its own contribution.
#[async_trait::async_trait]
pub trait CollectionPort: Send + Sync {
    /// Stable identifier recorded as `RawArticle::source_id`
    fn id(&self) -> &str;

    /// Called once before a run asks for its first keyword. Sources that keep
    /// anything between calls drop it here.
    async fn start_run(&self) {}

    async fn collect(&self, keyword: &str, window: TimeWindow) -> Result<Vec<RawArticle>, CollectionError>;
}

/// Case-insensitive keyword match on whole text, used by sources that cannot search.
pub fn mentions(keyword: &str, texts: &[&str]) -> bool {
    let needle = keyword.trim().to_lowercase();
    if needle.is_empty() {
        return false;
    }
    texts.iter().any(|t| t.to_lowercase().contains(&needle))
}

/// First `max_chars` characters, cut at a word boundary when one is close.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.chars().count() <= max_chars {
        return text;
    }
    let cut: String = text.chars().take(max_chars).collect();
    match cut.rfind(' ') {
        Some(idx) if idx > max_chars / 2 => format!("{}...", &cut[..idx]),
        _ => format!("{}...", cut),
    }
}
