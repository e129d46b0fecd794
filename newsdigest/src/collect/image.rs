//! Lead images for reported articles, read from the article page's
//! `og:image` / `twitter:image` meta tags.

use std::time::Duration;

use reqwest::Client;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::errors::CollectionError;

/// Substrings marking images that are page furniture rather than illustrations.
const DECORATIVE: [&str; 7] = ["icon", "logo", "avatar", "favicon", "sprite", "1x1", "pixel"];

/// Finds an image for an article URL. A miss is not an error: the article is
/// simply reported without one.
#[async_trait::async_trait]
pub trait ImageLookup: Send + Sync {
    async fn lookup(&self, page_url: &str) -> Option<String>;
}

pub struct OgImageFetcher {
    client: Client,
}

impl OgImageFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self, CollectionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("newsdigest/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl ImageLookup for OgImageFetcher {
    async fn lookup(&self, page_url: &str) -> Option<String> {
        let response = match self.client.get(page_url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!(url = page_url, status = %response.status(), "image: page not available");
                return None;
            }
            Err(e) => {
                debug!(url = page_url, error = %e, "image: fetch failed");
                return None;
            }
        };
        let body = response.text().await.ok()?;
        extract_image(&body, page_url)
    }
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(str::trim)
        .find(|content| !content.is_empty())
        .map(str::to_string)
}

fn is_decorative(src: &str) -> bool {
    let src = src.to_lowercase();
    DECORATIVE.iter().any(|marker| src.contains(marker))
}

/// Image URL announced by `html`, made absolute against `page_url`.
///
/// Preference: `og:image`, then `twitter:image`, then the first `<img>` that
/// does not look like an icon or logo.
pub fn extract_image(html: &str, page_url: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let found = meta_content(&document, "meta[property='og:image']")
        .or_else(|| meta_content(&document, "meta[name='twitter:image']"))
        .or_else(|| {
            let selector = Selector::parse("img").ok()?;
            document
                .select(&selector)
                .filter_map(|el| el.value().attr("src").or_else(|| el.value().attr("data-src")))
                .map(str::trim)
                .find(|src| !src.is_empty() && !src.starts_with("data:") && !is_decorative(src))
                .map(str::to_string)
        })?;

    match Url::parse(page_url).and_then(|base| base.join(&found)) {
        Ok(absolute) => Some(absolute.to_string()),
        Err(_) => Some(found),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "https://news.example.org/2024/03/story";

    #[test]
    fn og_image_wins_over_twitter_and_img() {
        let html = r#"<html><head>
            <meta name="twitter:image" content="https://cdn.example.org/tw.jpg">
            <meta property="og:image" content="https://cdn.example.org/og.jpg">
            </head><body><img src="/inline.jpg"></body></html>"#;
        assert_eq!(extract_image(html, PAGE).as_deref(), Some("https://cdn.example.org/og.jpg"));
    }

    #[test]
    fn twitter_image_is_the_fallback() {
        let html = r#"<html><head>
            <meta property="og:image" content="  ">
            <meta name="twitter:image" content="https://cdn.example.org/tw.jpg">
            </head></html>"#;
        assert_eq!(extract_image(html, PAGE).as_deref(), Some("https://cdn.example.org/tw.jpg"));
    }

    #[test]
    fn first_real_img_is_used_and_made_absolute() {
        let html = r#"<html><body>
            <img src="/static/site-logo.png">
            <img src="data:image/gif;base64,R0lGOD">
            <img data-src="../photos/lead.jpg">
            </body></html>"#;
        assert_eq!(
            extract_image(html, PAGE).as_deref(),
            Some("https://news.example.org/2024/photos/lead.jpg")
        );
    }

    #[test]
    fn page_without_images_gives_none() {
        assert_eq!(extract_image("<html><body><p>text only</p></body></html>", PAGE), None);
        assert_eq!(extract_image("<img src=\"/favicon.ico\">", PAGE), None);
    }

    #[tokio::test]
    async fn fetcher_reads_the_page_and_tolerates_errors() {
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("GET", "/story")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(r#"<html><head><meta property="og:image" content="/img/lead.png"></head></html>"#)
            .create_async()
            .await;
        let _missing = server.mock("GET", "/gone").with_status(404).create_async().await;

        let fetcher = OgImageFetcher::new(5).unwrap();
        assert_eq!(
            fetcher.lookup(&format!("{}/story", server.url())).await,
            Some(format!("{}/img/lead.png", server.url()))
        );
        assert_eq!(fetcher.lookup(&format!("{}/gone", server.url())).await, None);
    }
}
