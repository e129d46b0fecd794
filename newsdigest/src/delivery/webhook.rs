use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};

use super::DeliveryPort;
use crate::article::truncate;
use crate::errors::DeliveryError;
use crate::report::Report;

const OVERVIEW_CHARS: usize = 2900;
const TITLE_CHARS: usize = 100;
const ARTICLES_PER_SECTION: usize = 5;

/// Posts a Slack-compatible message (incoming webhook) summarizing the report.
pub struct WebhookDelivery {
    url: String,
    client: Client,
}

impl WebhookDelivery {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self, DeliveryError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(DeliveryError::Config("webhook URL is empty".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { url, client })
    }
}

fn mrkdwn(text: String) -> Value {
    json!({ "type": "section", "text": { "type": "mrkdwn", "text": text } })
}

pub(crate) fn payload(report: &Report) -> Value {
    let period = format!(
        "{} to {}",
        report.period_start.format("%Y-%m-%d"),
        report.period_end.format("%Y-%m-%d")
    );

    let mut blocks = vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": truncate(&report.title, 150), "emoji": true }
        }),
        json!({
            "type": "context",
            "elements": [{
                "type": "mrkdwn",
                "text": format!(
                    "*Period:* {} | *Articles:* {} | *Distinct:* {} | *Without summary:* {}",
                    period,
                    report.total_articles_considered,
                    report.total_after_dedup,
                    report.failed_summary_count
                )
            }]
        }),
    ];

    if let Some(overview) = &report.overview {
        blocks.push(json!({ "type": "divider" }));
        blocks.push(mrkdwn(truncate(overview.trim(), OVERVIEW_CHARS)));
    }

    for section in &report.sections {
        blocks.push(json!({ "type": "divider" }));
        let mut text = format!("*{}*", section.keyword);
        if section.is_empty() {
            text.push_str("\n_No articles._");
        }
        for entry in section.articles.iter().take(ARTICLES_PER_SECTION) {
            text.push_str(&format!(
                "\n• *<{}|{}>* - _{}_",
                entry.article.url,
                truncate(entry.article.title.trim(), TITLE_CHARS),
                entry.article.source_id
            ));
        }
        if section.len() > ARTICLES_PER_SECTION {
            text.push_str(&format!("\n_and {} more_", section.len() - ARTICLES_PER_SECTION));
        }
        let mut block = mrkdwn(text);
        // Slack allows one thumbnail per section block: the first listed article with an image
        let illustrated = section
            .articles
            .iter()
            .take(ARTICLES_PER_SECTION)
            .find_map(|entry| entry.article.image_url.as_deref().map(|url| (url, &entry.article.title)));
        if let Some((image_url, title)) = illustrated {
            block["accessory"] = json!({
                "type": "image",
                "image_url": image_url,
                "alt_text": truncate(title.trim(), TITLE_CHARS),
            });
        }
        blocks.push(block);
    }

    json!({
        "text": format!("{} - {}", report.title, period),
        "blocks": blocks,
    })
}

#[async_trait::async_trait]
impl DeliveryPort for WebhookDelivery {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, report: &Report) -> Result<(), DeliveryError> {
        let response = self.client.post(&self.url).json(&payload(report)).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Status { status, body });
        }
        Ok(())
    }
}
