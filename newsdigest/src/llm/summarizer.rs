// Summarization backends plugged into the orchestrator
use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, info};

use super::{extract_json_from_text, LlmProvider, LlmRequest};
use crate::article::{truncate, RawArticle, Section, SummarizedArticle};
use crate::errors::ProviderError;
use crate::summarize::SummarizationPort;

const SNIPPET_CHARS: usize = 1200;
const FOCUS_PLACEHOLDER: &str = "{focus}";

const DEFAULT_INSTRUCTIONS: &str = "You are a news editor preparing a digest. Summarize each article below.

IMPORTANT INSTRUCTIONS:
1. Write 2-3 factual sentences per article, using only the information given
2. KEEP THE ORIGINAL LANGUAGE of each article - do not translate
{focus}";

/// How summaries are asked for: the editorial instructions and an optional focus.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptStyle {
    /// Replaces the built-in instructions. `{focus}` marks where the focus line goes.
    pub instructions: Option<String>,
    pub focus: Option<String>,
}

impl PromptStyle {
    fn focus_line(&self) -> String {
        match self.focus.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
            Some(focus) => format!("FOCUS: {}\n", focus),
            None => String::new(),
        }
    }

    /// Instructions with the focus line substituted, or appended when the
    /// template has no placeholder.
    fn instructions(&self) -> String {
        let template = self.instructions.as_deref().unwrap_or(DEFAULT_INSTRUCTIONS);
        let focus = self.focus_line();
        let mut text = if template.contains(FOCUS_PLACEHOLDER) {
            template.replace(FOCUS_PLACEHOLDER, &focus)
        } else {
            format!("{}\n{}", template.trim_end(), focus)
        };
        if !text.ends_with('\n') {
            text.push('\n');
        }
        text
    }
}

/// Summarizes batches through an LLM, asking for one JSON string per article.
pub struct LlmSummarizer {
    provider: Arc<dyn LlmProvider>,
    max_tokens: usize,
    style: PromptStyle,
}

impl LlmSummarizer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            max_tokens: 1500,
            style: PromptStyle::default(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_style(mut self, style: PromptStyle) -> Self {
        self.style = style;
        self
    }
}

/// Instructions first, then the reply contract, then the numbered articles.
/// The reply contract is always ours: custom instructions cannot change it.
pub(crate) fn batch_prompt(batch: &[RawArticle], style: &PromptStyle) -> String {
    let mut prompt = style.instructions();
    let _ = writeln!(
        prompt,
        "Answer with a strict JSON array of exactly {} strings, one per article, in the same order\n",
        batch.len()
    );

    for (i, article) in batch.iter().enumerate() {
        let _ = writeln!(prompt, "### Article {}: {}", i + 1, article.title);
        let _ = writeln!(prompt, "- Source: {}", article.source_id);
        let _ = writeln!(prompt, "- URL: {}", article.url);
        match article.published_at {
            Some(at) => {
                let _ = writeln!(prompt, "- Published: {}", at.format("%Y-%m-%d %H:%M UTC"));
            }
            None => prompt.push_str("- Published: unknown\n"),
        }
        if article.has_snippet() {
            let _ = writeln!(prompt, "\n{}", truncate(article.body_snippet.trim(), SNIPPET_CHARS));
        }
        prompt.push('\n');
    }

    prompt.push_str("JSON array:");
    prompt
}

pub(crate) fn parse_batch_reply(content: &str, expected: usize) -> Result<Vec<String>, ProviderError> {
    let json = extract_json_from_text(content, '[', ']')
        .ok_or_else(|| ProviderError::Malformed("no JSON array in reply".to_string()))?;
    let summaries: Vec<String> = serde_json::from_str(&json)
        .map_err(|e| ProviderError::Malformed(format!("{} (input was: {})", e, truncate(&json, 200))))?;

    if summaries.len() != expected {
        return Err(ProviderError::CountMismatch {
            expected,
            got: summaries.len(),
        });
    }
    Ok(summaries.into_iter().map(|s| s.trim().to_string()).collect())
}

fn overview_prompt(sections: &[Section<SummarizedArticle>], style: &PromptStyle) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are a news editor. Write one short paragraph (at most 120 words) giving an overview ");
    prompt.push_str("of the main stories below. Mention the most important developments first. ");
    prompt.push_str("Plain text only, no headings or lists.\n");
    prompt.push_str(&style.focus_line());

    for section in sections {
        let summarized: Vec<&SummarizedArticle> =
            section.articles.iter().filter(|a| !a.is_failed()).collect();
        if summarized.is_empty() {
            continue;
        }
        let _ = writeln!(prompt, "\n## Topic: {}", section.keyword);
        for article in summarized {
            let _ = writeln!(prompt, "- **{}**: {}", article.article.title, article.summary_text);
        }
    }

    prompt.push_str("\nOverview:");
    prompt
}

#[async_trait::async_trait]
impl SummarizationPort for LlmSummarizer {
    async fn summarize_batch(&self, batch: &[RawArticle]) -> Result<Vec<String>, ProviderError> {
        let mut request = LlmRequest::new(batch_prompt(batch, &self.style));
        request.max_tokens = Some(self.max_tokens);
        // Lower temperature for more consistent summarization
        request.temperature = Some(0.3);

        let response = self
            .provider
            .generate(request)
            .await
            .map_err(ProviderError::Request)?;

        info!(
            model = %response.model,
            articles = batch.len(),
            tokens = response.usage.total_tokens,
            "llm: batch summarized"
        );
        parse_batch_reply(&response.content, batch.len())
    }

    async fn overview(
        &self,
        sections: &[Section<SummarizedArticle>],
    ) -> Result<Option<String>, ProviderError> {
        if sections.iter().flat_map(|s| &s.articles).all(SummarizedArticle::is_failed) {
            debug!("llm: nothing summarized, skipping overview");
            return Ok(None);
        }

        let mut request = LlmRequest::new(overview_prompt(sections, &self.style));
        request.max_tokens = Some(400);
        request.temperature = Some(0.5);

        let response = self
            .provider
            .generate(request)
            .await
            .map_err(ProviderError::Request)?;
        let text = response.content.trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }
}

/// Summarizer used when no LLM is configured: the first sentences of each
/// snippet, or the title when there is no snippet. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractiveSummarizer;

#[async_trait::async_trait]
impl SummarizationPort for ExtractiveSummarizer {
    async fn summarize_batch(&self, batch: &[RawArticle]) -> Result<Vec<String>, ProviderError> {
        Ok(batch.iter().map(extractive_summary).collect())
    }
}

fn extractive_summary(article: &RawArticle) -> String {
    let sentences: Vec<&str> = article
        .body_snippet
        .split_inclusive(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(2)
        .collect();

    if sentences.is_empty() {
        truncate(article.title.trim(), 300)
    } else {
        truncate(&sentences.join(" "), 300)
    }
}
