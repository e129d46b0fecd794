//! Summarization orchestrator: splits the aggregated articles into bounded
//! batches, submits each batch once, and maps the answers back by position.
//!
//! A failed batch only degrades its own articles to `failed`; sibling batches
//! and the run carry on. Retries belong to the `SummarizationPort`.

use std::collections::HashMap;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::article::{RawArticle, Section, SummarizedArticle};
use crate::errors::ProviderError;

/// Summarization capability consumed by the pipeline.
#[async_trait::async_trait]
pub trait SummarizationPort: Send + Sync {
    /// One summary per article, in the same order as `batch`.
    async fn summarize_batch(&self, batch: &[RawArticle]) -> Result<Vec<String>, ProviderError>;

    /// Optional digest paragraph over the whole report.
    async fn overview(
        &self,
        _sections: &[Section<SummarizedArticle>],
    ) -> Result<Option<String>, ProviderError> {
        Ok(None)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub max_concurrent: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: common::DEFAULT_BATCH_SIZE,
            max_concurrent: 1,
        }
    }
}

/// What happened to one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatus {
    Summarized,
    Failed(String),
    /// Not submitted because the run was cancelled first
    Skipped,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub index: usize,
    pub size: usize,
    pub status: BatchStatus,
}

#[derive(Debug, Clone)]
pub struct Summarized {
    pub sections: Vec<Section<SummarizedArticle>>,
    pub batches: Vec<BatchOutcome>,
}

impl Summarized {
    pub fn failed_batches(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| b.status != BatchStatus::Summarized)
            .count()
    }
}

/// Summarize every article of `sections`, preserving section and article order.
///
/// An article listed under several keywords is summarized once. Cancellation
/// is observed before each batch starts; batches already in flight finish.
pub async fn summarize(
    sections: Vec<Section<RawArticle>>,
    port: &dyn SummarizationPort,
    options: BatchOptions,
    cancel: &CancellationToken,
) -> Summarized {
    // Unique articles in first-appearance order
    let mut unique: Vec<&RawArticle> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();
    for article in sections.iter().flat_map(|s| s.articles.iter()) {
        if !position.contains_key(&article.url) {
            position.insert(article.url.clone(), unique.len());
            unique.push(article);
        }
    }
    let unique_count = unique.len();

    let batch_size = options.batch_size.max(1);
    let batches: Vec<Vec<RawArticle>> = unique
        .chunks(batch_size)
        .map(|chunk| chunk.iter().map(|a| (*a).clone()).collect())
        .collect();
    info!(
        articles = unique_count,
        batches = batches.len(),
        batch_size,
        "summarize: submitting batches"
    );

    // `buffered` yields results in submission order whatever the completion order
    let results: Vec<(BatchOutcome, Option<Vec<String>>)> = stream::iter(batches.iter().enumerate())
        .map(|(index, batch)| run_batch(index, batch, port, cancel))
        .buffered(options.max_concurrent.max(1))
        .collect()
        .await;

    let mut texts: Vec<Option<String>> = vec![None; unique_count];
    let mut outcomes = Vec::with_capacity(results.len());
    for (outcome, summaries) in results {
        if let Some(summaries) = summaries {
            let start = outcome.index * batch_size;
            for (offset, text) in summaries.into_iter().enumerate() {
                texts[start + offset] = Some(text);
            }
        }
        outcomes.push(outcome);
    }

    let sections = sections
        .into_iter()
        .map(|section| {
            let articles = section
                .articles
                .into_iter()
                .map(|article| {
                    let text = position
                        .get(article.url.as_str())
                        .and_then(|&i| texts[i].clone());
                    match text {
                        Some(text) => SummarizedArticle::ok(article, text),
                        None => SummarizedArticle::failed(article),
                    }
                })
                .collect();
            Section::new(section.keyword, articles)
        })
        .collect();

    Summarized {
        sections,
        batches: outcomes,
    }
}

async fn run_batch(
    index: usize,
    batch: &[RawArticle],
    port: &dyn SummarizationPort,
    cancel: &CancellationToken,
) -> (BatchOutcome, Option<Vec<String>>) {
    let outcome = |status| BatchOutcome {
        index,
        size: batch.len(),
        status,
    };

    if cancel.is_cancelled() {
        warn!(batch = index, size = batch.len(), "summarize: run cancelled, batch not submitted");
        return (outcome(BatchStatus::Skipped), None);
    }

    let result = port.summarize_batch(batch).await.and_then(|summaries| {
        if summaries.len() == batch.len() {
            Ok(summaries)
        } else {
            Err(ProviderError::CountMismatch {
                expected: batch.len(),
                got: summaries.len(),
            })
        }
    });

    match result {
        Ok(summaries) => (outcome(BatchStatus::Summarized), Some(summaries)),
        Err(e) => {
            warn!(batch = index, size = batch.len(), error = %e, "summarize: batch failed, marking its articles failed");
            (outcome(BatchStatus::Failed(e.to_string())), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::SummaryStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the batches whose index is listed, echoes titles otherwise.
    struct ScriptedPort {
        failing: Vec<usize>,
        calls: AtomicUsize,
    }

    impl ScriptedPort {
        fn new(failing: Vec<usize>) -> Self {
            Self {
                failing,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl SummarizationPort for ScriptedPort {
        async fn summarize_batch(&self, batch: &[RawArticle]) -> Result<Vec<String>, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(&call) {
                return Err(ProviderError::Malformed("scripted failure".into()));
            }
            Ok(batch.iter().map(|a| format!("summary of {}", a.title)).collect())
        }
    }

    fn section(keyword: &str, ids: &[usize]) -> Section<RawArticle> {
        Section::new(
            keyword,
            ids.iter()
                .map(|i| RawArticle::new("t", format!("https://n.example/{i}"), format!("title {i}"), keyword))
                .collect(),
        )
    }

    fn options(batch_size: usize) -> BatchOptions {
        BatchOptions {
            batch_size,
            max_concurrent: 1,
        }
    }

    #[tokio::test]
    async fn failed_batch_only_degrades_its_own_articles() {
        let port = ScriptedPort::new(vec![1]);
        let sections = vec![section("a", &[1, 2, 3, 4, 5, 6, 7])];

        let out = summarize(sections, &port, options(3), &CancellationToken::new()).await;
        let statuses: Vec<SummaryStatus> = out.sections[0].articles.iter().map(|a| a.summary_status).collect();

        use SummaryStatus as S;
        assert_eq!(statuses, vec![S::Ok, S::Ok, S::Ok, S::Failed, S::Failed, S::Failed, S::Ok]);
        assert_eq!(out.sections[0].articles[3].summary_text, "");
        assert_eq!(out.sections[0].articles[6].summary_text, "summary of title 7");
        assert_eq!(out.failed_batches(), 1);
        assert_eq!(out.batches.len(), 3);
    }

    #[tokio::test]
    async fn shared_articles_are_summarized_once_and_order_is_kept() {
        let port = ScriptedPort::new(vec![]);
        let sections = vec![section("a", &[1, 2]), section("b", &[2, 3])];

        let out = summarize(sections, &port, options(10), &CancellationToken::new()).await;
        assert_eq!(port.calls.load(Ordering::SeqCst), 1);

        let titles: Vec<Vec<&str>> = out
            .sections
            .iter()
            .map(|s| s.articles.iter().map(|a| a.summary_text.as_str()).collect())
            .collect();
        assert_eq!(
            titles,
            vec![
                vec!["summary of title 1", "summary of title 2"],
                vec!["summary of title 2", "summary of title 3"],
            ]
        );
    }

    #[tokio::test]
    async fn wrong_summary_count_fails_the_batch() {
        struct ShortPort;

        #[async_trait::async_trait]
        impl SummarizationPort for ShortPort {
            async fn summarize_batch(&self, _batch: &[RawArticle]) -> Result<Vec<String>, ProviderError> {
                Ok(vec!["only one".to_string()])
            }
        }

        let out = summarize(vec![section("a", &[1, 2])], &ShortPort, options(5), &CancellationToken::new()).await;
        assert!(out.sections[0].articles.iter().all(SummarizedArticle::is_failed));
        assert!(matches!(out.batches[0].status, BatchStatus::Failed(_)));
    }

    #[tokio::test]
    async fn cancelled_run_skips_remaining_batches() {
        let port = ScriptedPort::new(vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let out = summarize(vec![section("a", &[1, 2, 3])], &port, options(2), &cancel).await;
        assert_eq!(port.calls.load(Ordering::SeqCst), 0);
        assert_eq!(out.sections[0].len(), 3);
        assert!(out.batches.iter().all(|b| b.status == BatchStatus::Skipped));
    }

    #[tokio::test]
    async fn concurrent_batches_are_reassembled_by_index() {
        struct SlowFirst;

        #[async_trait::async_trait]
        impl SummarizationPort for SlowFirst {
            async fn summarize_batch(&self, batch: &[RawArticle]) -> Result<Vec<String>, ProviderError> {
                if batch[0].title == "title 1" {
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                }
                Ok(batch.iter().map(|a| a.title.clone()).collect())
            }
        }

        let opts = BatchOptions {
            batch_size: 1,
            max_concurrent: 4,
        };
        let out = summarize(vec![section("a", &[1, 2, 3])], &SlowFirst, opts, &CancellationToken::new()).await;
        let texts: Vec<&str> = out.sections[0].articles.iter().map(|a| a.summary_text.as_str()).collect();
        assert_eq!(texts, vec!["title 1", "title 2", "title 3"]);
    }

    #[tokio::test]
    async fn empty_sections_make_no_calls() {
        let port = ScriptedPort::new(vec![]);
        let out = summarize(vec![section("a", &[])], &port, options(3), &CancellationToken::new()).await;
        assert_eq!(port.calls.load(Ordering::SeqCst), 0);
        assert!(out.sections[0].is_empty());
        assert!(out.batches.is_empty());
    }
}
