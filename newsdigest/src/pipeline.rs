//! One digest run: collect, deduplicate, aggregate, summarize, assemble.
//! Delivery is a separate step so callers decide what to do with an empty
//! or degraded report.

use std::collections::HashMap;
use std::sync::Arc;

use common::PipelineSettings;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::aggregate::aggregate;
use crate::article::{RawArticle, Section, TimeWindow};
use crate::collect::{CollectionPort, ImageLookup};
use crate::dedup::Deduplicator;
use crate::delivery::{fan_out, DeliveryPort, DeliverySummary};
use crate::errors::PipelineError;
use crate::report::{assemble, CollectionStats, Report, ReportMeta};
use crate::summarize::{summarize, BatchOptions, SummarizationPort};

pub struct Pipeline {
    collectors: Vec<Arc<dyn CollectionPort>>,
    summarizer: Arc<dyn SummarizationPort>,
    channels: Vec<Arc<dyn DeliveryPort>>,
    images: Option<(Arc<dyn ImageLookup>, usize)>,
}

impl Pipeline {
    pub fn new(summarizer: Arc<dyn SummarizationPort>) -> Self {
        Self {
            collectors: Vec::new(),
            summarizer,
            channels: Vec::new(),
            images: None,
        }
    }

    /// Look up a lead image for reported articles that came without one,
    /// at most `max_concurrent` lookups at a time.
    pub fn with_image_lookup(mut self, lookup: Arc<dyn ImageLookup>, max_concurrent: usize) -> Self {
        self.images = Some((lookup, max_concurrent.max(1)));
        self
    }

    pub fn with_collector(mut self, collector: Arc<dyn CollectionPort>) -> Self {
        self.collectors.push(collector);
        self
    }

    pub fn with_channel(mut self, channel: Arc<dyn DeliveryPort>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn collectors(&self) -> usize {
        self.collectors.len()
    }

    pub fn channels(&self) -> usize {
        self.channels.len()
    }

    /// Run every stage for `keywords` over `window` and build the report.
    ///
    /// Fails only when cancelled before collection starts, or when no source
    /// returned a single article.
    pub async fn run(
        &self,
        window: TimeWindow,
        keywords: &[String],
        settings: &PipelineSettings,
        cancel: &CancellationToken,
    ) -> Result<Report, PipelineError> {
        let mut meta = ReportMeta::new(settings.report_title.clone());
        let span = info_span!("run", run_id = %meta.run_id);

        async move {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            info!(
                keywords = keywords.len(),
                collectors = self.collectors.len(),
                start = %window.start,
                end = %window.end,
                "run: collecting"
            );

            let (articles, failed_sources) = self.collect(window, keywords).await;
            if articles.is_empty() {
                warn!(failed_sources = failed_sources.len(), "run: no articles collected");
                return Err(PipelineError::NoArticles {
                    keywords: keywords.len(),
                    failed_sources: failed_sources.len(),
                });
            }
            let raw_articles = articles.len();

            let clusters = Deduplicator::new(settings.title_similarity_threshold).deduplicate(articles);
            info!(raw = raw_articles, clusters = clusters.len(), "run: deduplicated");

            let mut sections = aggregate(&clusters, keywords, settings.caps);
            if let Some((lookup, max_concurrent)) = &self.images {
                if !cancel.is_cancelled() {
                    attach_images(&mut sections, lookup.as_ref(), *max_concurrent).await;
                }
            }
            let options = BatchOptions {
                batch_size: settings.batch_size,
                max_concurrent: settings.max_concurrent_batches,
            };
            let summarized = summarize(sections, self.summarizer.as_ref(), options, cancel).await;

            if !cancel.is_cancelled() {
                match self.summarizer.overview(&summarized.sections).await {
                    Ok(overview) => meta.overview = overview,
                    Err(e) => warn!(error = %e, "run: overview failed, report goes out without one"),
                }
            }

            meta.collection = CollectionStats {
                raw_articles,
                clusters: clusters.len(),
                failed_sources,
            };
            let failed_batches = summarized.failed_batches();
            let report = assemble(summarized.sections, window, meta);
            info!(
                considered = report.total_articles_considered,
                distinct = report.total_after_dedup,
                failed_summaries = report.failed_summary_count,
                failed_batches,
                "run: report assembled"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Ask every collector for every keyword. Failures are logged and
    /// returned as `source: keyword: error` lines.
    async fn collect(&self, window: TimeWindow, keywords: &[String]) -> (Vec<RawArticle>, Vec<String>) {
        let mut articles = Vec::new();
        let mut failed = Vec::new();

        for collector in &self.collectors {
            collector.start_run().await;
        }

        for keyword in keywords {
            for collector in &self.collectors {
                match collector.collect(keyword, window).await {
                    Ok(found) => {
                        info!(source = collector.id(), keyword = %keyword, count = found.len(), "collect: done");
                        articles.extend(found.into_iter().map(|mut article| {
                            article.matched_keywords.insert(keyword.clone());
                            article
                        }));
                    }
                    Err(e) => {
                        warn!(source = collector.id(), keyword = %keyword, error = %e, "collect: source failed, skipping");
                        failed.push(format!("{}: {}: {}", collector.id(), keyword, e));
                    }
                }
            }
        }

        (articles, failed)
    }

    /// Offer the report to every configured channel.
    pub async fn deliver(&self, report: &Report) -> DeliverySummary {
        fan_out(&self.channels, report).await
    }
}

/// Fill `image_url` for reported articles without one. Each distinct URL is
/// looked up once even when it appears under several keywords.
async fn attach_images(sections: &mut [Section<RawArticle>], lookup: &dyn ImageLookup, max_concurrent: usize) {
    let mut pending: Vec<String> = Vec::new();
    for article in sections.iter().flat_map(|s| &s.articles) {
        if article.image_url.is_none() && !pending.contains(&article.url) {
            pending.push(article.url.clone());
        }
    }
    if pending.is_empty() {
        return;
    }

    let found: HashMap<String, String> = stream::iter(pending)
        .map(|url| async move {
            let image = lookup.lookup(&url).await;
            image.map(|image| (url, image))
        })
        .buffer_unordered(max_concurrent)
        .filter_map(|hit| async move { hit })
        .collect()
        .await;
    debug!(found = found.len(), "images: lookups done");

    for article in sections.iter_mut().flat_map(|s| s.articles.iter_mut()) {
        if article.image_url.is_none() {
            article.image_url = found.get(&article.url).cloned();
        }
    }
}
