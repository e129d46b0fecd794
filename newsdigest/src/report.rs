use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::article::{Section, SummarizedArticle, TimeWindow};

/// Where the report's articles came from, before deduplication.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionStats {
    /// Raw records returned by all sources
    pub raw_articles: usize,
    /// Distinct stories after deduplication
    pub clusters: usize,
    /// `source_id: keyword: error` for every collection that failed
    pub failed_sources: Vec<String>,
}

/// Identity and free-form parts of a report that are not derived from sections.
#[derive(Debug, Clone)]
pub struct ReportMeta {
    pub run_id: Uuid,
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub overview: Option<String>,
    pub collection: CollectionStats,
}

impl ReportMeta {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            title: title.into(),
            generated_at: Utc::now(),
            overview: None,
            collection: CollectionStats::default(),
        }
    }
}

/// The terminal artifact of a run. Delivery channels only ever see `&Report`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub run_id: Uuid,
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub overview: Option<String>,
    pub sections: Vec<Section<SummarizedArticle>>,
    /// Entries across all sections; an article listed under two keywords counts twice
    pub total_articles_considered: usize,
    /// Distinct articles across all sections
    pub total_after_dedup: usize,
    /// Entries whose summary failed
    pub failed_summary_count: usize,
    pub collection: CollectionStats,
}

/// Counters as recomputed from `sections`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionCounts {
    pub total_articles_considered: usize,
    pub total_after_dedup: usize,
    pub failed_summary_count: usize,
}

pub fn count_sections(sections: &[Section<SummarizedArticle>]) -> SectionCounts {
    let entries = || sections.iter().flat_map(|s| s.articles.iter());
    SectionCounts {
        total_articles_considered: entries().count(),
        total_after_dedup: entries().map(|a| a.article.url.as_str()).collect::<HashSet<_>>().len(),
        failed_summary_count: entries().filter(|a| a.is_failed()).count(),
    }
}

/// Build the report. Counters are always derived from `sections`, never passed in.
pub fn assemble(sections: Vec<Section<SummarizedArticle>>, window: TimeWindow, meta: ReportMeta) -> Report {
    let counts = count_sections(&sections);
    Report {
        run_id: meta.run_id,
        title: meta.title,
        generated_at: meta.generated_at,
        period_start: window.start,
        period_end: window.end,
        overview: meta.overview,
        sections,
        total_articles_considered: counts.total_articles_considered,
        total_after_dedup: counts.total_after_dedup,
        failed_summary_count: counts.failed_summary_count,
        collection: meta.collection,
    }
}

impl Report {
    pub fn counts(&self) -> SectionCounts {
        SectionCounts {
            total_articles_considered: self.total_articles_considered,
            total_after_dedup: self.total_after_dedup,
            failed_summary_count: self.failed_summary_count,
        }
    }

    pub fn empty_sections(&self) -> impl Iterator<Item = &str> {
        self.sections
            .iter()
            .filter(|s| s.is_empty())
            .map(|s| s.keyword.as_str())
    }

    pub fn is_degraded(&self) -> bool {
        self.failed_summary_count > 0 || !self.collection.failed_sources.is_empty()
    }
}
