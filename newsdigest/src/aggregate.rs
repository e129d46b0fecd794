use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use common::Caps;

use crate::article::{RawArticle, Section};
use crate::dedup::ArticleCluster;

/// Most recent first; unknown timestamps after every known one.
fn by_recency(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Group cluster representatives into one section per declared keyword.
///
/// A cluster belongs to every keyword any of its members matched, not only
/// the representative's: a story found under two keywords by two sources stays
/// listed under both.
///
/// Sections come out in `keywords` order, each sorted newest first and cut to
/// `caps.max_per_keyword`. `caps.max_total` then drops the oldest entries across
/// all sections; on equal timestamps the later section loses. Zero caps are
/// legal and just produce empty sections.
pub fn aggregate(clusters: &[ArticleCluster], keywords: &[String], caps: Caps) -> Vec<Section<RawArticle>> {
    let mut declared: Vec<&str> = Vec::with_capacity(keywords.len());
    for keyword in keywords {
        if !declared.contains(&keyword.as_str()) {
            declared.push(keyword);
        }
    }

    let mut sections: Vec<Section<RawArticle>> = declared
        .iter()
        .map(|keyword| {
            let mut articles: Vec<RawArticle> = clusters
                .iter()
                .filter(|c| c.matched_keywords().contains(keyword))
                .map(|c| c.representative().clone())
                .collect();
            // Stable: equal timestamps keep cluster (first-seen) order
            articles.sort_by(|a, b| by_recency(a.published_at, b.published_at));
            articles.truncate(caps.max_per_keyword);
            Section::new(*keyword, articles)
        })
        .collect();

    if let Some(max_total) = caps.max_total {
        apply_total_cap(&mut sections, max_total);
    }

    sections
}

fn apply_total_cap(sections: &mut [Section<RawArticle>], max_total: usize) {
    let total: usize = sections.iter().map(Section::len).sum();
    if total <= max_total {
        return;
    }

    // (section, position, published_at) for every entry, best first
    let mut entries: Vec<(usize, usize, Option<DateTime<Utc>>)> = sections
        .iter()
        .enumerate()
        .flat_map(|(s, section)| {
            section
                .articles
                .iter()
                .enumerate()
                .map(move |(p, a)| (s, p, a.published_at))
        })
        .collect();
    entries.sort_by(|a, b| by_recency(a.2, b.2).then(a.0.cmp(&b.0)).then(a.1.cmp(&b.1)));

    let mut keep: Vec<Vec<bool>> = sections.iter().map(|s| vec![false; s.len()]).collect();
    for &(s, p, _) in entries.iter().take(max_total) {
        keep[s][p] = true;
    }

    for (section, keep) in sections.iter_mut().zip(keep) {
        let mut flags = keep.into_iter();
        section.articles.retain(|_| flags.next().unwrap_or(false));
    }
}
