//! Greedy single-pass clustering of articles that tell the same story.
//!
//! Articles are visited in input order and compared with every cluster formed
//! so far; the first cluster that already holds the canonical URL, or whose
//! representative's normalized title is similar enough, absorbs the article. This is O(n²) over one run's batch, which stays in the hundreds.

use std::collections::BTreeSet;

use tracing::debug;

use crate::article::RawArticle;
use crate::normalize::{normalize, NormalizedKey};

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterMember {
    /// Position of the article in the deduplicator's input
    pub input_index: usize,
    pub article: RawArticle,
}

/// Articles judged identical, with one representative standing for all of them.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleCluster {
    members: Vec<ClusterMember>,
    representative: usize,
    key: NormalizedKey,
    /// Canonical URLs of every member, not just the representative
    urls: BTreeSet<String>,
}

impl ArticleCluster {
    fn new(input_index: usize, article: RawArticle, key: NormalizedKey) -> Self {
        Self {
            members: vec![ClusterMember { input_index, article }],
            representative: 0,
            urls: BTreeSet::from([key.canonical_url.clone()]),
            key,
        }
    }

    pub fn representative(&self) -> &RawArticle {
        &self.members[self.representative].article
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn members(&self) -> &[ClusterMember] {
        &self.members
    }

    pub fn input_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.members.iter().map(|m| m.input_index)
    }

    /// Union of every member's keywords. A story found under two keywords stays
    /// visible under both even though only one record represents it.
    pub fn matched_keywords(&self) -> BTreeSet<&str> {
        self.members
            .iter()
            .flat_map(|m| m.article.matched_keywords.iter().map(String::as_str))
            .collect()
    }

    fn add(&mut self, input_index: usize, article: RawArticle, key: NormalizedKey) {
        self.members.push(ClusterMember { input_index, article });
        self.urls.insert(key.canonical_url.clone());
        let newest = self.members.len() - 1;
        if rank(&self.members[newest]) < rank(&self.members[self.representative]) {
            self.representative = newest;
            self.key = key;
        }
    }
}

/// Lower ranks win: a body snippet first, then the earliest known timestamp,
/// then first seen. Unknown timestamps sort after every known one.
fn rank(member: &ClusterMember) -> (bool, bool, Option<chrono::DateTime<chrono::Utc>>, usize) {
    let article = &member.article;
    (
        !article.has_snippet(),
        article.published_at.is_none(),
        article.published_at,
        member.input_index,
    )
}

/// Length-normalized Levenshtein similarity in [0, 1]. Empty titles carry no
/// information and never match anything.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(a, b)
}

#[derive(Debug, Clone, Copy)]
pub struct Deduplicator {
    threshold: f64,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(common::DEFAULT_TITLE_SIMILARITY_THRESHOLD)
    }
}

impl Deduplicator {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    fn is_same_story(&self, candidate: &NormalizedKey, cluster: &ArticleCluster) -> bool {
        cluster.urls.contains(&candidate.canonical_url)
            || title_similarity(&candidate.normalized_title, &cluster.key.normalized_title)
                >= self.threshold
    }

    /// Partition `articles` into clusters; every input lands in exactly one.
    pub fn deduplicate(&self, articles: Vec<RawArticle>) -> Vec<ArticleCluster> {
        let mut clusters: Vec<ArticleCluster> = Vec::new();

        for (input_index, article) in articles.into_iter().enumerate() {
            let key = normalize(&article);
            match clusters.iter_mut().find(|c| self.is_same_story(&key, c)) {
                Some(cluster) => {
                    debug!(
                        url = %article.url,
                        representative = %cluster.representative().url,
                        "dedup: merging duplicate article"
                    );
                    cluster.add(input_index, article, key);
                }
                None => clusters.push(ArticleCluster::new(input_index, article, key)),
            }
        }

        clusters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn article(url: &str, title: &str) -> RawArticle {
        RawArticle::new("test", url, title, "economy")
    }

    #[test]
    fn empty_input_gives_no_clusters() {
        assert!(Deduplicator::default().deduplicate(Vec::new()).is_empty());
    }

    #[test]
    fn same_url_modulo_case_and_slash_is_one_cluster() {
        let clusters = Deduplicator::default().deduplicate(vec![
            article("https://News.example.com/story/", "Markets rally on jobs data"),
            article("http://news.example.com/story", "Completely different wording here"),
        ]);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].member_count(), 2);
    }

    #[test]
    fn near_identical_titles_are_one_cluster() {
        let clusters = Deduplicator::default().deduplicate(vec![
            article("https://a.example/1", "Fed announces rate cut"),
            article("https://b.example/2", "Fed announces rate cuts"),
        ]);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].member_count(), 2);
    }

    #[test]
    fn dissimilar_titles_with_different_urls_stay_apart() {
        let clusters = Deduplicator::default().deduplicate(vec![
            article("https://a.example/1", "Fed announces rate cut"),
            article("https://b.example/2", "Local team wins championship"),
            article("https://c.example/3", ""),
            article("https://d.example/4", ""),
        ]);
        assert_eq!(clusters.len(), 4);
        assert!(clusters.iter().all(|c| c.member_count() == 1));
    }

    #[test]
    fn clusters_partition_the_input() {
        let input = vec![
            article("https://a.example/1", "Fed announces rate cut"),
            article("https://b.example/2", "Oil prices climb"),
            article("https://a.example/1?utm_source=rss", "Something else"),
            article("https://c.example/3", "Oil prices climb!"),
            article("https://d.example/4", "Elections tomorrow"),
        ];
        let len = input.len();
        let clusters = Deduplicator::default().deduplicate(input);

        let total: usize = clusters.iter().map(|c| c.member_count()).sum();
        assert_eq!(total, len);

        let mut seen: Vec<usize> = clusters.iter().flat_map(|c| c.input_indices()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..len).collect::<Vec<_>>());
        assert_eq!(clusters.len(), 3);
    }

    #[test]
    fn representative_prefers_snippet_then_earliest_then_first_seen() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        let input = vec![
            article("https://x.example/a", "Fed announces rate cut").published(early),
            article("https://x.example/a/", "Fed announces rate cut").with_snippet("body").published(late),
            article("http://x.example/a", "Fed announces rate cut").with_snippet("body").published(early),
            article("https://x.example/a", "Fed announces rate cut").with_snippet("body"),
        ];
        let clusters = Deduplicator::default().deduplicate(input.clone());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].representative(), &input[2]);

        // Same input, same choice
        let again = Deduplicator::default().deduplicate(input.clone());
        assert_eq!(again[0].representative(), clusters[0].representative());
    }

    #[test]
    fn url_of_a_former_representative_still_matches() {
        let input = vec![
            article("https://a.example/story", "Fed announces rate cut"),
            article("https://b.example/other", "Fed announces rate cuts").with_snippet("body"),
            article("https://a.example/story/", "Totally unrelated headline"),
        ];
        let clusters = Deduplicator::default().deduplicate(input.clone());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].member_count(), 3);
        assert_eq!(clusters[0].representative(), &input[1]);
    }

    #[test]
    fn unknown_timestamps_lose_ties_and_first_seen_breaks_the_rest() {
        let input = vec![
            article("https://x.example/a", "Same story").with_snippet("one"),
            article("https://x.example/a", "Same story").with_snippet("two"),
        ];
        let clusters = Deduplicator::default().deduplicate(input.clone());
        assert_eq!(clusters[0].representative(), &input[0]);

        let at = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let input = vec![
            article("https://x.example/a", "Same story").with_snippet("one"),
            article("https://x.example/a", "Same story").with_snippet("two").published(at),
        ];
        let clusters = Deduplicator::default().deduplicate(input.clone());
        assert_eq!(clusters[0].representative(), &input[1]);
    }

    #[test]
    fn cluster_keywords_are_the_union_of_members() {
        let mut second = article("https://x.example/a", "Same story");
        second.matched_keywords = ["politics".to_string()].into();
        let clusters = Deduplicator::default()
            .deduplicate(vec![article("https://x.example/a", "Same story"), second]);
        let keywords: Vec<&str> = clusters[0].matched_keywords().into_iter().collect();
        assert_eq!(keywords, vec!["economy", "politics"]);
    }

    #[test]
    fn threshold_is_configurable() {
        let input = vec![
            article("https://a.example/1", "Fed announces rate cut"),
            article("https://b.example/2", "Fed announces rate cuts"),
        ];
        assert_eq!(Deduplicator::new(0.99).deduplicate(input.clone()).len(), 2);
        assert_eq!(Deduplicator::new(0.5).deduplicate(input).len(), 1);
    }

    #[test]
    fn similarity_bounds() {
        assert_eq!(title_similarity("same", "same"), 1.0);
        assert_eq!(title_similarity("", ""), 0.0);
        assert!(title_similarity("fed announces rate cut", "local team wins") < 0.5);
    }
}
