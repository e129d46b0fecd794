//! Canonical forms of URLs and titles used to compare articles.
//!
//! Nothing here fails: sources are not trusted to hand out well-formed URLs,
//! so anything `url` cannot parse falls back to plain string surgery.

use url::Url;

use crate::article::RawArticle;

/// Query parameters that only identify how a reader got to the page.
const TRACKING_PARAMS: &[&str] = &[
    "ref", "ref_src", "ref_url", "fbclid", "gclid", "dclid", "msclkid", "mc_cid", "mc_eid",
    "igshid", "cmpid", "smid", "at_medium", "at_campaign",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedKey {
    pub canonical_url: String,
    pub normalized_title: String,
}

pub fn normalize(raw: &RawArticle) -> NormalizedKey {
    NormalizedKey {
        canonical_url: canonical_url(&raw.url),
        normalized_title: normalize_title(&raw.title),
    }
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Scheme-less, lower-cased URL with tracking parameters, fragment and trailing slash removed.
pub fn canonical_url(raw: &str) -> String {
    let trimmed = raw.trim();

    let parsed = Url::parse(trimmed)
        .or_else(|_| Url::parse(&format!("http://{}", trimmed)))
        .ok()
        .filter(|u| u.host_str().is_some());

    match parsed {
        Some(url) => from_parsed(&url),
        None => fallback_canonical(trimmed),
    }
}

fn from_parsed(url: &Url) -> String {
    let mut out = String::new();
    out.push_str(url.host_str().unwrap_or_default());
    if let Some(port) = url.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }
    out.push_str(url.path().trim_end_matches('/'));

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !kept.is_empty() {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(kept)
            .finish();
        out.push('?');
        out.push_str(&query);
    }

    out.to_lowercase()
}

fn fallback_canonical(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let without_scheme = match lowered.find("://") {
        Some(idx) => &lowered[idx + 3..],
        None => lowered.as_str(),
    };
    let without_fragment = without_scheme.split('#').next().unwrap_or_default();

    let (path, query) = match without_fragment.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (without_fragment, None),
    };

    let mut out = path.trim_end_matches('/').to_string();
    if let Some(query) = query {
        let kept: Vec<&str> = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter(|pair| !is_tracking_param(pair.split('=').next().unwrap_or_default()))
            .collect();
        if !kept.is_empty() {
            out.push('?');
            out.push_str(&kept.join("&"));
        }
    }
    out
}

/// Lower-cased title without punctuation, whitespace collapsed and trimmed.
pub fn normalize_title(title: &str) -> String {
    let stripped: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
