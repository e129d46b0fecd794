//! Failure domains of a run. Every collaborator failure is scoped to one unit
//! (source, batch, channel); only `PipelineError` ends a run.

use thiserror::Error;

/// One source failed to produce articles for one keyword.
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("source answered with status {0}")]
    Status(reqwest::StatusCode),
    #[error("could not parse source response: {0}")]
    Parse(String),
    #[error("giving up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
    #[error("source misconfigured: {0}")]
    Config(String),
}

/// One summarization batch failed as a whole.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("LLM request failed: {0:#}")]
    Request(anyhow::Error),
    #[error("malformed summarizer reply: {0}")]
    Malformed(String),
    #[error("expected {expected} summaries, got {got}")]
    CountMismatch { expected: usize, got: usize },
}

/// One delivery channel failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("delivery request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("delivery endpoint answered {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("could not build email: {0}")]
    Email(#[from] lettre::error::Error),
    #[error("SMTP delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("channel misconfigured: {0}")]
    Config(String),
}

/// Run-level failures. Everything else degrades the report instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no source returned any article for {keywords} keyword(s) ({failed_sources} source failure(s))")]
    NoArticles {
        keywords: usize,
        failed_sources: usize,
    },
    #[error("run cancelled before collection")]
    Cancelled,
}
