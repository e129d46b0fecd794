/*!
common/src/lib.rs

Shared configuration types and helpers for newsdigest.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader for a TOML config file, with default/override layering
- The explicit `PipelineSettings` value handed to every pipeline run
*/

use anyhow::{Context, Result};
use chrono::{NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default title similarity above which two articles are considered the same story.
pub const DEFAULT_TITLE_SIMILARITY_THRESHOLD: f64 = 0.85;
pub const DEFAULT_MAX_PER_KEYWORD: usize = 10;
pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_REPORT_TITLE: &str = "News Digest";
/// Upper bound for `politeness.max_retries`; backoff doubles on every attempt.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Pipeline tuning section (`[pipeline]`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub title_similarity_threshold: Option<f64>,
    pub max_per_keyword: Option<usize>,
    /// Global cap across all sections; absent means uncapped
    pub max_total: Option<usize>,
    /// Maximum number of articles submitted to the summarizer in one call
    pub batch_size: Option<usize>,
    pub max_concurrent_batches: Option<usize>,
    pub report_title: Option<String>,
}

/// Report content options (`[report]`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Editorial angle handed to the summarizer, e.g. "impact on small businesses"
    pub focus: Option<String>,
}

/// Scheduler (run times) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// List of wall-clock times in "HH:MM" 24h format when a run should start
    pub times: Vec<String>,
    /// "daily" or "weekly"; defaults to weekly when `day_of_week` is set, daily otherwise
    pub frequency: Option<String>,
    /// Day name for weekly runs ("monday", "tue", ...); weekly runs default to monday
    pub day_of_week: Option<String>,
    /// IANA zone the times are read in; UTC when absent
    pub timezone: Option<String>,
    /// Collection window used for the first run, and for `run` invocations
    pub lookback_hours: Option<u64>,
}

impl SchedulerConfig {
    /// Day weekly runs happen on, or `None` for daily runs.
    pub fn weekday(&self) -> Result<Option<Weekday>> {
        let weekly = match self.frequency.as_deref().map(str::trim) {
            Some(f) if f.eq_ignore_ascii_case("weekly") => true,
            Some(f) if f.eq_ignore_ascii_case("daily") => false,
            Some(other) => anyhow::bail!("scheduler.frequency must be 'daily' or 'weekly', got '{}'", other),
            None => self.day_of_week.is_some(),
        };
        if !weekly {
            return Ok(None);
        }
        parse_weekday(self.day_of_week.as_deref().unwrap_or("monday")).map(Some)
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.timezone.as_deref().map_or(Ok(Tz::UTC), parse_timezone)
    }
}

/// Politeness / fetching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolitenessConfig {
    pub fetch_timeout_seconds: Option<u64>,
    pub max_retries: Option<u32>,
}

/// Lead image lookup on article pages (`[images]`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImagesConfig {
    pub enabled: Option<bool>,
    pub timeout_seconds: Option<u64>,
    pub max_concurrent: Option<usize>,
}

/// RSS/Atom feed source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub url: String,
    pub name: Option<String>,
    pub enabled: Option<bool>,
}

impl FeedConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

/// News search API source (Tavily-compatible)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub enabled: Option<bool>,
    pub api_url: Option<String>,
    pub api_key_env: Option<String>,
    pub max_results_per_keyword: Option<usize>,
    #[serde(default)]
    pub include_domains: Vec<String>,
    #[serde(default)]
    pub exclude_domains: Vec<String>,
}

/// Remote LLM endpoint (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteLlmConfig {
    pub api_url: Option<String>,
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
}

/// LLM top-level config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub adapter: Option<String>, // "remote", "none"
    // Fallback: single remote config
    pub remote: Option<RemoteLlmConfig>,
    // Task-specific override
    pub summarization: Option<RemoteLlmConfig>,
    /// Replaces the built-in summarization instructions; `{focus}` is substituted
    pub summary_prompt: Option<String>,
}

impl LlmConfig {
    /// Endpoint used for summarization: the task-specific section wins over `remote`.
    pub fn summarization_endpoint(&self) -> Option<&RemoteLlmConfig> {
        self.summarization.as_ref().or(self.remote.as_ref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDeliveryConfig {
    pub enabled: Option<bool>,
    pub output_dir: Option<String>,
    /// Any of "markdown", "html", "json"
    #[serde(default)]
    pub formats: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDeliveryConfig {
    pub enabled: Option<bool>,
    /// Name of the env var holding the webhook URL
    pub url_env: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// SMTP delivery of the HTML report with a plain-text alternative
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailDeliveryConfig {
    pub enabled: Option<bool>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    /// "starttls" (default), "tls" or "none"
    pub smtp_tls: Option<String>,
    /// Env var names holding the SMTP credentials
    pub username_env: Option<String>,
    pub password_env: Option<String>,
    /// Sender address; the SMTP username when absent
    pub from: Option<String>,
    #[serde(default)]
    pub recipients: Vec<String>,
    pub subject_prefix: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub file: Option<FileDeliveryConfig>,
    pub webhook: Option<WebhookDeliveryConfig>,
    pub email: Option<EmailDeliveryConfig>,
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Keywords in declaration order; this order is the report section order
    #[serde(default)]
    pub keywords: Vec<String>,
    pub pipeline: Option<PipelineConfig>,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
    pub search: Option<SearchConfig>,
    pub llm: Option<LlmConfig>,
    pub report: Option<ReportConfig>,
    pub images: Option<ImagesConfig>,
    pub delivery: Option<DeliveryConfig>,
    pub scheduler: SchedulerConfig,
    pub politeness: Option<PolitenessConfig>,
}

/// Per-keyword and global result caps applied by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caps {
    pub max_per_keyword: usize,
    pub max_total: Option<usize>,
}

impl Default for Caps {
    fn default() -> Self {
        Self {
            max_per_keyword: DEFAULT_MAX_PER_KEYWORD,
            max_total: None,
        }
    }
}

/// Everything a pipeline run needs besides its collaborators, passed explicitly into `run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub title_similarity_threshold: f64,
    pub caps: Caps,
    pub batch_size: usize,
    pub max_concurrent_batches: usize,
    pub report_title: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            title_similarity_threshold: DEFAULT_TITLE_SIMILARITY_THRESHOLD,
            caps: Caps::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrent_batches: 1,
            report_title: DEFAULT_REPORT_TITLE.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for (label, path) in [("default", default_path), ("override", override_path)] {
            let Some(path) = path else { continue };
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {} config: {}", label, path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse {} configuration", label))?;
            merge_toml(&mut config_value, val);
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        Ok(cfg)
    }

    /// Resolve the `[pipeline]` section into concrete settings, filling in defaults.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        let defaults = PipelineSettings::default();
        let Some(p) = self.pipeline.as_ref() else {
            return defaults;
        };
        PipelineSettings {
            title_similarity_threshold: p
                .title_similarity_threshold
                .unwrap_or(defaults.title_similarity_threshold),
            caps: Caps {
                max_per_keyword: p.max_per_keyword.unwrap_or(defaults.caps.max_per_keyword),
                max_total: p.max_total,
            },
            batch_size: p.batch_size.unwrap_or(defaults.batch_size),
            max_concurrent_batches: p.max_concurrent_batches.unwrap_or(1).max(1),
            report_title: p.report_title.clone().unwrap_or(defaults.report_title),
        }
    }

    pub fn fetch_timeout_seconds(&self) -> u64 {
        self.politeness
            .as_ref()
            .and_then(|p| p.fetch_timeout_seconds)
            .unwrap_or(10)
    }

    pub fn max_retries(&self) -> u32 {
        self.politeness.as_ref().and_then(|p| p.max_retries).unwrap_or(3)
    }

    pub fn report_focus(&self) -> Option<&str> {
        self.report
            .as_ref()
            .and_then(|r| r.focus.as_deref())
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }

    pub fn images_enabled(&self) -> bool {
        self.images.as_ref().and_then(|i| i.enabled).unwrap_or(false)
    }

    pub fn lookback_hours(&self) -> u64 {
        self.scheduler.lookback_hours.unwrap_or(24)
    }

    /// Check the configuration for problems that would make every run useless.
    /// All problems are reported at once.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.keywords.is_empty() {
            problems.push("no keywords configured".to_string());
        }

        let settings = self.pipeline_settings();
        if !(0.0..=1.0).contains(&settings.title_similarity_threshold) {
            problems.push(format!(
                "pipeline.title_similarity_threshold must be within [0, 1], got {}",
                settings.title_similarity_threshold
            ));
        }
        if settings.batch_size == 0 {
            problems.push("pipeline.batch_size must be at least 1".to_string());
        }

        if self.max_retries() > MAX_RETRIES_LIMIT {
            problems.push(format!(
                "politeness.max_retries must be at most {}, got {}",
                MAX_RETRIES_LIMIT,
                self.max_retries()
            ));
        }

        for feed in &self.feeds {
            if let Err(e) = url::Url::parse(&feed.url) {
                problems.push(format!("feed url '{}' is invalid: {}", feed.url, e));
            }
        }

        for time in &self.scheduler.times {
            if let Err(e) = parse_schedule_time(time) {
                problems.push(e.to_string());
            }
        }
        if let Err(e) = self.scheduler.weekday() {
            problems.push(e.to_string());
        }
        if let Err(e) = self.scheduler.timezone() {
            problems.push(e.to_string());
        }

        if let Some(email) = self
            .delivery
            .as_ref()
            .and_then(|d| d.email.as_ref())
            .filter(|e| e.enabled.unwrap_or(true))
        {
            if email.recipients.is_empty() {
                problems.push("delivery.email.recipients is empty".to_string());
            }
            if email.smtp_host.as_deref().map_or(true, |h| h.trim().is_empty()) {
                problems.push("delivery.email.smtp_host is not set".to_string());
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("invalid configuration: {}", problems.join("; "))
        }
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Parse a scheduler entry in "HH:MM" 24h format.
pub fn parse_schedule_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .with_context(|| format!("scheduler time '{}' is not in HH:MM format", s))
}

/// Parse a day name, full or abbreviated, any case.
pub fn parse_weekday(s: &str) -> Result<Weekday> {
    s.trim()
        .parse::<Weekday>()
        .map_err(|_| anyhow::anyhow!("scheduler day_of_week '{}' is not a day name", s))
}

/// Parse an IANA time zone name such as "Europe/Paris".
pub fn parse_timezone(s: &str) -> Result<Tz> {
    s.trim()
        .parse::<Tz>()
        .map_err(|e| anyhow::anyhow!("scheduler timezone '{}' is unknown: {}", s, e))
}
