/*
newsdigest - main.rs
Command line entry point: one-off runs, the scheduling worker, and config validation.
*/

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use common::Config;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use newsdigest::article::TimeWindow;
use newsdigest::collect::{CollectionPort, FeedCollector, OgImageFetcher, SearchCollector};
use newsdigest::delivery::{
    DeliveryPort, DeliverySummary, EmailDelivery, FileDelivery, ReportFormat, SmtpSettings, SmtpTls,
    WebhookDelivery,
};
use newsdigest::errors::PipelineError;
use newsdigest::llm::remote::RemoteLlmProvider;
use newsdigest::llm::LlmProvider;
use newsdigest::llm::summarizer::{ExtractiveSummarizer, LlmSummarizer, PromptStyle};
use newsdigest::render;
use newsdigest::schedule::{window_since, Schedule};
use newsdigest::summarize::SummarizationPort;
use newsdigest::Pipeline;

const DEFAULT_SEARCH_URL: &str = "https://api.tavily.com/search";
const DEFAULT_SEARCH_KEY_ENV: &str = "TAVILY_API_KEY";
const DEFAULT_WEBHOOK_URL_ENV: &str = "NEWSDIGEST_WEBHOOK_URL";
const DEFAULT_SMTP_USER_ENV: &str = "SMTP_USER";
const DEFAULT_SMTP_PASSWORD_ENV: &str = "SMTP_PASSWORD";

#[derive(Parser, Debug)]
#[command(name = "newsdigest", about = "Collect, deduplicate, summarize and deliver a news digest")]
struct Args {
    /// Path to config.toml (merged over config.default.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Produce and deliver one report now
    Run {
        /// Collection window in hours, ending now
        #[arg(long)]
        lookback_hours: Option<u64>,
    },
    /// Run at the configured scheduler times until interrupted
    Schedule,
    /// Check the configuration and the secrets it refers to
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = load_config(args.config).await?;

    match args.command {
        Command::Validate => validate(&config),
        Command::Run { lookback_hours } => {
            config.validate()?;
            run_once(&config, lookback_hours.unwrap_or_else(|| config.lookback_hours())).await
        }
        Command::Schedule => {
            config.validate()?;
            run_scheduler(&config).await
        }
    }
}

async fn load_config(explicit: Option<PathBuf>) -> Result<Config> {
    let default_path = PathBuf::from("config.default.toml");

    let override_path = if let Some(p) = explicit {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            anyhow::bail!("Config file not found: {}", p.display());
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() { Some(p) } else { None }
    };

    let config = Config::load_with_defaults(
        if default_path.exists() { Some(&default_path) } else { None },
        override_path.as_deref(),
    )
    .await?;
    info!(default = ?default_path, override = ?override_path, "configuration loaded");
    Ok(config)
}

fn secret(env_name: &str) -> Result<String> {
    std::env::var(env_name).with_context(|| format!("environment variable '{}' not set", env_name))
}

/// Create the summarizer selected by `[llm].adapter`.
fn create_summarizer(config: &Config) -> Result<Arc<dyn SummarizationPort>> {
    let Some(llm_config) = config.llm.as_ref() else {
        info!("no [llm] section, using extractive summaries");
        return Ok(Arc::new(ExtractiveSummarizer));
    };

    let adapter = llm_config.adapter.as_deref().unwrap_or("none");
    match adapter {
        "remote" => {
            let remote_config = llm_config
                .summarization_endpoint()
                .ok_or_else(|| anyhow::anyhow!("Remote adapter selected but no [llm.remote] config found"))?;

            let api_key_env = remote_config
                .api_key_env
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("Missing api_key_env in remote config"))?;
            let api_key = secret(api_key_env).context("LLM API key")?;

            let model = remote_config.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string());
            let api_url = remote_config
                .api_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434/v1/chat/completions".to_string());
            let max_tokens = remote_config.max_tokens.unwrap_or(1500);

            let provider = RemoteLlmProvider::new(api_url, api_key, model).with_defaults(
                remote_config.timeout_seconds.unwrap_or(60),
                max_tokens,
                remote_config.temperature.unwrap_or(0.3),
            );
            let style = PromptStyle {
                instructions: llm_config.summary_prompt.clone(),
                focus: config.report_focus().map(str::to_string),
            };
            info!(
                model = provider.model(),
                custom_prompt = style.instructions.is_some(),
                focus = ?style.focus,
                "LLM summarizer initialized"
            );
            Ok(Arc::new(
                LlmSummarizer::new(Arc::new(provider))
                    .with_max_tokens(max_tokens)
                    .with_style(style),
            ))
        }
        "none" => Ok(Arc::new(ExtractiveSummarizer)),
        _ => anyhow::bail!("Unknown LLM adapter type: {}", adapter),
    }
}

fn feed_name(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

fn create_collectors(config: &Config) -> Result<Vec<Arc<dyn CollectionPort>>> {
    let mut collectors: Vec<Arc<dyn CollectionPort>> = Vec::new();
    let timeout = config.fetch_timeout_seconds();

    for feed in config.feeds.iter().filter(|f| f.is_enabled()) {
        let name = feed.name.clone().unwrap_or_else(|| feed_name(&feed.url));
        let collector = FeedCollector::new(&name, feed.url.clone(), timeout)
            .with_context(|| format!("feed '{}'", name))?
            .with_retries(config.max_retries(), Duration::from_secs(1));
        collectors.push(Arc::new(collector));
    }

    if let Some(search) = config.search.as_ref().filter(|s| s.enabled.unwrap_or(true)) {
        let key_env = search.api_key_env.as_deref().unwrap_or(DEFAULT_SEARCH_KEY_ENV);
        let collector = SearchCollector::new(
            search.api_url.clone().unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string()),
            secret(key_env).context("search API key")?,
            timeout,
        )?
        .with_max_results(search.max_results_per_keyword.unwrap_or(10))
        .with_domains(search.include_domains.clone(), search.exclude_domains.clone());
        collectors.push(Arc::new(collector));
    }

    Ok(collectors)
}

fn create_channels(config: &Config) -> Result<Vec<Arc<dyn DeliveryPort>>> {
    let mut channels: Vec<Arc<dyn DeliveryPort>> = Vec::new();
    let Some(delivery) = config.delivery.as_ref() else {
        return Ok(channels);
    };

    if let Some(file) = delivery.file.as_ref().filter(|f| f.enabled.unwrap_or(true)) {
        let formats = file
            .formats
            .iter()
            .map(|f| f.parse::<ReportFormat>())
            .collect::<Result<Vec<_>, _>>()?;
        let dir = file.output_dir.clone().unwrap_or_else(|| "reports".to_string());
        channels.push(Arc::new(FileDelivery::new(dir, formats)));
    }

    if let Some(webhook) = delivery.webhook.as_ref().filter(|w| w.enabled.unwrap_or(true)) {
        let url_env = webhook.url_env.as_deref().unwrap_or(DEFAULT_WEBHOOK_URL_ENV);
        let url = secret(url_env).context("webhook URL")?;
        channels.push(Arc::new(WebhookDelivery::new(url, webhook.timeout_seconds.unwrap_or(30))?));
    }

    if let Some(email) = delivery.email.as_ref().filter(|e| e.enabled.unwrap_or(true)) {
        let tls = email.smtp_tls.as_deref().unwrap_or("starttls").parse::<SmtpTls>()?;
        let user_env = email.username_env.as_deref().unwrap_or(DEFAULT_SMTP_USER_ENV);
        let username = std::env::var(user_env).unwrap_or_default();
        let password = if username.is_empty() {
            String::new()
        } else {
            secret(email.password_env.as_deref().unwrap_or(DEFAULT_SMTP_PASSWORD_ENV)).context("SMTP password")?
        };
        let from = email.from.clone().unwrap_or_else(|| username.clone());
        let smtp = SmtpSettings {
            host: email.smtp_host.clone().unwrap_or_default(),
            port: email.smtp_port.unwrap_or(match tls {
                SmtpTls::Tls => 465,
                SmtpTls::StartTls => 587,
                SmtpTls::None => 25,
            }),
            tls,
            username,
            password,
            timeout: Duration::from_secs(email.timeout_seconds.unwrap_or(30)),
        };
        let subject_prefix = email.subject_prefix.clone().unwrap_or_else(|| "[News Digest]".to_string());
        channels.push(Arc::new(
            EmailDelivery::new(smtp, &from, &email.recipients, subject_prefix).context("email channel")?,
        ));
    }

    Ok(channels)
}

fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let mut pipeline = Pipeline::new(create_summarizer(config)?);
    for collector in create_collectors(config)? {
        pipeline = pipeline.with_collector(collector);
    }
    for channel in create_channels(config)? {
        pipeline = pipeline.with_channel(channel);
    }
    if config.images_enabled() {
        let images = config.images.clone().unwrap_or_default();
        let fetcher = OgImageFetcher::new(images.timeout_seconds.unwrap_or(10))?;
        pipeline = pipeline.with_image_lookup(Arc::new(fetcher), images.max_concurrent.unwrap_or(4));
    }
    if pipeline.collectors() == 0 {
        warn!("no feeds or search configured, runs will find nothing");
    }
    Ok(pipeline)
}

fn log_delivery(summary: &DeliverySummary) {
    let delivered: Vec<&str> = summary.succeeded().collect();
    for (channel, e) in summary.failed() {
        error!(channel, error = %e, "delivery failed");
    }
    info!(delivered = ?delivered, all_succeeded = summary.all_succeeded(), "delivery finished");
}

async fn run_once(config: &Config, lookback_hours: u64) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let settings = config.pipeline_settings();
    let window = TimeWindow::lookback(Utc::now(), lookback_hours);

    let report = pipeline
        .run(window, &config.keywords, &settings, &CancellationToken::new())
        .await?;

    if pipeline.channels() == 0 {
        // Nothing configured: the terminal is the channel
        println!("{}", render::markdown(&report));
        return Ok(());
    }
    log_delivery(&pipeline.deliver(&report).await);
    Ok(())
}

/// Long-running worker: sleep until the next configured time, run, deliver, repeat.
async fn run_scheduler(config: &Config) -> Result<()> {
    let schedule = Schedule::from_config(&config.scheduler)?;
    if schedule.is_empty() {
        anyhow::bail!("scheduler.times is empty, nothing to schedule");
    }

    let pipeline = build_pipeline(config)?;
    let settings = config.pipeline_settings();
    let cancel = CancellationToken::new();

    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, cancelling");
            watcher.cancel();
        }
    });

    let weekday = config.scheduler.weekday()?;
    let timezone = config.scheduler.timezone()?;
    info!(
        times = ?config.scheduler.times,
        day = ?weekday,
        timezone = %timezone,
        "worker: initializing scheduler"
    );
    let mut last_run: Option<DateTime<Utc>> = None;

    loop {
        let now = Utc::now();
        let Some(next) = schedule.next_run_after(now) else {
            break;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        info!(next = %next, "worker: sleeping until next run");

        select! {
            _ = tokio::time::sleep(wait) => {},
            _ = cancel.cancelled() => {
                info!("worker: shutdown requested, exiting loop");
                break;
            }
        }

        let started = Utc::now();
        let window = window_since(last_run, started, config.lookback_hours());
        match pipeline.run(window, &config.keywords, &settings, &cancel).await {
            Ok(report) => {
                log_delivery(&pipeline.deliver(&report).await);
                last_run = Some(started);
            }
            Err(PipelineError::Cancelled) => break,
            Err(e) => warn!(error = %e, "worker: run produced no report"),
        }

        if cancel.is_cancelled() {
            info!("worker: cancelled during run, exiting loop");
            break;
        }
    }

    info!("worker: cleanup complete");
    Ok(())
}

fn validate(config: &Config) -> Result<()> {
    config.validate()?;

    println!("Keywords ({}): {}", config.keywords.len(), config.keywords.join(", "));
    let feeds: Vec<_> = config.feeds.iter().filter(|f| f.is_enabled()).collect();
    println!("Feeds: {} enabled of {}", feeds.len(), config.feeds.len());

    let mut secrets: Vec<(&str, String)> = Vec::new();
    let mut missing_sender = false;
    if let Some(search) = config.search.as_ref().filter(|s| s.enabled.unwrap_or(true)) {
        println!("Search: {}", search.api_url.as_deref().unwrap_or(DEFAULT_SEARCH_URL));
        secrets.push(("search", search.api_key_env.clone().unwrap_or_else(|| DEFAULT_SEARCH_KEY_ENV.to_string())));
    }

    let adapter = config.llm.as_ref().and_then(|l| l.adapter.as_deref()).unwrap_or("none");
    println!("Summarizer: {}", adapter);
    if adapter == "remote" {
        if let Some(env) = config
            .llm
            .as_ref()
            .and_then(|l| l.summarization_endpoint())
            .and_then(|r| r.api_key_env.clone())
        {
            secrets.push(("llm", env));
        }
    }

    if let Some(delivery) = config.delivery.as_ref() {
        if let Some(file) = delivery.file.as_ref().filter(|f| f.enabled.unwrap_or(true)) {
            for format in &file.formats {
                format.parse::<ReportFormat>()?;
            }
            println!("Channel: file -> {}", file.output_dir.as_deref().unwrap_or("reports"));
        }
        if let Some(webhook) = delivery.webhook.as_ref().filter(|w| w.enabled.unwrap_or(true)) {
            println!("Channel: webhook");
            secrets.push(("webhook", webhook.url_env.clone().unwrap_or_else(|| DEFAULT_WEBHOOK_URL_ENV.to_string())));
        }
        if let Some(email) = delivery.email.as_ref().filter(|e| e.enabled.unwrap_or(true)) {
            email.smtp_tls.as_deref().unwrap_or("starttls").parse::<SmtpTls>()?;
            println!(
                "Channel: email -> {} via {}",
                email.recipients.join(", "),
                email.smtp_host.as_deref().unwrap_or("?")
            );
            let user_env = email.username_env.as_deref().unwrap_or(DEFAULT_SMTP_USER_ENV);
            if std::env::var(user_env).map(|v| !v.trim().is_empty()).unwrap_or(false) {
                secrets.push((
                    "smtp password",
                    email.password_env.clone().unwrap_or_else(|| DEFAULT_SMTP_PASSWORD_ENV.to_string()),
                ));
            } else if email.from.is_none() {
                println!("Email: neither {} nor delivery.email.from is set, no sender address", user_env);
                missing_sender = true;
            }
        }
    }

    let mut missing = 0;
    for (what, env) in &secrets {
        let present = std::env::var(env).map(|v| !v.trim().is_empty()).unwrap_or(false);
        println!("Secret {} ({}): {}", what, env, if present { "set" } else { "MISSING" });
        if !present {
            missing += 1;
        }
    }
    if missing > 0 {
        anyhow::bail!("{} secret(s) missing from the environment", missing);
    }
    if missing_sender {
        anyhow::bail!("email channel has no sender address");
    }

    if let Some(focus) = config.report_focus() {
        println!("Report focus: {}", focus);
    }
    println!("Images: {}", if config.images_enabled() { "looked up on article pages" } else { "from sources only" });
    let cadence = match config.scheduler.weekday()? {
        Some(day) => format!("weekly on {}", day),
        None => "daily".to_string(),
    };
    println!(
        "Schedule: {} at {:?} ({}, lookback {}h)",
        cadence,
        config.scheduler.times,
        config.scheduler.timezone()?,
        config.lookback_hours()
    );
    println!("Configuration OK");
    Ok(())
}
