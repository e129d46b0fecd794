// Fetch one feed through the feed collector and print what a run would see.
use chrono::Utc;
use clap::Parser;

use newsdigest::article::TimeWindow;
use newsdigest::collect::{CollectionPort, FeedCollector};

#[derive(Parser, Debug)]
#[command(name = "probe_feed", about = "Show the articles a feed contributes for one keyword")]
struct Args {
    /// Feed URL (RSS or Atom)
    url: String,

    /// Keyword to filter on
    keyword: String,

    /// Window length in hours, ending now
    #[arg(long, default_value_t = 24)]
    hours: u64,

    #[arg(long, default_value_t = 10)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    let collector = FeedCollector::new("probe", args.url.clone(), args.timeout)?;
    let window = TimeWindow::lookback(Utc::now(), args.hours);

    println!("\n{}", "=".repeat(60));
    println!("Feed: {}", args.url);
    println!("Keyword: {} (last {}h)", args.keyword, args.hours);
    println!("{}", "=".repeat(60));

    match collector.collect(&args.keyword, window).await {
        Ok(articles) => {
            println!("✓ {} matching entries", articles.len());
            for (i, article) in articles.iter().enumerate() {
                println!("\n  {}. {}", i + 1, article.title);
                println!("     URL: {}", article.url);
                match article.published_at {
                    Some(at) => println!("     Published: {}", at.to_rfc3339()),
                    None => println!("     Published: unknown"),
                }
                println!("     Snippet: {} chars", article.body_snippet.chars().count());
            }
        }
        Err(e) => {
            println!("✗ Failed: {}", e);
        }
    }
    Ok(())
}
