use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use feedscope::{Config, FeedParseResult, FeedService};

/// Get the default config file path (~/.config/feedscope/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("feedscope")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(
    name = "feedscope",
    version,
    about = "Fetch, parse and normalize RSS, Atom and JSON feeds"
)]
struct Args {
    /// Config file (defaults to ~/.config/feedscope/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Skip cached results (fresh results are still cached)
    #[arg(long)]
    no_cache: bool,

    /// Print full results as JSON instead of a summary line per URL
    #[arg(long)]
    json: bool,

    /// Feed URLs to parse
    #[arg(required = true, value_name = "URL")]
    urls: Vec<String>,
}

#[derive(Serialize)]
struct UrlReport<'a> {
    url: &'a str,
    #[serde(flatten)]
    result: &'a FeedParseResult,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Logs go to stderr so --json output stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from '{}'", config_path.display()))?;

    let service = FeedService::new(&config).context("Failed to build HTTP client")?;
    let use_cache = !args.no_cache;

    // Duplicate URLs coalesce into a single fetch inside the service
    let results: Vec<Arc<FeedParseResult>> = futures::future::join_all(
        args.urls
            .iter()
            .map(|url| service.parse_feed(url, use_cache)),
    )
    .await;

    if args.json {
        let reports: Vec<UrlReport<'_>> = args
            .urls
            .iter()
            .zip(&results)
            .map(|(url, result)| UrlReport {
                url,
                result: result.as_ref(),
            })
            .collect();
        let out = serde_json::to_string_pretty(&reports).context("Failed to serialize results")?;
        println!("{out}");
    } else {
        for (url, result) in args.urls.iter().zip(&results) {
            println!("{}", summary_line(url, result));
        }
    }

    tracing::debug!(
        cached = service.cache_size(),
        in_flight = service.in_flight_count(),
        "Shutting down"
    );
    service.destroy();

    let failed = results.iter().filter(|r| !r.success).count();
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn summary_line(url: &str, result: &FeedParseResult) -> String {
    match &result.feed {
        Some(feed) => format!(
            "ok    {url}  [{}] \"{}\" ({} items)",
            feed.feed_type, feed.metadata.title, feed.items.len()
        ),
        None => format!(
            "FAIL  {url}  [{}] {}",
            result.category.map_or("unknown", |c| c.as_str()),
            result.error.as_deref().unwrap_or("no error message")
        ),
    }
}
