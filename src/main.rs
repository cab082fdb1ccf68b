//! dirtyrss main entry point
//!
//! This is the command-line interface for the dirtyrss catalog crawler.

use anyhow::{bail, Context};
use clap::Parser;
use dirtyrss::config::{load_config_with_hash, validate, Config};
use dirtyrss::crawler::{build_crawler, resolve_catalog, CatalogCrawler, DEFAULT_SEARCH_BASE};
use dirtyrss::{CatalogEntry, CatalogInfo};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// dirtyrss: republish a paginated media catalog as a chronological list
///
/// Crawls every listing page of a catalog within a deadline and prints its
/// entries, newest first, as JSON. Pages left over when the deadline fires are
/// fetched in the background; pass --drain to wait for them before exiting.
#[derive(Parser, Debug)]
#[command(name = "dirtyrss")]
#[command(version)]
#[command(about = "Crawl a paginated media catalog", long_about = None)]
struct Cli {
    /// Catalog URL, or a program name to search for
    #[arg(value_name = "TARGET")]
    target: String,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Known number of entries in the catalog (defaults to the advertised count)
    #[arg(long)]
    entries: Option<usize>,

    /// Entries assumed per listing page
    #[arg(long)]
    page_size: Option<usize>,

    /// Pages fetched concurrently per batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Crawl deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Requests per second
    #[arg(long)]
    rate: Option<u32>,

    /// Wait for the background continuation before exiting
    #[arg(long)]
    drain: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

/// JSON document printed on success
#[derive(Serialize)]
struct Output<'a> {
    catalog_url: &'a str,
    info: &'a CatalogInfo,
    entries: &'a [CatalogEntry],
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = load_effective_config(&cli)?;
    let crawler = build_crawler(&config).context("failed to build crawler")?;

    let catalog_url = match resolve_catalog(crawler.fetcher(), &cli.target, DEFAULT_SEARCH_BASE)
        .await?
    {
        Some(url) => url,
        None => bail!("Catalog {} not found", cli.target),
    };
    tracing::info!("Catalog url is {}", catalog_url);

    let info = crawler
        .fetch_info(&catalog_url)
        .await
        .with_context(|| format!("Catalog {} not found", catalog_url))?;

    let page_size = config.crawler.page_size;
    let total = cli
        .entries
        .or(info.total_entries)
        .unwrap_or(page_size);

    let entries = crawler
        .crawl(&catalog_url, total, page_size)
        .await
        .with_context(|| format!("Catalog {} not found", catalog_url))?;
    tracing::info!("{} entries found for {}", entries.len(), info.title);

    let output = Output {
        catalog_url: &catalog_url,
        info: &info,
        entries: &entries,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    if cli.drain {
        drain_background(&crawler).await;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("dirtyrss=info,warn"),
            1 => EnvFilter::new("dirtyrss=debug,info"),
            2 => EnvFilter::new("dirtyrss=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    // JSON goes to stdout, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the configuration file, if any, and applies command-line overrides
fn load_effective_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };

    if let Some(page_size) = cli.page_size {
        config.crawler.page_size = page_size;
    }
    if let Some(batch_size) = cli.batch_size {
        config.crawler.batch_size = batch_size;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.crawler.timeout_ms = timeout_ms;
    }
    if let Some(rate) = cli.rate {
        config.crawler.requests_per_second = rate;
    }

    validate(&config).context("invalid configuration")?;
    Ok(config)
}

/// Waits until no background continuation is running
async fn drain_background(crawler: &CatalogCrawler) {
    if crawler.background_in_flight() > 0 {
        tracing::info!("Waiting for background continuation to finish");
    }
    while crawler.background_in_flight() > 0 {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
