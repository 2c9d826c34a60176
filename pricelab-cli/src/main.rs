//! PriceLab CLI: ingest, fetch, query and cache commands.
//!
//! Commands:
//! - `ingest`: load a CSV file, clean it and cache the snapshot
//! - `fetch`: pull records from a remote API (retry with backoff) and cache
//! - `latest`: print the most recent cached price
//! - `history`: print the trailing N days of cached prices
//! - `cache status`: report cached tags, date ranges and point counts

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pricelab_core::data::{ApiClient, PricePoint, VersionTag};
use pricelab_core::{PriceHistory, PipelineConfig, PricePipeline};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "pricelab",
    about = "PriceLab CLI: daily price series ingestion and cache"
)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache directory (overrides config).
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Snapshot version tag (overrides config).
    #[arg(long, global = true)]
    tag: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a CSV file with `timestamp` and `price` columns.
    Ingest {
        /// Path to the CSV file.
        path: PathBuf,
    },
    /// Fetch the series from a remote JSON API.
    Fetch {
        /// Endpoint URL. Defaults to `api.url` from the config.
        url: Option<String>,

        /// Extra query parameter as key=value (repeatable).
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Maximum attempts before giving up (overrides config).
        #[arg(long)]
        max_retries: Option<u32>,
    },
    /// Print the most recent cached price.
    Latest,
    /// Print the trailing N days of cached prices.
    History {
        /// Number of days.
        #[arg(long, default_value_t = 30)]
        days: usize,

        /// Emit JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report cached tags, date ranges and point counts.
    Status {
        /// Tags to report. Defaults to every tag in the cache directory.
        tags: Vec<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("pricelab=info,pricelab_core=info,pricelab_cli=info")
        }))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Ingest { path } => run_ingest(&config, path),
        Commands::Fetch {
            url,
            params,
            max_retries,
        } => run_fetch(&config, url, params, max_retries),
        Commands::Latest => run_latest(&config),
        Commands::History { days, json } => run_history(&config, days, json),
        Commands::Cache { action } => match action {
            CacheAction::Status { tags } => run_cache_status(&config, tags),
        },
    }
}

/// Config file (if any) with CLI overrides applied.
fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = dir.clone();
    }
    if let Some(tag) = &cli.tag {
        config.version = tag.clone();
    }
    config.validate()?;
    Ok(config)
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got '{s}'")),
    }
}

fn build_pipeline(config: &PipelineConfig) -> Result<PricePipeline> {
    let api = ApiClient::with_reqwest().context("building HTTP client")?;
    Ok(PricePipeline::from_config(config, api)?)
}

/// Pipeline with the cached snapshot loaded, or an error if there is none.
fn cached_pipeline(config: &PipelineConfig) -> Result<PricePipeline> {
    let mut pipeline = build_pipeline(config)?;
    if pipeline.load_cache()?.is_none() {
        bail!(
            "no cached data for tag '{}' in {} (run `ingest` or `fetch` first)",
            pipeline.tag(),
            config.cache_dir.display()
        );
    }
    Ok(pipeline)
}

fn run_ingest(config: &PipelineConfig, path: PathBuf) -> Result<()> {
    let mut pipeline = build_pipeline(config)?;
    let dataset = pipeline
        .load_from_csv(&path)
        .with_context(|| format!("ingesting {}", path.display()))?;
    print_summary(dataset.points());
    Ok(())
}

fn run_fetch(
    config: &PipelineConfig,
    url: Option<String>,
    params: Vec<(String, String)>,
    max_retries: Option<u32>,
) -> Result<()> {
    let mut req = config.api_request(url.as_deref())?;
    req.params.extend(params);
    if let Some(n) = max_retries {
        req.max_retries = n;
    }

    let mut pipeline = build_pipeline(config)?;
    let dataset = pipeline
        .fetch_from_api(&req)
        .with_context(|| format!("fetching {}", req.url))?;
    print_summary(dataset.points());
    Ok(())
}

fn run_latest(config: &PipelineConfig) -> Result<()> {
    let pipeline = cached_pipeline(config)?;
    match pipeline.latest_price() {
        Some(price) => println!("{price}"),
        None => println!("no data"),
    }
    Ok(())
}

fn run_history(config: &PipelineConfig, days: usize, json: bool) -> Result<()> {
    let pipeline = cached_pipeline(config)?;
    let points = pipeline.historical_points(days).unwrap_or_default();
    if json {
        println!("{}", serde_json::to_string_pretty(points)?);
    } else {
        for p in points {
            println!("{}  {:.6}", p.date, p.price);
        }
    }
    Ok(())
}

fn run_cache_status(config: &PipelineConfig, tags: Vec<String>) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let cache = pipeline.cache();
    let tags: Vec<VersionTag> = if tags.is_empty() {
        cache.tags()
    } else {
        tags.into_iter()
            .map(VersionTag::new)
            .collect::<Result<_, _>>()?
    };

    if tags.is_empty() {
        println!("cache {} is empty", cache.cache_dir().display());
        return Ok(());
    }

    println!("{:<16} {:>8} {:<12} {:<12}", "TAG", "POINTS", "START", "END");
    for status in cache.status(&tags) {
        let fmt_date = |d: Option<chrono::NaiveDate>| {
            d.map(|d| d.to_string()).unwrap_or_else(|| "-".into())
        };
        let count = match (status.cached, status.point_count) {
            (false, _) => "missing".to_string(),
            (true, Some(n)) => n.to_string(),
            (true, None) => "?".to_string(),
        };
        println!(
            "{:<16} {:>8} {:<12} {:<12}",
            status.tag.as_str(),
            count,
            fmt_date(status.start_date),
            fmt_date(status.end_date)
        );
    }
    Ok(())
}

fn print_summary(points: &[PricePoint]) {
    match (points.first(), points.last()) {
        (Some(first), Some(last)) => println!(
            "{} days cached: {} → {} (latest {:.6})",
            points.len(),
            first.date,
            last.date,
            last.price
        ),
        _ => println!("no data"),
    }
}
