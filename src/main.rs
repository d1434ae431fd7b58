//! Sitegrab main entry point
//!
//! This is the command-line interface for the Sitegrab website archiver.

use anyhow::{Context, Result};
use clap::Parser;
use sitegrab::config::{
    load_config, load_config_with_hash, save_config, working_dir_name, MaxDepth, PolicyConfig,
    SpanHosts,
};
use sitegrab::output::{load_statistics, print_index_statistics, print_statistics};
use sitegrab::storage::open_index;
use sitegrab::{ConfigError, CrawlError, CrawlOutcome, Session};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const ID_FILE: &str = "id";
const START_URL_FILE: &str = "start_url";
const POLICY_FILE: &str = "policy.toml";

/// Sitegrab: a recursive website archiver
///
/// Sitegrab crawls a website breadth-first from one or more start URLs,
/// fetches page requisites, and writes everything into WARC files. Each crawl
/// gets its own working directory that can be resumed after an interruption.
#[derive(Parser, Debug)]
#[command(name = "sitegrab")]
#[command(version = "1.0.0")]
#[command(about = "A recursive website archiver", long_about = None)]
struct Cli {
    /// URLs to start crawling from
    #[arg(value_name = "START_URL", required_unless_present = "resume")]
    urls: Vec<String>,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of parallel fetch workers
    #[arg(long)]
    concurrency: Option<u32>,

    /// Maximum recursion depth (a number or "inf")
    #[arg(long, value_name = "N")]
    level: Option<MaxDepth>,

    /// Maximum page-requisites chain length
    #[arg(long, value_name = "N")]
    page_requisites_level: Option<u32>,

    /// Fetch only the start URLs and their page requisites
    #[arg(long)]
    no_recursive: bool,

    /// Also fetch pages on other hosts linked from the site (one hop)
    #[arg(long)]
    offsite_links: bool,

    /// Comma-separated ignore sets to activate
    #[arg(long, value_delimiter = ',', value_name = "SETS")]
    igsets: Vec<String>,

    /// Parent directory of new working directories
    #[arg(long, value_name = "DIR", conflicts_with = "resume")]
    dir: Option<PathBuf>,

    /// Resume the crawl in an existing working directory
    #[arg(long, value_name = "DIR")]
    resume: Option<PathBuf>,

    /// Show statistics of the working directory given with --resume and exit
    #[arg(long, requires = "resume")]
    stats: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            if is_config_error(&e) {
                2
            } else {
                1
            }
        }
    };
    std::process::exit(code);
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sitegrab=info,warn"),
            1 => EnvFilter::new("sitegrab=debug,info"),
            2 => EnvFilter::new("sitegrab=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn is_config_error(error: &anyhow::Error) -> bool {
    if error.downcast_ref::<ConfigError>().is_some() {
        return true;
    }
    matches!(error.downcast_ref::<CrawlError>(), Some(CrawlError::Config(_)))
}

async fn run(cli: Cli) -> Result<i32> {
    let mut config = base_config(&cli)?;
    apply_overrides(&mut config, &cli);

    if cli.stats {
        let dir = cli.resume.as_deref().unwrap_or(Path::new("."));
        handle_stats(dir, &config)?;
        return Ok(0);
    }

    let (workdir, urls) = match &cli.resume {
        Some(dir) => (dir.clone(), resume_urls(dir, &cli.urls)?),
        None => (create_workdir(&cli)?, cli.urls.clone()),
    };
    config.output.directory = workdir.clone();
    save_config(&config, &workdir.join(POLICY_FILE))
        .with_context(|| format!("saving policy to {}", workdir.display()))?;

    handle_crawl(config, &urls, cli.quiet).await
}

/// Policy before command-line overrides
///
/// An explicit `--config` file wins. Otherwise a resumed crawl reloads the
/// policy saved in its working directory, and a new crawl starts from the
/// defaults.
fn base_config(cli: &Cli) -> Result<PolicyConfig> {
    if let Some(path) = &cli.config {
        tracing::info!("Loading configuration from: {}", path.display());
        let (config, hash) = load_config_with_hash(path)?;
        tracing::info!("Configuration loaded successfully (hash: {})", hash);
        return Ok(config);
    }

    if let Some(dir) = &cli.resume {
        let saved = dir.join(POLICY_FILE);
        if saved.exists() {
            tracing::info!("Loading saved policy from: {}", saved.display());
            return Ok(load_config(&saved)?);
        }
        tracing::warn!("No saved policy in {}, using defaults", dir.display());
    }
    Ok(PolicyConfig::default())
}

/// Applies command-line options on top of the loaded configuration
fn apply_overrides(config: &mut PolicyConfig, cli: &Cli) {
    if let Some(concurrency) = cli.concurrency {
        config.crawl.concurrency = concurrency;
    }
    if let Some(level) = cli.level {
        config.crawl.max_depth = level;
    }
    if let Some(level) = cli.page_requisites_level {
        config.crawl.page_requisite_depth = level;
    }
    if cli.no_recursive {
        config.crawl.recursive = false;
    }
    if cli.offsite_links {
        config.crawl.span_hosts_mode = SpanHosts::PageRequisitesAndLinkedPages;
    }
    for set in &cli.igsets {
        let set = set.trim();
        if !set.is_empty() && !config.ignores.sets.iter().any(|s| s == set) {
            config.ignores.sets.push(set.to_string());
        }
    }
}

/// Creates a fresh working directory holding the `id` and `start_url` files
fn create_workdir(cli: &Cli) -> Result<PathBuf> {
    let first = cli
        .urls
        .first()
        .ok_or_else(|| ConfigError::Validation("at least one start URL is required".to_string()))?;

    let id = uuid::Uuid::new_v4().simple().to_string();
    let ymd = chrono::Utc::now().format("%Y-%m-%d").to_string();
    let parent = cli.dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let workdir = parent.join(working_dir_name(first, &ymd, &id));

    fs::create_dir_all(&workdir)
        .with_context(|| format!("creating working directory {}", workdir.display()))?;
    fs::write(workdir.join(ID_FILE), format!("{}\n", id))?;
    fs::write(workdir.join(START_URL_FILE), format!("{}\n", cli.urls.join("\n")))?;

    tracing::info!("Working directory: {}", workdir.display());
    Ok(workdir)
}

/// Start URLs of a resumed crawl: the ones given, or those recorded at creation
fn resume_urls(dir: &Path, given: &[String]) -> Result<Vec<String>> {
    if !given.is_empty() {
        return Ok(given.to_vec());
    }

    let path = dir.join(START_URL_FILE);
    let content = fs::read_to_string(&path)
        .map_err(ConfigError::Io)
        .with_context(|| format!("reading {}", path.display()))?;
    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    if urls.is_empty() {
        return Err(ConfigError::Validation(format!("{} lists no URLs", path.display())).into());
    }
    tracing::info!("Resuming crawl in {}", dir.display());
    Ok(urls)
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(dir: &Path, config: &PolicyConfig) -> Result<()> {
    let db_path = dir.join(&config.output.database);
    if !db_path.exists() {
        anyhow::bail!("no crawl database at {}", db_path.display());
    }
    println!("Database: {}\n", db_path.display());

    let index = open_index(&db_path)?;
    let stats = load_statistics(&index)?;
    print_index_statistics(&stats);
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: PolicyConfig, urls: &[String], quiet: bool) -> Result<i32> {
    tracing::info!(
        "Crawling {} start URL(s) with {} worker(s), level {}, span-hosts {}",
        urls.len(),
        config.crawl.concurrency,
        config.crawl.max_depth,
        config.crawl.span_hosts_mode
    );

    let mut session = Session::new(config, urls)?;

    let cancel = session.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing in-flight fetches");
            cancel.cancel();
        }
    });

    let report = session.run().await;
    if !quiet {
        print_statistics(&report.stats);
        for segment in &report.segments {
            println!("Archive: {}", segment.display());
        }
    }

    match &report.outcome {
        CrawlOutcome::Completed => tracing::info!("Crawl completed successfully"),
        CrawlOutcome::Cancelled => tracing::warn!("Crawl cancelled; resume with --resume"),
        CrawlOutcome::FatalError(reason) => tracing::error!("Crawl failed: {}", reason),
    }
    Ok(report.outcome.exit_code())
}
