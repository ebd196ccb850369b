//! Trawler command-line entry point

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use trawler::config::{load_config_with_hash, CrawlMode};
use trawler::engine::Engine;
use tracing_subscriber::EnvFilter;

/// Trawler: a high-throughput, polite web crawler
///
/// Fetches pages breadth-first from a seed list (REGULAR mode) or
/// re-crawls a fixed corpus with low latency (FRESH mode), respecting
/// robots.txt and per-domain rate limits throughout.
#[derive(Parser, Debug)]
#[command(name = "trawler")]
#[command(version)]
#[command(about = "A high-throughput, polite web crawler", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Run in FRESH mode regardless of the configured mode
    #[arg(long)]
    fresh: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Print metadata-store statistics and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {:#}", e);
            std::process::ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    tracing::info!("loading configuration from {}", cli.config.display());
    let (mut config, config_hash) =
        load_config_with_hash(&cli.config).context("failed to load configuration")?;
    tracing::info!(hash = %config_hash, "configuration loaded");

    if cli.fresh {
        config.crawler.mode = CrawlMode::Fresh;
    }

    if cli.dry_run {
        return handle_dry_run(&config);
    }
    if cli.stats {
        return handle_stats(&config);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;
    runtime.block_on(handle_crawl(config))
}

/// Sets up the tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("trawler=info,warn"),
            1 => EnvFilter::new("trawler=debug,info"),
            2 => EnvFilter::new("trawler=trace,debug"),
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

/// Validates the configuration and prints the crawl plan
fn handle_dry_run(config: &trawler::Config) -> anyhow::Result<()> {
    use trawler::config::load_line_list;

    println!("=== Trawler Dry Run ===\n");

    println!("Crawler:");
    println!("  Mode: {:?}", config.crawler.mode);
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Fetch workers: {}", config.crawler.effective_fetch_workers());
    println!("  HTML workers: {}", config.crawler.effective_html_workers());
    println!("  In-flight per worker: {}", config.crawler.max_in_flight);
    println!("  Frontier capacity: {}", config.crawler.frontier_max_size);
    println!("  Min request gap: {}ms", config.crawler.min_request_gap_ms);

    println!("\nUser agent:");
    println!("  {}", trawler::fetch::user_agent_string(&config.user_agent));

    println!("\nPaths:");
    println!("  Work dir: {}", config.paths.work_dir);
    println!("  Metadata DB: {}", config.paths.metadata_db);
    println!("  Batch output: {}", config.paths.batch_output);

    let seeds = load_line_list(std::path::Path::new(&config.paths.seeds))
        .context("failed to load seed list")?;
    println!("\nSeeds ({}):", seeds.len());
    for seed in &seeds {
        println!("  - {}", seed);
    }

    if let Some(path) = &config.paths.blacklist {
        let blacklist = load_line_list(std::path::Path::new(path))?;
        println!("\nBlacklisted domains ({}):", blacklist.len());
        for domain in &blacklist {
            println!("  - {}", domain);
        }
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would start crawling {} seed URLs", seeds.len());
    Ok(())
}

/// Prints metadata-store statistics
fn handle_stats(config: &trawler::Config) -> anyhow::Result<()> {
    use trawler::meta::{MetadataStore, SqliteMetaStore};

    let store = SqliteMetaStore::open(std::path::Path::new(&config.paths.metadata_db))
        .context("failed to open metadata store")?;
    let stats = store.stats()?;

    println!("=== Metadata Store ===\n");
    println!("Database: {}\n", config.paths.metadata_db);
    println!("Known URLs:            {}", stats.total_urls);
    println!("With validators:       {}", stats.urls_with_validators);
    println!("Unchanged on revisit:  {}", stats.urls_unchanged_streak);
    Ok(())
}

/// Runs the crawl with escalating stop-signal handling
async fn handle_crawl(config: trawler::Config) -> anyhow::Result<()> {
    let engine = Engine::new(config).context("engine initialization failed")?;
    let stop = engine.stop_handle();

    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            match stop.request_stop() {
                1 => {
                    tracing::info!("stop requested, finishing in-flight work");
                }
                2 => {
                    tracing::warn!("second stop signal, forcing exit in 2s");
                    tokio::spawn(async {
                        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                        std::process::exit(2);
                    });
                }
                _ => {
                    tracing::error!("third stop signal, terminating immediately");
                    std::process::exit(2);
                }
            }
        }
    });

    let snapshot = engine.run().await.context("crawl failed")?;
    tracing::info!(
        pages = snapshot.pages_fetched,
        errors = snapshot.total_errors(),
        "crawl complete"
    );
    Ok(())
}
