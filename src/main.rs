//! pdf-trawl main entry point
//!
//! This is the command-line interface for the pdf-trawl harvester.

use anyhow::{bail, Context};
use clap::Parser;
use pdf_trawl::cache::{IncrementalCache, SqliteCache};
use pdf_trawl::config::{load_config_with_hash, Config};
use pdf_trawl::crawler::Harvester;
use pdf_trawl::output::{print_cache_stats, print_summary};
use pdf_trawl::SeedGroup;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// pdf-trawl: a polite PDF harvester
///
/// pdf-trawl walks seed pages within depth, page and time budgets, finds links
/// to PDF documents and downloads them through a per-host rate limiter. Repeat
/// runs skip pages and documents that are still fresh in the cache.
#[derive(Parser, Debug)]
#[command(name = "pdf-trawl")]
#[command(version)]
#[command(about = "A polite PDF harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Only run the seed groups with these ids (repeatable)
    #[arg(long = "group", value_name = "ID")]
    groups: Vec<String>,

    /// Validate config and show what would be harvested without fetching anything
    #[arg(long, conflicts_with = "prune")]
    dry_run: bool,

    /// Remove expired cache entries, show cache statistics and exit
    #[arg(long, conflicts_with = "dry_run")]
    prune: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let groups = select_groups(&config, &cli.groups)?;

    if cli.dry_run {
        handle_dry_run(&config, &groups);
    } else if cli.prune {
        handle_prune(&config)?;
    } else {
        handle_harvest(config, &groups, &config_hash).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("pdf_trawl=info,warn"),
            1 => EnvFilter::new("pdf_trawl=debug,info"),
            2 => EnvFilter::new("pdf_trawl=trace,debug"),
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

/// Builds the seed groups to run, restricted to `only` when it is non-empty
fn select_groups(config: &Config, only: &[String]) -> anyhow::Result<Vec<SeedGroup>> {
    for id in only {
        if !config.groups.iter().any(|g| &g.id == id) {
            bail!("unknown group '{}'", id);
        }
    }

    config
        .groups
        .iter()
        .filter(|g| only.is_empty() || only.contains(&g.id))
        .map(|g| SeedGroup::from_config(g).with_context(|| format!("group '{}'", g.id)))
        .collect()
}

/// Handles the --dry-run mode: shows what would be harvested
fn handle_dry_run(config: &Config, groups: &[SeedGroup]) {
    println!("=== pdf-trawl Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Request delay: {}ms", config.crawler.request_delay_ms);
    println!(
        "  Max concurrent downloads: {}",
        config.crawler.max_concurrent_downloads
    );
    println!("  Max parallel groups: {}", config.crawler.max_parallel_groups);
    println!("  Respect robots.txt: {}", config.crawler.respect_robots_txt);
    if let Some(deadline) = config.crawler.run_deadline_secs {
        println!("  Run deadline: {}s", deadline);
    }

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!(
        "  Backoff: {}ms base, {}ms max",
        config.retry.base_delay_ms, config.retry.max_delay_ms
    );

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nCache:");
    println!("  Database: {}", config.cache.database_path);
    println!("  Freshness: {}h", config.cache.freshness_hours);
    println!("  Retention: {}d", config.cache.retention_days);

    println!("\nArtifacts: {}", config.storage.local_path);

    println!("\nSeed Groups ({}):", groups.len());
    for group in groups {
        println!(
            "  - {} (depth {}, {} pages, {}s)",
            group.id,
            group.max_depth,
            group.max_pages,
            group.time_limit.as_secs()
        );
        if !group.document_types.is_empty() {
            println!("    document types: {}", group.document_types.join(", "));
        }
        for seed in &group.seeds {
            println!("    * {}", seed);
        }
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start harvesting from {} seed URLs",
        groups.iter().map(|g| g.seeds.len()).sum::<usize>()
    );
}

/// Handles the --prune mode: drops expired entries and shows cache statistics
fn handle_prune(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.cache.database_path);

    let sqlite = SqliteCache::new(Path::new(&config.cache.database_path))?;
    let cache = IncrementalCache::new(
        Arc::new(sqlite),
        config.cache.freshness(),
        config.cache.retention(),
    );

    let pruned = cache.prune_expired()?;
    println!("Pruned {} expired entries\n", pruned);

    print_cache_stats(&cache.stats()?);
    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(
    config: Config,
    groups: &[SeedGroup],
    config_hash: &str,
) -> anyhow::Result<()> {
    tracing::info!(
        "Seed groups: {}, seed URLs: {}",
        groups.len(),
        groups.iter().map(|g| g.seeds.len()).sum::<usize>()
    );

    let harvester = Harvester::new(config)?;
    let summary = harvester.run(groups, config_hash).await.map_err(|e| {
        tracing::error!("Harvest failed: {}", e);
        e
    })?;

    print_summary(&summary);
    Ok(())
}
