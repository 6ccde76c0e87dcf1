//! Biz-Sweep main entry point
//!
//! This is the command-line interface for the Biz-Sweep business search sweeper.

use anyhow::Context;
use biz_sweep::config::{load_config_with_hash, resolve_api_key, validate, Config};
use biz_sweep::crawler::{CrawlEngine, RunOutcome, RunReport, YelpClient};
use biz_sweep::output::{export_jsonl, load_statistics, print_statistics};
use biz_sweep::planner::QueryPlanner;
use biz_sweep::storage::{open_storage, LedgerLock};
use biz_sweep::{ConfigError, SweepError};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit status of a run stopped by the rate limiter (EX_TEMPFAIL)
const EXIT_PAUSED: u8 = 75;

/// Exit status of a configuration error (EX_CONFIG)
const EXIT_CONFIG: u8 = 78;

/// Biz-Sweep: a resumable business-search sweeper
///
/// Biz-Sweep enumerates every business the search API returns for the
/// configured areas, one page at a time within the API's request budget.
/// Stopping is always safe: rerun the same command to continue.
#[derive(Parser, Debug)]
#[command(name = "biz-sweep")]
#[command(version)]
#[command(about = "A resumable, rate-limit-aware business search sweeper", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Sweep this location instead of the configured areas (repeatable)
    #[arg(long = "area", value_name = "CITY, ST")]
    areas: Vec<String>,

    /// Search with this filter instead of the configured ones (repeatable)
    #[arg(long = "filter", value_name = "TERM")]
    filters: Vec<String>,

    /// Also run an unfiltered search for every area
    #[arg(long)]
    all: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be swept without sending requests
    #[arg(long, conflicts_with_all = ["stats", "export"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export"])]
    stats: bool,

    /// Write every stored record to PATH as JSON Lines and exit
    #[arg(long, value_name = "PATH", conflicts_with_all = ["dry_run", "stats"])]
    export: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            exit_code_for(&e)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if !cli.areas.is_empty() || !cli.filters.is_empty() || cli.all {
        config.apply_overrides(&cli.areas, &cli.filters, cli.all);
        validate(&config)?;
    }

    if cli.dry_run {
        handle_dry_run(&config);
        Ok(ExitCode::SUCCESS)
    } else if cli.stats {
        handle_stats(&config)?;
        Ok(ExitCode::SUCCESS)
    } else if let Some(path) = &cli.export {
        handle_export(&config, path)?;
        Ok(ExitCode::SUCCESS)
    } else {
        handle_sweep(&config, config_hash).await
    }
}

/// Maps an error to the process exit status
fn exit_code_for(error: &anyhow::Error) -> ExitCode {
    let is_config = error.downcast_ref::<ConfigError>().is_some()
        || error
            .downcast_ref::<SweepError>()
            .is_some_and(SweepError::is_configuration);

    if is_config {
        ExitCode::from(EXIT_CONFIG)
    } else {
        ExitCode::FAILURE
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("biz_sweep=info,warn"),
            1 => EnvFilter::new("biz_sweep=debug,info"),
            2 => EnvFilter::new("biz_sweep=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would be swept
fn handle_dry_run(config: &Config) {
    println!("=== Biz-Sweep Dry Run ===\n");

    println!("API:");
    println!("  Base URL: {}", config.api.base_url);
    println!("  Page size: {}", config.api.page_size);
    println!("  Pagination ceiling: {}", config.api.max_results);
    match resolve_api_key(&config.api) {
        Ok(_) => println!("  Key: found in ${}", config.api.key_env),
        Err(_) => println!("  Key: ${} is NOT set", config.api.key_env),
    }

    println!("\nRate Limit:");
    println!(
        "  {} requests per {}s",
        config.rate_limit.requests_per_window, config.rate_limit.window_secs
    );

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    let planner = QueryPlanner::from_config(config);
    println!("\nArea Roots ({}):", planner.roots().len());
    for root in planner.roots() {
        if root.partitions.is_empty() {
            println!("  - {}", root.unit);
        } else {
            println!("  - {} ({} ZIP partitions)", root.unit, root.partitions.len());
        }
    }

    println!("\n✓ Configuration is valid");
    println!("  Roots over the ceiling of {} are subdivided while sweeping", config.api.max_results);
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export mode: writes stored records as JSON Lines
fn handle_export(config: &Config, path: &Path) -> anyhow::Result<()> {
    let storage = open_storage(Path::new(&config.output.database_path))?;
    let written = export_jsonl(&storage, path)
        .with_context(|| format!("exporting to {}", path.display()))?;

    println!("✓ Exported {} records to: {}", written, path.display());
    Ok(())
}

/// Handles the main sweep operation
async fn handle_sweep(config: &Config, config_hash: String) -> anyhow::Result<ExitCode> {
    let api_key = resolve_api_key(&config.api)?;

    let db_path = Path::new(&config.output.database_path);
    let _lock = LedgerLock::acquire(db_path)?;

    let storage = open_storage(db_path)?;
    let client = YelpClient::new(&config.api, api_key)?;

    let mut engine = CrawlEngine::new(config, client, storage)?.with_config_hash(config_hash);
    let outcome = engine.run().await?;

    print_report(&engine.report());

    match outcome {
        RunOutcome::Complete => {
            tracing::info!("Sweep complete");
            Ok(ExitCode::SUCCESS)
        }
        RunOutcome::Paused(reason) => {
            tracing::info!("Sweep paused ({}); rerun the same command to continue", reason);
            Ok(ExitCode::from(EXIT_PAUSED))
        }
    }
}

fn print_report(report: &RunReport) {
    println!("Units planned this run: {}", report.units_planned);
    println!(
        "Units completed: {} ({} truncated, {} possibly truncated)",
        report.units_completed, report.units_truncated, report.units_possibly_truncated
    );
    println!("Pages fetched: {}", report.pages_fetched);
    println!("Requests sent: {}", report.requests_issued);
    println!(
        "Records: {} new, {} duplicate, {} near-duplicate",
        report.records_new, report.records_duplicate, report.records_near_duplicate
    );
}
