//! Arena-Stats main entry point
//!
//! Command-line interface for the match-history ingester.

use anyhow::Context;
use arena_stats::api::ApiClient;
use arena_stats::config::{load_config_with_hash, Config};
use arena_stats::crawler::IngestionManager;
use arena_stats::export::DatasetWriter;
use arena_stats::storage::{MatchStore, SqliteStore};
use arena_stats::ArenaError;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Arena-Stats: match history ingestion for a rate-limited game API
///
/// Starts from seed players, walks the player/match graph breadth-first up
/// to a configured depth, and persists matches, players, and per-match stats
/// to SQLite (optionally exporting partitioned datasets).
#[derive(Parser, Debug)]
#[command(name = "arena-stats")]
#[command(version)]
#[command(about = "Match history ingestion for a rate-limited game API", long_about = None)]
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

    /// Additional seed nickname (repeatable)
    #[arg(long = "nickname", value_name = "NICKNAME")]
    nicknames: Vec<String>,

    /// Additional seed uid (repeatable)
    #[arg(long = "uid", value_name = "UID")]
    uids: Vec<String>,

    /// Override the configured max crawl depth
    #[arg(long)]
    depth: Option<u32>,

    /// Override the configured per-user games cap
    #[arg(long = "max-games", value_name = "N")]
    max_games: Option<u32>,

    /// Validate config and show what would be ingested without running
    #[arg(long)]
    dry_run: bool,

    /// Fail the run if the character or item catalog refresh fails
    #[arg(long)]
    require_metadata_refresh: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) =
        load_config_with_hash(&cli.config).context("failed to load configuration")?;
    tracing::info!("Configuration loaded (hash: {})", config_hash);

    apply_overrides(&mut config, &cli);

    if cli.dry_run {
        print_dry_run(&config);
        return Ok(());
    }

    run_ingest(config, &config_hash, cli.require_metadata_refresh).await?;
    Ok(())
}

/// Sets up the tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("arena_stats=info,warn"),
            1 => EnvFilter::new("arena_stats=debug,info"),
            2 => EnvFilter::new("arena_stats=trace,debug"),
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

/// Folds CLI arguments over the file configuration
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(depth) = cli.depth {
        config.crawl.max_depth = depth;
    }
    if let Some(max_games) = cli.max_games {
        config.crawl.max_games_per_user = Some(max_games);
    }
    config.seeds.nicknames.extend(cli.nicknames.iter().cloned());
    config.seeds.uids.extend(cli.uids.iter().cloned());
}

/// Handles --dry-run: validates config and shows what would be ingested
fn print_dry_run(config: &Config) {
    println!("=== Arena-Stats Dry Run ===\n");

    println!("API:");
    println!("  Base URL: {}", config.api.base_url);
    println!("  Min interval: {}ms", config.api.min_interval_ms);
    println!("  Max retries: {}", config.api.max_retries);
    println!(
        "  Credential: {}",
        if config.api.api_key().is_some() {
            "present"
        } else {
            "MISSING"
        }
    );

    println!("\nCrawl:");
    println!("  Max depth: {}", config.crawl.max_depth);
    match config.crawl.max_games_per_user {
        Some(cap) => println!("  Max games per user: {}", cap),
        None => println!("  Max games per user: unlimited"),
    }
    println!("  Fetch game details: {}", config.crawl.fetch_game_details);
    println!("  Only newer games: {}", config.crawl.only_newer_games);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    match &config.output.export_dir {
        Some(dir) => println!("  Export dir: {}", dir),
        None => println!("  Export dir: (disabled)"),
    }

    println!("\nSeeds ({} nicknames, {} uids):", config.seeds.nicknames.len(), config.seeds.uids.len());
    for nickname in &config.seeds.nicknames {
        println!("  - {}", nickname);
    }
    for uid in &config.seeds.uids {
        println!("  - uid:{}", uid);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main ingest operation
async fn run_ingest(
    config: Config,
    config_hash: &str,
    require_metadata_refresh: bool,
) -> anyhow::Result<()> {
    let client = ApiClient::new(&config.api)?;
    let store = Arc::new(Mutex::new(
        SqliteStore::new(Path::new(&config.output.database_path))
            .context("failed to open database")?,
    ));

    refresh_catalogs(&client, &store, require_metadata_refresh).await?;

    let exporter = match &config.output.export_dir {
        Some(dir) => Some(DatasetWriter::new(Path::new(dir)).context("failed to set up export")?),
        None => None,
    };

    let mut manager = IngestionManager::new(client, store, exporter, config.crawl.clone());
    let summary = manager.run(&config.seeds, config_hash).await?;

    tracing::info!(
        "Ingest finished: {} users processed, {} games, {} participant rows, \
         {} discovered, {} empty, {} abandoned, {} unresolved",
        summary.users_processed,
        summary.games_ingested,
        summary.participant_rows,
        summary.users_discovered,
        summary.empty_nodes,
        summary.abandoned_nodes,
        summary.unresolved_nicknames,
    );
    Ok(())
}

/// Refreshes the character and item catalogs before ingesting.
///
/// Failures are warnings by default; the ingest still works, it just stores
/// codes without their display names. `--require-metadata-refresh` turns
/// them into a hard error.
async fn refresh_catalogs(
    client: &ApiClient,
    store: &Arc<Mutex<SqliteStore>>,
    required: bool,
) -> anyhow::Result<()> {
    let characters_ok = match client.character_catalog().await {
        Ok(entries) if !entries.is_empty() => {
            let stored = store.lock().unwrap().refresh_characters(&entries)?;
            tracing::info!("Stored {} character definitions", stored);
            true
        }
        Ok(_) => {
            tracing::warn!("Character catalog response was empty; skipping refresh");
            false
        }
        Err(e) => {
            tracing::warn!("Failed to refresh character catalog: {}", e);
            false
        }
    };

    let items_ok = match client.item_catalog().await {
        Ok(entries) if !entries.is_empty() => {
            let stored = store.lock().unwrap().refresh_items(&entries)?;
            tracing::info!("Stored {} item definitions", stored);
            true
        }
        Ok(_) => {
            tracing::warn!("Item catalog response was empty; skipping refresh");
            false
        }
        Err(e) => {
            tracing::warn!("Failed to refresh item catalog: {}", e);
            false
        }
    };

    if required && !(characters_ok && items_ok) {
        return Err(ArenaError::MetadataRefresh.into());
    }
    Ok(())
}
