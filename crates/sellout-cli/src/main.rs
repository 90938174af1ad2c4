use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sellout_cli::{Command, Config, LocationArgs};
use sellout_core::traits::WatermarkStore;
use sellout_core::{
    DbConfig, DictionaryStats, DirectoryDictionarySource, DirectorySource, FileWatermarkStore,
    SourceConfig, SyncConfig, SyncError, SyncService, SyncStats, SyncSummary, TracingReporter,
    load_source_config, refresh_dictionaries, timestamp,
};
use sellout_db::PgEntityStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let config = Config::parse();

    // The watermark lives on disk; no database needed.
    if let Command::Watermark { locations } = &config.command {
        return show_watermark(locations).await;
    }

    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL is not set (use --database-url or the environment)")?;

    info!("Connecting to database...");
    let db_config = DbConfig::default();
    let pool = PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .connect(database_url)
        .await
        .context("Failed to connect to database")?;

    let store = PgEntityStore::new(pool);

    match config.command {
        Command::Sync {
            locations,
            dictionaries,
            location,
            limit,
            skip_dictionaries,
        } => {
            let sources = resolve_sources(&locations)?;

            let mut sync_config = SyncConfig::default();
            if let Some(prefix) = location.or_else(|| sources.location.clone()) {
                sync_config = sync_config.with_location(prefix);
            }
            if skip_dictionaries {
                sync_config = sync_config.without_dictionary_refresh();
            }
            if let Some(limit) = limit {
                sync_config = sync_config.with_max_snapshots(limit);
            }

            let dictionary_dir = dictionaries.or_else(|| sources.dictionary_dir.clone());
            handle_sync(&store, &sources, sync_config, dictionary_dir).await?;
        }
        Command::Dictionaries { dir, config } => {
            let dir = match dir {
                Some(dir) => dir,
                None => load_source_config(config)?
                    .and_then(|c| c.dictionary_dir)
                    .ok_or_else(|| {
                        anyhow::anyhow!(
                            "No dictionary directory. Use --dir or set dictionary_dir in sellout.toml"
                        )
                    })?,
            };
            let stats = refresh_dictionaries(
                &store,
                &DirectoryDictionarySource::new(&dir),
                &TracingReporter,
            )
            .await
            .map_err(report_failure)?;
            print_dictionary_summary(&stats);
        }
        Command::Migrate => {
            store.migrate().await.context("Failed to apply migrations")?;
            info!("Database schema is up to date");
        }
        Command::Stats => {
            show_stats(&store).await?;
        }
        Command::Watermark { .. } => unreachable!("handled before connecting"),
    }

    Ok(())
}

/// Merges location flags over `sellout.toml`.
fn resolve_sources(locations: &LocationArgs) -> anyhow::Result<SourceConfig> {
    let flags = SourceConfig {
        snapshot_dir: locations.snapshot_dir.clone(),
        watermark_path: locations.watermark.clone(),
        ..Default::default()
    };
    let file = load_source_config(locations.config.clone())?.unwrap_or_default();
    Ok(flags.or(file))
}

async fn handle_sync(
    store: &PgEntityStore,
    sources: &SourceConfig,
    sync_config: SyncConfig,
    dictionary_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let snapshot_dir = sources.require_snapshot_dir()?;
    let watermark_path = sources.resolve_watermark_path()?;
    info!(
        snapshots = %snapshot_dir.display(),
        watermark = %watermark_path.display(),
        "Syncing crawler output"
    );

    let service = SyncService::with_config(
        store.clone(),
        DirectorySource::new(snapshot_dir),
        FileWatermarkStore::new(watermark_path),
        sync_config,
    );
    let reporter = TracingReporter;

    if service.config().refresh_dictionaries {
        match dictionary_dir {
            Some(dir) => {
                let stats = service
                    .refresh_dictionaries(&DirectoryDictionarySource::new(dir), &reporter)
                    .await
                    .map_err(report_failure)?;
                print_dictionary_summary(&stats);
            }
            None => info!("No dictionary directory configured, skipping dictionary refresh"),
        }
    }

    // First Ctrl-C stops the run after the snapshot in flight.
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current snapshot");
            interrupt.cancel();
        }
    });

    let summary = service
        .run_cancellable(&reporter, cancel)
        .await
        .map_err(report_failure)?;
    print_sync_summary(&summary);

    Ok(())
}

/// Logs a run-ending error with its classification before handing it to anyhow.
fn report_failure(e: SyncError) -> anyhow::Error {
    error!(retryable = e.is_retryable(), "{}", e.user_message());
    if e.is_retryable() {
        info!("The watermark was not moved past the failure; rerun sync to resume");
    }
    anyhow::Error::new(e)
}

async fn show_watermark(locations: &LocationArgs) -> anyhow::Result<()> {
    let sources = resolve_sources(locations)?;
    let path = sources.resolve_watermark_path()?;
    let watermark = FileWatermarkStore::new(&path)
        .read()
        .await
        .with_context(|| format!("Failed to read watermark {}", path.display()))?;

    if watermark == timestamp::epoch() {
        println!("No snapshot applied yet ({})", path.display());
    } else {
        println!("{}", timestamp::format_pull_time(watermark));
        eprintln!("  {} ({})", watermark, path.display());
    }
    Ok(())
}

/// Print a summary of one sync run.
fn print_sync_summary(summary: &SyncSummary) {
    info!("");
    info!("═══════════════════════════════════════════════════════");
    if summary.status.is_cancelled() {
        info!("SYNC CANCELLED ({} snapshots left)", summary.remaining());
    } else {
        info!("SYNC COMPLETE");
    }
    info!("═══════════════════════════════════════════════════════");
    info!("  Snapshots listed:    {}", summary.listed);
    info!("  Snapshots pending:   {}", summary.pending);
    info!("  Snapshots applied:   {}", summary.applied);
    info!("  Snapshots skipped:   {}", summary.skipped.len());
    info!("  Watermark:           {} -> {}", summary.watermark_before, summary.watermark_after);
    print_entity_stats("Events", &summary.events);
    print_entity_stats("Venues", &summary.venues);

    if !summary.skipped.is_empty() {
        info!("───────────────────────────────────────────────────────");
        info!("Skipped snapshots:");
        for skipped in &summary.skipped {
            warn!("  - {}: {}", skipped.location, skipped.reason);
        }
    }
    info!("═══════════════════════════════════════════════════════");
}

fn print_entity_stats(label: &str, stats: &SyncStats) {
    info!("───────────────────────────────────────────────────────");
    info!("  {}", label);
    info!("  = Unchanged:         {}", stats.unchanged);
    info!("  ↑ Updated:           {}", stats.updated);
    info!("  + Created:           {}", stats.created);
    info!("  ✗ Failed:            {}", stats.failed);
}

fn print_dictionary_summary(stats: &DictionaryStats) {
    info!(
        "Dictionaries refreshed: formats {} created / {} updated, categories {} created / {} updated",
        stats.formats.created,
        stats.formats.updated,
        stats.categories.created,
        stats.categories.updated
    );
}

async fn show_stats(store: &PgEntityStore) -> anyhow::Result<()> {
    let stats = store.get_stats().await?;

    println!("\n📊 Database Statistics\n");
    println!("  Events:                {}", stats.events);
    println!("  Sold out:              {}", stats.sold_out_events);
    println!("  Venues:                {}", stats.venues);
    println!("  Formats:               {}", stats.formats);
    println!("  Categories:            {}", stats.categories);
    if let Some(latest) = stats.latest_info_date {
        println!("  Latest snapshot data:  {}", latest);
    }
    println!();

    Ok(())
}
