//! exmig - exhibition content migration CLI
//!
//! Reads exhibition pages from the source CMS database and recreates them
//! as entries and assets on the hosted content platform.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use exmig::assets::AssetDeduplicator;
use exmig::clean::Cleaner;
use exmig::source::PgSourceStore;
use exmig::target::{ContentfulClient, MemoryStore, TargetStore};
use exmig::Migration;
use exmig_common::config::{self, CliOverrides, MigrationConfig};
use exmig_common::Depth;

/// Command-line arguments for exmig
#[derive(Parser, Debug)]
#[command(name = "exmig")]
#[command(about = "Migrate exhibition pages to the hosted content platform")]
#[command(version)]
struct Args {
    /// TOML config file (default: ./exmig.toml if present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Source database URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Write to an in-memory platform instead of the real one
    #[arg(long, global = true)]
    dry_run: bool,

    /// Top-level pages (or images) processed concurrently
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    /// Asset index snapshot file
    #[arg(long, global = true, value_name = "FILE")]
    asset_cache: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload every source picture not yet on the platform
    Images,
    /// Inspect or rebuild the asset index snapshot
    Assets {
        #[command(subcommand)]
        action: AssetsAction,
    },
    /// Create one page tree, or every top-level page
    Create { urlname: Option<String> },
    /// Image pass followed by creating every top-level page
    Migrate,
    /// Write credit pages into their exhibition entries
    Credits,
    /// Print a page's source tree as JSON
    Load {
        urlname: String,
        /// Source language code; default is the translated default tree
        language: Option<String>,
    },
    /// Report translation alignment for one page or all of them
    Translate { urlname: Option<String> },
    /// Delete one entry graph, or every exhibition page graph
    Clean {
        id: Option<String>,
        /// Keep linked entries and assets that something else links to
        #[arg(long)]
        check_links: bool,
    },
}

#[derive(Subcommand, Debug)]
enum AssetsAction {
    /// Enumerate platform assets and write the snapshot
    Cache,
    /// Print every known asset id
    List,
}

#[tokio::main]
async fn main() -> ExitCode {
    config::load_dotenv();
    let args = Args::parse();

    let config = match resolve_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = exmig_common::logging::init_logging(Some(&config.error_log)) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    info!(
        "exmig {} ({} {}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_PROFILE"),
        env!("BUILD_TIMESTAMP")
    );
    info!("Error log: {}", config.error_log.display());

    match run(args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Fatal: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn resolve_config(args: &Args) -> Result<MigrationConfig> {
    let toml = config::load_toml_config(args.config.as_deref())?;
    let cli = CliOverrides {
        database_url: args.database_url.clone(),
        jobs: args.jobs,
        asset_cache: args.asset_cache.clone(),
    };
    Ok(MigrationConfig::resolve(&cli, &toml)?)
}

fn connect_target(config: &MigrationConfig, dry_run: bool) -> Result<Arc<dyn TargetStore>> {
    if dry_run {
        info!("Dry run: writing to an in-memory platform");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let client = ContentfulClient::new(&config.target).context("Failed to configure platform client")?;
    Ok(Arc::new(client))
}

fn build_assets(
    config: &MigrationConfig,
    target: Arc<dyn TargetStore>,
    dry_run: bool,
) -> Arc<AssetDeduplicator> {
    let mut assets = AssetDeduplicator::new(target, config.locales.clone());
    if let Some(server) = &config.image_server {
        assets = assets.with_image_server(server.clone());
    }
    // A dry run must not record in-memory asset ids as real ones
    if !dry_run {
        assets = assets.with_snapshot(config.asset_cache.clone());
    }
    Arc::new(assets)
}

async fn run(args: Args, config: MigrationConfig) -> Result<()> {
    let target = connect_target(&config, args.dry_run)?;
    let assets = build_assets(&config, target.clone(), args.dry_run);

    // Commands that only touch the platform
    match &args.command {
        Command::Assets { action } => {
            match action {
                AssetsAction::Cache => {
                    let count = assets.cache().await.context("Failed to enumerate assets")?;
                    info!("Cached {} asset ids to {}", count, config.asset_cache.display());
                }
                AssetsAction::List => {
                    for id in assets.known_ids().await.context("Failed to enumerate assets")? {
                        println!("{}", id);
                    }
                }
            }
            return Ok(());
        }
        Command::Clean { id, check_links } => {
            let cleaner = Cleaner::new(target, assets).with_link_check(*check_links);
            let tally = match id {
                Some(id) => cleaner.smart_delete(id, Depth::ROOT).await,
                None => cleaner.clean_all(Depth::ROOT).await?,
            };
            info!(
                deleted_entries = tally.deleted_entries,
                deleted_assets = tally.deleted_assets,
                kept_shared = tally.kept_shared,
                failures = tally.failures,
                "Cleanup finished"
            );
            return Ok(());
        }
        _ => {}
    }

    if matches!(args.command, Command::Images | Command::Migrate) {
        config.require_image_server()?;
    }

    let database_url = config.require_database_url()?;
    let source = Arc::new(
        PgSourceStore::connect(database_url)
            .await
            .context("Failed to connect to source database")?,
    );
    info!("Source database connection established");

    let migration = Migration::new(source.clone(), target, assets, config.locales.clone()).with_jobs(config.jobs);
    let outcome = dispatch(&migration, args.command).await;
    source.close().await;
    outcome
}

async fn dispatch(migration: &Migration, command: Command) -> Result<()> {
    match command {
        Command::Images => {
            let tally = migration.images().await?;
            info!(
                existing = tally.existing,
                created = tally.created,
                failed = tally.failed,
                "Images done"
            );
        }
        Command::Create { urlname: Some(urlname) } => {
            let id = migration.create(&urlname).await?;
            println!("{}", serde_json::to_string(&id)?);
        }
        Command::Create { urlname: None } => {
            let ids = migration.create_all().await?;
            info!("Created {} exhibitions", ids.len());
        }
        Command::Migrate => {
            let report = migration.migrate().await?;
            info!(
                images_created = report.images.created,
                images_failed = report.images.failed,
                exhibitions = report.pages.len(),
                "Migration done"
            );
        }
        Command::Credits => {
            let tally = migration.credits().await?;
            info!(updated = tally.updated, unmatched = tally.unmatched, "Credits done");
        }
        Command::Load { urlname, language } => {
            let page = migration.load(&urlname, language.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        Command::Translate { urlname } => {
            let statuses = migration.translate(urlname.as_deref()).await?;
            let aligned = statuses.iter().filter(|s| s.aligned).count();
            info!("{} of {} translations align", aligned, statuses.len());
        }
        Command::Assets { .. } | Command::Clean { .. } => {}
    }
    Ok(())
}
