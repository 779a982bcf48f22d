//! pricewatch CLI
//!
//! Local execution entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use pricewatch::{
    bus::InProcessBus,
    config::{self, DEFAULT_CONFIG_FILE},
    error::Result,
    models::{Config, OutputMode},
    pipeline::{
        self, CatalogSource, LiveCatalogSource, ProductRefresher, SnapshotRefresher,
        SnapshotSource, StoredProductRefresher, Supervisor,
    },
    services::{HttpCategoryPages, HttpProductPages, ProductScraper},
    storage::{FavoriteStore, LocalStore, PriceHistoryLedger, SnapshotStore, StorageHandler},
};
use tokio_util::sync::CancellationToken;

/// pricewatch - catalog price tracker
#[derive(Parser, Debug)]
#[command(
    name = "pricewatch",
    version,
    about = "Tracks catalog prices and notifies users about drops on their favorites"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile a catalog batch once and deliver resulting notifications
    Ingest {
        /// Catalog snapshot file ({"data": {"contents": [...]}})
        #[arg(long, required_unless_present = "live", conflicts_with = "live")]
        snapshot: Option<PathBuf>,

        /// Scrape product listings instead of reading a snapshot
        #[arg(long)]
        live: bool,
    },

    /// Crawl the category tree and save it
    Crawl,

    /// Start consumer and scheduler, ingest once, run until Ctrl-C
    Run {
        /// Catalog snapshot to ingest at startup
        #[arg(long, conflicts_with = "live")]
        snapshot: Option<PathBuf>,

        /// Scrape product listings at startup
        #[arg(long)]
        live: bool,

        /// Snapshot re-read by the favorites scheduler on every tick
        #[arg(long)]
        feed: Option<PathBuf>,
    },

    /// Mark a product as favorite for a user
    Favorite {
        #[arg(long)]
        user: String,

        #[arg(long)]
        product: u64,
    },

    /// Show the price history of a product
    History {
        #[arg(long)]
        product: u64,
    },

    /// Validate the configuration file
    Validate,
}

/// Initialize logging; `-v` wins over the configured level and `RUST_LOG`
/// wins over both.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

async fn open_store(config: &Config) -> Result<Arc<LocalStore>> {
    let store = LocalStore::open(&config.storage.data_dir).await?;
    log::info!("Using data directory {}", store.root_dir().display());
    Ok(Arc::new(store))
}

/// Scraping source over the configured listings, or the leaves of the
/// last crawled category tree.
async fn live_source(config: &Config, store: &LocalStore) -> Result<LiveCatalogSource> {
    let pages = Arc::new(HttpProductPages::new(&config.crawler, &config.products)?);
    let scraper = ProductScraper::new(pages, &config.crawler, &config.products);
    let listings = LiveCatalogSource::listings(&config.products, &store.categories().await);
    if listings.is_empty() {
        log::warn!("No product listings configured and no crawled categories; run crawl first");
    }
    Ok(LiveCatalogSource::new(scraper, listings))
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = config::load_config(&cli.config);
    init_logging(
        cli.verbose,
        loaded.as_ref().map_or("info", |c| c.logging.level.as_str()),
    );
    let config = loaded?;

    log::info!("pricewatch starting with {}", cli.config.display());

    match cli.command {
        Command::Ingest { snapshot, .. } => {
            if let Some(note) = config::output_mode_note(&config, "ingest") {
                log::warn!("{note}");
            }
            let store = open_store(&config).await?;
            let source: Box<dyn CatalogSource> = match snapshot {
                Some(path) => Box::new(SnapshotSource::new(path)),
                None => Box::new(live_source(&config, &store).await?),
            };
            let bus = Arc::new(InProcessBus::from_config(&config.bus));
            let supervisor = Supervisor::new(config, store, bus);

            supervisor.run_once(source.as_ref()).await?;
        }

        Command::Crawl => {
            let storage: Box<dyn StorageHandler> = match config.storage.output_mode {
                OutputMode::Store => Box::new(LocalStore::open(&config.storage.data_dir).await?),
                OutputMode::Snapshot => Box::new(SnapshotStore::new(&config.storage.snapshot_dir)),
            };
            let pages = Arc::new(HttpCategoryPages::new(&config.crawler)?);

            let report = pipeline::run_crawl(&config, pages, storage.as_ref()).await?;
            if !report.failed.is_empty() {
                log::warn!("{} category pages could not be read", report.failed.len());
            }
        }

        Command::Run {
            snapshot,
            live,
            feed,
        } => {
            if let Some(note) = config::output_mode_note(&config, "run") {
                log::warn!("{note}");
            }
            let store = open_store(&config).await?;
            let bus = Arc::new(InProcessBus::from_config(&config.bus));
            let refresher: Arc<dyn ProductRefresher> = match feed {
                Some(path) => Arc::new(SnapshotRefresher::new(path)),
                None => Arc::new(StoredProductRefresher::new(store.clone())),
            };
            let source: Option<Box<dyn CatalogSource>> = if live {
                Some(Box::new(live_source(&config, &store).await?))
            } else {
                snapshot.map(|path| Box::new(SnapshotSource::new(path)) as Box<dyn CatalogSource>)
            };
            let supervisor = Supervisor::new(config, store, bus);

            let token = CancellationToken::new();
            tokio::spawn({
                let token = token.clone();
                async move {
                    match tokio::signal::ctrl_c().await {
                        Ok(()) => log::info!("Shutdown requested"),
                        Err(e) => log::error!("Cannot listen for Ctrl-C, stopping: {e}"),
                    }
                    token.cancel();
                }
            });

            supervisor
                .run(source.as_deref(), refresher, token)
                .await?;
        }

        Command::Favorite { user, product } => {
            let store = open_store(&config).await?;
            let favorite = store.add_favorite(&user, product).await?;
            log::info!(
                "Favorite #{}: user {} -> product {}",
                favorite.id,
                favorite.user_id,
                favorite.product_id
            );
        }

        Command::History { product } => {
            let store = open_store(&config).await?;
            let history = store.history(product).await?;
            if history.is_empty() {
                log::info!("No price changes recorded for product {product}");
            }
            for entry in history {
                log::info!(
                    "{}  {:.2}",
                    entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.price
                );
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config::check_runtime(&config) {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK (crawler, products, storage, bus, scheduler)");
        }
    }

    log::info!("Done!");

    Ok(())
}
