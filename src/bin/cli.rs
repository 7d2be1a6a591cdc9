//! Catalog Crawler CLI
//!
//! Local execution entry point: ingestion passes, search queries and
//! maintenance against a storage directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use catalog_crawler::{
    error::{AppError, Result},
    models::{Config, ContentType, SearchOptions},
    pipeline::Orchestrator,
    search::SearchIndexService,
    services::DedupTracker,
    storage::LocalStorage,
    utils::http::{HttpFetcher, PageFetcher, StaticFetcher},
};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

/// Catalog Crawler - media catalog ingestion and search
#[derive(Parser, Debug)]
#[command(
    name = "catalog-crawler",
    version,
    about = "Ingest media catalogs and search them with graceful degradation"
)]
struct Cli {
    /// Path to storage directory containing config and state files
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one ingestion pass over the configured sources
    Ingest {
        /// Only ingest these source ids
        #[arg(long = "source")]
        sources: Vec<String>,

        /// Minimum records requested per source
        #[arg(long)]
        min_items: Option<usize>,

        /// Read a source's page from disk instead of the network (ID=FILE)
        #[arg(long = "html", value_name = "ID=FILE")]
        html: Vec<String>,
    },

    /// Search indexed content
    Search {
        query: String,

        /// Restrict to a content type (movie, drama, anime, tvshow)
        #[arg(long = "type")]
        content_type: Option<ContentType>,

        #[arg(long)]
        size: Option<usize>,

        #[arg(long)]
        genre: Option<String>,

        #[arg(long)]
        country: Option<String>,

        #[arg(long)]
        year: Option<i32>,

        #[arg(long)]
        min_rating: Option<f64>,
    },

    /// Autocomplete titles
    Suggest {
        prefix: String,

        #[arg(long, default_value_t = 10)]
        size: usize,
    },

    /// Probe search backends and report the active tier
    Health,

    /// Show index and tracker statistics
    Stats,

    /// Validate configuration
    Validate,

    /// Forget every tracked id so the next pass re-ingests everything
    ClearCache {
        /// Also drop the search index
        #[arg(long)]
        index: bool,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Build the search service, seeding its memory tier from the snapshot.
async fn open_search(config: &Config, storage: &LocalStorage) -> Result<SearchIndexService> {
    let mut service = SearchIndexService::new(&config.search)?;
    match storage.load_index().await {
        Ok(Some(snapshot)) => service = service.with_snapshot(snapshot),
        Ok(None) => log::info!("No index snapshot yet"),
        Err(e) => log::warn!("Ignoring unreadable index snapshot: {}", e),
    }
    service.probe().await;
    Ok(service)
}

/// Fetcher serving `ID=FILE` pages, keyed by each source's listing URL.
async fn offline_fetcher(config: &Config, pages: &[String]) -> Result<StaticFetcher> {
    let mut fetcher = StaticFetcher::new();
    for page in pages {
        let (id, file) = page
            .split_once('=')
            .ok_or_else(|| AppError::validation(format!("expected ID=FILE, got '{page}'")))?;
        let source = config
            .sources
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| AppError::validation(format!("unknown source '{id}'")))?;
        let html = tokio::fs::read_to_string(Path::new(file)).await?;
        fetcher.insert(source.listing_url(), html);
    }
    Ok(fetcher)
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let storage = LocalStorage::new(&cli.storage_dir);
    let config = Config::load_or_default(storage.config_path());
    let tracker_path = storage.path(&config.tracker.cache_file);

    log::info!("Using storage directory {}", cli.storage_dir.display());

    match cli.command {
        Command::Ingest {
            sources,
            min_items,
            html,
        } => {
            config.validate()?;
            let selected: Vec<_> = config
                .sources
                .iter()
                .filter(|s| sources.is_empty() || sources.contains(&s.id))
                .cloned()
                .collect();
            if selected.is_empty() {
                return Err(AppError::validation("no matching sources"));
            }

            let fetcher: Arc<dyn PageFetcher> = if html.is_empty() {
                Arc::new(HttpFetcher::new(&config.fetch)?)
            } else {
                Arc::new(offline_fetcher(&config, &html).await?)
            };
            let search = Arc::new(open_search(&config, &storage).await?);
            search.create_index().await;
            let tracker = DedupTracker::load(&tracker_path).await;

            let mut orchestrator = Orchestrator::new(&config, fetcher, Arc::clone(&search), tracker)?
                .with_tracker_path(&tracker_path);

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupt received, stopping after the current source");
                    on_signal.cancel();
                }
            });

            let min_items = min_items.unwrap_or(config.ingest.min_items_per_source);
            let summary = orchestrator.update_all(&selected, min_items, &cancel).await;

            if let Err(e) = storage.save_index(&search.snapshot()).await {
                log::warn!("Failed to save index snapshot: {}", e);
            }
            print_json(&summary)?;
        }

        Command::Search {
            query,
            content_type,
            size,
            genre,
            country,
            year,
            min_rating,
        } => {
            let search = open_search(&config, &storage).await?;
            let options = SearchOptions {
                size,
                genre,
                country,
                year,
                min_rating,
            };
            let hits = search.search(Some(&query), content_type, &options).await;
            log::info!("{} result(s) for '{}' ({})", hits.len(), query, search.tier());
            print_json(&hits)?;
        }

        Command::Suggest { prefix, size } => {
            let search = open_search(&config, &storage).await?;
            print_json(&search.get_suggestions(&prefix, size).await)?;
        }

        Command::Health => {
            let search = open_search(&config, &storage).await?;
            print_json(&search.health_check().await)?;
        }

        Command::Stats => {
            let search = open_search(&config, &storage).await?;
            let tracker = DedupTracker::load(&tracker_path).await;
            print_json(&serde_json::json!({
                "index": search.get_index_stats().await,
                "tracker": tracker.stats(),
            }))?;
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            SearchIndexService::new(&config.search)?;
            log::info!("✓ Config OK ({} source(s))", config.sources.len());
        }

        Command::ClearCache { index } => {
            let mut tracker = DedupTracker::load(&tracker_path).await;
            tracker.clear();
            if !tracker.save(&tracker_path).await {
                return Err(AppError::persistence(
                    tracker_path.display(),
                    "could not write cleared tracker state",
                ));
            }
            log::info!("Tracker state cleared");

            if index {
                let search = open_search(&config, &storage).await?;
                search.delete_index().await;
                storage.save_index(&search.snapshot()).await?;
                log::info!("Search index dropped");
            }
        }
    }

    log::info!("Done!");

    Ok(())
}
