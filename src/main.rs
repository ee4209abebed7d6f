use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use venue_sync::app::collect_use_case::{CollectOptions, CollectUseCase};
use venue_sync::app::load_use_case::{LoadMode, Loader};
use venue_sync::app::ports::DocumentStorePort;
use venue_sync::config::Config;
use venue_sync::constants::ENV_FIRESTORE_TOKEN;
use venue_sync::infra::{FirestoreStore, InMemoryStore, ReqwestHttp};
use venue_sync::pipeline::ingestion::{ListingQuery, RetryingFetcher};
use venue_sync::pipeline::storage::dataset::DatasetWriter;
use venue_sync::logging;

#[derive(Parser)]
#[command(name = "venue_sync")]
#[command(about = "Collects venue listings and schedules and syncs them into a document store")]
#[command(version)]
struct Cli {
    /// Path to config.toml (defaults to $VENUE_SYNC_CONFIG, then ./config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging for this crate
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the listing and detail sources and write the artifact
    Collect {
        /// Free-text filter passed to the listing API
        #[arg(long)]
        keyword: Option<String>,
        /// Maximum listing pages to walk
        #[arg(long)]
        pages: Option<u32>,
        #[arg(long)]
        page_size: Option<u32>,
        #[arg(long)]
        start_page: Option<u32>,
        /// Stop after this many venues
        #[arg(long)]
        max_items: Option<usize>,
        /// Listing data only; every record stays partial
        #[arg(long)]
        skip_details: bool,
        /// Print records as JSON instead of writing the artifact
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        artifact: Option<PathBuf>,
    },
    /// Upsert the artifact into the document store
    Load {
        /// Hot-fix a single venue by name (or id) instead of syncing everything
        #[arg(long)]
        name: Option<String>,
        /// Sync into an in-memory store and report what would be written
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        artifact: Option<PathBuf>,
        /// Concurrent upserts in batch mode
        #[arg(long)]
        concurrency: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Hold the guard so file logs flush on exit
    let _log_guard = logging::init_logging(cli.verbose);
    venue_sync::metrics::init_metrics();

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Collect {
            keyword,
            pages,
            page_size,
            start_page,
            max_items,
            skip_details,
            dry_run,
            artifact,
        } => {
            if let Some(pages) = pages {
                config.crawl.max_pages = pages;
            }
            if let Some(size) = page_size {
                config.crawl.page_size = size;
            }
            if let Some(start) = start_page {
                config.crawl.start_page = start;
            }
            if let Some(max) = max_items {
                config.crawl.max_items = max;
            }
            if let Some(path) = artifact {
                config.artifact.path = path;
            }
            config.validate()?;

            let query = match keyword.filter(|k| !k.trim().is_empty()) {
                Some(keyword) => ListingQuery::Keyword(keyword),
                None => ListingQuery::Pages(config.crawl.max_pages),
            };
            run_collect(&config, query, !skip_details, dry_run).await
        }
        Commands::Load {
            name,
            dry_run,
            artifact,
            concurrency,
        } => {
            if let Some(path) = artifact {
                config.artifact.path = path;
            }
            if let Some(n) = concurrency {
                config.store.concurrency = n;
            }
            let mode = match name {
                Some(name) => LoadMode::HotFix { name },
                None => LoadMode::Batch,
            };
            run_load(&config, mode, dry_run).await
        }
    }
}

// Progress and summaries go to stderr so `--dry-run` output on stdout can be piped.
async fn run_collect(config: &Config, query: ListingQuery, fetch_details: bool, dry_run: bool) -> anyhow::Result<()> {
    eprintln!("🔄 Collecting venues ({:?})...", query);

    let http = ReqwestHttp::new(&config.http)?;
    let fetcher = Arc::new(RetryingFetcher::new(Arc::new(http), &config.crawl));
    let use_case = CollectUseCase::new(fetcher, config);

    let collected = use_case
        .run(&CollectOptions { query, fetch_details })
        .await
        .context("collection aborted")?;
    let summary = &collected.summary;

    eprintln!("\n📊 Collection results (run {}):", summary.run_id);
    eprintln!("   Pages requested: {}", summary.pages_requested);
    eprintln!("   Complete: {}", summary.complete);
    eprintln!("   Partial: {}", summary.partial);
    eprintln!("   Dropped: {}", summary.dropped);
    eprintln!("   Detail pages unreachable: {}", summary.unreachable);

    if dry_run {
        println!("{}", serde_json::to_string_pretty(&collected.records)?);
        return Ok(());
    }

    let writer = DatasetWriter::new(&config.artifact.path);
    writer.write(&collected.records)?;
    let followups = writer.write_followups(&collected.records)?;
    eprintln!("✅ Wrote {} records to {}", collected.records.len(), writer.path().display());
    if followups > 0 {
        eprintln!(
            "⚠️  {} venues without a schedule listed in {}",
            followups,
            writer.followup_path().display()
        );
    }
    Ok(())
}

async fn run_load(config: &Config, mode: LoadMode, dry_run: bool) -> anyhow::Result<()> {
    let store: Arc<dyn DocumentStorePort> = if dry_run {
        println!("🧪 Dry run: syncing into an in-memory store");
        Arc::new(InMemoryStore::new())
    } else {
        let token = std::env::var(ENV_FIRESTORE_TOKEN).ok();
        if token.is_none() {
            warn!("{} is not set; requests go out unauthenticated", ENV_FIRESTORE_TOKEN);
        }
        Arc::new(FirestoreStore::new(&config.store, token, config.http.timeout())?)
    };

    match &mode {
        LoadMode::Batch => println!("📤 Syncing {} into '{}'...", config.artifact.path.display(), config.store.collection),
        LoadMode::HotFix { name } => println!("🩹 Hot-fix: syncing '{}' into '{}'...", name, config.store.collection),
    }

    let mut loader = Loader::new(
        DatasetWriter::new(&config.artifact.path),
        store,
        config.store.concurrency,
    );
    let summary = loader.run(&mode).await?;
    info!("Loader finished in state {:?}", loader.state());

    println!("\n📊 Load results:");
    println!("   Succeeded: {}", summary.succeeded.len());
    for id in &summary.succeeded {
        println!("   ✓ {}", id);
    }
    println!("   Failed: {}", summary.failed.len());
    if !summary.is_clean() {
        println!("\n⚠️  Failed upserts:");
        for failure in &summary.failed {
            println!("   - {}: {}", failure.id, failure.error);
        }
        bail!("{} of {} upserts failed", summary.failed.len(), summary.failed.len() + summary.succeeded.len());
    }
    println!("✅ Load completed successfully");
    Ok(())
}
