use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::Config;
use crate::index_fts::Fts5Index;
use crate::indexer;
use crate::progress::{format_number, ProgressMode, SyncProgressReporter};
use crate::registry;
use crate::store::Store;
use crate::sync::{self, SyncMode, SyncOptions};

/// Command-line overrides for `histdex sync`.
#[derive(Debug, Clone, Default)]
pub struct SyncArgs {
    pub browser: Option<String>,
    pub full: bool,
    pub no_index: bool,
    pub jobs: Option<usize>,
    pub timeout_secs: Option<u64>,
}

/// Discover sources, import them, and index what's new.
///
/// Every source is attempted; if any failed the command still builds
/// the index for what was imported, then returns the aggregate error.
pub async fn run_sync_command(
    config: &Config,
    args: &SyncArgs,
    progress: ProgressMode,
) -> Result<()> {
    let candidates = registry::candidates_from_config(config);
    let discovery = registry::discover(&candidates)?;

    let mode = if args.full {
        SyncMode::Full
    } else {
        SyncMode::Incremental
    };
    let mut options = SyncOptions::from_config(config, mode);
    options.only = args.browser.clone();
    if let Some(jobs) = args.jobs {
        options.concurrency = jobs.max(1);
    }
    if let Some(secs) = args.timeout_secs {
        options.deadline = Some(Instant::now() + Duration::from_secs(secs));
    }

    let reporter: Arc<dyn SyncProgressReporter> = Arc::from(progress.reporter());
    let store = Store::open(&config.db.path).await?;

    let report = sync::run_sync(&store, &discovery.extractors, &options, reporter.clone()).await;

    println!(
        "sync ({})",
        match mode {
            SyncMode::Full => "full",
            SyncMode::Incremental => "incremental",
        }
    );
    if report.outcomes.is_empty() {
        println!("  no sources found");
    }
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(stats) => println!(
                "  {}  urls: {}  visits: {} new / {} seen",
                outcome.name,
                format_number(stats.urls_upserted),
                format_number(stats.visits_inserted),
                format_number(stats.visits_seen)
            ),
            Err(e) => println!("  {}  FAILED: {}", outcome.name, e),
        }
    }

    let mut index_error = None;
    if config.sync.build_index && !args.no_index {
        let started = std::time::Instant::now();
        match index_new_urls(config, &store, reporter.as_ref()).await {
            Ok(indexed) => println!(
                "  indexed: {} documents in {:.1?}",
                format_number(indexed as u64),
                started.elapsed()
            ),
            Err(e) => {
                println!("  indexing FAILED: {:#}", e);
                index_error = Some(e);
            }
        }
    }

    store.close().await;
    match (report.into_result(), index_error) {
        (Ok(_), None) => {}
        (Ok(_), Some(index_error)) => return Err(index_error),
        (Err(sync_error), None) => return Err(sync_error.into()),
        (Err(sync_error), Some(index_error)) => return Err(index_error.context(sync_error)),
    }
    println!("ok");
    Ok(())
}

async fn index_new_urls(
    config: &Config,
    store: &Store,
    reporter: &dyn SyncProgressReporter,
) -> Result<usize> {
    let mut index = Fts5Index::open(&config.index.path).await?;
    let indexed = indexer::build_index(store, &mut index, config.index.batch_size, reporter).await;
    index.close().await;
    Ok(indexed?)
}

/// `histdex index`: index the delta, or everything with `rebuild`.
pub async fn run_index_command(
    config: &Config,
    rebuild: bool,
    progress: ProgressMode,
) -> Result<()> {
    let reporter = progress.reporter();
    let store = Store::open(&config.db.path).await?;
    let mut index = Fts5Index::open(&config.index.path).await?;
    let started = std::time::Instant::now();

    let result = if rebuild {
        indexer::rebuild(&store, &mut index, config.index.batch_size, reporter.as_ref()).await
    } else {
        indexer::build_index(&store, &mut index, config.index.batch_size, reporter.as_ref()).await
    };
    index.close().await;
    store.close().await;
    let indexed = result?;

    println!("index{}", if rebuild { " (rebuild)" } else { "" });
    println!(
        "  indexed: {} documents in {:.1?}",
        format_number(indexed as u64),
        started.elapsed()
    );
    println!("ok");
    Ok(())
}

/// `histdex init`: create the store and the index.
pub async fn run_init(config: &Config) -> Result<()> {
    let store = Store::open(&config.db.path).await?;
    let index = Fts5Index::open(&config.index.path).await?;
    index.close().await;
    store.close().await;

    println!("Store initialized: {}", config.db.path.display());
    println!("Index initialized: {}", config.index.path.display());
    Ok(())
}
