//! # histdex CLI
//!
//! The `histdex` binary imports browser history into a single searchable
//! store.
//!
//! ## Usage
//!
//! ```bash
//! histdex --config ~/.config/histdex/histdex.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `histdex init` | Create the store and the index |
//! | `histdex sources` | List probed locations and discovered databases |
//! | `histdex sync` | Import history from every discovered browser |
//! | `histdex index` | Index URLs that aren't indexed yet |
//! | `histdex search "<query>"` | Search the index |
//! | `histdex stats` | Store and index statistics |
//!
//! ## Examples
//!
//! ```bash
//! # Import only new visits from every Chrome profile, skip indexing
//! histdex sync --browser chrome --no-index
//!
//! # Re-read everything from every source, four at a time
//! histdex sync --full --jobs 4
//!
//! # Search titles only, as JSON
//! histdex search "title:tokio" --json
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use histdex::config;
use histdex::progress::ProgressMode;
use histdex::search;
use histdex::sources;
use histdex::stats;
use histdex::sync_cmd::{self, SyncArgs};

/// histdex: search everything you have ever visited, across browsers.
///
/// Without `--config`, `<config_dir>/histdex/histdex.toml` is read when
/// present and built-in defaults are used otherwise.
#[derive(Parser)]
#[command(
    name = "histdex",
    about = "histdex — a local-first, deduplicated, searchable browsing history",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log progress details to stderr (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Progress output on stderr: auto, human, json, or off.
    #[arg(long, global = true, default_value = "auto", value_parser = parse_progress)]
    progress: ProgressMode,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create the store and index files and their schemas.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// List probed browser locations and the history databases found.
    Sources,

    /// Import browser history into the store.
    ///
    /// Incremental by default: each source resumes after the latest visit
    /// already stored for it. Exits non-zero if any source failed.
    Sync {
        /// Only import sources with this name, or every profile of this
        /// location (`chrome` selects `chrome:Default`, `chrome:Profile 1`, ...).
        #[arg(short, long)]
        browser: Option<String>,

        /// Ignore previously imported visits and re-read everything.
        #[arg(long)]
        full: bool,

        /// Don't update the search index afterwards.
        #[arg(long)]
        no_index: bool,

        /// Number of sources imported in parallel.
        #[arg(long)]
        jobs: Option<usize>,

        /// Give up on sources still importing after this many seconds.
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Add URLs that aren't indexed yet to the search index.
    Index {
        /// Drop the index and rebuild it from the whole store.
        #[arg(long)]
        rebuild: bool,
    },

    /// Search the index.
    ///
    /// Terms are ANDed; `title:`, `url:` and `description:` scope a term
    /// to one field and a trailing `*` matches prefixes.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<i64>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show store and index statistics.
    Stats,
}

fn parse_progress(s: &str) -> Result<ProgressMode, String> {
    ProgressMode::parse(s)
        .ok_or_else(|| format!("invalid progress mode '{}': use auto, human, json, or off", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "histdex=info"
    } else {
        "histdex=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cfg = config::resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => {
            sync_cmd::run_init(&cfg).await?;
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Sync {
            browser,
            full,
            no_index,
            jobs,
            timeout,
        } => {
            let args = SyncArgs {
                browser,
                full,
                no_index,
                jobs,
                timeout_secs: timeout,
            };
            sync_cmd::run_sync_command(&cfg, &args, cli.progress).await?;
        }
        Commands::Index { rebuild } => {
            sync_cmd::run_index_command(&cfg, rebuild, cli.progress).await?;
        }
        Commands::Search { query, limit, json } => {
            search::run_search(&cfg, &query, limit, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
