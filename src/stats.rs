//! Store statistics and health overview.
//!
//! Provides a quick summary of what has been imported: URL and visit
//! counts, index coverage, and a per-source breakdown. Used by
//! `histdex stats` to give confidence that syncs and indexing are working
//! as expected.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::index_fts::Fts5Index;
use crate::store::{Store, UrlFilter};

/// Run the stats command: query the store and the index, print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = Store::open(&config.db.path).await?;

    let total_urls = store.count_urls_matching(&UrlFilter::All).await?;
    let indexed = store.count_urls_matching(&UrlFilter::Indexed).await?;
    let unindexed = store.count_urls_matching(&UrlFilter::Unindexed).await?;
    let recent = store
        .count_urls_matching(&UrlFilter::VisitedSince(
            Utc::now() - chrono::Duration::days(7),
        ))
        .await?;
    let total_visits = store.count_visits().await?;
    let by_extractor = store.visits_by_extractor().await?;

    let index = Fts5Index::open(&config.index.path).await?;
    let documents = index.document_count().await?;
    index.close().await;
    store.close().await;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);
    let index_size = std::fs::metadata(&config.index.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("histdex — Store Stats");
    println!("=====================");
    println!();
    println!("  Store:       {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Index:       {}", config.index.path.display());
    println!("  Size:        {}", format_bytes(index_size));
    println!();
    println!("  URLs:        {}", total_urls);
    println!("  Visits:      {}", total_visits);
    println!("  Last 7 days: {} URLs", recent);
    println!(
        "  Indexed:     {} / {} ({}%)",
        indexed,
        total_urls,
        if total_urls > 0 {
            (indexed * 100) / total_urls
        } else {
            0
        }
    );
    println!("  Unindexed:   {}", unindexed);
    println!("  Documents:   {}", documents);

    if !by_extractor.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<40} {:>8}   {}", "SOURCE", "VISITS", "LATEST VISIT");
        println!("  {}", "-".repeat(70));

        for s in &by_extractor {
            let latest = match s.latest_visit {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!("  {:<40} {:>8}   {}", s.extractor_name, s.visits, latest);
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts: DateTime<Utc>) -> String {
    let delta = (Utc::now() - ts).num_seconds();

    if delta < 0 {
        return ts.format("%Y-%m-%d %H:%M").to_string();
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        ts.format("%Y-%m-%d %H:%M").to_string()
    }
}
