//! Search gateway: query → index → store.
//!
//! The index answers with ranked ids only; full records come from the
//! store and are put back into the index's order before being returned.

use anyhow::Result as AnyResult;
use std::collections::{HashMap, HashSet};

use crate::config::Config;
use crate::error::Result;
use crate::index::DocumentIndex;
use crate::index_fts::Fts5Index;
use crate::models::{UrlQueryResult, UrlRecord};
use crate::normalize::UrlId;
use crate::store::Store;

/// Run `query` against the index and hydrate the top `limit` hits.
///
/// A blank query, or one matching nothing, is an empty result rather
/// than an error. Hits whose URL is no longer in the store are dropped.
pub async fn search_urls(
    store: &Store,
    index: &dyn DocumentIndex,
    query: &str,
    limit: usize,
) -> Result<UrlQueryResult> {
    if query.trim().is_empty() || limit == 0 {
        return Ok(UrlQueryResult::default());
    }

    let hits = index.search(query, limit).await?;
    let mut seen = HashSet::with_capacity(hits.ids.len());
    let ranked: Vec<UrlId> = hits
        .ids
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect();

    let mut by_id: HashMap<UrlId, UrlRecord> = store
        .urls_by_id(&ranked)
        .await?
        .into_iter()
        .map(|record| (record.url_id.clone(), record))
        .collect();

    let urls: Vec<UrlRecord> = ranked.iter().filter_map(|id| by_id.remove(id)).collect();
    if urls.len() < ranked.len() {
        tracing::debug!(
            missing = ranked.len() - urls.len(),
            "index hits without a stored url"
        );
    }

    Ok(UrlQueryResult {
        urls,
        total_count: hits.total,
    })
}

/// `histdex search`: print ranked results, or the raw result as JSON.
pub async fn run_search(
    config: &Config,
    query: &str,
    limit: Option<i64>,
    json: bool,
) -> AnyResult<()> {
    let limit = limit.unwrap_or(config.search.limit).max(1);

    let store = Store::open(&config.db.path).await?;
    let index = Fts5Index::open(&config.index.path).await?;
    let result = search_urls(&store, &index, query, limit as usize).await;
    index.close().await;
    store.close().await;
    let result = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if result.urls.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, record) in result.urls.iter().enumerate() {
        let title_display = record.title.as_deref().unwrap_or("(untitled)");
        let visited = record
            .last_visit
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());

        println!("{}. {}", i + 1, title_display);
        println!("    url: {}", record.url);
        println!("    last visit: {}", visited);
        if let Some(ref description) = record.description {
            println!("    description: \"{}\"", description.replace('\n', " ").trim());
        }
        println!("    id: {}", record.url_id);
        println!();
    }
    println!(
        "{} of {} matches",
        result.urls.len(),
        result.total_count
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexDocument, IndexHits};
    use crate::normalize::identify;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Returns a fixed ranking regardless of the query.
    struct Ranked(Vec<UrlId>);

    #[async_trait]
    impl DocumentIndex for Ranked {
        async fn add(&mut self, _doc: IndexDocument) -> Result<()> {
            Ok(())
        }
        async fn commit(&mut self) -> Result<()> {
            Ok(())
        }
        async fn search(&self, _query: &str, limit: usize) -> Result<IndexHits> {
            Ok(IndexHits {
                ids: self.0.iter().take(limit).cloned().collect(),
                total: self.0.len() as u64,
            })
        }
        async fn clear(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn results_follow_index_order() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(&tmp.path().join("store.sqlite")).await.unwrap();
        let urls = ["https://c.test", "https://a.test", "https://b.test"];
        for url in urls {
            store.upsert_url(&UrlRecord::new(url)).await.unwrap();
        }

        let index = Ranked(vec![
            identify("https://b.test"),
            identify("https://gone.test"),
            identify("https://c.test"),
            identify("https://b.test"),
            identify("https://a.test"),
        ]);

        let result = search_urls(&store, &index, "anything", 10).await.unwrap();
        let got: Vec<&str> = result.urls.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(got, vec!["https://b.test", "https://c.test", "https://a.test"]);
        assert_eq!(result.total_count, 5);
    }

    #[tokio::test]
    async fn blank_query_is_empty_result() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(&tmp.path().join("store.sqlite")).await.unwrap();
        let index = Ranked(vec![identify("https://a.test")]);

        let result = search_urls(&store, &index, "  ", 10).await.unwrap();
        assert!(result.urls.is_empty());
        assert_eq!(result.total_count, 0);
    }
}
