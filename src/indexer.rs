//! Indexer: store → document index.
//!
//! Only URLs without an `indexed_at` mark are indexed, so repeated runs
//! cover just the delta. Documents are committed to the index in batches,
//! and a batch's marks are written only after its commit succeeds: a
//! failure leaves that batch unmarked and retried on the next run.

use chrono::Utc;

use crate::error::Result;
use crate::index::{DocumentIndex, IndexDocument};
use crate::progress::{SyncProgressEvent, SyncProgressReporter};
use crate::store::Store;

/// Index every unindexed URL. Returns the number of documents added.
pub async fn build_index(
    store: &Store,
    index: &mut dyn DocumentIndex,
    batch_size: usize,
    reporter: &dyn SyncProgressReporter,
) -> Result<usize> {
    let pending = store.unindexed_urls().await?;
    let total = pending.len() as u64;
    let mut indexed = 0usize;

    for chunk in pending.chunks(batch_size.max(1)) {
        for record in chunk {
            index.add(IndexDocument::from(record)).await?;
        }
        index.commit().await?;

        let now = Utc::now();
        let mut batch = store.begin().await?;
        for record in chunk {
            batch.upsert_index_meta(&record.url_id, Some(now)).await?;
        }
        batch.commit().await?;

        indexed += chunk.len();
        reporter.report(SyncProgressEvent::Indexing {
            n: indexed as u64,
            total,
        });
    }

    tracing::info!(documents = indexed, "index up to date");
    Ok(indexed)
}

/// Drop the whole index and every indexing mark, then index all URLs.
pub async fn rebuild(
    store: &Store,
    index: &mut dyn DocumentIndex,
    batch_size: usize,
    reporter: &dyn SyncProgressReporter,
) -> Result<usize> {
    index.clear().await?;
    let cleared = store.clear_index_meta().await?;
    tracing::info!(cleared, "cleared index marks");
    build_index(store, index, batch_size, reporter).await
}
