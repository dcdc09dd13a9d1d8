//! Document index abstraction.
//!
//! The index stores one searchable document per URL, addressed by
//! [`UrlId`]. It only ever returns ids; records are re-hydrated from the
//! store by the search gateway.
//!
//! Handles are opened once per command and passed explicitly to the
//! indexer and the search gateway. See [`crate::index_fts`] for the
//! SQLite FTS5 implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::UrlRecord;
use crate::normalize::UrlId;

/// Searchable fields of one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDocument {
    pub url_id: UrlId,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub last_visit: Option<DateTime<Utc>>,
}

impl From<&UrlRecord> for IndexDocument {
    fn from(record: &UrlRecord) -> Self {
        Self {
            url_id: record.url_id.clone(),
            url: record.url.clone(),
            title: record.title.clone(),
            description: record.description.clone(),
            last_visit: record.last_visit,
        }
    }
}

/// Ranked ids for a query plus the total number of matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexHits {
    pub ids: Vec<UrlId>,
    pub total: u64,
}

#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Stage a document. Adding a document whose id is already indexed
    /// replaces it. Nothing is searchable until [`commit`](Self::commit).
    async fn add(&mut self, doc: IndexDocument) -> Result<()>;

    /// Make every staged document searchable, atomically. On error none
    /// of them are.
    async fn commit(&mut self) -> Result<()>;

    /// Top `limit` ids matching `query`, best first.
    async fn search(&self, query: &str, limit: usize) -> Result<IndexHits>;

    /// Drop every document, staged or committed.
    async fn clear(&mut self) -> Result<()>;
}
