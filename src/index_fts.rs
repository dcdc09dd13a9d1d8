//! SQLite FTS5 document index.
//!
//! Lives in its own database file (`[index] path`), separate from the
//! store, so it can be dropped and rebuilt at any time. The FTS row id of
//! a document is derived from its [`UrlId`], which makes re-adding a URL
//! a replace rather than a duplicate.
//!
//! # Query syntax
//!
//! | Input | Meaning |
//! |-------|---------|
//! | `rust async` | documents containing both terms |
//! | `title:rust` | `rust` in the title only (`url`, `title`, `description`) |
//! | `exam*` | terms starting with `exam` |
//!
//! Terms are always quoted before reaching FTS5, so user input can never
//! produce a syntax error. Matches are ranked by BM25 with the title
//! weighted above the URL and the URL above the description; ties go to
//! the most recently visited.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::path::Path;

use crate::db;
use crate::error::{HistoryError, Result};
use crate::index::{DocumentIndex, IndexDocument, IndexHits};
use crate::normalize::UrlId;

const FIELDS: [&str; 3] = ["url", "title", "description"];

pub struct Fts5Index {
    pool: SqlitePool,
    pending: Vec<IndexDocument>,
}

impl Fts5Index {
    /// Open (and create if needed) the index file at `path`.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        let pool = db::connect(path).await?;

        // FTS5 CREATE is not idempotent natively, so we check first
        let exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='documents'",
        )
        .fetch_one(&pool)
        .await
        .map_err(HistoryError::IndexWrite)?;

        if exists == 0 {
            sqlx::query(
                r#"
                CREATE VIRTUAL TABLE documents USING fts5(
                    url_id UNINDEXED,
                    url,
                    title,
                    description,
                    last_visit UNINDEXED
                )
                "#,
            )
            .execute(&pool)
            .await
            .map_err(HistoryError::IndexWrite)?;
        }

        Ok(Self {
            pool,
            pending: Vec::new(),
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Number of committed documents.
    pub async fn document_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(HistoryError::IndexRead)?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl DocumentIndex for Fts5Index {
    async fn add(&mut self, doc: IndexDocument) -> Result<()> {
        self.pending.push(doc);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let docs = std::mem::take(&mut self.pending);
        if docs.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(HistoryError::IndexWrite)?;
        for doc in &docs {
            let row_id = doc.url_id.row_id();
            sqlx::query("DELETE FROM documents WHERE rowid = ?")
                .bind(row_id)
                .execute(&mut *tx)
                .await
                .map_err(HistoryError::IndexWrite)?;
            sqlx::query(
                r#"
                INSERT INTO documents (rowid, url_id, url, title, description, last_visit)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(row_id)
            .bind(doc.url_id.as_str())
            .bind(doc.url.as_str())
            .bind(doc.title.as_deref())
            .bind(doc.description.as_deref())
            .bind(doc.last_visit.map(|t| t.timestamp()))
            .execute(&mut *tx)
            .await
            .map_err(HistoryError::IndexWrite)?;
        }
        tx.commit().await.map_err(HistoryError::IndexWrite)?;

        tracing::debug!(documents = docs.len(), "committed index batch");
        Ok(())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<IndexHits> {
        let Some(expr) = fts_query(query) else {
            return Ok(IndexHits::default());
        };

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE documents MATCH ?")
                .bind(&expr)
                .fetch_one(&self.pool)
                .await
                .map_err(HistoryError::IndexRead)?;

        // bm25 weights follow column order: url_id, url, title, description, last_visit
        let rows: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT url_id FROM documents
            WHERE documents MATCH ?
            ORDER BY bm25(documents, 0.0, 2.0, 5.0, 1.0, 0.0), last_visit DESC
            LIMIT ?
            "#,
        )
        .bind(&expr)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(HistoryError::IndexRead)?;

        Ok(IndexHits {
            ids: rows.into_iter().filter_map(UrlId::from_stored).collect(),
            total: total.max(0) as u64,
        })
    }

    async fn clear(&mut self) -> Result<()> {
        self.pending.clear();
        sqlx::query("DELETE FROM documents")
            .execute(&self.pool)
            .await
            .map_err(HistoryError::IndexWrite)?;
        Ok(())
    }
}

/// Translate free text into an FTS5 match expression. `None` when the
/// text holds nothing searchable.
pub fn fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text.split_whitespace().filter_map(fts_term).collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" AND "))
    }
}

fn fts_term(token: &str) -> Option<String> {
    let (field, term) = match token.split_once(':') {
        Some((field, rest)) if FIELDS.contains(&field) => (Some(field), rest),
        _ => (None, token),
    };

    let (term, prefix) = match term.strip_suffix('*') {
        Some(stem) => (stem, true),
        None => (term, false),
    };
    if !term.chars().any(char::is_alphanumeric) {
        return None;
    }

    let mut out = String::new();
    if let Some(field) = field {
        out.push_str(field);
        out.push_str(" : ");
    }
    out.push('"');
    out.push_str(&term.replace('"', "\"\""));
    out.push('"');
    if prefix {
        out.push_str(" *");
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::identify;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn doc(url: &str, title: &str, last_visit: i64) -> IndexDocument {
        IndexDocument {
            url_id: identify(url),
            url: url.to_string(),
            title: Some(title.to_string()),
            description: None,
            last_visit: Utc.timestamp_opt(last_visit, 0).single(),
        }
    }

    #[test]
    fn query_translation() {
        assert_eq!(fts_query("rust"), Some("\"rust\"".into()));
        assert_eq!(
            fts_query("rust  async"),
            Some("\"rust\" AND \"async\"".into())
        );
        assert_eq!(fts_query("title:rust"), Some("title : \"rust\"".into()));
        assert_eq!(fts_query("exam*"), Some("\"exam\" *".into()));
        assert_eq!(
            fts_query("https://example.com"),
            Some("\"https://example.com\"".into())
        );
        assert_eq!(fts_query("say\"hi"), Some("\"say\"\"hi\"".into()));
        assert_eq!(fts_query("   "), None);
        assert_eq!(fts_query("* : -"), None);
    }

    #[tokio::test]
    async fn add_commit_search() {
        let tmp = TempDir::new().unwrap();
        let mut index = Fts5Index::open(&tmp.path().join("index.sqlite"))
            .await
            .unwrap();

        index
            .add(doc("https://example.com", "Example Domain", 100))
            .await
            .unwrap();
        index
            .add(doc("https://rust-lang.org", "Rust", 200))
            .await
            .unwrap();
        assert_eq!(index.search("example", 10).await.unwrap().total, 0);

        index.commit().await.unwrap();
        let hits = index.search("example", 10).await.unwrap();
        assert_eq!(hits.total, 1);
        assert_eq!(hits.ids, vec![identify("https://example.com")]);

        assert_eq!(index.search("exam*", 10).await.unwrap().total, 1);
        assert_eq!(index.search("title:domain", 10).await.unwrap().total, 1);
        assert_eq!(index.search("url:domain", 10).await.unwrap().total, 0);
        assert_eq!(index.search("", 10).await.unwrap(), IndexHits::default());
    }

    #[tokio::test]
    async fn readding_replaces() {
        let tmp = TempDir::new().unwrap();
        let mut index = Fts5Index::open(&tmp.path().join("index.sqlite"))
            .await
            .unwrap();

        index
            .add(doc("https://example.com", "Old", 100))
            .await
            .unwrap();
        index.commit().await.unwrap();
        index
            .add(doc("https://example.com", "New", 200))
            .await
            .unwrap();
        index.commit().await.unwrap();

        assert_eq!(index.document_count().await.unwrap(), 1);
        assert_eq!(index.search("old", 10).await.unwrap().total, 0);
        assert_eq!(index.search("new", 10).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn title_outranks_url_and_limit_applies() {
        let tmp = TempDir::new().unwrap();
        let mut index = Fts5Index::open(&tmp.path().join("index.sqlite"))
            .await
            .unwrap();

        index
            .add(doc("https://a.test/tokio", "Unrelated page", 300))
            .await
            .unwrap();
        index
            .add(doc("https://b.test/page", "Tokio", 100))
            .await
            .unwrap();
        index.commit().await.unwrap();

        let hits = index.search("tokio", 1).await.unwrap();
        assert_eq!(hits.total, 2);
        assert_eq!(hits.ids, vec![identify("https://b.test/page")]);

        index.clear().await.unwrap();
        assert_eq!(index.document_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reopen_keeps_documents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.sqlite");
        {
            let mut index = Fts5Index::open(&path).await.unwrap();
            index
                .add(doc("https://example.com", "Example", 1))
                .await
                .unwrap();
            index.commit().await.unwrap();
            index.close().await;
        }
        let index = Fts5Index::open(&path).await.unwrap();
        assert_eq!(index.document_count().await.unwrap(), 1);
    }
}
