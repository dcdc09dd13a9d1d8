//! The unified history store.
//!
//! Wraps a [`SqlitePool`] over three tables:
//!
//! | Table | Key | Holds |
//! |-------|-----|-------|
//! | `urls` | `url_id` | one row per distinct URL |
//! | `visits` | `(url_id, visit_time)` | one row per distinct visit, tagged with the extractor |
//! | `urls_meta` | `url_id` | when the URL was last added to the document index |
//!
//! Every write is a single upsert or insert-if-absent statement, so a
//! cancelled or failed import never leaves a half-written row behind.
//! Bulk writes go through [`StoreBatch`], which groups statements in one
//! transaction that either commits as a whole or not at all.

use chrono::{DateTime, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, Transaction};
use std::collections::BTreeSet;
use std::path::Path;

use crate::db;
use crate::error::{HistoryError, Result};
use crate::migrate;
use crate::models::{UrlRecord, VisitEvent};
use crate::normalize::{identify, UrlId};

/// Upper bound on bound parameters per `IN (...)` lookup. Well under
/// SQLite's historical limit of 999 host parameters.
pub const MAX_IDS_PER_QUERY: usize = 400;

/// Typed predicate for [`Store::count_urls_matching`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlFilter {
    All,
    Indexed,
    Unindexed,
    VisitedSince(DateTime<Utc>),
}

/// Per-extractor visit totals, as reported by `histdex stats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorVisits {
    pub extractor_name: String,
    pub visits: i64,
    pub latest_visit: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the store file at `path` and ensure the schema exists.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Start a write batch. Nothing written through it is visible until
    /// [`StoreBatch::commit`]; dropping it rolls back.
    pub async fn begin(&self) -> Result<StoreBatch> {
        let tx = self.pool.begin().await.map_err(HistoryError::StoreWrite)?;
        Ok(StoreBatch { tx })
    }

    /// Insert or update a URL. Title and description are replaced,
    /// `last_visit` only ever moves forward.
    pub async fn upsert_url(&self, record: &UrlRecord) -> Result<()> {
        upsert_url_query(record)
            .execute(&self.pool)
            .await
            .map_err(HistoryError::StoreWrite)?;
        Ok(())
    }

    /// Make sure a URL row exists without touching its title or
    /// description. Advances `last_visit` like [`upsert_url`](Self::upsert_url).
    pub async fn touch_url(&self, url: &str, last_visit: Option<DateTime<Utc>>) -> Result<()> {
        let url_id = identify(url);
        touch_url_query(&url_id, url, last_visit)
            .execute(&self.pool)
            .await
            .map_err(HistoryError::StoreWrite)?;
        Ok(())
    }

    /// Record when a URL was indexed. `None` marks it as needing indexing.
    pub async fn upsert_index_meta(
        &self,
        url_id: &UrlId,
        indexed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        index_meta_query(url_id, indexed_at)
            .execute(&self.pool)
            .await
            .map_err(HistoryError::StoreWrite)?;
        Ok(())
    }

    /// Forget every indexing mark so the next indexer pass covers all URLs.
    pub async fn clear_index_meta(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE urls_meta SET indexed_at = NULL")
            .execute(&self.pool)
            .await
            .map_err(HistoryError::StoreWrite)?;
        Ok(result.rows_affected())
    }

    /// Insert a visit unless one already exists for the same URL and
    /// time. Returns whether a row was written.
    pub async fn insert_visit(&self, event: &VisitEvent) -> Result<bool> {
        let result = insert_visit_query(event)
            .execute(&self.pool)
            .await
            .map_err(HistoryError::StoreWrite)?;
        Ok(result.rows_affected() > 0)
    }

    /// Latest visit stored for an extractor, the cursor of incremental
    /// imports. Fails with [`HistoryError::NoPriorData`] when the
    /// extractor has no visits yet.
    pub async fn latest_visit_time(&self, extractor_name: &str) -> Result<DateTime<Utc>> {
        let latest: Option<i64> =
            sqlx::query_scalar("SELECT MAX(visit_time) FROM visits WHERE extractor_name = ?")
                .bind(extractor_name)
                .fetch_one(&self.pool)
                .await
                .map_err(HistoryError::StoreRead)?;

        latest
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .ok_or_else(|| HistoryError::NoPriorData(extractor_name.to_string()))
    }

    pub async fn count_urls_matching(&self, filter: &UrlFilter) -> Result<u64> {
        let base = "SELECT COUNT(*) FROM urls u LEFT JOIN urls_meta m ON m.url_id = u.url_id";
        let query = match filter {
            UrlFilter::All => sqlx::query_scalar::<_, i64>(base),
            UrlFilter::Indexed => sqlx::query_scalar(
                "SELECT COUNT(*) FROM urls u JOIN urls_meta m ON m.url_id = u.url_id \
                 WHERE m.indexed_at IS NOT NULL",
            ),
            UrlFilter::Unindexed => sqlx::query_scalar(
                "SELECT COUNT(*) FROM urls u LEFT JOIN urls_meta m ON m.url_id = u.url_id \
                 WHERE m.url_id IS NULL OR m.indexed_at IS NULL",
            ),
            UrlFilter::VisitedSince(since) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM urls WHERE last_visit >= ?")
                    .bind(since.timestamp())
            }
        };

        let count = query
            .fetch_one(&self.pool)
            .await
            .map_err(HistoryError::StoreRead)?;
        Ok(count.max(0) as u64)
    }

    pub async fn count_visits(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM visits")
            .fetch_one(&self.pool)
            .await
            .map_err(HistoryError::StoreRead)?;
        Ok(count.max(0) as u64)
    }

    pub async fn visits_by_extractor(&self) -> Result<Vec<ExtractorVisits>> {
        let rows = sqlx::query(
            r#"
            SELECT extractor_name, COUNT(*) AS visits, MAX(visit_time) AS latest
            FROM visits
            GROUP BY extractor_name
            ORDER BY extractor_name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(HistoryError::StoreRead)?;

        rows.iter()
            .map(|row| -> std::result::Result<ExtractorVisits, sqlx::Error> {
                let latest: Option<i64> = row.try_get("latest")?;
                Ok(ExtractorVisits {
                    extractor_name: row.try_get("extractor_name")?,
                    visits: row.try_get("visits")?,
                    latest_visit: latest.and_then(|ts| DateTime::from_timestamp(ts, 0)),
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(HistoryError::StoreRead)
    }

    /// Fetch the records for the given ids. Ids that don't exist are
    /// absent from the result; no particular order is guaranteed.
    pub async fn urls_by_id(&self, ids: &[UrlId]) -> Result<Vec<UrlRecord>> {
        let unique: Vec<&UrlId> = ids.iter().collect::<BTreeSet<_>>().into_iter().collect();
        let mut records = Vec::with_capacity(unique.len());

        for chunk in unique.chunks(MAX_IDS_PER_QUERY) {
            let mut builder = QueryBuilder::<Sqlite>::new(
                "SELECT url_id, url, title, description, last_visit FROM urls WHERE url_id IN (",
            );
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(id.as_str());
            }
            separated.push_unseparated(")");

            let rows = builder
                .build()
                .fetch_all(&self.pool)
                .await
                .map_err(HistoryError::StoreRead)?;
            for row in &rows {
                records.push(row_to_url(row).map_err(HistoryError::StoreRead)?);
            }
        }

        Ok(records)
    }

    /// URLs that were never indexed or whose indexing mark was cleared.
    pub async fn unindexed_urls(&self) -> Result<Vec<UrlRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT u.url_id, u.url, u.title, u.description, u.last_visit
            FROM urls u
            LEFT JOIN urls_meta m ON m.url_id = u.url_id
            WHERE m.url_id IS NULL OR m.indexed_at IS NULL
            ORDER BY u.url_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(HistoryError::StoreRead)?;

        rows.iter()
            .map(|row| row_to_url(row).map_err(HistoryError::StoreRead))
            .collect()
    }
}

/// A group of store writes applied in one transaction.
pub struct StoreBatch {
    tx: Transaction<'static, Sqlite>,
}

impl StoreBatch {
    pub async fn upsert_url(&mut self, record: &UrlRecord) -> Result<()> {
        upsert_url_query(record)
            .execute(&mut *self.tx)
            .await
            .map_err(HistoryError::StoreWrite)?;
        Ok(())
    }

    pub async fn touch_url(&mut self, url: &str, last_visit: Option<DateTime<Utc>>) -> Result<()> {
        let url_id = identify(url);
        touch_url_query(&url_id, url, last_visit)
            .execute(&mut *self.tx)
            .await
            .map_err(HistoryError::StoreWrite)?;
        Ok(())
    }

    pub async fn insert_visit(&mut self, event: &VisitEvent) -> Result<bool> {
        let result = insert_visit_query(event)
            .execute(&mut *self.tx)
            .await
            .map_err(HistoryError::StoreWrite)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn upsert_index_meta(
        &mut self,
        url_id: &UrlId,
        indexed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        index_meta_query(url_id, indexed_at)
            .execute(&mut *self.tx)
            .await
            .map_err(HistoryError::StoreWrite)?;
        Ok(())
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(HistoryError::StoreWrite)
    }
}

// `last_visit` never regresses: keep the larger of the stored and the
// incoming value, treating NULL as "unknown".
const ADVANCE_LAST_VISIT: &str = r#"
    last_visit = CASE
        WHEN excluded.last_visit IS NULL THEN urls.last_visit
        WHEN urls.last_visit IS NULL THEN excluded.last_visit
        ELSE MAX(urls.last_visit, excluded.last_visit)
    END
"#;

fn upsert_url_query(record: &UrlRecord) -> Query<'_, Sqlite, SqliteArguments<'_>> {
    static SQL: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    let sql = SQL.get_or_init(|| {
        format!(
            "INSERT INTO urls (url_id, url, title, description, last_visit) VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(url_id) DO UPDATE SET \
                title = excluded.title, \
                description = excluded.description, \
                {ADVANCE_LAST_VISIT}"
        )
    });

    sqlx::query(sql.as_str())
        .bind(record.url_id.as_str())
        .bind(record.url.as_str())
        .bind(record.title.as_deref())
        .bind(record.description.as_deref())
        .bind(record.last_visit.map(|t| t.timestamp()))
}

fn touch_url_query<'q>(
    url_id: &'q UrlId,
    url: &'q str,
    last_visit: Option<DateTime<Utc>>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    static SQL: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    let sql = SQL.get_or_init(|| {
        format!(
            "INSERT INTO urls (url_id, url, last_visit) VALUES (?, ?, ?) \
             ON CONFLICT(url_id) DO UPDATE SET {ADVANCE_LAST_VISIT}"
        )
    });

    sqlx::query(sql.as_str())
        .bind(url_id.as_str())
        .bind(url)
        .bind(last_visit.map(|t| t.timestamp()))
}

fn insert_visit_query(event: &VisitEvent) -> Query<'_, Sqlite, SqliteArguments<'_>> {
    sqlx::query(
        r#"
        INSERT INTO visits (url_id, visit_time, extractor_name) VALUES (?, ?, ?)
        ON CONFLICT(url_id, visit_time) DO NOTHING
        "#,
    )
    .bind(event.url_id.as_str())
    .bind(event.visit_time.timestamp())
    .bind(event.extractor_name.as_str())
}

fn index_meta_query(
    url_id: &UrlId,
    indexed_at: Option<DateTime<Utc>>,
) -> Query<'_, Sqlite, SqliteArguments<'_>> {
    sqlx::query(
        r#"
        INSERT INTO urls_meta (url_id, indexed_at) VALUES (?, ?)
        ON CONFLICT(url_id) DO UPDATE SET indexed_at = excluded.indexed_at
        "#,
    )
    .bind(url_id.as_str())
    .bind(indexed_at.map(|t| t.timestamp()))
}

fn row_to_url(row: &SqliteRow) -> std::result::Result<UrlRecord, sqlx::Error> {
    let url: String = row.try_get("url")?;
    let stored_id: String = row.try_get("url_id")?;
    let last_visit: Option<i64> = row.try_get("last_visit")?;

    Ok(UrlRecord {
        url_id: UrlId::from_stored(stored_id).unwrap_or_else(|| identify(&url)),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        last_visit: last_visit.and_then(|ts| DateTime::from_timestamp(ts, 0)),
        url,
    })
}
