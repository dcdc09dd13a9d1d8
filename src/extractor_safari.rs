//! Safari extractor.
//!
//! Reads `~/Library/Safari/History.db`. Safari keeps titles on visits
//! rather than on items, so a URL's title is the one recorded by its most
//! recent titled visit. Visit times are fractional seconds since
//! 2001-01-01.

use async_trait::async_trait;
use sqlx::{Row, SqliteConnection};
use std::path::{Path, PathBuf};

use crate::error::{HistoryError, Result};
use crate::extractor::{cocoa_seconds_to_utc, non_empty, Extractor};
use crate::models::{ExtractedUrl, ExtractedVisit};

pub const HISTORY_DB_FILE: &str = "History.db";

pub struct SafariExtractor {
    name: String,
    history_path: PathBuf,
}

impl SafariExtractor {
    pub fn new(name: impl Into<String>, history_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            history_path: history_path.into(),
        }
    }
}

#[async_trait]
impl Extractor for SafariExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_path(&self) -> &Path {
        &self.history_path
    }

    fn kind(&self) -> &str {
        "safari"
    }

    async fn list_urls(&self, conn: &mut SqliteConnection) -> Result<Vec<ExtractedUrl>> {
        let rows = sqlx::query(
            r#"
            SELECT i.url AS url,
                   (SELECT v.title FROM history_visits v
                    WHERE v.history_item = i.id AND v.title IS NOT NULL
                    ORDER BY v.visit_time DESC
                    LIMIT 1) AS title
            FROM history_items i
            "#,
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| HistoryError::source_read(&self.name, e))?;

        let mut urls = Vec::with_capacity(rows.len());
        for row in &rows {
            let url: String = row
                .try_get("url")
                .map_err(|e| HistoryError::source_read(&self.name, e))?;
            let title: Option<String> = row
                .try_get("title")
                .map_err(|e| HistoryError::source_read(&self.name, e))?;
            urls.push(ExtractedUrl {
                url,
                title: non_empty(title),
                description: None,
            });
        }

        Ok(urls)
    }

    async fn list_visits(&self, conn: &mut SqliteConnection) -> Result<Vec<ExtractedVisit>> {
        let rows = sqlx::query(
            r#"
            SELECT i.url AS url, v.visit_time AS visit_time
            FROM history_visits v
            INNER JOIN history_items i ON v.history_item = i.id
            "#,
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| HistoryError::source_read(&self.name, e))?;

        let mut visits = Vec::with_capacity(rows.len());
        for row in &rows {
            let url: String = row
                .try_get("url")
                .map_err(|e| HistoryError::source_read(&self.name, e))?;
            let raw: f64 = row
                .try_get("visit_time")
                .map_err(|e| HistoryError::source_read(&self.name, e))?;
            let visit_time =
                cocoa_seconds_to_utc(raw).ok_or_else(|| HistoryError::InvalidTimestamp {
                    name: self.name.clone(),
                    raw: raw as i64,
                })?;
            visits.push(ExtractedVisit { url, visit_time });
        }

        Ok(visits)
    }
}
