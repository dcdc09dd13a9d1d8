//! Chromium-family extractor (Chrome, Chromium, Brave, Vivaldi, Edge).
//!
//! Reads the `History` database found in each profile directory. Visit
//! times are microseconds since 1601-01-01.

use async_trait::async_trait;
use sqlx::{Row, SqliteConnection};
use std::path::{Path, PathBuf};

use crate::error::{HistoryError, Result};
use crate::extractor::{non_empty, webkit_micros_to_utc, Extractor};
use crate::models::{ExtractedUrl, ExtractedVisit};

/// File name of the history database inside a Chromium profile.
pub const HISTORY_FILE: &str = "History";

pub struct ChromiumExtractor {
    name: String,
    history_path: PathBuf,
}

impl ChromiumExtractor {
    pub fn new(name: impl Into<String>, history_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            history_path: history_path.into(),
        }
    }
}

#[async_trait]
impl Extractor for ChromiumExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_path(&self) -> &Path {
        &self.history_path
    }

    fn kind(&self) -> &str {
        "chromium"
    }

    async fn list_urls(&self, conn: &mut SqliteConnection) -> Result<Vec<ExtractedUrl>> {
        let rows = sqlx::query("SELECT url, title FROM urls")
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
            SELECT u.url AS url, v.visit_time AS visit_time
            FROM visits v
            INNER JOIN urls u ON v.url = u.id
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
            let raw: i64 = row
                .try_get("visit_time")
                .map_err(|e| HistoryError::source_read(&self.name, e))?;
            let visit_time =
                webkit_micros_to_utc(raw).ok_or_else(|| HistoryError::InvalidTimestamp {
                    name: self.name.clone(),
                    raw,
                })?;
            visits.push(ExtractedVisit { url, visit_time });
        }

        Ok(visits)
    }
}
