//! Firefox extractor.
//!
//! Reads `places.sqlite` from each profile. Visit dates are microseconds
//! since the unix epoch. Newer profiles also carry a page description in
//! `moz_places.description`, which is passed through when present.

use async_trait::async_trait;
use sqlx::{Row, SqliteConnection};
use std::path::{Path, PathBuf};

use crate::error::{HistoryError, Result};
use crate::extractor::{non_empty, unix_micros_to_utc, Extractor};
use crate::models::{ExtractedUrl, ExtractedVisit};

/// File name of the history database inside a Firefox profile.
pub const PLACES_FILE: &str = "places.sqlite";

pub struct FirefoxExtractor {
    name: String,
    places_path: PathBuf,
}

impl FirefoxExtractor {
    pub fn new(name: impl Into<String>, places_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            places_path: places_path.into(),
        }
    }

    async fn has_description(&self, conn: &mut SqliteConnection) -> Result<bool> {
        let columns: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pragma_table_info('moz_places') WHERE name = 'description'",
        )
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| HistoryError::source_read(&self.name, e))?;
        Ok(columns > 0)
    }
}

#[async_trait]
impl Extractor for FirefoxExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_path(&self) -> &Path {
        &self.places_path
    }

    fn kind(&self) -> &str {
        "firefox"
    }

    async fn list_urls(&self, conn: &mut SqliteConnection) -> Result<Vec<ExtractedUrl>> {
        let sql = if self.has_description(conn).await? {
            "SELECT url, title, description FROM moz_places"
        } else {
            "SELECT url, title, NULL AS description FROM moz_places"
        };

        let rows = sqlx::query(sql)
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
            let description: Option<String> = row
                .try_get("description")
                .map_err(|e| HistoryError::source_read(&self.name, e))?;
            urls.push(ExtractedUrl {
                url,
                title: non_empty(title),
                description: non_empty(description),
            });
        }

        Ok(urls)
    }

    async fn list_visits(&self, conn: &mut SqliteConnection) -> Result<Vec<ExtractedVisit>> {
        let rows = sqlx::query(
            r#"
            SELECT p.url AS url, v.visit_date AS visit_date
            FROM moz_historyvisits v
            INNER JOIN moz_places p ON v.place_id = p.id
            WHERE v.visit_date IS NOT NULL
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
                .try_get("visit_date")
                .map_err(|e| HistoryError::source_read(&self.name, e))?;
            let visit_time =
                unix_micros_to_utc(raw).ok_or_else(|| HistoryError::InvalidTimestamp {
                    name: self.name.clone(),
                    raw,
                })?;
            visits.push(ExtractedVisit { url, visit_time });
        }

        Ok(visits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sqlx::sqlite::SqliteConnectOptions;
    use sqlx::{ConnectOptions, Connection};
    use tempfile::TempDir;

    async fn write_places(path: &Path, with_description: bool) {
        let mut conn = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .connect()
            .await
            .unwrap();
        let places = if with_description {
            "CREATE TABLE moz_places (id INTEGER PRIMARY KEY, url LONGVARCHAR, title LONGVARCHAR, description TEXT)"
        } else {
            "CREATE TABLE moz_places (id INTEGER PRIMARY KEY, url LONGVARCHAR, title LONGVARCHAR)"
        };
        sqlx::query(places).execute(&mut conn).await.unwrap();
        sqlx::query(
            "CREATE TABLE moz_historyvisits (id INTEGER PRIMARY KEY, place_id INTEGER, visit_date INTEGER, visit_type INTEGER)",
        )
        .execute(&mut conn)
        .await
        .unwrap();
        if with_description {
            sqlx::query(
                "INSERT INTO moz_places (id, url, title, description) VALUES (1, 'https://mozilla.org', 'Mozilla', 'Internet for people')",
            )
            .execute(&mut conn)
            .await
            .unwrap();
        } else {
            sqlx::query(
                "INSERT INTO moz_places (id, url, title) VALUES (1, 'https://mozilla.org', 'Mozilla')",
            )
            .execute(&mut conn)
            .await
            .unwrap();
        }
        sqlx::query(
            "INSERT INTO moz_historyvisits (place_id, visit_date, visit_type) VALUES (1, 1658620800500000, 1), (1, NULL, 1)",
        )
        .execute(&mut conn)
        .await
        .unwrap();
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn reads_description_when_present() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(PLACES_FILE);
        write_places(&path, true).await;

        let extractor = FirefoxExtractor::new("firefox:abc.default", &path);
        let mut handle = extractor.open(true).await.unwrap();
        let urls = extractor.list_urls(&mut handle.conn).await.unwrap();
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].description.as_deref(), Some("Internet for people"));

        let visits = extractor.list_visits(&mut handle.conn).await.unwrap();
        assert_eq!(visits.len(), 1);
        assert_eq!(
            visits[0].visit_time,
            Utc.timestamp_opt(1_658_620_800, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn older_schema_without_description() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(PLACES_FILE);
        write_places(&path, false).await;

        let extractor = FirefoxExtractor::new("firefox:abc.default", &path);
        let mut handle = extractor.open(false).await.unwrap();
        let urls = extractor.list_urls(&mut handle.conn).await.unwrap();
        assert_eq!(urls[0].title.as_deref(), Some("Mozilla"));
        assert_eq!(urls[0].description, None);
    }
}
