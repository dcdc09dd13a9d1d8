//! Idempotent schema creation for the unified store.
//!
//! Visits are unique by `(url_id, visit_time)` only, not by extractor:
//! some browsers import the history of others, so the same visit can be
//! reported by several sources and must be stored once.

use sqlx::SqlitePool;

use crate::error::{HistoryError, Result};

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS urls (
            url_id TEXT PRIMARY KEY NOT NULL,
            url TEXT UNIQUE NOT NULL,
            title TEXT,
            description TEXT,
            last_visit INTEGER
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS urls_meta (
            url_id TEXT PRIMARY KEY NOT NULL REFERENCES urls(url_id),
            indexed_at INTEGER
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS visits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url_id TEXT NOT NULL REFERENCES urls(url_id),
            visit_time INTEGER NOT NULL,
            extractor_name TEXT NOT NULL
        )
        "#,
        "CREATE UNIQUE INDEX IF NOT EXISTS visits_unique ON visits(url_id, visit_time)",
        "CREATE INDEX IF NOT EXISTS visits_extractor_time ON visits(extractor_name, visit_time DESC)",
    ];

    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(HistoryError::StoreWrite)?;
    }

    Ok(())
}
