//! The extractor capability interface.
//!
//! An [`Extractor`] knows how to query one browser family's native history
//! schema and emit normalized [`ExtractedUrl`]s and [`ExtractedVisit`]s.
//! Everything downstream (deduplication, storage, indexing) is shared and
//! source-agnostic.
//!
//! ```text
//! Registry ──▶ Arc<dyn Extractor> ──open()──▶ SourceHandle
//!                    │                             │
//!                    ├── list_urls(&mut conn) ◀────┤
//!                    └── list_visits(&mut conn) ◀──┘
//! ```
//!
//! Each list operation either returns every row of the source or fails
//! with [`HistoryError::SourceRead`]; partial results are never returned.
//!
//! # Timestamps
//!
//! Visit times must leave the extractor as UTC with second resolution.
//! The helpers at the bottom of this module convert the three native
//! encodings we know about.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::error::{HistoryError, Result};
use crate::models::{ExtractedUrl, ExtractedVisit};

/// Adapter for one source database.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use histdex::error::Result;
/// use histdex::extractor::Extractor;
/// use histdex::models::{ExtractedUrl, ExtractedVisit};
/// use sqlx::SqliteConnection;
/// use std::path::Path;
///
/// struct EmptyExtractor;
///
/// #[async_trait]
/// impl Extractor for EmptyExtractor {
///     fn name(&self) -> &str { "empty" }
///     fn source_path(&self) -> &Path { Path::new("/dev/null") }
///
///     async fn list_urls(&self, _conn: &mut SqliteConnection) -> Result<Vec<ExtractedUrl>> {
///         Ok(vec![])
///     }
///
///     async fn list_visits(&self, _conn: &mut SqliteConnection) -> Result<Vec<ExtractedVisit>> {
///         Ok(vec![])
///     }
/// }
/// ```
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Stable identifier of the source, e.g. `"chrome:Default"`.
    ///
    /// Stored as the `extractor_name` of every visit this extractor
    /// produces and used as the key of its incremental-sync cursor.
    fn name(&self) -> &str;

    /// Path of the native database file. Informational only.
    fn source_path(&self) -> &Path;

    /// Browser family implemented by this extractor (`"chromium"`,
    /// `"firefox"`, `"safari"`). Custom extractors default to `"custom"`.
    fn kind(&self) -> &str {
        "custom"
    }

    /// Open a connection to the source database.
    ///
    /// With `snapshot` set, the file is first copied to a private
    /// temporary directory so a running browser's locks don't get in the
    /// way. The source file itself is never written.
    async fn open(&self, snapshot: bool) -> Result<SourceHandle> {
        SourceHandle::open(self.name(), self.source_path(), snapshot).await
    }

    /// Every URL row in the source.
    async fn list_urls(&self, conn: &mut SqliteConnection) -> Result<Vec<ExtractedUrl>>;

    /// Every visit in the source, converted to UTC seconds.
    async fn list_visits(&self, conn: &mut SqliteConnection) -> Result<Vec<ExtractedVisit>>;
}

/// An open connection to a source database.
///
/// When opened from a snapshot, the temporary copy lives exactly as long
/// as the handle.
pub struct SourceHandle {
    pub conn: SqliteConnection,
    _snapshot: Option<TempDir>,
}

impl SourceHandle {
    pub async fn open(name: &str, path: &Path, snapshot: bool) -> Result<Self> {
        if !snapshot {
            let conn = SqliteConnectOptions::new()
                .filename(path)
                .read_only(true)
                .connect()
                .await
                .map_err(|e| HistoryError::source_read(name, e))?;
            return Ok(Self {
                conn,
                _snapshot: None,
            });
        }

        let dir = TempDir::new().map_err(|e| HistoryError::source_read(name, e.into()))?;
        let copy = copy_database(path, dir.path())
            .await
            .map_err(|e| HistoryError::source_read(name, e.into()))?;

        let conn = SqliteConnectOptions::new()
            .filename(&copy)
            .connect()
            .await
            .map_err(|e| HistoryError::source_read(name, e))?;

        Ok(Self {
            conn,
            _snapshot: Some(dir),
        })
    }

    /// A handle over an empty in-memory database, for extractors whose
    /// data doesn't come from a file.
    pub async fn in_memory(name: &str) -> Result<Self> {
        let conn = SqliteConnection::connect("sqlite::memory:")
            .await
            .map_err(|e| HistoryError::source_read(name, e))?;
        Ok(Self {
            conn,
            _snapshot: None,
        })
    }

    pub async fn close(self) {
        let _ = self.conn.close().await;
    }
}

/// Side files SQLite needs to recover a copy: the write-ahead log, or the
/// rollback journal of a write in progress (Chromium's `History-journal`).
const SIDE_FILE_SUFFIXES: [&str; 2] = ["-wal", "-journal"];

/// Copy a SQLite file and its `-wal` / `-journal` files (if any) into `dir`.
async fn copy_database(path: &Path, dir: &Path) -> std::io::Result<PathBuf> {
    let file_name = path
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("source.sqlite"));
    let target = dir.join(file_name);
    tokio::fs::copy(path, &target).await?;

    for suffix in SIDE_FILE_SUFFIXES {
        let mut side_name = file_name.to_os_string();
        side_name.push(suffix);
        let side = path.with_file_name(&side_name);
        if tokio::fs::try_exists(&side).await.unwrap_or(false) {
            tokio::fs::copy(&side, dir.join(&side_name)).await?;
        }
    }

    Ok(target)
}

/// Browsers store "no title" as an empty string; normalize that to `None`.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

// ============ Timestamp conversion ============

/// Seconds between 1601-01-01 (WebKit/Windows epoch) and 1970-01-01.
pub const WEBKIT_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;

/// Seconds between 1970-01-01 and 2001-01-01 (Core Data epoch).
pub const COCOA_EPOCH_OFFSET_SECS: i64 = 978_307_200;

/// Chromium: microseconds since 1601-01-01.
pub fn webkit_micros_to_utc(micros: i64) -> Option<DateTime<Utc>> {
    let secs = micros
        .div_euclid(1_000_000)
        .checked_sub(WEBKIT_EPOCH_OFFSET_SECS)?;
    DateTime::from_timestamp(secs, 0)
}

/// Firefox: microseconds since the unix epoch.
pub fn unix_micros_to_utc(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(micros.div_euclid(1_000_000), 0)
}

/// Safari: fractional seconds since 2001-01-01.
pub fn cocoa_seconds_to_utc(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() || seconds.abs() > 1e15 {
        return None;
    }
    let secs = (seconds.floor() as i64).checked_add(COCOA_EPOCH_OFFSET_SECS)?;
    DateTime::from_timestamp(secs, 0)
}
