//! Error kinds shared by the extraction, storage, and indexing layers.
//!
//! Per-source errors ([`HistoryError::SourceRead`],
//! [`HistoryError::InvalidTimestamp`], [`HistoryError::DeadlineExceeded`])
//! are collected by the sync driver and reported together in
//! [`HistoryError::SyncFailed`]. [`HistoryError::NoPriorData`] is never
//! surfaced to users: the sync driver recovers from it by importing the
//! source in full.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to read source '{name}': {source}")]
    SourceRead {
        name: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("source '{name}' reported an unrepresentable timestamp: {raw}")]
    InvalidTimestamp { name: String, raw: i64 },

    #[error("store write failed: {0}")]
    StoreWrite(#[source] sqlx::Error),

    #[error("store read failed: {0}")]
    StoreRead(#[source] sqlx::Error),

    #[error("no visits recorded yet for '{0}'")]
    NoPriorData(String),

    #[error("document index write failed: {0}")]
    IndexWrite(#[source] sqlx::Error),

    #[error("document index query failed: {0}")]
    IndexRead(#[source] sqlx::Error),

    #[error("failed to search {} for history databases: {source}", root.display())]
    Discovery {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("deadline exceeded while importing '{0}'")]
    DeadlineExceeded(String),

    #[error("{} source(s) failed: {}", .0.len(), .0.join(", "))]
    SyncFailed(Vec<String>),
}

impl HistoryError {
    /// Wrap a driver error raised while reading the named source.
    pub fn source_read(name: &str, source: sqlx::Error) -> Self {
        Self::SourceRead {
            name: name.to_string(),
            source,
        }
    }
}

pub type Result<T, E = HistoryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_failed_lists_every_source() {
        let err = HistoryError::SyncFailed(vec!["chrome:Default".into(), "safari".into()]);
        assert_eq!(
            err.to_string(),
            "2 source(s) failed: chrome:Default, safari"
        );
    }
}
