//! Core data models used throughout histdex.
//!
//! Extractors emit [`ExtractedUrl`]s and [`ExtractedVisit`]s in the shape of
//! their source; the sync driver turns them into [`UrlRecord`]s and
//! [`VisitEvent`]s keyed by [`UrlId`], which is the only form the store
//! and the index ever see.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::normalize::{identify, UrlId};

/// A URL row as reported by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedUrl {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// A single visit as reported by a source, already converted to UTC with
/// second resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedVisit {
    pub url: String,
    pub visit_time: DateTime<Utc>,
}

/// Deduplicated URL stored in the unified store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlRecord {
    pub url_id: UrlId,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub last_visit: Option<DateTime<Utc>>,
}

impl UrlRecord {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            url_id: identify(&url),
            url,
            title: None,
            description: None,
            last_visit: None,
        }
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_last_visit(mut self, last_visit: Option<DateTime<Utc>>) -> Self {
        self.last_visit = last_visit;
        self
    }
}

/// A stored visit. Unique on `(url_id, visit_time)` regardless of source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitEvent {
    pub url_id: UrlId,
    pub visit_time: DateTime<Utc>,
    pub extractor_name: String,
}

impl VisitEvent {
    pub fn new(url: &str, visit_time: DateTime<Utc>, extractor_name: &str) -> Self {
        Self {
            url_id: identify(url),
            visit_time: to_seconds(visit_time),
            extractor_name: extractor_name.to_string(),
        }
    }
}

/// Result of a search: records in relevance order plus the total number
/// of matching documents in the index.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UrlQueryResult {
    pub urls: Vec<UrlRecord>,
    pub total_count: u64,
}

/// Truncate a timestamp to whole seconds, the canonical resolution of
/// every stored visit.
pub fn to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.timestamp(), 0).unwrap_or(ts)
}
