//! Sync driver: extractor → store.
//!
//! Imports every discovered source into the unified store, either in full
//! or incrementally. An incremental import resumes after the latest visit
//! already stored for that extractor:
//!
//! ```text
//! since = store.latest_visit_time(name)      (NoPriorData → full import)
//! urls   → upsert all                         (titles may change without a visit)
//! visits → insert those with visit_time > since
//! ```
//!
//! Writes go to the store in transactions of `batch_size` statements. A
//! failed batch rolls back and ends that source's import; batches already
//! committed stay. Failures are collected per source and never stop the
//! other sources from being imported.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::config::Config;
use crate::error::{HistoryError, Result};
use crate::extractor::Extractor;
use crate::models::{ExtractedUrl, ExtractedVisit, UrlRecord, VisitEvent};
use crate::normalize;
use crate::progress::{SyncProgressEvent, SyncProgressReporter};
use crate::registry::matches_filter;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Import every URL and visit.
    Full,
    /// Import only visits newer than the latest one already stored.
    Incremental,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub mode: SyncMode,
    /// Only import extractors selected by this `--browser` filter.
    pub only: Option<String>,
    /// Number of sources imported at the same time.
    pub concurrency: usize,
    /// Sources still running at this instant fail with
    /// [`HistoryError::DeadlineExceeded`].
    pub deadline: Option<Instant>,
    pub snapshot: bool,
    pub batch_size: usize,
}

impl SyncOptions {
    pub fn from_config(config: &Config, mode: SyncMode) -> Self {
        Self {
            mode,
            only: None,
            concurrency: config.sync.concurrency,
            deadline: config
                .sync
                .timeout_secs
                .map(|secs| Instant::now() + std::time::Duration::from_secs(secs)),
            snapshot: config.sync.snapshot,
            batch_size: config.index.batch_size,
        }
    }
}

/// Counters for one source's import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub urls_upserted: u64,
    /// Visits reported by the source.
    pub visits_seen: u64,
    /// Visits newer than the cursor, i.e. offered to the store.
    pub visits_new: u64,
    /// Visits actually written; the rest were already stored.
    pub visits_inserted: u64,
    /// Cursor of an incremental import, `None` for a full one.
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct SourceOutcome {
    pub name: String,
    pub path: PathBuf,
    pub result: Result<ImportStats>,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub outcomes: Vec<SourceOutcome>,
}

impl SyncReport {
    pub fn failed_names(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_err())
            .map(|o| o.name.clone())
            .collect()
    }

    /// `Err(SyncFailed)` naming every failed source, if any failed.
    pub fn into_result(self) -> Result<Vec<SourceOutcome>> {
        let failed = self.failed_names();
        if failed.is_empty() {
            Ok(self.outcomes)
        } else {
            Err(HistoryError::SyncFailed(failed))
        }
    }
}

/// A single pending statement of an import.
enum PendingWrite<'a> {
    Url(UrlRecord),
    Touch(&'a str, Option<DateTime<Utc>>),
    Visit(VisitEvent),
}

/// Import one source.
pub async fn import_source(
    store: &Store,
    extractor: &dyn Extractor,
    options: &SyncOptions,
    reporter: &dyn SyncProgressReporter,
) -> Result<ImportStats> {
    let name = extractor.name();

    let since = match options.mode {
        SyncMode::Full => None,
        SyncMode::Incremental => match store.latest_visit_time(name).await {
            Ok(latest) => Some(latest),
            Err(HistoryError::NoPriorData(_)) => {
                tracing::info!(source = name, "no prior visits, importing in full");
                None
            }
            Err(e) => return Err(e),
        },
    };

    reporter.report(SyncProgressEvent::Reading {
        source: name.to_string(),
    });

    let mut handle = extractor.open(options.snapshot).await?;
    let listed = async {
        let urls = extractor.list_urls(&mut handle.conn).await?;
        let visits = extractor.list_visits(&mut handle.conn).await?;
        Ok::<_, HistoryError>((urls, visits))
    }
    .await;
    handle.close().await;
    let (urls, visits) = listed?;

    let writes = plan_writes(name, &urls, &visits, since);
    let mut stats = ImportStats {
        visits_seen: visits.len() as u64,
        since,
        ..Default::default()
    };

    let total = writes.len() as u64;
    let mut written = 0u64;
    for chunk in writes.chunks(options.batch_size.max(1)) {
        let mut batch = store.begin().await?;
        for write in chunk {
            match write {
                PendingWrite::Url(record) => {
                    batch.upsert_url(record).await?;
                    stats.urls_upserted += 1;
                }
                PendingWrite::Touch(url, last_visit) => {
                    batch.touch_url(url, *last_visit).await?;
                }
                PendingWrite::Visit(event) => {
                    stats.visits_new += 1;
                    if batch.insert_visit(event).await? {
                        stats.visits_inserted += 1;
                    }
                }
            }
        }
        batch.commit().await?;

        written += chunk.len() as u64;
        reporter.report(SyncProgressEvent::Importing {
            source: name.to_string(),
            n: written,
            total,
        });
    }

    tracing::info!(
        source = name,
        urls = stats.urls_upserted,
        visits_seen = stats.visits_seen,
        visits_inserted = stats.visits_inserted,
        "imported source"
    );

    Ok(stats)
}

/// Order the writes of an import: every listed URL, then the URLs known
/// only from visits, then the visits newer than `since`.
fn plan_writes<'a>(
    name: &str,
    urls: &'a [ExtractedUrl],
    visits: &'a [ExtractedVisit],
    since: Option<DateTime<Utc>>,
) -> Vec<PendingWrite<'a>> {
    let mut last_visit: HashMap<&str, DateTime<Utc>> = HashMap::new();
    for visit in visits {
        last_visit
            .entry(visit.url.as_str())
            .and_modify(|t| *t = (*t).max(visit.visit_time))
            .or_insert(visit.visit_time);
    }

    let mut writes = Vec::with_capacity(urls.len() + visits.len());
    let mut listed: HashSet<&str> = HashSet::with_capacity(urls.len());

    for url in urls {
        let Some(valid) = normalize::validate(&url.url) else {
            tracing::debug!(source = name, "skipping empty url");
            continue;
        };
        if !listed.insert(valid) {
            continue;
        }
        writes.push(PendingWrite::Url(
            UrlRecord::new(valid)
                .with_title(url.title.clone())
                .with_description(url.description.clone())
                .with_last_visit(last_visit.get(valid).copied()),
        ));
    }

    let mut touched: HashSet<&str> = HashSet::new();
    let new_visits: Vec<&ExtractedVisit> = visits
        .iter()
        .filter(|v| normalize::validate(&v.url).is_some())
        .filter(|v| since.map_or(true, |s| v.visit_time > s))
        .collect();

    for visit in &new_visits {
        let url = visit.url.as_str();
        if !listed.contains(url) && touched.insert(url) {
            writes.push(PendingWrite::Touch(url, last_visit.get(url).copied()));
        }
    }
    for visit in new_visits {
        writes.push(PendingWrite::Visit(VisitEvent::new(
            &visit.url,
            visit.visit_time,
            name,
        )));
    }

    writes
}

/// Import every selected extractor and report per-source outcomes in
/// discovery order.
pub async fn run_sync(
    store: &Store,
    extractors: &[Arc<dyn Extractor>],
    options: &SyncOptions,
    reporter: Arc<dyn SyncProgressReporter>,
) -> SyncReport {
    let selected: Vec<Arc<dyn Extractor>> = extractors
        .iter()
        .filter(|e| {
            options
                .only
                .as_deref()
                .map_or(true, |filter| matches_filter(e.name(), filter))
        })
        .cloned()
        .collect();

    if selected.is_empty() {
        tracing::warn!(filter = ?options.only, "no sources selected");
    }

    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut handles = Vec::with_capacity(selected.len());

    for extractor in selected {
        let store = store.clone();
        let options = options.clone();
        let reporter = reporter.clone();
        let semaphore = semaphore.clone();
        let name = extractor.name().to_string();
        let path = extractor.source_path().to_path_buf();

        let handle = tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let import = import_source(&store, extractor.as_ref(), &options, reporter.as_ref());
            let result = match options.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, import)
                    .await
                    .unwrap_or_else(|_| {
                        Err(HistoryError::DeadlineExceeded(extractor.name().to_string()))
                    }),
                None => import.await,
            };

            reporter.report(SyncProgressEvent::Finished {
                source: extractor.name().to_string(),
                error: result.as_ref().err().map(|e| e.to_string()),
            });
            result
        });
        handles.push((name, path, handle));
    }

    let mut report = SyncReport::default();
    for (name, path, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(HistoryError::DeadlineExceeded(name.clone())),
        };
        if let Err(e) = &result {
            tracing::warn!(source = %name, error = %e, "source failed");
        }
        report.outcomes.push(SourceOutcome { name, path, result });
    }

    report
}
