use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::SqliteConnection;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use histdex::error::Result;
use histdex::extractor::{Extractor, SourceHandle};
use histdex::index_fts::Fts5Index;
use histdex::indexer::build_index;
use histdex::models::{ExtractedUrl, ExtractedVisit};
use histdex::normalize::identify;
use histdex::progress::NoProgress;
use histdex::search::search_urls;
use histdex::store::{Store, UrlFilter};
use histdex::sync::{import_source, run_sync, SyncMode, SyncOptions};

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

/// An extractor serving fixed records from memory.
struct Memory {
    name: String,
    urls: Vec<ExtractedUrl>,
    visits: Vec<ExtractedVisit>,
}

impl Memory {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            urls: Vec::new(),
            visits: Vec::new(),
        }
    }

    fn url(mut self, url: &str, title: &str) -> Self {
        self.urls.push(ExtractedUrl {
            url: url.to_string(),
            title: Some(title.to_string()),
            description: None,
        });
        self
    }

    fn visit(mut self, url: &str, secs: i64) -> Self {
        self.visits.push(ExtractedVisit {
            url: url.to_string(),
            visit_time: ts(secs),
        });
        self
    }
}

#[async_trait]
impl Extractor for Memory {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_path(&self) -> &Path {
        Path::new(":memory:")
    }

    async fn open(&self, _snapshot: bool) -> Result<SourceHandle> {
        SourceHandle::in_memory(&self.name).await
    }

    async fn list_urls(&self, _conn: &mut SqliteConnection) -> Result<Vec<ExtractedUrl>> {
        Ok(self.urls.clone())
    }

    async fn list_visits(&self, _conn: &mut SqliteConnection) -> Result<Vec<ExtractedVisit>> {
        Ok(self.visits.clone())
    }
}

fn options(mode: SyncMode) -> SyncOptions {
    SyncOptions {
        mode,
        only: None,
        concurrency: 1,
        deadline: None,
        snapshot: false,
        batch_size: 100,
    }
}

async fn setup() -> (TempDir, Store, Fts5Index) {
    let tmp = TempDir::new().unwrap();
    let store = Store::open(&tmp.path().join("histdex.sqlite"))
        .await
        .unwrap();
    let index = Fts5Index::open(&tmp.path().join("index.sqlite"))
        .await
        .unwrap();
    (tmp, store, index)
}

async fn visit_count(store: &Store) -> u64 {
    store.count_visits().await.unwrap()
}

#[tokio::test]
async fn full_import_twice_is_idempotent() {
    let (_tmp, store, _index) = setup().await;
    let source = Memory::new("a")
        .url("https://example.com", "Example")
        .url("https://rust-lang.org", "Rust")
        .visit("https://example.com", 100)
        .visit("https://example.com", 200)
        .visit("https://rust-lang.org", 150);

    import_source(&store, &source, &options(SyncMode::Full), &NoProgress)
        .await
        .unwrap();
    let second = import_source(&store, &source, &options(SyncMode::Full), &NoProgress)
        .await
        .unwrap();

    assert_eq!(second.visits_inserted, 0);
    assert_eq!(
        store.count_urls_matching(&UrlFilter::All).await.unwrap(),
        2
    );
    assert_eq!(visit_count(&store).await, 3);
}

#[tokio::test]
async fn same_visit_from_two_sources_is_stored_once() {
    let (_tmp, store, _index) = setup().await;
    let chrome = Memory::new("chrome:Default")
        .url("https://example.com", "Example")
        .visit("https://example.com", 100);
    let firefox = Memory::new("firefox:main")
        .url("https://example.com", "Example")
        .visit("https://example.com", 100)
        .visit("https://example.com", 300);

    let extractors: Vec<Arc<dyn Extractor>> = vec![Arc::new(chrome), Arc::new(firefox)];
    let report = run_sync(
        &store,
        &extractors,
        &options(SyncMode::Full),
        Arc::new(NoProgress),
    )
    .await;
    assert!(report.into_result().is_ok());

    assert_eq!(visit_count(&store).await, 2);
    let per_source = store.visits_by_extractor().await.unwrap();
    assert_eq!(per_source.len(), 2);
    assert_eq!(per_source[0].extractor_name, "chrome:Default");
    assert_eq!(per_source[0].visits, 1);
    assert_eq!(per_source[1].visits, 1);
}

#[tokio::test]
async fn incremental_import_only_adds_newer_visits() {
    let (_tmp, store, _index) = setup().await;
    let first = Memory::new("a")
        .url("https://example.com", "Example")
        .visit("https://example.com", 100)
        .visit("https://example.com", 200);
    import_source(&store, &first, &options(SyncMode::Full), &NoProgress)
        .await
        .unwrap();
    assert_eq!(store.latest_visit_time("a").await.unwrap(), ts(200));

    let second = Memory::new("a")
        .url("https://example.com", "Example")
        .visit("https://example.com", 150)
        .visit("https://example.com", 250);
    let stats = import_source(&store, &second, &options(SyncMode::Incremental), &NoProgress)
        .await
        .unwrap();

    assert_eq!(stats.visits_inserted, 1);
    assert_eq!(visit_count(&store).await, 3);
    assert_eq!(store.latest_visit_time("a").await.unwrap(), ts(250));

    let records = store
        .urls_by_id(&[identify("https://example.com")])
        .await
        .unwrap();
    assert_eq!(records[0].last_visit, Some(ts(250)));
}

#[tokio::test]
async fn titles_update_without_new_visits() {
    let (_tmp, store, _index) = setup().await;
    let first = Memory::new("a")
        .url("https://example.com", "Old title")
        .visit("https://example.com", 100);
    import_source(&store, &first, &options(SyncMode::Full), &NoProgress)
        .await
        .unwrap();

    let second = Memory::new("a")
        .url("https://example.com", "New title")
        .visit("https://example.com", 100);
    import_source(&store, &second, &options(SyncMode::Incremental), &NoProgress)
        .await
        .unwrap();

    let records = store
        .urls_by_id(&[identify("https://example.com")])
        .await
        .unwrap();
    assert_eq!(records[0].title.as_deref(), Some("New title"));
}

#[tokio::test]
async fn import_index_search_end_to_end() {
    let (_tmp, store, mut index) = setup().await;
    let source = Memory::new("a")
        .url("https://example.com", "Example Domain")
        .url("https://docs.rs", "Docs.rs")
        .visit("https://example.com", 100)
        .visit("https://example.com", 200);

    import_source(&store, &source, &options(SyncMode::Full), &NoProgress)
        .await
        .unwrap();
    assert_eq!(visit_count(&store).await, 2);

    let indexed = build_index(&store, &mut index, 500, &NoProgress)
        .await
        .unwrap();
    assert_eq!(indexed, 2);
    assert!(store.unindexed_urls().await.unwrap().is_empty());
    assert_eq!(
        build_index(&store, &mut index, 500, &NoProgress)
            .await
            .unwrap(),
        0
    );

    let result = search_urls(&store, &index, "example", 100).await.unwrap();
    assert!(result.total_count >= 1);
    assert_eq!(result.urls[0].url, "https://example.com");
    assert_eq!(result.urls[0].title.as_deref(), Some("Example Domain"));
    assert_eq!(result.urls[0].last_visit, Some(ts(200)));

    let empty = search_urls(&store, &index, "zzzz", 100).await.unwrap();
    assert!(empty.urls.is_empty());
    assert_eq!(empty.total_count, 0);
}
