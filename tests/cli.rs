use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const WEBKIT_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;

fn histdex_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("histdex");
    path
}

/// Write a Chromium `History` file with two URLs and three visits.
async fn write_chromium_history(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut conn = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .connect()
        .await
        .unwrap();
    for sql in [
        "CREATE TABLE urls (id INTEGER PRIMARY KEY, url LONGVARCHAR, title LONGVARCHAR)",
        "CREATE TABLE visits (id INTEGER PRIMARY KEY, url INTEGER NOT NULL, visit_time INTEGER NOT NULL)",
        "INSERT INTO urls (id, url, title) VALUES (1, 'https://example.com', 'Example Domain')",
        "INSERT INTO urls (id, url, title) VALUES (2, 'https://www.rust-lang.org', 'Rust Programming Language')",
    ] {
        sqlx::query(sql).execute(&mut conn).await.unwrap();
    }
    for (url_id, unix_secs) in [(1i64, 1_658_620_800i64), (1, 1_658_620_900), (2, 1_658_621_000)] {
        sqlx::query("INSERT INTO visits (url, visit_time) VALUES (?, ?)")
            .bind(url_id)
            .bind((unix_secs + WEBKIT_EPOCH_OFFSET_SECS) * 1_000_000)
            .execute(&mut conn)
            .await
            .unwrap();
    }
    conn.close().await.unwrap();
}

async fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    write_chromium_history(&root.join("chrome").join("Default").join("History")).await;

    let config_content = format!(
        r#"[db]
path = "{root}/data/histdex.sqlite"

[index]
path = "{root}/data/index.sqlite"

[discovery]
include_defaults = false

[[discovery.sources]]
name = "chrome"
kind = "chromium"
root = "{root}/chrome"
"#,
        root = root.display()
    );

    let config_path = root.join("histdex.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_histdex(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = histdex_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run histdex binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[tokio::test]
async fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env().await;

    let (stdout, stderr, success) = run_histdex(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let (_, _, success) = run_histdex(&config_path, &["init"]);
    assert!(success, "second init failed (not idempotent)");
}

#[tokio::test]
async fn test_sources_lists_profiles() {
    let (_tmp, config_path) = setup_test_env().await;

    let (stdout, stderr, success) = run_histdex(&config_path, &["sources"]);
    assert!(success, "sources failed: {}", stderr);
    assert!(stdout.contains("chrome:Default"));
    assert!(stdout.contains("1 found"));
}

#[tokio::test]
async fn test_sync_then_search() {
    let (_tmp, config_path) = setup_test_env().await;

    let (stdout, stderr, success) = run_histdex(&config_path, &["sync"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("chrome:Default  urls: 2  visits: 3 new / 3 seen"));
    assert!(stdout.contains("indexed: 2 documents"));
    assert!(stdout.contains("ok"));

    let (stdout, _, success) = run_histdex(&config_path, &["search", "example"]);
    assert!(success);
    assert!(stdout.contains("Example Domain"));
    assert!(stdout.contains("https://example.com"));
    assert!(!stdout.contains("rust-lang"));

    let (stdout, _, success) = run_histdex(&config_path, &["search", "nothing-matches-this"]);
    assert!(success, "empty search must not fail");
    assert!(stdout.contains("No results."));
}

#[tokio::test]
async fn test_sync_is_incremental() {
    let (_tmp, config_path) = setup_test_env().await;

    let (_, _, success) = run_histdex(&config_path, &["sync"]);
    assert!(success);

    let (stdout, _, success) = run_histdex(&config_path, &["sync"]);
    assert!(success);
    assert!(stdout.contains("visits: 0 new / 3 seen"));
    assert!(stdout.contains("indexed: 0 documents"));

    let (stdout, _, success) = run_histdex(&config_path, &["sync", "--full", "--no-index"]);
    assert!(success);
    assert!(stdout.contains("visits: 0 new / 3 seen"));
    assert!(!stdout.contains("indexed:"));
}

#[tokio::test]
async fn test_search_json() {
    let (_tmp, config_path) = setup_test_env().await;
    run_histdex(&config_path, &["sync"]);

    let (stdout, stderr, success) = run_histdex(&config_path, &["search", "rust", "--json"]);
    assert!(success, "search failed: {}", stderr);

    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["total_count"], 1);
    assert_eq!(parsed["urls"][0]["url"], "https://www.rust-lang.org");
    assert_eq!(parsed["urls"][0]["title"], "Rust Programming Language");
}

#[tokio::test]
async fn test_failed_source_exits_nonzero() {
    let (tmp, config_path) = setup_test_env().await;

    let broken = tmp.path().join("broken").join("Default");
    fs::create_dir_all(&broken).unwrap();
    fs::write(broken.join("History"), b"this is not a database").unwrap();

    let mut config = fs::read_to_string(&config_path).unwrap();
    config.push_str(&format!(
        r#"
[[discovery.sources]]
name = "broken"
kind = "chromium"
root = "{}/broken"
"#,
        tmp.path().display()
    ));
    fs::write(&config_path, config).unwrap();

    let (stdout, stderr, success) = run_histdex(&config_path, &["sync"]);
    assert!(!success, "sync should fail when a source fails");
    assert!(stdout.contains("broken:Default  FAILED"));
    assert!(stdout.contains("chrome:Default  urls: 2"));
    assert!(stdout.contains("indexed: 2 documents"));
    assert!(stderr.contains("1 source(s) failed: broken:Default"));

    // The healthy source was still imported and indexed
    let (stdout, _, success) = run_histdex(&config_path, &["search", "example"]);
    assert!(success);
    assert!(stdout.contains("https://example.com"));
}

#[tokio::test]
async fn test_index_failure_keeps_source_failures() {
    let (tmp, config_path) = setup_test_env().await;

    let broken = tmp.path().join("broken").join("Default");
    fs::create_dir_all(&broken).unwrap();
    fs::write(broken.join("History"), b"this is not a database").unwrap();

    // The index path is a directory, so the index cannot be opened
    let index_dir = tmp.path().join("index-dir");
    fs::create_dir_all(&index_dir).unwrap();
    let config = fs::read_to_string(&config_path)
        .unwrap()
        .replace(
            &format!("{}/data/index.sqlite", tmp.path().display()),
            &index_dir.display().to_string(),
        );
    let config = format!(
        r#"{config}
[[discovery.sources]]
name = "broken"
kind = "chromium"
root = "{}/broken"
"#,
        tmp.path().display()
    );
    fs::write(&config_path, config).unwrap();

    let (stdout, stderr, success) = run_histdex(&config_path, &["sync"]);
    assert!(!success, "sync should fail");
    assert!(stdout.contains("chrome:Default  urls: 2"));
    assert!(stdout.contains("indexing FAILED"));
    assert!(!stdout.contains("ok\n"));
    assert!(stderr.contains("1 source(s) failed: broken:Default"));
    assert!(stderr.contains("Caused by"));

    // The healthy source's visits were kept
    let (stdout, _, _) = run_histdex(&config_path, &["sync", "--no-index", "-b", "chrome"]);
    assert!(stdout.contains("visits: 0 new / 3 seen"));
}

#[tokio::test]
async fn test_browser_filter() {
    let (_tmp, config_path) = setup_test_env().await;

    let (stdout, _, success) = run_histdex(&config_path, &["sync", "--browser", "firefox"]);
    assert!(success);
    assert!(stdout.contains("no sources found"));

    let (stdout, _, success) = run_histdex(&config_path, &["sync", "--browser", "chrome"]);
    assert!(success);
    assert!(stdout.contains("chrome:Default"));
}

#[tokio::test]
async fn test_stats() {
    let (_tmp, config_path) = setup_test_env().await;
    run_histdex(&config_path, &["sync"]);

    let (stdout, stderr, success) = run_histdex(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("URLs:        2"));
    assert!(stdout.contains("Visits:      3"));
    assert!(stdout.contains("Indexed:     2 / 2 (100%)"));
    assert!(stdout.contains("chrome:Default"));
}

#[test]
fn test_invalid_progress_mode() {
    let output = Command::new(histdex_binary())
        .args(["--progress", "loud", "stats"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}
