//! Sync and index progress reporting.
//!
//! Reports observable progress during `histdex sync` and `histdex index`
//! so users see which source is being read, how far an import got, and
//! how much is left to index. Progress is emitted on **stderr** so stdout
//! remains parseable for scripts.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug)]
pub enum SyncProgressEvent {
    /// Reading a source database (total unknown).
    Reading { source: String },
    /// Writing a source's records: n of total written so far.
    Importing { source: String, n: u64, total: u64 },
    /// Finished a source; `error` is set when it failed.
    Finished {
        source: String,
        error: Option<String>,
    },
    /// Adding documents to the index.
    Indexing { n: u64, total: u64 },
}

/// Reports progress. Implementations write to stderr (human or JSON).
///
/// Shared between concurrently running imports, hence `Send + Sync`.
pub trait SyncProgressReporter: Send + Sync {
    fn report(&self, event: SyncProgressEvent);
}

/// Human-friendly progress on stderr: "sync chrome:Default  importing  1,234 / 5,000 records".
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match &event {
            SyncProgressEvent::Reading { source } => {
                format!("sync {}  reading...\n", source)
            }
            SyncProgressEvent::Importing { source, n, total } => format!(
                "sync {}  importing  {} / {} records\n",
                source,
                format_number(*n),
                format_number(*total)
            ),
            SyncProgressEvent::Finished { source, error } => match error {
                None => format!("sync {}  done\n", source),
                Some(e) => format!("sync {}  failed: {}\n", source, e),
            },
            SyncProgressEvent::Indexing { n, total } => format!(
                "index  {} / {} documents\n",
                format_number(*n),
                format_number(*total)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        let obj = match &event {
            SyncProgressEvent::Reading { source } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "reading"
            }),
            SyncProgressEvent::Importing { source, n, total } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "importing",
                "n": n,
                "total": total
            }),
            SyncProgressEvent::Finished { source, error } => serde_json::json!({
                "event": "finished",
                "source": source,
                "ok": error.is_none(),
                "error": error
            }),
            SyncProgressEvent::Indexing { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "indexing",
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse a `--progress` value. `auto` defers to [`default_for_tty`](Self::default_for_tty).
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "auto" => Some(Self::default_for_tty()),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            "off" => Some(ProgressMode::Off),
            _ => None,
        }
    }

    pub fn reporter(&self) -> Box<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
