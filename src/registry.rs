//! Extractor registry: finds history databases on this machine.
//!
//! A registry is a list of [`CandidateLocation`]s, each naming a browser
//! family and a root directory. [`discover`] probes every root and, for
//! each history database it finds beneath it, builds one extractor:
//!
//! ```text
//! chrome   ~/.config/google-chrome/     ──▶ chrome:Default, chrome:Profile 1
//! firefox  ~/.mozilla/firefox/          ──▶ firefox:abcd1234.default-release
//! safari   ~/Library/Safari/            ──▶ safari
//! ```
//!
//! Roots that don't exist are reported as [`ProbeOutcome::Absent`] and
//! skipped. Discovery only fails when searching an existing root errors.
//!
//! Built-in locations depend on the platform; `[[discovery.sources]]` in
//! the config adds more, and `include_defaults = false` drops the
//! built-ins altogether.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{HistoryError, Result};
use crate::extractor::Extractor;
use crate::extractor_chromium::{ChromiumExtractor, HISTORY_FILE};
use crate::extractor_firefox::{FirefoxExtractor, PLACES_FILE};
use crate::extractor_safari::{SafariExtractor, HISTORY_DB_FILE};

/// How deep below a root to look for profile databases.
const MAX_PROFILE_DEPTH: usize = 3;

/// Browser family, which decides the file to look for and the extractor
/// to build.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Chromium,
    Firefox,
    Safari,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Chromium => "chromium",
            SourceKind::Firefox => "firefox",
            SourceKind::Safari => "safari",
        }
    }

    fn build(&self, name: String, path: PathBuf) -> Arc<dyn Extractor> {
        match self {
            SourceKind::Chromium => Arc::new(ChromiumExtractor::new(name, path)),
            SourceKind::Firefox => Arc::new(FirefoxExtractor::new(name, path)),
            SourceKind::Safari => Arc::new(SafariExtractor::new(name, path)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateLocation {
    pub name: String,
    pub kind: SourceKind,
    pub root: PathBuf,
}

impl CandidateLocation {
    pub fn new(name: impl Into<String>, kind: SourceKind, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            kind,
            root: root.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The root exists; this many databases were found under it.
    Found(usize),
    /// The root is missing or not a directory.
    Absent,
}

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub location: CandidateLocation,
    pub outcome: ProbeOutcome,
}

/// Result of [`discover`]: the extractors to run plus what happened at
/// every probed location.
pub struct Discovery {
    pub extractors: Vec<Arc<dyn Extractor>>,
    pub probes: Vec<ProbeResult>,
}

/// Built-in locations for the current platform.
pub fn default_candidates() -> Vec<CandidateLocation> {
    let mut out = Vec::new();

    if cfg!(target_os = "macos") {
        if let Some(home) = dirs::home_dir() {
            let support = home.join("Library/Application Support");
            out.push(CandidateLocation::new(
                "chrome",
                SourceKind::Chromium,
                support.join("Google/Chrome"),
            ));
            out.push(CandidateLocation::new(
                "chromium",
                SourceKind::Chromium,
                support.join("Chromium"),
            ));
            out.push(CandidateLocation::new(
                "brave",
                SourceKind::Chromium,
                support.join("BraveSoftware/Brave-Browser"),
            ));
            out.push(CandidateLocation::new(
                "vivaldi",
                SourceKind::Chromium,
                support.join("Vivaldi"),
            ));
            out.push(CandidateLocation::new(
                "firefox",
                SourceKind::Firefox,
                support.join("Firefox/Profiles"),
            ));
            out.push(CandidateLocation::new(
                "safari",
                SourceKind::Safari,
                home.join("Library/Safari"),
            ));
        }
    } else if cfg!(target_os = "windows") {
        if let Some(local) = dirs::data_local_dir() {
            out.push(CandidateLocation::new(
                "chrome",
                SourceKind::Chromium,
                local.join("Google/Chrome/User Data"),
            ));
            out.push(CandidateLocation::new(
                "edge",
                SourceKind::Chromium,
                local.join("Microsoft/Edge/User Data"),
            ));
            out.push(CandidateLocation::new(
                "brave",
                SourceKind::Chromium,
                local.join("BraveSoftware/Brave-Browser/User Data"),
            ));
            out.push(CandidateLocation::new(
                "vivaldi",
                SourceKind::Chromium,
                local.join("Vivaldi/User Data"),
            ));
        }
        if let Some(roaming) = dirs::data_dir() {
            out.push(CandidateLocation::new(
                "firefox",
                SourceKind::Firefox,
                roaming.join("Mozilla/Firefox/Profiles"),
            ));
        }
    } else {
        if let Some(config) = dirs::config_dir() {
            out.push(CandidateLocation::new(
                "chrome",
                SourceKind::Chromium,
                config.join("google-chrome"),
            ));
            out.push(CandidateLocation::new(
                "chromium",
                SourceKind::Chromium,
                config.join("chromium"),
            ));
            out.push(CandidateLocation::new(
                "brave",
                SourceKind::Chromium,
                config.join("BraveSoftware/Brave-Browser"),
            ));
            out.push(CandidateLocation::new(
                "vivaldi",
                SourceKind::Chromium,
                config.join("vivaldi"),
            ));
        }
        if let Some(home) = dirs::home_dir() {
            out.push(CandidateLocation::new(
                "firefox",
                SourceKind::Firefox,
                home.join(".mozilla/firefox"),
            ));
        }
    }

    out
}

/// Candidate locations for a config: the built-ins (unless disabled)
/// followed by every `[[discovery.sources]]` entry.
pub fn candidates_from_config(config: &Config) -> Vec<CandidateLocation> {
    let mut out = if config.discovery.include_defaults {
        default_candidates()
    } else {
        Vec::new()
    };

    for source in &config.discovery.sources {
        out.push(CandidateLocation::new(
            source.name.clone(),
            source.kind,
            source.root.clone(),
        ));
    }

    out
}

/// Probe every candidate and build one extractor per database found.
pub fn discover(candidates: &[CandidateLocation]) -> Result<Discovery> {
    let mut extractors: Vec<Arc<dyn Extractor>> = Vec::new();
    let mut probes = Vec::with_capacity(candidates.len());

    for location in candidates {
        if !location.root.is_dir() {
            tracing::info!(
                location = %location.name,
                root = %location.root.display(),
                "skipping missing history location"
            );
            probes.push(ProbeResult {
                location: location.clone(),
                outcome: ProbeOutcome::Absent,
            });
            continue;
        }

        let found = find_databases(location)?;
        tracing::debug!(
            location = %location.name,
            databases = found.len(),
            "probed history location"
        );
        probes.push(ProbeResult {
            location: location.clone(),
            outcome: ProbeOutcome::Found(found.len()),
        });
        for (name, path) in found {
            extractors.push(location.kind.build(name, path));
        }
    }

    Ok(Discovery { extractors, probes })
}

/// Databases under one location, as `(extractor name, path)` pairs in a
/// stable order.
fn find_databases(location: &CandidateLocation) -> Result<Vec<(String, PathBuf)>> {
    match location.kind {
        SourceKind::Chromium => walk_profiles(location, HISTORY_FILE),
        SourceKind::Firefox => walk_profiles(location, PLACES_FILE),
        SourceKind::Safari => {
            let path = location.root.join(HISTORY_DB_FILE);
            if path.is_file() {
                Ok(vec![(location.name.clone(), path)])
            } else {
                Ok(Vec::new())
            }
        }
    }
}

fn walk_profiles(location: &CandidateLocation, file_name: &str) -> Result<Vec<(String, PathBuf)>> {
    let mut found = Vec::new();

    for entry in WalkDir::new(&location.root)
        .max_depth(MAX_PROFILE_DEPTH)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(HistoryError::Discovery {
                    root: location.root.clone(),
                    source: e,
                })
            }
            Err(e) => {
                tracing::warn!(location = %location.name, error = %e, "skipping unreadable path");
                continue;
            }
        };

        if !entry.file_type().is_file() || entry.file_name() != file_name {
            continue;
        }

        let name = profile_name(&location.name, &location.root, entry.path());
        found.push((name, entry.into_path()));
    }

    Ok(found)
}

/// `<location>:<profile>`, where the profile is the database's directory
/// relative to the root. A database directly under the root is named
/// after the location alone.
fn profile_name(location: &str, root: &Path, db_path: &Path) -> String {
    let profile = db_path
        .parent()
        .and_then(|dir| dir.strip_prefix(root).ok())
        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        .unwrap_or_default();

    if profile.is_empty() {
        location.to_string()
    } else {
        format!("{location}:{profile}")
    }
}

/// Whether an extractor is selected by a `--browser` filter. The filter
/// matches a full extractor name or every profile of a location.
pub fn matches_filter(extractor_name: &str, filter: &str) -> bool {
    extractor_name == filter
        || extractor_name
            .strip_prefix(filter)
            .is_some_and(|rest| rest.starts_with(':'))
}
