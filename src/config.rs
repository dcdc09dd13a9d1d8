//! TOML configuration.
//!
//! Every section is optional; a missing config file yields
//! [`Config::default`], which places the store and the index under the
//! platform data directory and probes the built-in browser locations.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::registry::SourceKind;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_limit")]
    pub limit: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_search_limit(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub build_index: bool,
    #[serde(default = "default_true")]
    pub snapshot: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: None,
            build_index: true,
            snapshot: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    #[serde(default = "default_true")]
    pub include_defaults: bool,
    #[serde(default)]
    pub sources: Vec<SourceLocationConfig>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            include_defaults: true,
            sources: Vec::new(),
        }
    }
}

/// An explicitly configured place to look for history databases.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceLocationConfig {
    pub name: String,
    pub kind: SourceKind,
    pub root: PathBuf,
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("histdex")
}

fn default_db_path() -> PathBuf {
    data_dir().join("histdex.sqlite")
}
fn default_index_path() -> PathBuf {
    data_dir().join("index.sqlite")
}
fn default_batch_size() -> usize {
    500
}
fn default_search_limit() -> i64 {
    100
}
fn default_concurrency() -> usize {
    1
}
fn default_true() -> bool {
    true
}

/// Default location of the config file: `<config_dir>/histdex/histdex.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("histdex").join("histdex.toml"))
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Resolve the config to use: an explicit path must exist; without one,
/// the default file is read if present and built-in defaults otherwise.
pub fn resolve_config(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => load_config(path),
        None => match default_config_path() {
            Some(path) if path.exists() => load_config(&path),
            _ => Ok(Config::default()),
        },
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;

    config.db.path = expand_home(&config.db.path);
    config.index.path = expand_home(&config.index.path);
    for source in &mut config.discovery.sources {
        source.root = expand_home(&source.root);
    }

    if config.index.batch_size == 0 {
        bail!("index.batch_size must be > 0");
    }

    if config.search.limit < 1 {
        bail!("search.limit must be >= 1");
    }

    if config.sync.concurrency == 0 {
        bail!("sync.concurrency must be > 0");
    }

    for source in &config.discovery.sources {
        if source.name.trim().is_empty() {
            bail!("discovery.sources: name must not be empty");
        }
        if source.name.contains(':') {
            bail!(
                "discovery.sources: name '{}' must not contain ':'",
                source.name
            );
        }
    }

    Ok(config)
}
