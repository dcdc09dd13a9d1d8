//! # histdex
//!
//! A local-first aggregator for browsing history.
//!
//! histdex reads the history databases of every installed browser
//! (Chromium family, Firefox, Safari), merges them into one deduplicated
//! SQLite store, and keeps a full-text index over it for fast search from
//! the CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────┐   ┌──────────┐
//! │  Registry   │──▶│ Extractors  │──▶│   Sync   │──▶│  Store   │
//! │ (discover)  │   │ per browser │   │  Driver  │   │ (SQLite) │
//! └─────────────┘   └─────────────┘   └──────────┘   └────┬─────┘
//!                                                         │
//!                       ┌──────────┐   ┌──────────┐       │
//!            query ────▶│  Search  │◀──│  Index   │◀──────┤ Indexer
//!                       │ Gateway  │   │  (FTS5)  │       │
//!                       └────┬─────┘   └──────────┘       │
//!                            └──── hydrate by url_id ◀────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! histdex init                 # create store and index
//! histdex sources              # show which browsers were found
//! histdex sync                 # import new history, then index it
//! histdex search "rust async"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`normalize`] | URL identity (`url_id`) |
//! | [`models`] | Core data types |
//! | [`error`] | Error kinds |
//! | [`extractor`] | Extractor trait, source handles, timestamp conversion |
//! | [`extractor_chromium`] | Chrome, Chromium, Brave, Vivaldi, Edge |
//! | [`extractor_firefox`] | Firefox |
//! | [`extractor_safari`] | Safari |
//! | [`registry`] | Discovery of history databases |
//! | [`store`] | Unified, deduplicated history store |
//! | [`sync`] | Full and incremental imports |
//! | [`index`] | Document index abstraction |
//! | [`index_fts`] | SQLite FTS5 document index |
//! | [`indexer`] | Store → index |
//! | [`search`] | Search gateway |
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod error;
pub mod extractor;
pub mod extractor_chromium;
pub mod extractor_firefox;
pub mod extractor_safari;
pub mod index;
pub mod index_fts;
pub mod indexer;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod registry;
pub mod search;
pub mod sources;
pub mod stats;
pub mod store;
pub mod sync;
pub mod sync_cmd;
