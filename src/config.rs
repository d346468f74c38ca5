//! Runtime configuration, deserialised from `pgn-ingest.toml` and
//! `PGN_INGEST_*` environment variables.

use std::path::PathBuf;

use serde::Deserialize;

use crate::split::DEFAULT_GAMES_PER_SHARD;

/// Ingestion tuning for one shard run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Flush buffered move records every this many games.
    pub moves_flush_games: usize,
    /// Flush buffered headers every this many games.
    pub headers_flush_games: usize,
    /// Read each source once up front to collect every header key before
    /// ingesting it, so the first flushed batch already has every column.
    pub prescan_headers: bool,
    /// Worker threads for parallel shards. `None` uses one per CPU.
    pub threads: Option<usize>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            moves_flush_games: 50,
            headers_flush_games: 100,
            prescan_headers: true,
            threads: None,
        }
    }
}

/// Splitting month archives into shard files.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub games_per_shard: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        SplitConfig {
            games_per_shard: DEFAULT_GAMES_PER_SHARD,
        }
    }
}

/// Top-level configuration of the `pgn-ingest` binary.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ingest: IngestConfig,
    pub split: SplitConfig,
    /// SQLite database to write to.
    pub sqlite_path: Option<PathBuf>,
    /// Directory for JSONL/CSV staging files, used when no database is set.
    pub staging_dir: Option<PathBuf>,
}
