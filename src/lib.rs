//! Ingestion of lichess PGN archives into tabular stores.
//!
//! Each source file is one shard: its games are streamed through the header
//! extractor and movetext parser, replayed on a board to add SAN/UCI/FEN, and
//! flushed in batches to per-shard staging tables of a [`Sink`]. Shards run
//! in parallel on a rayon pool; [`merge::merge_all`] later consolidates the
//! header shards of each variant/month into one deduplicated table. Month
//! archives are cut into shard files with [`split::split_file`].

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

pub mod annotation;
pub mod batch;
pub mod board;
pub mod config;
mod error;
pub mod eval;
pub mod header;
pub mod merge;
pub mod movetext;
pub mod naming;
pub mod pipeline;
pub mod reader;
pub mod record;
pub mod schema;
pub mod sink;
pub mod split;
pub mod tokenizer;

pub use config::{AppConfig, IngestConfig, SplitConfig};
pub use error::{Error, Result};
pub use naming::ShardTarget;
pub use pipeline::{IngestSummary, ShardIngest};
pub use sink::{FileSink, MemorySink, Sink, SqliteSink};

use schema::SchemaRegistry;

/// Outcome of one source file in a parallel run.
#[derive(Debug)]
pub struct ShardReport {
    pub path: PathBuf,
    pub result: Result<IngestSummary>,
}

/// Ingest one archive file. The shard's variant, month and shard number come
/// from the file name.
pub fn ingest_file<S: Sink + ?Sized>(path: &Path, sink: &S, config: &IngestConfig) -> Result<IngestSummary> {
    let target = ShardTarget::from_path(path)?;
    let mut ingest = ShardIngest::new(sink, target, config);

    if config.prescan_headers {
        let mut registry = SchemaRegistry::new();
        let added = registry.prescan(BufReader::new(File::open(path)?))?;
        tracing::debug!(path = %path.display(), added, "pre-scanned header keys");
        ingest = ingest.with_registry(registry);
    }

    ingest.ingest_reader(BufReader::new(File::open(path)?))?;
    ingest.finish()
}

/// Ingest several archive files in parallel, one task per file.
///
/// A failing shard does not stop the others; each file's result is reported
/// separately. Only failing to start the pool is an error for the whole run.
pub fn ingest_files<S: Sink + ?Sized>(
    paths: &[PathBuf],
    sink: &S,
    config: &IngestConfig,
) -> Result<Vec<ShardReport>> {
    let num_threads = config.threads.unwrap_or_else(num_cpus::get);
    let thread_pool = ThreadPoolBuilder::new().num_threads(num_threads).build()?;

    Ok(thread_pool.install(|| {
        paths
            .par_iter()
            .map(|path| {
                let result = ingest_file(path, sink, config);
                if let Err(e) = &result {
                    tracing::error!(path = %path.display(), "shard failed: {e}");
                }
                ShardReport {
                    path: path.clone(),
                    result,
                }
            })
            .collect()
    }))
}
