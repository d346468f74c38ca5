//! Error type for `pgn_ingest`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// The board-state capability rejected a move token. Distinct from the
    /// movetext simply running out, which is never an error.
    #[error("invalid move {token:?}: {reason}")]
    InvalidMove { token: String, reason: String },

    /// A game's start position (FEN tag) could not be set up.
    #[error("invalid start position: {0}")]
    InvalidPosition(String),

    #[error("unrecognised table name: {0}")]
    TableName(String),

    #[error("unrecognised source file name: {0}")]
    SourceName(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    /// Appending a batch to the sink failed; fatal for the current shard.
    #[error("flush to {table} failed: {source}")]
    Flush {
        table: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn flush(table: &str, source: Error) -> Self {
        Error::Flush {
            table: table.to_owned(),
            source: Box::new(source),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
