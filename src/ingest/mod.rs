//! Ingestion: tabular records → embedded documents in the store.
pub mod loader;
pub mod source;

use std::path::PathBuf;

use thiserror::Error;

use crate::db::StoreError;
use crate::embedder::EmbedderError;

/// Columns every source must carry (exact, case-sensitive).
pub const REQUIRED_COLUMNS: [&str; 3] = ["Date", "Title", "Description"];

/// Errors that abort an ingestion run. None of them leave a partially
/// populated store behind: `Capacity` names the failed chunk after the
/// chunks before it have been cleared.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("source file not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("failed to read source: {0}")]
    Source(String),

    #[error("source must contain '{0}' column")]
    MissingColumn(String),

    #[error("row {row}: cannot parse date '{value}'")]
    InvalidDate { row: usize, value: String },

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedderError),

    #[error("embedder returned {actual} vectors for {expected} documents")]
    EmbeddingCount { expected: usize, actual: usize },

    #[error("insert of batch {batch}/{batches} failed: {source}")]
    Capacity {
        batch: usize,
        batches: usize,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<csv::Error> for IngestError {
    fn from(e: csv::Error) -> Self {
        IngestError::Source(e.to_string())
    }
}

impl From<calamine::Error> for IngestError {
    fn from(e: calamine::Error) -> Self {
        IngestError::Source(e.to_string())
    }
}
