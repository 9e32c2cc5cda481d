//! Query pipeline: retrieve → assemble prompt → generate.
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex as TokioMutex;
use tracing::info;

use crate::db::{Db, StoreError};
use crate::embedder::Embedder;
use crate::generator::{GenerationError, Generator};
use crate::ingest::IngestError;
use crate::ingest::loader::{IngestOutcome, Ingestor};
use crate::prompt::build_prompt;
use crate::retriever::{RetrieveError, Retriever};

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("Database empty. Add CSV first.")]
    EmptyStore,

    #[error("retrieval failed: {0}")]
    Retrieval(RetrieveError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl From<RetrieveError> for QueryError {
    fn from(e: RetrieveError) -> Self {
        match e {
            RetrieveError::EmptyStore => QueryError::EmptyStore,
            other => QueryError::Retrieval(other),
        }
    }
}

/// Owns the store and the two model boundaries for the lifetime of the
/// process. All methods block; async callers run them on a blocking thread.
pub struct RagPipeline {
    db: TokioMutex<Db>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    top_k: usize,
}

impl RagPipeline {
    pub fn new(
        db: Db,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        top_k: usize,
    ) -> Self {
        Self {
            db: TokioMutex::new(db),
            embedder,
            generator,
            top_k: top_k.max(1),
        }
    }

    /// Populate the store from `source` unless a previous load completed.
    pub fn ensure_populated(
        &self,
        source: &Path,
        embed_batch_size: usize,
    ) -> Result<IngestOutcome, IngestError> {
        let mut db = self.db.blocking_lock();
        Ingestor::new(&mut *db, self.embedder.as_ref())
            .with_embed_batch_size(embed_batch_size)
            .ensure_populated(source)
    }

    /// Answer one query from the indexed context.
    ///
    /// A query that is empty or only whitespace is rejected with
    /// [`QueryError::EmptyQuery`] (HTTP 400) before anything is embedded.
    pub fn answer(&self, query: &str) -> Result<String, QueryError> {
        if query.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let passages = {
            let db = self.db.blocking_lock();
            Retriever::new(&*db, self.embedder.as_ref()).retrieve(query, self.top_k)?
        };
        info!("answering with {} passages", passages.len());

        let prompt = build_prompt(query, &passages);
        Ok(self.generator.generate(&prompt)?)
    }

    /// Flush and close the store.
    pub fn close(self) -> Result<(), StoreError> {
        self.db.into_inner().close()
    }
}
