//! Similarity search followed by a recency re-rank.
use thiserror::Error;
use tracing::debug;

use crate::db::models::DocumentMetadata;
use crate::db::{StoreError, VectorStore};
use crate::embedder::{Embedder, EmbedderError};

pub const DEFAULT_N_RESULTS: usize = 5;

#[derive(Error, Debug)]
pub enum RetrieveError {
    #[error("Database empty. Add CSV first.")]
    EmptyStore,

    #[error("n_results must be at least 1")]
    InvalidLimit,

    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbedderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A retrieved document: its embedded text and metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passage {
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// Passages ordered most recent first.
pub type RetrievalResult = Vec<Passage>;

pub struct Retriever<'a, S: VectorStore + ?Sized, E: Embedder + ?Sized> {
    store: &'a S,
    embedder: &'a E,
}

impl<'a, S: VectorStore + ?Sized, E: Embedder + ?Sized> Retriever<'a, S, E> {
    pub fn new(store: &'a S, embedder: &'a E) -> Self {
        Self { store, embedder }
    }

    /// Fetch the `n_results` documents nearest to `query`, then order them
    /// by date, newest first. Documents sharing a date keep their
    /// similarity order.
    pub fn retrieve(&self, query: &str, n_results: usize) -> Result<RetrievalResult, RetrieveError> {
        if n_results == 0 {
            return Err(RetrieveError::InvalidLimit);
        }
        if self.store.count()? == 0 {
            return Err(RetrieveError::EmptyStore);
        }

        let query_vector = self.embedder.embed(query)?;
        let hits = self.store.query(&query_vector, n_results)?;
        debug!("retrieved {} candidates for query", hits.len());

        let mut passages: RetrievalResult = hits
            .into_iter()
            .map(|hit| Passage {
                text: hit.text,
                metadata: hit.metadata,
            })
            .collect();
        rank_by_recency(&mut passages);

        Ok(passages)
    }
}

/// Stable sort by ISO date, descending.
pub fn rank_by_recency(passages: &mut [Passage]) {
    passages.sort_by(|a, b| b.metadata.date.cmp(&a.metadata.date));
}
