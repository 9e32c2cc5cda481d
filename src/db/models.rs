use serde::{Deserialize, Serialize};

/// Per-document metadata stored next to the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// `YYYY-MM-DD`
    pub date: String,
    pub title: String,
    pub description: String,
}

/// A document ready to be written: id, embedding text and metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// One nearest-neighbour hit.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
    /// Cosine distance to the query vector (0 = identical direction).
    pub distance: f64,
}
