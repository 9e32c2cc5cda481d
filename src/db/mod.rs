//! Vector document store using SQLite and sqlite-vec
use rusqlite::{Connection, OptionalExtension, params};
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;
use thiserror::Error;
use tracing::info;

pub mod documents;
pub mod models;
pub mod search;

use models::{DocumentMetadata, SearchHit};

/// Largest number of rows a single `add` accepts unless configured otherwise.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 5000;

/// `store_meta` key written once a load has inserted its last batch.
pub(crate) const LOAD_COMPLETE_KEY: &str = "load_complete";

const META_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS store_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

fn schema_sql(dimensions: usize) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    doc_id TEXT NOT NULL UNIQUE,
    content TEXT NOT NULL,
    date TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_date ON documents(date);

CREATE VIRTUAL TABLE IF NOT EXISTS vec_documents USING vec0(
    embedding FLOAT[{dimensions}]
);
"#
    )
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to prepare store location: {0}")]
    Io(#[from] std::io::Error),

    #[error("batch of {size} exceeds the store limit of {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("batch slices differ in length (ids {ids}, documents {documents}, metadatas {metadatas}, embeddings {embeddings})")]
    LengthMismatch {
        ids: usize,
        documents: usize,
        metadatas: usize,
        embeddings: usize,
    },

    #[error("embedding has {actual} dimensions, store expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("store was built with model '{stored}', refusing to reuse it with '{requested}'")]
    ModelMismatch { stored: String, requested: String },
}

/// Operations the ingestion pipeline and the retriever need from an index.
pub trait VectorStore {
    /// Number of stored documents.
    fn count(&self) -> Result<usize, StoreError>;

    /// Largest batch a single [`VectorStore::add`] call accepts.
    fn max_batch_size(&self) -> usize;

    /// Append one batch; it becomes visible entirely or not at all.
    fn add(
        &mut self,
        ids: &[String],
        documents: &[String],
        metadatas: &[DocumentMetadata],
        embeddings: &[Vec<f32>],
    ) -> Result<(), StoreError>;

    /// Top `n_results` documents nearest to `query_embedding`.
    fn query(&self, query_embedding: &[f32], n_results: usize)
    -> Result<Vec<SearchHit>, StoreError>;

    /// Whether the last load ran to its final batch.
    fn is_load_complete(&self) -> Result<bool, StoreError>;

    /// Record that every batch of the current load has been added.
    fn mark_load_complete(&mut self) -> Result<(), StoreError>;

    /// Remove every document and the load marker.
    fn clear(&mut self) -> Result<(), StoreError>;
}

static INIT_VEC: Once = Once::new();

/// Initialize the sqlite-vec extension. Safe to call multiple times.
fn init_sqlite_vec() {
    INIT_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// A SQLite connection holding one document collection with a fixed
/// embedding dimensionality.
pub struct Db {
    pub(crate) conn: Connection,
    dimensions: usize,
    max_batch_size: usize,
}

impl Db {
    /// Open (or create) the store at `path` for embeddings of `dimensions`
    /// produced by `model_name`. Parent directories are created as needed.
    pub fn open<P: AsRef<Path>>(
        path: P,
        dimensions: usize,
        model_name: &str,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref();
        info!("Opening document store: {}", path.display());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        init_sqlite_vec();
        let conn = Connection::open(path)?;
        Self::init(conn, dimensions, model_name)
    }

    /// Open an in-memory store (useful for testing).
    pub fn open_in_memory(dimensions: usize, model_name: &str) -> Result<Self, StoreError> {
        init_sqlite_vec();
        let conn = Connection::open_in_memory()?;
        Self::init(conn, dimensions, model_name)
    }

    fn init(conn: Connection, dimensions: usize, model_name: &str) -> Result<Self, StoreError> {
        let vec_version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        info!("sqlite-vec version: {}", vec_version);

        conn.execute_batch(META_SQL)?;

        match read_meta(&conn, "dimensions")? {
            Some(stored) if stored != dimensions.to_string() => {
                return Err(StoreError::DimensionMismatch {
                    expected: stored.parse().unwrap_or_default(),
                    actual: dimensions,
                });
            }
            Some(_) => {}
            None => write_meta(&conn, "dimensions", &dimensions.to_string())?,
        }

        match read_meta(&conn, "model")? {
            Some(stored) if stored != model_name => {
                return Err(StoreError::ModelMismatch {
                    stored,
                    requested: model_name.to_string(),
                });
            }
            Some(_) => {}
            None => write_meta(&conn, "model", model_name)?,
        }

        conn.execute_batch(&schema_sql(dimensions))?;

        Ok(Self {
            conn,
            dimensions,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        })
    }

    /// Override the per-call insert limit.
    #[must_use]
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Flush and close the underlying connection.
    pub fn close(self) -> Result<(), StoreError> {
        self.conn.close().map_err(|(_, e)| StoreError::Sqlite(e))
    }
}

fn read_meta(conn: &Connection, key: &str) -> Result<Option<String>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = ?",
            params![key],
            |row| row.get(0),
        )
        .optional()?)
}

fn write_meta(conn: &Connection, key: &str, value: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO store_meta (key, value) VALUES (?, ?)",
        params![key, value],
    )?;
    Ok(())
}

impl VectorStore for Db {
    fn count(&self) -> Result<usize, StoreError> {
        self.document_count()
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    fn add(
        &mut self,
        ids: &[String],
        documents: &[String],
        metadatas: &[DocumentMetadata],
        embeddings: &[Vec<f32>],
    ) -> Result<(), StoreError> {
        self.insert_batch(ids, documents, metadatas, embeddings)
    }

    fn query(
        &self,
        query_embedding: &[f32],
        n_results: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        self.search(query_embedding, n_results)
    }

    fn is_load_complete(&self) -> Result<bool, StoreError> {
        Ok(read_meta(&self.conn, LOAD_COMPLETE_KEY)?.is_some())
    }

    fn mark_load_complete(&mut self) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO store_meta (key, value) VALUES (?, datetime('now'))",
            params![LOAD_COMPLETE_KEY],
        )?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.clear_documents()
    }
}

/// Helper to serialize a float32 vector into bytes for vec0 virtual table
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_db_init() {
        let db = Db::open_in_memory(8, "test").expect("Failed to open in-memory DB");

        let tables: usize = db
            .conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name IN ('store_meta', 'documents', 'vec_documents');",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(tables, 3);
        assert_eq!(db.dimensions(), 8);
        assert_eq!(db.max_batch_size(), DEFAULT_MAX_BATCH_SIZE);
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("store").join("index.db");

        let db = Db::open(&path, 4, "test").unwrap();
        db.close().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_reopen_with_other_dimensions_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.db");

        Db::open(&path, 4, "test").unwrap().close().unwrap();

        match Db::open(&path, 8, "test") {
            Err(StoreError::DimensionMismatch { expected, actual }) => {
                assert_eq!(expected, 4);
                assert_eq!(actual, 8);
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("reopening with new dimensions should fail"),
        }
    }

    #[test]
    fn test_reopen_with_other_model_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.db");

        Db::open(&path, 4, "model-a").unwrap().close().unwrap();
        assert!(matches!(
            Db::open(&path, 4, "model-b"),
            Err(StoreError::ModelMismatch { .. })
        ));
    }

    #[test]
    fn test_max_batch_size_floor() {
        let db = Db::open_in_memory(4, "test").unwrap().with_max_batch_size(0);
        assert_eq!(db.max_batch_size(), 1);
    }

    #[test]
    fn test_serialize_vector() {
        let vec = vec![1.0, 2.0, -3.5];
        let bytes = serialize_vector(&vec);
        assert_eq!(bytes.len(), 12);

        // 1.0f32 in hex: 0x3f800000 -> little endian: 00 00 80 3f
        assert_eq!(&bytes[0..4], &[0x00, 0x00, 0x80, 0x3f]);
        assert_eq!(&bytes[4..8], &[0x00, 0x00, 0x00, 0x40]);
        assert_eq!(&bytes[8..12], &[0x00, 0x00, 0x60, 0xc0]);
    }
}
