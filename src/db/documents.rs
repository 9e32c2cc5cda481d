use super::{Db, LOAD_COMPLETE_KEY, StoreError, models::DocumentMetadata, serialize_vector};
use rusqlite::params;

impl Db {
    /// Returns the number of stored documents
    pub fn document_count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Inserts one batch of documents with their vectors inside a single
    /// transaction. Nothing from the batch is visible if any row fails.
    pub fn insert_batch(
        &mut self,
        ids: &[String],
        documents: &[String],
        metadatas: &[DocumentMetadata],
        embeddings: &[Vec<f32>],
    ) -> Result<(), StoreError> {
        let size = ids.len();
        if documents.len() != size || metadatas.len() != size || embeddings.len() != size {
            return Err(StoreError::LengthMismatch {
                ids: size,
                documents: documents.len(),
                metadatas: metadatas.len(),
                embeddings: embeddings.len(),
            });
        }
        if size > self.max_batch_size {
            return Err(StoreError::BatchTooLarge {
                size,
                max: self.max_batch_size,
            });
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimensions) {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimensions,
                actual: bad.len(),
            });
        }

        let tx = self.conn.transaction()?;
        {
            let mut insert_doc = tx.prepare(
                "INSERT INTO documents (doc_id, content, date, title, description) VALUES (?, ?, ?, ?, ?)",
            )?;
            let mut insert_vec =
                tx.prepare("INSERT INTO vec_documents (rowid, embedding) VALUES (?, ?)")?;

            for i in 0..size {
                let meta = &metadatas[i];
                insert_doc.execute(params![
                    ids[i],
                    documents[i],
                    meta.date,
                    meta.title,
                    meta.description
                ])?;
                let row_id = tx.last_insert_rowid();

                insert_vec.execute(params![row_id, serialize_vector(&embeddings[i])])?;
            }
        }
        tx.commit()?;

        Ok(())
    }

    /// Deletes every document, its vector and the load marker in one
    /// transaction.
    pub fn clear_documents(&mut self) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM vec_documents", [])?;
        tx.execute("DELETE FROM documents", [])?;
        tx.execute(
            "DELETE FROM store_meta WHERE key = ?",
            params![LOAD_COMPLETE_KEY],
        )?;
        tx.commit()?;
        Ok(())
    }
}
