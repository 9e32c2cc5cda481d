use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use super::IngestError;
use super::source::{self, Record};
use crate::db::VectorStore;
use crate::db::models::{Document, DocumentMetadata};
use crate::embedder::Embedder;

/// Texts handed to the embedder per call.
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 32;

#[derive(Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The store already held documents; nothing was read or written.
    Skipped { existing: usize },
    Loaded { documents: usize, batches: usize },
}

/// Text that gets embedded for a record.
#[must_use]
pub fn document_text(title: &str, description: &str) -> String {
    format!("Title: {title}\nDescription: {description}")
}

/// Sort records by date (stable for equal dates) and turn them into
/// documents with positional `doc_<n>` ids.
///
/// Ids follow the sorted position, so adding or removing source rows shifts
/// the id of every later record.
#[must_use]
pub fn build_documents(mut records: Vec<Record>) -> Vec<Document> {
    records.sort_by_key(|r| r.date);

    records
        .into_iter()
        .enumerate()
        .map(|(i, r)| Document {
            id: format!("doc_{i}"),
            text: document_text(&r.title, &r.description),
            metadata: DocumentMetadata {
                date: r.date.format("%Y-%m-%d").to_string(),
                title: r.title,
                description: r.description,
            },
        })
        .collect()
}

/// Populates a store from a tabular source exactly once.
pub struct Ingestor<'a, S: VectorStore + ?Sized, E: Embedder + ?Sized> {
    store: &'a mut S,
    embedder: &'a E,
    embed_batch_size: usize,
}

impl<'a, S: VectorStore + ?Sized, E: Embedder + ?Sized> Ingestor<'a, S, E> {
    pub fn new(store: &'a mut S, embedder: &'a E) -> Self {
        Self {
            store,
            embedder,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
        }
    }

    #[must_use]
    pub fn with_embed_batch_size(mut self, embed_batch_size: usize) -> Self {
        self.embed_batch_size = embed_batch_size.max(1);
        self
    }

    /// Load `source` only if the store is not already fully loaded.
    ///
    /// A completed load is trusted as-is: no diffing, no upserts. Documents
    /// left by a load that never reached its last batch are cleared and the
    /// source is read again.
    pub fn ensure_populated(&mut self, source: &Path) -> Result<IngestOutcome, IngestError> {
        let existing = self.store.count()?;
        let complete = self.store.is_load_complete()?;
        if existing > 0 && complete {
            info!("Document store already loaded with {existing} entries");
            return Ok(IngestOutcome::Skipped { existing });
        }

        if existing > 0 {
            warn!("Discarding {existing} documents from an unfinished load");
            self.store.clear()?;
        }

        info!("Document store empty. Loading {}", source.display());
        let records = source::read_records(source)?;
        self.load(records)
    }

    /// Embed and insert `records` unconditionally.
    pub fn load(&mut self, records: Vec<Record>) -> Result<IngestOutcome, IngestError> {
        let documents = build_documents(records);
        if documents.is_empty() {
            warn!("Source contained no records, store left empty");
            return Ok(IngestOutcome::Loaded {
                documents: 0,
                batches: 0,
            });
        }

        let total = documents.len();
        let mut ids = Vec::with_capacity(total);
        let mut texts = Vec::with_capacity(total);
        let mut metadatas = Vec::with_capacity(total);
        for doc in documents {
            ids.push(doc.id);
            texts.push(doc.text);
            metadatas.push(doc.metadata);
        }

        let embeddings = self.embed_all(&texts)?;
        let batches = self.insert_chunked(&ids, &texts, &metadatas, &embeddings)?;
        self.store.mark_load_complete()?;

        info!("Successfully loaded {total} documents into the store");
        Ok(IngestOutcome::Loaded {
            documents: total,
            batches,
        })
    }

    /// Embed every text, feeding the embedder `embed_batch_size` at a time.
    fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        info!("Encoding {} embeddings...", texts.len());

        let pb = ProgressBar::new(texts.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} embedded ({eta})")
        {
            pb.set_style(style);
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for group in texts.chunks(self.embed_batch_size) {
            let refs: Vec<&str> = group.iter().map(String::as_str).collect();
            let vectors = self.embedder.embed_batch(&refs)?;
            if vectors.len() != refs.len() {
                return Err(IngestError::EmbeddingCount {
                    expected: refs.len(),
                    actual: vectors.len(),
                });
            }
            embeddings.extend(vectors);
            pb.inc(group.len() as u64);
        }
        pb.finish_and_clear();

        Ok(embeddings)
    }

    /// Insert in ascending chunks of the store's batch limit. The first
    /// failing chunk aborts the rest and clears the chunks already added.
    fn insert_chunked(
        &mut self,
        ids: &[String],
        texts: &[String],
        metadatas: &[DocumentMetadata],
        embeddings: &[Vec<f32>],
    ) -> Result<usize, IngestError> {
        let total = ids.len();
        let chunk_size = self.store.max_batch_size().max(1);
        let batches = total.div_ceil(chunk_size);

        for batch in 0..batches {
            let start = batch * chunk_size;
            let end = (start + chunk_size).min(total);

            if let Err(e) = self.store.add(
                &ids[start..end],
                &texts[start..end],
                &metadatas[start..end],
                &embeddings[start..end],
            ) {
                error!("Batch {}/{batches} failed: {e}", batch + 1);
                if batch > 0 {
                    if let Err(clear_err) = self.store.clear() {
                        error!("Failed to clear partially loaded store: {clear_err}");
                    }
                }
                return Err(IngestError::Capacity {
                    batch: batch + 1,
                    batches,
                    source: e,
                });
            }
            info!("Inserted batch {}/{batches} ({end} / {total} docs)", batch + 1);
        }

        Ok(batches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::SearchHit;
    use crate::db::{Db, StoreError};
    use crate::embedder::hashing::HashEmbedder;
    use chrono::NaiveDate;

    fn record(date: &str, title: &str) -> Record {
        Record {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            title: title.to_string(),
            description: format!("{title} description"),
        }
    }

    /// Store double that records batch sizes and can fail a given batch.
    struct RecordingStore {
        rows: usize,
        max: usize,
        fail_on: Option<usize>,
        batches: Vec<usize>,
        complete: bool,
        clears: usize,
    }

    impl RecordingStore {
        fn new(max: usize) -> Self {
            Self {
                rows: 0,
                max,
                fail_on: None,
                batches: Vec::new(),
                complete: false,
                clears: 0,
            }
        }
    }

    impl VectorStore for RecordingStore {
        fn count(&self) -> Result<usize, StoreError> {
            Ok(self.rows)
        }

        fn max_batch_size(&self) -> usize {
            self.max
        }

        fn add(
            &mut self,
            ids: &[String],
            _documents: &[String],
            _metadatas: &[DocumentMetadata],
            _embeddings: &[Vec<f32>],
        ) -> Result<(), StoreError> {
            if self.fail_on == Some(self.batches.len() + 1) {
                return Err(StoreError::BatchTooLarge {
                    size: ids.len(),
                    max: 0,
                });
            }
            self.batches.push(ids.len());
            self.rows += ids.len();
            Ok(())
        }

        fn query(&self, _: &[f32], _: usize) -> Result<Vec<SearchHit>, StoreError> {
            Ok(Vec::new())
        }

        fn is_load_complete(&self) -> Result<bool, StoreError> {
            Ok(self.complete)
        }

        fn mark_load_complete(&mut self) -> Result<(), StoreError> {
            self.complete = true;
            Ok(())
        }

        fn clear(&mut self) -> Result<(), StoreError> {
            self.rows = 0;
            self.complete = false;
            self.clears += 1;
            Ok(())
        }
    }

    #[test]
    fn test_build_documents_sorts_and_numbers() {
        let docs = build_documents(vec![
            record("2024-01-03", "third"),
            record("2024-01-01", "first"),
            record("2024-01-02", "second"),
        ]);

        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["doc_0", "doc_1", "doc_2"]);
        assert_eq!(docs[0].metadata.title, "first");
        assert_eq!(docs[0].metadata.date, "2024-01-01");
        assert_eq!(docs[2].metadata.title, "third");
        assert_eq!(
            docs[1].text,
            "Title: second\nDescription: second description"
        );
    }

    #[test]
    fn test_build_documents_equal_dates_keep_source_order() {
        let docs = build_documents(vec![
            record("2024-01-02", "b"),
            record("2024-01-01", "a"),
            record("2024-01-02", "c"),
        ]);
        let titles: Vec<&str> = docs.iter().map(|d| d.metadata.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_chunked_insert_counts() {
        let embedder = HashEmbedder::new(16);
        // exact multiple, remainder, smaller than one chunk
        for (n, expected_batches) in [(6usize, vec![3, 3]), (7, vec![3, 3, 1]), (2, vec![2])] {
            let mut store = RecordingStore::new(3);
            let records = (0..n)
                .map(|i| record(&format!("2024-01-{:02}", i + 1), &format!("t{i}")))
                .collect();

            let outcome = Ingestor::new(&mut store, &embedder).load(records).unwrap();

            assert_eq!(
                outcome,
                IngestOutcome::Loaded {
                    documents: n,
                    batches: expected_batches.len()
                }
            );
            assert_eq!(store.count().unwrap(), n);
            assert_eq!(store.batches, expected_batches);
            assert!(store.complete);
        }
    }

    #[test]
    fn test_chunked_insert_into_db_matches_single_insert() {
        let embedder = HashEmbedder::new(16);
        let records: Vec<Record> = (0..10)
            .map(|i| record(&format!("2024-02-{:02}", i + 1), &format!("t{i}")))
            .collect();

        let mut chunked = Db::open_in_memory(16, "test").unwrap().with_max_batch_size(4);
        let mut single = Db::open_in_memory(16, "test").unwrap();

        Ingestor::new(&mut chunked, &embedder)
            .load(records.clone())
            .unwrap();
        Ingestor::new(&mut single, &embedder).load(records).unwrap();

        assert_eq!(chunked.count().unwrap(), 10);
        assert_eq!(chunked.count().unwrap(), single.count().unwrap());
    }

    #[test]
    fn test_failed_chunk_aborts_remaining() {
        let embedder = HashEmbedder::new(16);
        let mut store = RecordingStore::new(2);
        store.fail_on = Some(2);
        let records = (0..5)
            .map(|i| record(&format!("2024-01-{:02}", i + 1), &format!("t{i}")))
            .collect();

        let err = Ingestor::new(&mut store, &embedder)
            .load(records)
            .unwrap_err();

        match err {
            IngestError::Capacity { batch, batches, .. } => {
                assert_eq!(batch, 2);
                assert_eq!(batches, 3);
            }
            other => panic!("expected Capacity, got {other:?}"),
        }
        // the first chunk landed and was then cleared, the third was never attempted
        assert_eq!(store.batches, vec![2]);
        assert_eq!(store.clears, 1);
        assert_eq!(store.count().unwrap(), 0);
        assert!(!store.complete);
    }

    #[test]
    fn test_ensure_populated_skips_non_empty_store() {
        let embedder = HashEmbedder::new(16);
        let mut store = RecordingStore::new(10);
        store.rows = 4;
        store.complete = true;

        // The source is never touched, so a missing file is fine here
        let outcome = Ingestor::new(&mut store, &embedder)
            .ensure_populated(Path::new("/nonexistent/source.csv"))
            .unwrap();

        assert_eq!(outcome, IngestOutcome::Skipped { existing: 4 });
        assert!(store.batches.is_empty());
    }

    #[test]
    fn test_ensure_populated_discards_unfinished_load() {
        let embedder = HashEmbedder::new(16);
        let mut store = RecordingStore::new(10);
        store.rows = 4;

        // no completion marker, so the leftovers never get served
        let err = Ingestor::new(&mut store, &embedder)
            .ensure_populated(Path::new("/nonexistent/source.csv"))
            .unwrap_err();
        assert!(matches!(err, IngestError::SourceNotFound(_)));
        assert_eq!(store.clears, 1);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_ensure_populated_missing_source() {
        let embedder = HashEmbedder::new(16);
        let mut store = RecordingStore::new(10);

        let err = Ingestor::new(&mut store, &embedder)
            .ensure_populated(Path::new("/nonexistent/source.csv"))
            .unwrap_err();
        assert!(matches!(err, IngestError::SourceNotFound(_)));
    }

    #[test]
    fn test_small_embed_batches_cover_everything() {
        let embedder = HashEmbedder::new(16);
        let mut store = Db::open_in_memory(16, "test").unwrap();
        let records = (0..5)
            .map(|i| record(&format!("2024-01-{:02}", i + 1), &format!("t{i}")))
            .collect();

        Ingestor::new(&mut store, &embedder)
            .with_embed_batch_size(2)
            .load(records)
            .unwrap();
        assert_eq!(store.count().unwrap(), 5);
    }
}
