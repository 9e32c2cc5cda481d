use super::{
    Db, StoreError,
    models::{DocumentMetadata, SearchHit},
    serialize_vector,
};
use rusqlite::params;

fn map_search_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SearchHit> {
    Ok(SearchHit {
        id: row.get(0)?,
        text: row.get(1)?,
        metadata: DocumentMetadata {
            date: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
        },
        distance: row.get(5)?,
    })
}

impl Db {
    /// Nearest documents by cosine distance. Equal distances keep insertion
    /// order so repeated queries return identical results.
    pub fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>, StoreError> {
        if query_vector.len() != self.dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimensions,
                actual: query_vector.len(),
            });
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                d.doc_id,
                d.content,
                d.date,
                d.title,
                d.description,
                vec_distance_cosine(v.embedding, ?) AS distance
            FROM vec_documents v
            JOIN documents d ON v.rowid = d.id
            ORDER BY distance ASC, d.id ASC
            LIMIT ?
            "#,
        )?;
        let rows = stmt.query_map(
            params![serialize_vector(query_vector), top_k as i64],
            map_search_row,
        )?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::VectorStore;

    fn unit(dims: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; dims];
        v[hot] = 1.0;
        v
    }

    fn insert(db: &mut Db, id: &str, date: &str, embedding: Vec<f32>) {
        db.add(
            &[id.to_string()],
            &[format!("Title: {id}\nDescription: body")],
            &[DocumentMetadata {
                date: date.to_string(),
                title: id.to_string(),
                description: "body".to_string(),
            }],
            &[embedding],
        )
        .unwrap();
    }

    #[test]
    fn test_search_nearest_first() {
        let mut db = Db::open_in_memory(4, "test").unwrap();
        insert(&mut db, "doc_0", "2024-01-01", unit(4, 0));
        insert(&mut db, "doc_1", "2024-01-02", unit(4, 1));
        insert(&mut db, "doc_2", "2024-01-03", vec![0.9, 0.1, 0.0, 0.0]);

        let results = db.query(&unit(4, 0), 5).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, "doc_0");
        assert!(results[0].distance < 1e-6);
        assert_eq!(results[1].id, "doc_2");
        assert_eq!(results[2].id, "doc_1");
        assert_eq!(results[0].metadata.date, "2024-01-01");
        assert_eq!(results[0].text, "Title: doc_0\nDescription: body");
    }

    #[test]
    fn test_search_limit() {
        let mut db = Db::open_in_memory(4, "test").unwrap();
        for i in 0..4 {
            insert(&mut db, &format!("doc_{i}"), "2024-01-01", unit(4, i));
        }

        assert_eq!(db.query(&unit(4, 2), 2).unwrap().len(), 2);
        assert!(db.query(&unit(4, 2), 0).unwrap().is_empty());
    }

    #[test]
    fn test_search_ties_follow_insertion_order() {
        let mut db = Db::open_in_memory(4, "test").unwrap();
        for i in 0..3 {
            insert(&mut db, &format!("doc_{i}"), "2024-01-01", unit(4, 1));
        }

        let ids: Vec<String> = db
            .query(&unit(4, 1), 3)
            .unwrap()
            .into_iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(ids, vec!["doc_0", "doc_1", "doc_2"]);
    }

    #[test]
    fn test_search_rejects_wrong_dimensions() {
        let db = Db::open_in_memory(4, "test").unwrap();
        assert!(matches!(
            db.query(&[1.0, 0.0], 1),
            Err(StoreError::DimensionMismatch { .. })
        ));
    }
}
