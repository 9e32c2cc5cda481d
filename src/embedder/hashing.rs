/// Offline feature-hashing embedder.
///
/// Lower-cased word tokens are hashed into signed buckets and the result is
/// L2-normalized, so texts sharing words end up close under cosine distance.
/// Vectors depend on `std`'s `DefaultHasher`, so an index built with this
/// backend should be rebuilt after a toolchain upgrade.
use std::hash::{DefaultHasher, Hash, Hasher};

use super::{Embedder, EmbedderError, l2_normalize};

pub const HASH_MODEL_NAME: &str = "feature-hash";

/// Deterministic bag-of-words embedder that needs no model files.
pub struct HashEmbedder {
    pub dimensions: usize,
}

impl HashEmbedder {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        let hash = hasher.finish();

        let index = (hash % self.dimensions as u64) as usize;
        // top bit picks the sign so colliding tokens tend to cancel out
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dimensions: 384 }
    }
}

/// Split text into lower-cased alphanumeric words.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        if self.dimensions == 0 {
            return Err(EmbedderError::InferenceFailed(
                "dimensions must be positive".to_string(),
            ));
        }

        let mut embedding = vec![0.0f32; self.dimensions];
        let mut seen_token = false;
        for token in tokenize(text) {
            let (index, sign) = self.bucket(&token);
            embedding[index] += sign;
            seen_token = true;
        }

        // Texts without any word still need a non-zero direction for cosine distance.
        if !seen_token || embedding.iter().all(|v| *v == 0.0) {
            let (index, _) = self.bucket(text);
            embedding[index] = 1.0;
        }

        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        HASH_MODEL_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_hash_embed_dimensions() {
        let embedder = HashEmbedder::new(384);
        let result = embedder.embed("hello world").unwrap();
        assert_eq!(result.len(), 384);
    }

    #[test]
    fn test_hash_embed_deterministic() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("Sensex closes higher").unwrap();
        let b = embedder.embed("Sensex closes higher").unwrap();
        assert_eq!(a, b, "same input should produce same output");
    }

    #[test]
    fn test_hash_embed_case_and_punctuation_insensitive() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("RBI, repo rate!").unwrap();
        let b = embedder.embed("rbi repo rate").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_embed_shared_words_are_closer() {
        let embedder = HashEmbedder::default();
        let query = embedder.embed("inflation outlook").unwrap();
        let near = embedder.embed("inflation outlook for next quarter").unwrap();
        let far = embedder.embed("cricket final tickets sold out").unwrap();
        assert!(cosine(&query, &near) > cosine(&query, &far));
    }

    #[test]
    fn test_hash_embed_normalized() {
        let embedder = HashEmbedder::default();
        for text in ["test normalization", "", "???"] {
            let vec = embedder.embed(text).unwrap();
            let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!(
                (norm - 1.0).abs() < 0.01,
                "vector for {text:?} should be unit length, got {norm}"
            );
        }
    }

    #[test]
    fn test_hash_embed_batch_preserves_order() {
        let embedder = HashEmbedder::new(64);
        let results = embedder.embed_batch(&["a", "b", "c"]).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[1], embedder.embed("b").unwrap());
        for vec in &results {
            assert_eq!(vec.len(), 64);
        }
    }

    #[test]
    fn test_hash_embed_zero_dimensions() {
        let embedder = HashEmbedder::new(0);
        assert!(embedder.embed("anything").is_err());
    }
}
