/// WordPiece tokenizer wrapper around the HuggingFace `tokenizers` crate.
///
/// Produces padded id/mask/type-id rows ready to be stacked into ONNX input
/// tensors.
use std::path::Path;

use anyhow::Result;
use tokenizers::{Encoding, PaddingParams, Tokenizer, TruncationParams};

/// MiniLM sentence-transformers were trained with 256-token windows.
const MAX_SEQ_LENGTH: usize = 256;

pub struct WordPieceTokenizer {
    inner: Tokenizer,
    max_length: usize,
}

/// Output of a tokenization operation.
#[derive(Debug, Clone)]
pub struct TokenizerOutput {
    /// Token IDs (input_ids for the model).
    pub input_ids: Vec<i64>,
    /// Attention mask (1 for real tokens, 0 for padding).
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
}

impl From<&Encoding> for TokenizerOutput {
    fn from(enc: &Encoding) -> Self {
        let widen = |xs: &[u32]| xs.iter().map(|&x| i64::from(x)).collect::<Vec<i64>>();
        Self {
            input_ids: widen(enc.get_ids()),
            attention_mask: widen(enc.get_attention_mask()),
            token_type_ids: widen(enc.get_type_ids()),
        }
    }
}

impl WordPieceTokenizer {
    /// Load a tokenizer from a `tokenizer.json` file in the model directory.
    pub fn from_model_dir(model_dir: &Path) -> Result<Self> {
        let tokenizer_path = model_dir.join("tokenizer.json");

        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer.json not found in {}",
            model_dir.display()
        );

        let mut inner = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;

        inner
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQ_LENGTH,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to configure truncation: {e}"))?;

        // Default strategy pads each batch to its longest member
        inner.with_padding(Some(PaddingParams::default()));

        Ok(Self {
            inner,
            max_length: MAX_SEQ_LENGTH,
        })
    }

    /// Tokenize a single text.
    pub fn tokenize(&self, text: &str) -> Result<TokenizerOutput> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("failed to encode text: {e}"))?;

        Ok(TokenizerOutput::from(&encoding))
    }

    /// Tokenize multiple texts; every row is padded to the same length.
    pub fn tokenize_batch(&self, texts: &[&str]) -> Result<Vec<TokenizerOutput>> {
        let encodings = self
            .inner
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("failed to encode batch: {e}"))?;

        Ok(encodings.iter().map(TokenizerOutput::from).collect())
    }

    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(false)
    }

    #[must_use]
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}
