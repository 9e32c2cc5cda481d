/// ONNX Runtime embedder using the `ort` crate.
///
/// Loads an all-MiniLM-L6-v2 ONNX export, runs padded batch inference,
/// applies mean pooling with the attention mask and L2-normalizes each row.
use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use serde::Deserialize;
use tracing::{debug, info};

use super::tokenizer::{TokenizerOutput, WordPieceTokenizer};
use super::{Embedder, EmbedderError, l2_normalize};

/// all-MiniLM-L6-v2 hidden size.
pub const MINILM_DIMENSIONS: usize = 384;

/// The part of a Hugging Face `config.json` the embedder needs.
#[derive(Debug, Deserialize)]
struct TransformerConfig {
    hidden_size: usize,
}

/// Read the embedding width from the `config.json` shipped with the model.
pub fn hidden_size(model_dir: &Path) -> Result<usize, EmbedderError> {
    let path = model_dir.join("config.json");
    let data = std::fs::read_to_string(&path).map_err(|e| {
        EmbedderError::ModelLoadFailed(format!("cannot read {}: {e}", path.display()))
    })?;
    let config: TransformerConfig = serde_json::from_str(&data).map_err(|e| {
        EmbedderError::ModelLoadFailed(format!("invalid {}: {e}", path.display()))
    })?;

    if config.hidden_size == 0 {
        return Err(EmbedderError::ModelLoadFailed(format!(
            "{} declares hidden_size 0",
            path.display()
        )));
    }
    Ok(config.hidden_size)
}

/// ONNX-backed embedder implementing the `Embedder` trait.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: WordPieceTokenizer,
    dimensions: usize,
    model_name: String,
}

impl OnnxEmbedder {
    /// Create a new `OnnxEmbedder` by loading a model from the given directory.
    ///
    /// Expects `model.onnx`, `tokenizer.json` and `config.json` in
    /// `model_dir`. One short inference runs before returning, so a model
    /// whose output width disagrees with `config.json` fails here.
    pub fn new(model_dir: &Path, model_name: &str) -> Result<Self, EmbedderError> {
        let model_path = model_dir.join("model.onnx");

        if !model_path.exists() {
            return Err(EmbedderError::ModelLoadFailed(format!(
                "model.onnx not found in {}",
                model_dir.display()
            )));
        }

        let dimensions = hidden_size(model_dir)?;

        info!("Initializing ONNX Runtime...");

        let session = Session::builder()
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("session builder error: {e}")))?
            .with_intra_threads(4)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("thread config error: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("model load error: {e}")))?;

        let tokenizer = WordPieceTokenizer::from_model_dir(model_dir)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("tokenizer error: {e}")))?;

        let embedder = Self {
            session: Mutex::new(session),
            tokenizer,
            dimensions,
            model_name: model_name.to_string(),
        };
        embedder
            .embed("warm up")
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("self-check failed: {e}")))?;

        info!(
            "Loaded {model_name} ({dimensions} dimensions, vocab size: {}, max tokens: {})",
            embedder.tokenizer.vocab_size(),
            embedder.tokenizer.max_length()
        );

        Ok(embedder)
    }

    /// Run one inference over already padded rows.
    fn infer(&self, rows: &[TokenizerOutput]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let batch = rows.len();
        let seq_len = rows[0].input_ids.len();
        if rows.iter().any(|r| r.input_ids.len() != seq_len) {
            return Err(EmbedderError::TokenizerError(
                "batch rows are not padded to a common length".to_string(),
            ));
        }

        let mut input_ids = Vec::with_capacity(batch * seq_len);
        let mut attention_mask = Vec::with_capacity(batch * seq_len);
        let mut token_type_ids = Vec::with_capacity(batch * seq_len);
        for row in rows {
            input_ids.extend_from_slice(&row.input_ids);
            attention_mask.extend_from_slice(&row.attention_mask);
            token_type_ids.extend_from_slice(&row.token_type_ids);
        }

        let input_ids_val = Tensor::from_array(([batch, seq_len], input_ids))
            .map_err(|e| EmbedderError::InferenceFailed(format!("input_ids error: {e}")))?;
        let attention_mask_val = Tensor::from_array(([batch, seq_len], attention_mask.clone()))
            .map_err(|e| EmbedderError::InferenceFailed(format!("attention_mask error: {e}")))?;
        let token_type_ids_val = Tensor::from_array(([batch, seq_len], token_type_ids))
            .map_err(|e| EmbedderError::InferenceFailed(format!("token_type_ids error: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedderError::InferenceFailed(format!("lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_val,
                "attention_mask" => attention_mask_val,
                "token_type_ids" => token_type_ids_val,
            ])
            .map_err(|e| EmbedderError::InferenceFailed(format!("inference failed: {e}")))?;

        // last_hidden_state: [batch, seq_len, hidden]
        let (_shape, hidden_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("output extraction: {e}")))?;

        let expected = batch * seq_len * self.dimensions;
        if hidden_data.len() != expected {
            return Err(EmbedderError::InferenceFailed(format!(
                "unexpected output size {} (expected {expected})",
                hidden_data.len()
            )));
        }

        debug!("embedded batch of {batch} (seq_len {seq_len})");

        Ok(mean_pooling(
            hidden_data,
            &attention_mask,
            batch,
            seq_len,
            self.dimensions,
        )
        .into_iter()
        .map(|mut row| {
            l2_normalize(&mut row);
            row
        })
        .collect())
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let tokens = self
            .tokenizer
            .tokenize(text)
            .map_err(|e| EmbedderError::TokenizerError(e.to_string()))?;

        self.infer(std::slice::from_ref(&tokens))?
            .pop()
            .ok_or_else(|| EmbedderError::InferenceFailed("empty model output".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self
            .tokenizer
            .tokenize_batch(texts)
            .map_err(|e| EmbedderError::TokenizerError(e.to_string()))?;

        self.infer(&rows)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Mean pooling over hidden states weighted by attention mask.
///
/// `hidden_data` is a flat array with shape `[batch, seq_len, hidden_size]`
/// and `attention_mask` is flat `[batch, seq_len]`.
fn mean_pooling(
    hidden_data: &[f32],
    attention_mask: &[i64],
    batch: usize,
    seq_len: usize,
    hidden_size: usize,
) -> Vec<Vec<f32>> {
    (0..batch)
        .map(|b| {
            let mut result = vec![0.0f32; hidden_size];
            let mut mask_sum: f32 = 0.0;

            for t in 0..seq_len {
                let mask = attention_mask[b * seq_len + t] as f32;
                if mask == 0.0 {
                    continue;
                }
                mask_sum += mask;

                let offset = (b * seq_len + t) * hidden_size;
                for (h, acc) in result.iter_mut().enumerate() {
                    *acc += hidden_data[offset + h] * mask;
                }
            }

            if mask_sum > 0.0 {
                for v in &mut result {
                    *v /= mask_sum;
                }
            }
            result
        })
        .collect()
}
