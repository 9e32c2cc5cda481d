//! # newsrag: retrieval pipeline over dated news records
//!
//! Loads a tabular news dataset (date, title, description) into a local
//! vector index once, then answers questions by retrieving the closest
//! records, ranking them by recency and handing a grounded prompt to a
//! hosted text-generation model.
//!
//! ## Architecture
//!
//! - **[`config`]**: JSON configuration with per-field defaults
//! - **[`embedder`]**: Text embedding via ONNX Runtime (all-MiniLM-L6-v2) or feature hashing
//! - **[`db`]**: SQLite + sqlite-vec document store (count, chunk-limited add, cosine query)
//! - **[`ingest`]**: CSV/spreadsheet reading, date normalisation, idempotent chunked loading
//! - **[`retriever`]**: Similarity search with recency re-ranking
//! - **[`prompt`]**: Grounded prompt assembly
//! - **[`generator`]**: Typed text-generation boundary (Gemini client)
//! - **[`pipeline`]**: Query flow tying the above together
//! - **[`api`]**: `POST /query` over axum

pub mod api;
pub mod config;
pub mod db;
pub mod embedder;
pub mod generator;
pub mod ingest;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
