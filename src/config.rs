/// Configuration module for newsrag.
///
/// Handles loading, validating, and providing default configuration values.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::DEFAULT_MAX_BATCH_SIZE;
use crate::embedder::onnx::MINILM_DIMENSIONS;
use crate::ingest::loader::DEFAULT_EMBED_BATCH_SIZE;
use crate::retriever::DEFAULT_N_RESULTS;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

// ── Default value functions ──────────────────────────────────────────

fn default_db_path() -> String {
    "./database/newsrag.db".to_string()
}

fn default_source_path() -> String {
    "sample_IndianFinancialNews.csv".to_string()
}

fn default_insert_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

fn default_embed_batch_size() -> usize {
    DEFAULT_EMBED_BATCH_SIZE
}

fn default_search_top_k() -> usize {
    DEFAULT_N_RESULTS
}

fn default_model_name() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_model_dir() -> String {
    "models/all-MiniLM-L6-v2".to_string()
}

fn default_dimensions() -> usize {
    MINILM_DIMENSIONS
}

fn default_generator_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_generator_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_source_path")]
    pub source_path: String,

    /// Rows per store insert; the store rejects larger batches.
    #[serde(default = "default_insert_batch_size")]
    pub insert_batch_size: usize,

    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,

    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderBackend {
    #[default]
    Onnx,
    Hash,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    #[serde(default)]
    pub backend: EmbedderBackend,

    #[serde(default = "default_model_name")]
    pub name: String,

    #[serde(default = "default_model_dir")]
    pub dir: String,

    /// Only used by the hash backend; the ONNX backend reads `hidden_size`
    /// from the model's `config.json`.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeneratorConfig {
    #[serde(default = "default_generator_model")]
    pub model: String,

    #[serde(default = "default_generator_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            source_path: default_source_path(),
            insert_batch_size: default_insert_batch_size(),
            embed_batch_size: default_embed_batch_size(),
            search_top_k: default_search_top_k(),
            model: ModelConfig::default(),
            generator: GeneratorConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: EmbedderBackend::default(),
            name: default_model_name(),
            dir: default_model_dir(),
            dimensions: default_dimensions(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: default_generator_model(),
            base_url: default_generator_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and, for the
    /// default path only, writes a template.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.insert_batch_size > 0,
            "insert_batch_size must be positive"
        );
        anyhow::ensure!(
            self.embed_batch_size > 0,
            "embed_batch_size must be positive"
        );
        anyhow::ensure!(self.search_top_k > 0, "search_top_k must be positive");
        anyhow::ensure!(
            self.model.dimensions > 0,
            "model.dimensions must be positive"
        );
        anyhow::ensure!(!self.db_path.is_empty(), "db_path must be set");
        anyhow::ensure!(
            self.generator.timeout_secs > 0,
            "generator.timeout_secs must be positive"
        );
        Ok(())
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.db_path)
    }

    #[must_use]
    pub fn source_path(&self) -> PathBuf {
        PathBuf::from(&self.source_path)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.insert_batch_size, 5000);
        assert_eq!(config.embed_batch_size, 32);
        assert_eq!(config.search_top_k, 5);
        assert_eq!(config.model.backend, EmbedderBackend::Onnx);
        assert_eq!(config.model.name, "all-MiniLM-L6-v2");
        assert_eq!(config.model.dimensions, 384);
        assert_eq!(config.generator.model, "gemini-2.5-flash");
        assert_eq!(config.generator.api_key_env, "GEMINI_API_KEY");
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{"insert_batch_size": 1000, "db_path": "./test.db", "model": {"backend": "hash"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.insert_batch_size, 1000);
        assert_eq!(config.db_path, "./test.db");
        assert_eq!(config.model.backend, EmbedderBackend::Hash);
        // Other fields should have defaults
        assert_eq!(config.search_top_k, 5);
        assert_eq!(config.model.dimensions, 384);
        assert_eq!(config.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn test_load_file_and_invalid_json() {
        let dir = tempdir().unwrap();

        let good = dir.path().join("good.json");
        std::fs::write(&good, r#"{"search_top_k": 9}"#).unwrap();
        let config = Config::load(good.to_str().unwrap()).unwrap();
        assert_eq!(config.search_top_k, 9);

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        let config = Config::load(bad.to_str().unwrap()).unwrap();
        assert_eq!(config.search_top_k, 5);
    }

    #[test]
    fn test_load_missing_non_default_path_does_not_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.search_top_k, 5);
        assert!(!path.exists());
    }

    #[test]
    fn test_validate_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_bad_sizes() {
        let mut config = Config::default();
        config.insert_batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.embed_batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.search_top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.insert_batch_size, config.insert_batch_size);
        assert_eq!(parsed.db_path, config.db_path);
        assert_eq!(parsed.model.name, config.model.name);
        assert_eq!(parsed.model.backend, config.model.backend);
    }
}
