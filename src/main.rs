use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use newsrag::api::server::ApiServer;
use newsrag::config::{Config, DEFAULT_CONFIG_PATH, EmbedderBackend};
use newsrag::db::Db;
use newsrag::embedder::Embedder;
use newsrag::embedder::download::download_model_files;
use newsrag::embedder::hashing::HashEmbedder;
use newsrag::embedder::onnx::OnnxEmbedder;
use newsrag::generator::gemini::GeminiGenerator;
use newsrag::ingest::IngestError;
use newsrag::ingest::loader::IngestOutcome;
use newsrag::pipeline::RagPipeline;

#[derive(Parser)]
#[command(name = "newsrag", version, about = "Grounded Q&A over a dated news dataset")]
struct Cli {
    /// Path to the JSON config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Load the dataset if the index is empty, then serve POST /query (default)
    Serve,
    /// Load the dataset if the index is empty, then exit
    Ingest,
    /// Answer one query and print the result
    Ask { query: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve);

    info!("Starting newsrag...");

    // 1. Load config
    let config = Config::load(&cli.config)?;
    config.validate()?;

    // 2. Init embedder; a model that cannot be loaded stops startup
    let embedder = load_embedder(&config)?;

    // 3. Open store
    let db = Db::open(
        config.db_path(),
        embedder.dimensions(),
        embedder.model_name(),
    )
    .context("Failed to open document store")?
    .with_max_batch_size(config.insert_batch_size);

    // 4. Init generator
    let generator = Arc::new(GeminiGenerator::from_config(&config.generator)?);

    let pipeline = RagPipeline::new(db, embedder, generator, config.search_top_k);

    // 5. Populate once, before any query is served
    match pipeline.ensure_populated(&config.source_path(), config.embed_batch_size) {
        Ok(IngestOutcome::Skipped { existing }) => {
            info!("Skipping ingestion, index holds {existing} documents");
        }
        Ok(IngestOutcome::Loaded { documents, batches }) => {
            info!("Ingested {documents} documents in {batches} batches");
        }
        Err(IngestError::SourceNotFound(path)) if !matches!(command, Command::Ingest) => {
            warn!(
                "Source not found at {}; queries will fail until the index is populated",
                path.display()
            );
        }
        Err(e) => return Err(e).context("Ingestion failed"),
    }

    // 6. Act
    let pipeline = match command {
        Command::Ingest => Some(pipeline),
        Command::Ask { query } => {
            let answer = pipeline.answer(&query)?;
            println!("{answer}");
            Some(pipeline)
        }
        Command::Serve => serve(pipeline, &config.server.bind)?,
    };

    if let Some(pipeline) = pipeline {
        pipeline.close().context("Failed to close document store")?;
    }

    Ok(())
}

/// Run the HTTP server on a fresh runtime. Startup work above stays on the
/// main thread because the model download and generator client block.
fn serve(pipeline: RagPipeline, bind: &str) -> Result<Option<RagPipeline>> {
    let pipeline = Arc::new(pipeline);
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(ApiServer::new(pipeline.clone(), bind).start())?;
    drop(runtime);

    Ok(Arc::try_unwrap(pipeline).ok())
}

fn load_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    match config.model.backend {
        EmbedderBackend::Hash => {
            info!(
                "Using feature-hash embedder ({} dimensions)",
                config.model.dimensions
            );
            Ok(Arc::new(HashEmbedder::new(config.model.dimensions)))
        }
        EmbedderBackend::Onnx => {
            let model_dir = Path::new(&config.model.dir);
            download_model_files(&config.model.name, model_dir)
                .context("Failed to fetch embedding model")?;
            let embedder = OnnxEmbedder::new(model_dir, &config.model.name)
                .context("Failed to load embedding model")?;
            Ok(Arc::new(embedder))
        }
    }
}
