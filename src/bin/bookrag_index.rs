//! Offline index builder
//!
//! Reads extracted page text and writes the index JSON the browser app loads.
//!
//! ```text
//! bookrag-index pages.json --model model.onnx --tokenizer tokenizer.json -o index.json
//! ```
//!
//! `pages.json` is an array of `{ "file": "Moby_Dick.pdf", "pages": [{ "page": 1, "text": "..." }] }`.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use bookrag::embeddings::{EmbedConfig, OnnxModel};
use bookrag::{IndexBuildConfig, IndexBuilder, IndexError, OnnxEmbedder, PageDocument, RagError};
use clap::Parser;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "bookrag-index", version, about = "Build a bookrag index from page text")]
struct Args {
    /// JSON array of page documents
    pages: PathBuf,

    /// ONNX sentence-embedding model
    #[arg(long)]
    model: PathBuf,

    /// HuggingFace tokenizer.json for the model
    #[arg(long)]
    tokenizer: PathBuf,

    /// Output index file
    #[arg(short, long, default_value = "index.json")]
    out: PathBuf,

    /// Model id recorded in the index metadata
    #[arg(long, default_value = "sentence-transformers/all-MiniLM-L6-v2")]
    model_id: String,

    /// Window size in characters
    #[arg(long, default_value_t = 1200)]
    chunk_size: usize,

    /// Characters shared by consecutive windows
    #[arg(long, default_value_t = 200)]
    overlap: usize,

    #[arg(long, default_value_t = 32)]
    batch_size: usize,

    /// Log debug events
    #[arg(short, long)]
    verbose: bool,
}

fn run(args: &Args) -> Result<usize, RagError> {
    let json = fs::read_to_string(&args.pages).map_err(IndexError::from)?;
    let docs = PageDocument::list_from_json(&json)?;

    let mut builder = IndexBuilder::new(IndexBuildConfig {
        model: args.model_id.clone(),
        chunk_size: args.chunk_size,
        chunk_overlap: args.overlap,
        batch_size: args.batch_size,
    });
    for doc in docs {
        let file = doc.file.clone();
        let chunks = builder.add_page_document(doc);
        info!(file = %file, chunks, "queued");
    }

    let embed_config = OnnxModel::from_id(&args.model_id)
        .map(EmbedConfig::for_model)
        .unwrap_or_default()
        .with_batch_size(args.batch_size);
    let model_bytes = fs::read(&args.model).map_err(IndexError::from)?;
    let tokenizer_json = fs::read_to_string(&args.tokenizer).map_err(IndexError::from)?;
    let embedder = OnnxEmbedder::from_bytes(&model_bytes, &tokenizer_json, embed_config)?;

    let file = futures::executor::block_on(builder.build(&embedder))?;
    file.write_to(&args.out)?;
    Ok(file.records.len())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    match run(&args) {
        Ok(records) => {
            info!(records, out = %args.out.display(), "index written");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
