//! Error types
//!
//! One enum per concern, folded into [`RagError`] at the session level.
//! The WASM layer turns any of these into a `JsValue` string.

use thiserror::Error;

/// Index loading / building failures. All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Failed to fetch index from {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Failed to parse index JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Index contains no records")]
    Empty,

    #[error("Record {position} has embedding dimension {found}, expected {expected}")]
    DimensionMismatch {
        position: usize,
        expected: usize,
        found: usize,
    },

    #[error("Record {position} has a non-finite embedding value")]
    NonFinite { position: usize },

    #[error("Index metadata declares dimension {declared} but records have {actual}")]
    MetadataMismatch { declared: usize, actual: usize },

    #[error("Index I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Embedding failures
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("Model not loaded")]
    NotLoaded,

    #[error("Model load failed: {0}")]
    LoadFailed(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Unsupported embedding output: {0}")]
    UnsupportedOutput(String),

    #[error("Embedder returned an empty vector")]
    EmptyOutput,
}

/// Generation failures, classified by whether a reload can fix them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// The runtime dropped the model; one reload-and-retry is allowed.
    #[error("Model not loaded: {0}")]
    ModelUnloaded(String),

    #[error("{0}")]
    Fatal(String),

    #[error("No candidate models to load")]
    NoCandidates,

    #[error("All candidate models failed to load; last error: {last}")]
    AllCandidatesFailed { last: String },

    #[error("Generation engine is not loaded")]
    NotLoaded,

    #[error("Engine does not support explicit reload")]
    ReloadUnsupported,
}

impl GenerationError {
    /// Only an unloaded model is worth a reload-and-retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ModelUnloaded(_))
    }
}

/// Retrieval failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetrievalError {
    #[error("Query has dimension {query}, index has {index}")]
    DimensionMismatch { query: usize, index: usize },
}

/// Top-level error for a session operation
#[derive(Debug, Error)]
pub enum RagError {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}
