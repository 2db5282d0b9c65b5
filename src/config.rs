//! Session configuration
//!
//! Everything here has a default so the browser side can pass `{}` (or
//! nothing) and override only what it cares about.

use serde::{Deserialize, Serialize};

use crate::embeddings::PoolingStrategy;
use crate::generation::SamplingParams;

/// Default number of passages retrieved per question
pub const DEFAULT_TOP_K: usize = 5;
/// Upper bound for user-selected top-k
pub const MAX_TOP_K: usize = 10;

/// Chat models tried in order when the runtime does not narrow the list
pub const DEFAULT_CANDIDATE_MODELS: &[&str] = &[
    "Llama-3.2-1B-Instruct-q4f16_1-MLC",
    "Qwen2.5-1.5B-Instruct-q4f16_1-MLC",
    "Phi-3.5-mini-instruct-q4f16_1-MLC",
];

/// Top-level configuration for a [`crate::RagSession`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RagConfig {
    /// Where the index JSON is fetched from (relative to the page)
    pub index_url: String,

    /// Top-k used when the caller gives nothing usable
    pub default_top_k: usize,

    /// Top-k ceiling, itself capped at [`MAX_TOP_K`]
    pub max_top_k: usize,

    /// Sampling temperature for generation
    pub temperature: f32,

    /// Maximum generated tokens
    pub max_tokens: u32,

    /// Chat model identifiers, in preference order
    pub candidate_models: Vec<String>,

    /// Embedding model identifier (informational, checked against index metadata)
    pub embedding_model: String,

    /// Pooling requested from the embedding runtime
    pub pooling: PoolingStrategy,

    /// Whether the embedding runtime should L2-normalize
    pub normalize: bool,

    /// Passage text is truncated to this many characters when rendered
    pub snippet_chars: usize,

    /// Ask the generation runtime to run inside a web worker
    pub use_web_worker: bool,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            index_url: "index.json".to_string(),
            default_top_k: DEFAULT_TOP_K,
            max_top_k: MAX_TOP_K,
            temperature: 0.2,
            max_tokens: 512,
            candidate_models: DEFAULT_CANDIDATE_MODELS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            embedding_model: "Xenova/all-MiniLM-L6-v2".to_string(),
            pooling: PoolingStrategy::Mean,
            normalize: true,
            snippet_chars: 600,
            use_web_worker: false,
        }
    }
}

impl RagConfig {
    /// Builder: set index location
    pub fn with_index_url(mut self, url: impl Into<String>) -> Self {
        self.index_url = url.into();
        self
    }

    /// Builder: replace candidate models
    pub fn with_candidates<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.candidate_models = models.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set default top-k
    pub fn with_default_top_k(mut self, k: usize) -> Self {
        self.default_top_k = k;
        self
    }

    /// Builder: lower the top-k ceiling
    pub fn with_max_top_k(mut self, k: usize) -> Self {
        self.max_top_k = k;
        self
    }

    /// Builder: set snippet length
    pub fn with_snippet_chars(mut self, chars: usize) -> Self {
        self.snippet_chars = chars;
        self
    }

    /// Sampling parameters derived from this config
    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}
