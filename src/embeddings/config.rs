// bookrag/src/embeddings/config.rs
//
// Configuration types for the query embedder

use serde::{Deserialize, Serialize};
use std::fmt;

use super::EmbedOptions;

/// Sentence-embedding models the index is expected to be built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OnnxModel {
    /// sentence-transformers/all-MiniLM-L6-v2 - 384 dimensions, what the book indexer uses
    #[default]
    #[serde(rename = "all-minilm-l6-v2")]
    AllMiniLML6V2,

    /// BAAI/bge-small-en-v1.5 - 384 dimensions
    #[serde(rename = "bge-small-en-v1.5")]
    BGESmallENV15,
}

impl fmt::Display for OnnxModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hf_model_id())
    }
}

impl OnnxModel {
    pub fn dimensions(&self) -> usize {
        match self {
            Self::AllMiniLML6V2 => 384,
            Self::BGESmallENV15 => 384,
        }
    }

    /// Maximum sequence length; longer questions are truncated
    pub fn max_length(&self) -> usize {
        match self {
            Self::AllMiniLML6V2 => 256,
            Self::BGESmallENV15 => 512,
        }
    }

    /// Pooling the model was trained with
    pub fn default_pooling(&self) -> PoolingStrategy {
        match self {
            Self::AllMiniLML6V2 => PoolingStrategy::Mean,
            Self::BGESmallENV15 => PoolingStrategy::Cls,
        }
    }

    pub fn hf_model_id(&self) -> &'static str {
        match self {
            Self::AllMiniLML6V2 => "sentence-transformers/all-MiniLM-L6-v2",
            Self::BGESmallENV15 => "BAAI/bge-small-en-v1.5",
        }
    }

    /// Resolve a loose identifier (`Xenova/all-MiniLM-L6-v2`, `bge-small`, ...)
    pub fn from_id(id: &str) -> Option<Self> {
        let id = id.to_ascii_lowercase();
        let name = id.rsplit('/').next().unwrap_or(id.as_str());
        match name {
            "all-minilm-l6-v2" => Some(Self::AllMiniLML6V2),
            "bge-small" | "bge-small-en-v1.5" => Some(Self::BGESmallENV15),
            _ => None,
        }
    }
}

/// Pooling strategy for converting token embeddings to a sentence embedding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PoolingStrategy {
    /// Mean over attended tokens
    #[default]
    Mean,

    /// [CLS] token embedding
    Cls,

    /// Max over attended tokens
    Max,
}

impl PoolingStrategy {
    /// Name used by JS embedding runtimes
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Cls => "cls",
            Self::Max => "max",
        }
    }
}

/// Query embedder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedConfig {
    pub model: OnnxModel,

    /// Batch size when embedding many texts (indexing)
    pub batch_size: usize,

    pub pooling: PoolingStrategy,

    /// L2-normalize outputs; required for dot product to equal cosine similarity
    pub normalize: bool,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self::for_model(OnnxModel::default())
    }
}

impl EmbedConfig {
    /// Settings matching how `model` embeds passages at index time
    pub fn for_model(model: OnnxModel) -> Self {
        Self {
            model,
            batch_size: 32,
            pooling: model.default_pooling(),
            normalize: true,
        }
    }

    /// Config for the model named in an index's metadata, if it is a known one
    pub fn for_index_model(id: Option<&str>) -> Option<Self> {
        id.and_then(OnnxModel::from_id).map(Self::for_model)
    }

    /// The same settings in the form JS runtimes take
    pub fn options(&self) -> EmbedOptions {
        EmbedOptions {
            pooling: self.pooling,
            normalize: self.normalize,
        }
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_pooling(mut self, pooling: PoolingStrategy) -> Self {
        self.pooling = pooling;
        self
    }
}
