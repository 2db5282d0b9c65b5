// bookrag/src/embeddings/mod.rs
//
// Query embedding. The session only sees the `Embedder` capability:
// text in, fixed-length normalized vector out. Two backings exist:
// - OnnxEmbedder: pure-Rust tract inference (all-MiniLM-L6-v2 by default)
// - wasm::JsEmbedder: a JS pipeline function (transformers.js style)

pub mod config;
pub mod model;
pub mod output;
pub mod tokenize;

pub use config::{EmbedConfig, OnnxModel, PoolingStrategy};
pub use model::OnnxEmbedder;
pub use output::EmbeddingOutput;

use serde::{Deserialize, Serialize};

use crate::error::EmbedError;

/// Options forwarded to an embedding runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedOptions {
    pub pooling: PoolingStrategy,
    pub normalize: bool,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            pooling: PoolingStrategy::Mean,
            normalize: true,
        }
    }
}

/// Text → vector capability
#[allow(async_fn_in_trait)]
pub trait Embedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Output dimension, when known before the first call
    fn dimensions(&self) -> Option<usize> {
        None
    }
}

/// Scale a vector to unit length in place (zero vectors are left alone)
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}
