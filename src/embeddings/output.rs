//! Embedding runtime output shapes
//!
//! JS runtimes hand back either a plain numeric array or a tensor-like
//! object carrying the numbers under `data`. Both collapse to `Vec<f32>`.

use serde::Deserialize;

use crate::error::EmbedError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingOutput {
    /// `[0.1, 0.2, ...]`
    Vector(Vec<f32>),
    /// `[[0.1, 0.2, ...]]` (a batch of one)
    Nested(Vec<Vec<f32>>),
    /// `{ data: [...], dims: [1, d] }`
    Tensor {
        data: Vec<f32>,
        #[serde(default)]
        dims: Vec<usize>,
    },
}

impl EmbeddingOutput {
    pub fn into_vector(self) -> Result<Vec<f32>, EmbedError> {
        let vector = match self {
            Self::Vector(v) => v,
            Self::Nested(mut rows) => {
                if rows.len() != 1 {
                    return Err(EmbedError::UnsupportedOutput(format!(
                        "expected a single row, got {}",
                        rows.len()
                    )));
                }
                rows.swap_remove(0)
            }
            Self::Tensor { data, dims } => {
                if !dims.is_empty() && dims.iter().product::<usize>() != data.len() {
                    return Err(EmbedError::Shape(format!(
                        "dims {:?} do not match {} values",
                        dims,
                        data.len()
                    )));
                }
                data
            }
        };

        if vector.is_empty() {
            return Err(EmbedError::EmptyOutput);
        }
        Ok(vector)
    }
}
