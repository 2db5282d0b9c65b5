// bookrag/src/embeddings/model.rs
//
// Pure-Rust sentence encoder via tract, used natively (index building,
// tests with a real model) and in WASM when no JS embedding runtime is wired.

use tract_onnx::prelude::tract_ndarray::{Axis, Ix3};
use tract_onnx::prelude::*;
use tracing::debug;

use super::config::{EmbedConfig, PoolingStrategy};
use super::tokenize::{pad_batch, EmbedTokenizer, TokenizedInput};
use super::{l2_normalize, Embedder};
use crate::error::EmbedError;

/// Type alias for the tract typed model
type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Loaded ONNX sentence encoder
pub struct OnnxEmbedder {
    model: TractModel,
    tokenizer: EmbedTokenizer,
    config: EmbedConfig,
    /// BERT exports take token_type_ids as a third input; some distilled ones do not
    wants_token_types: bool,
}

impl OnnxEmbedder {
    /// Load from ONNX bytes and tokenizer.json contents
    pub fn from_bytes(
        model_bytes: &[u8],
        tokenizer_json: &str,
        config: EmbedConfig,
    ) -> Result<Self, EmbedError> {
        let load_failed = |e: TractError| EmbedError::LoadFailed(e.to_string());

        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .map_err(load_failed)?
            .into_optimized()
            .map_err(load_failed)?
            .into_runnable()
            .map_err(load_failed)?;

        let wants_token_types = model.model().inputs.len() >= 3;
        let tokenizer = EmbedTokenizer::from_json(tokenizer_json, config.model.max_length())?;

        debug!(model = %config.model, wants_token_types, "onnx embedder loaded");

        Ok(Self {
            model,
            tokenizer,
            config,
            wants_token_types,
        })
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    /// Embed one text
    pub fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed_many(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or(EmbedError::EmptyOutput)
    }

    /// Embed texts in `config.batch_size` slices
    pub fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            out.extend(self.run_batch(batch)?);
        }
        Ok(out)
    }

    fn run_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let (padded, seq_len) = pad_batch(self.tokenizer.encode_batch(texts)?);

        let mut inputs: TVec<TValue> = tvec![
            build_input_tensor(&padded, seq_len, |t| &t.input_ids)?.into(),
            build_input_tensor(&padded, seq_len, |t| &t.attention_mask)?.into(),
        ];
        if self.wants_token_types {
            inputs.push(build_input_tensor(&padded, seq_len, |t| &t.token_type_ids)?.into());
        }

        let outputs = self
            .model
            .run(inputs)
            .map_err(|e| EmbedError::InferenceFailed(e.to_string()))?;

        // (batch, seq_len, hidden)
        let hidden = outputs[0]
            .to_array_view::<f32>()
            .map_err(|e| EmbedError::Shape(e.to_string()))?
            .into_dimensionality::<Ix3>()
            .map_err(|e| EmbedError::Shape(format!("expected 3D output: {e}")))?;

        let mut embeddings = Vec::with_capacity(padded.len());
        for (i, input) in padded.iter().enumerate() {
            let tokens = hidden.index_axis(Axis(0), i);
            let width = tokens.shape()[1];
            let attended = input
                .attention_mask
                .iter()
                .enumerate()
                .filter(|(_, &m)| m > 0)
                .map(|(j, _)| tokens.row(j));

            let mut embedding = match self.config.pooling {
                PoolingStrategy::Mean => {
                    let mut sum = vec![0.0f32; width];
                    let mut count = 0usize;
                    for row in attended {
                        sum.iter_mut().zip(row.iter()).for_each(|(s, v)| *s += v);
                        count += 1;
                    }
                    if count > 0 {
                        sum.iter_mut().for_each(|s| *s /= count as f32);
                    }
                    sum
                }
                PoolingStrategy::Cls => tokens.row(0).to_vec(),
                PoolingStrategy::Max => {
                    let mut max = vec![f32::NEG_INFINITY; width];
                    for row in attended {
                        max.iter_mut().zip(row.iter()).for_each(|(m, v)| *m = m.max(*v));
                    }
                    max
                }
            };

            if self.config.normalize {
                l2_normalize(&mut embedding);
            }
            embeddings.push(embedding);
        }

        Ok(embeddings)
    }
}

impl Embedder for OnnxEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed_one(text)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.embed_many(texts)
    }

    fn dimensions(&self) -> Option<usize> {
        Some(self.config.model.dimensions())
    }
}

fn build_input_tensor<F>(
    inputs: &[TokenizedInput],
    seq_len: usize,
    extractor: F,
) -> Result<Tensor, EmbedError>
where
    F: Fn(&TokenizedInput) -> &[i64],
{
    let mut data = Vec::with_capacity(inputs.len() * seq_len);
    for input in inputs {
        data.extend_from_slice(extractor(input));
    }

    Tensor::from_shape(&[inputs.len(), seq_len], &data).map_err(|e| EmbedError::Shape(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_input_tensor_shape() {
        let inputs = vec![
            TokenizedInput {
                input_ids: vec![101, 5, 102],
                attention_mask: vec![1, 1, 1],
                token_type_ids: vec![0, 0, 0],
            },
            TokenizedInput {
                input_ids: vec![101, 102, 0],
                attention_mask: vec![1, 1, 0],
                token_type_ids: vec![0, 0, 0],
            },
        ];
        let tensor = build_input_tensor(&inputs, 3, |t| &t.attention_mask).unwrap();
        assert_eq!(tensor.shape(), &[2, 3]);
    }

    #[test]
    fn test_bad_model_bytes() {
        let result = OnnxEmbedder::from_bytes(b"not an onnx file", "{}", EmbedConfig::default());
        assert!(matches!(result, Err(EmbedError::LoadFailed(_))));
    }
}
