// bookrag/src/embeddings/tokenize.rs
//
// Tokenization wrapper for BERT-style sentence encoders

use std::sync::Arc;
use tokenizers::Tokenizer;

use crate::error::EmbedError;

/// Tokenizer with a fixed truncation length
pub struct EmbedTokenizer {
    tokenizer: Arc<Tokenizer>,
    max_length: usize,
}

/// Model inputs for one text
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizedInput {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
}

impl TokenizedInput {
    fn truncate(&mut self, len: usize) {
        self.input_ids.truncate(len);
        self.attention_mask.truncate(len);
        self.token_type_ids.truncate(len);
    }

    fn pad_to(&mut self, len: usize) {
        self.input_ids.resize(len, 0);
        self.attention_mask.resize(len, 0);
        self.token_type_ids.resize(len, 0);
    }
}

impl EmbedTokenizer {
    /// Create from tokenizer.json contents
    pub fn from_json(tokenizer_json: &str, max_length: usize) -> Result<Self, EmbedError> {
        let tokenizer = Tokenizer::from_bytes(tokenizer_json.as_bytes())
            .map_err(|e| EmbedError::Tokenizer(format!("load failed: {e}")))?;

        Ok(Self {
            tokenizer: Arc::new(tokenizer),
            max_length,
        })
    }

    pub fn encode(&self, text: &str) -> Result<TokenizedInput, EmbedError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbedError::Tokenizer(format!("encode failed: {e}")))?;

        let widen = |ids: &[u32]| ids.iter().map(|&v| v as i64).collect::<Vec<i64>>();
        let mut input = TokenizedInput {
            input_ids: widen(encoding.get_ids()),
            attention_mask: widen(encoding.get_attention_mask()),
            token_type_ids: widen(encoding.get_type_ids()),
        };
        input.truncate(self.max_length);

        Ok(input)
    }

    pub fn encode_batch(&self, texts: &[String]) -> Result<Vec<TokenizedInput>, EmbedError> {
        texts.iter().map(|text| self.encode(text)).collect()
    }
}

/// Right-pad a batch with zeros to its longest sequence
pub fn pad_batch(mut inputs: Vec<TokenizedInput>) -> (Vec<TokenizedInput>, usize) {
    let max_len = inputs.iter().map(|i| i.input_ids.len()).max().unwrap_or(0);
    for input in &mut inputs {
        input.pad_to(max_len);
    }
    (inputs, max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(ids: &[i64]) -> TokenizedInput {
        TokenizedInput {
            input_ids: ids.to_vec(),
            attention_mask: vec![1; ids.len()],
            token_type_ids: vec![0; ids.len()],
        }
    }

    #[test]
    fn test_pad_batch() {
        let (padded, len) = pad_batch(vec![input(&[101, 7592, 102]), input(&[101, 102])]);
        assert_eq!(len, 3);
        assert_eq!(padded[1].input_ids, vec![101, 102, 0]);
        assert_eq!(padded[1].attention_mask, vec![1, 1, 0]);
        assert_eq!(padded[0], input(&[101, 7592, 102]));
    }

    #[test]
    fn test_pad_empty_batch() {
        let (padded, len) = pad_batch(vec![]);
        assert!(padded.is_empty());
        assert_eq!(len, 0);
    }

    #[test]
    fn test_invalid_tokenizer_json() {
        assert!(matches!(
            EmbedTokenizer::from_json("{not json", 128),
            Err(EmbedError::Tokenizer(_))
        ));
    }
}
