//! Loading and validating the precomputed index
//!
//! The index is read once at startup and never mutated. Anything wrong
//! with it is fatal: the session cannot answer without it.

use std::path::Path;

use tracing::{debug, info, warn};

use super::record::{IndexFile, IndexMetadata, IndexRecord};
use crate::error::IndexError;

/// Norm deviation tolerated before a record is reported as unnormalized
const NORM_TOLERANCE: f32 = 1e-3;

/// Validated, read-only in-memory index
#[derive(Debug, Clone)]
pub struct DocumentIndex {
    records: Vec<IndexRecord>,
    dimensions: usize,
    metadata: Option<IndexMetadata>,
}

impl DocumentIndex {
    /// Parse an index document from a JSON string
    pub fn from_json(json: &str) -> Result<Self, IndexError> {
        let file: IndexFile = serde_json::from_str(json)?;
        Self::from_file_contents(file)
    }

    /// Parse an index document from raw bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, IndexError> {
        let file: IndexFile = serde_json::from_slice(bytes)?;
        Self::from_file_contents(file)
    }

    /// Read and parse an index file from disk
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "reading index file");
        let bytes = std::fs::read(path)?;
        Self::from_slice(&bytes)
    }

    /// Validate an already-deserialized index document
    pub fn from_file_contents(file: IndexFile) -> Result<Self, IndexError> {
        let IndexFile { records, metadata } = file;

        let dimensions = records.first().ok_or(IndexError::Empty)?.embedding.len();

        let mut unnormalized = 0usize;
        for (position, record) in records.iter().enumerate() {
            if record.embedding.len() != dimensions {
                return Err(IndexError::DimensionMismatch {
                    position,
                    expected: dimensions,
                    found: record.embedding.len(),
                });
            }
            if record.embedding.iter().any(|v| !v.is_finite()) {
                return Err(IndexError::NonFinite { position });
            }
            let norm = record.embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
            if (norm - 1.0).abs() > NORM_TOLERANCE {
                unnormalized += 1;
            }
        }

        if let Some(declared) = metadata.as_ref().and_then(|m| m.embedding_dim) {
            if declared != dimensions {
                return Err(IndexError::MetadataMismatch {
                    declared,
                    actual: dimensions,
                });
            }
        }

        if unnormalized > 0 {
            warn!(
                unnormalized,
                total = records.len(),
                "index contains embeddings that are not unit length; scores are raw dot products"
            );
        }

        info!(records = records.len(), dimensions, "index loaded");

        Ok(Self {
            records,
            dimensions,
            metadata,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false for a constructed index; kept for API symmetry
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Embedding dimension shared by every record
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn records(&self) -> &[IndexRecord] {
        &self.records
    }

    pub fn metadata(&self) -> Option<&IndexMetadata> {
        self.metadata.as_ref()
    }

    /// Embedding model the index was built with, if recorded
    pub fn model(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.model.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_json(book: &str, embedding: &[f32]) -> String {
        format!(
            r#"{{"source":"{book}.pdf#pp.1-1","book":"{book}","pages":[1,1],"text":"t","embedding":{}}}"#,
            serde_json::to_string(embedding).unwrap()
        )
    }

    fn index_json(records: &[String]) -> String {
        format!(r#"{{"records":[{}]}}"#, records.join(","))
    }

    #[test]
    fn test_record_count_matches_array_length() {
        let records: Vec<String> = (0..7)
            .map(|i| record_json(&format!("b{i}"), &[1.0, 0.0]))
            .collect();
        let index = DocumentIndex::from_json(&index_json(&records)).unwrap();
        assert_eq!(index.len(), 7);
        assert_eq!(index.dimensions(), 2);
        assert!(!index.is_empty());
    }

    #[test]
    fn test_empty_records_fails() {
        let err = DocumentIndex::from_json(r#"{"records":[]}"#).unwrap_err();
        assert!(matches!(err, IndexError::Empty));
    }

    #[test]
    fn test_missing_records_field_fails() {
        let err = DocumentIndex::from_json(r#"{"items":[]}"#).unwrap_err();
        assert!(matches!(err, IndexError::Parse(_)));
    }

    #[test]
    fn test_garbage_fails() {
        assert!(matches!(
            DocumentIndex::from_slice(b"<html>404</html>"),
            Err(IndexError::Parse(_))
        ));
    }

    #[test]
    fn test_dimension_mismatch_fails() {
        let records = vec![
            record_json("a", &[1.0, 0.0]),
            record_json("b", &[1.0, 0.0, 0.0]),
        ];
        let err = DocumentIndex::from_json(&index_json(&records)).unwrap_err();
        match err {
            IndexError::DimensionMismatch {
                position,
                expected,
                found,
            } => {
                assert_eq!(position, 1);
                assert_eq!(expected, 2);
                assert_eq!(found, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_metadata_dimension_checked() {
        let json = format!(
            r#"{{"records":[{}],"metadata":{{"model":"m","embedding_dim":384}}}}"#,
            record_json("a", &[1.0, 0.0])
        );
        let err = DocumentIndex::from_json(&json).unwrap_err();
        assert!(matches!(
            err,
            IndexError::MetadataMismatch {
                declared: 384,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_metadata_exposed() {
        let json = format!(
            r#"{{"records":[{}],"metadata":{{"model":"all-MiniLM-L6-v2","embedding_dim":2,"total_chunks":1}}}}"#,
            record_json("a", &[0.6, 0.8])
        );
        let index = DocumentIndex::from_json(&json).unwrap();
        assert_eq!(index.model(), Some("all-MiniLM-L6-v2"));
        assert_eq!(index.metadata().and_then(|m| m.total_chunks), Some(1));
    }

    #[test]
    fn test_unnormalized_is_accepted() {
        let records = vec![record_json("a", &[3.0, 4.0])];
        let index = DocumentIndex::from_json(&index_json(&records)).unwrap();
        assert_eq!(index.records()[0].embedding, vec![3.0, 4.0]);
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut file: IndexFile =
            serde_json::from_str(&index_json(&[record_json("a", &[1.0, 0.0])])).unwrap();
        file.records[0].embedding[1] = f32::NAN;
        let err = DocumentIndex::from_file_contents(file).unwrap_err();
        assert!(matches!(err, IndexError::NonFinite { position: 0 }));
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = DocumentIndex::from_path("/definitely/not/here/index.json").unwrap_err();
        assert!(matches!(err, IndexError::Io(_)));
    }
}
