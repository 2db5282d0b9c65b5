//! Retriever - linear top-k over the in-memory index
//!
//! Every record is scored by dot product against the query; the index is
//! small enough that a full scan and sort is the whole algorithm.

mod similarity;

pub use similarity::dot;

use serde::Serialize;

use crate::config::{DEFAULT_TOP_K, MAX_TOP_K};
use crate::error::RetrievalError;
use crate::index::{DocumentIndex, IndexRecord, PageRange};

/// A record paired with its similarity to the query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPassage<'a> {
    /// Position of the record in the index
    pub position: usize,
    pub score: f32,
    #[serde(flatten)]
    pub record: &'a IndexRecord,
}

/// Owned, embedding-free copy of a retrieved passage, kept with the answer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub position: usize,
    pub score: f32,
    pub book: String,
    pub source: String,
    pub pages: PageRange,
    pub text: String,
}

impl From<&ScoredPassage<'_>> for Citation {
    fn from(p: &ScoredPassage<'_>) -> Self {
        Self {
            position: p.position,
            score: p.score,
            book: p.record.book.clone(),
            source: p.record.source.clone(),
            pages: p.record.pages,
            text: p.record.text.clone(),
        }
    }
}

/// Clamp a requested k into `[1, MAX_TOP_K]`
pub fn clamp_top_k(k: i64) -> usize {
    clamp_top_k_within(k, MAX_TOP_K)
}

/// Clamp into `[1, ceiling]`; the ceiling itself never exceeds `MAX_TOP_K`
pub fn clamp_top_k_within(k: i64, ceiling: usize) -> usize {
    let ceiling = ceiling.clamp(1, MAX_TOP_K);
    k.clamp(1, ceiling as i64) as usize
}

/// Parse a user-entered k, falling back to the default when it is not a number
pub fn parse_top_k(input: &str) -> usize {
    input
        .trim()
        .parse::<i64>()
        .map(clamp_top_k)
        .unwrap_or(DEFAULT_TOP_K)
}

/// Score every record and return the best `min(k, len)` in descending order.
///
/// `k` is clamped first. Equal scores keep index order (lower position first).
pub fn top_k_similar<'a>(
    index: &'a DocumentIndex,
    query: &[f32],
    k: i64,
) -> Result<Vec<ScoredPassage<'a>>, RetrievalError> {
    if query.len() != index.dimensions() {
        return Err(RetrievalError::DimensionMismatch {
            query: query.len(),
            index: index.dimensions(),
        });
    }

    let k = clamp_top_k(k);

    let mut scored: Vec<ScoredPassage<'a>> = index
        .records()
        .iter()
        .enumerate()
        .map(|(position, record)| ScoredPassage {
            position,
            score: dot(query, &record.embedding),
            record,
        })
        .collect();

    // Stable sort, so ties stay in index order
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(k);

    Ok(scored)
}
