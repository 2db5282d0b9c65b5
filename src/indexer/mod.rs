//! Offline index builder
//!
//! Turns already-extracted page text into the index JSON the session loads:
//! chunk every book, embed the chunks in batches, attach page citations.
//!
//! ```text
//! (file, pages) → PageChunker → Embedder::embed_batch → IndexFile
//! ```

mod chunker;

pub use chunker::{PageChunk, PageChunker};

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::embeddings::{l2_normalize, Embedder};
use crate::error::{EmbedError, IndexError, RagError};
use crate::index::{IndexFile, IndexMetadata, IndexRecord};

/// `"Moby_Dick.pdf"` → `"Moby Dick"`
pub fn book_name_from_file(file_name: &str) -> String {
    let path = Path::new(file_name);
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
        .replace('_', " ")
}

/// Extracted text of one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageText {
    pub page: u32,
    pub text: String,
}

/// One source document as handed to the indexer:
/// `{ "file": "Moby_Dick.pdf", "pages": [{ "page": 1, "text": "..." }] }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageDocument {
    pub file: String,
    #[serde(default)]
    pub pages: Vec<PageText>,
}

impl PageDocument {
    /// Parse a JSON array of documents
    pub fn list_from_json(json: &str) -> Result<Vec<Self>, IndexError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone)]
pub struct IndexBuildConfig {
    /// Recorded in the index metadata
    pub model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Texts per `embed_batch` call
    pub batch_size: usize,
}

impl Default for IndexBuildConfig {
    fn default() -> Self {
        Self {
            model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            chunk_size: 1200,
            chunk_overlap: 200,
            batch_size: 32,
        }
    }
}

struct PendingChunk {
    file_name: String,
    book: String,
    chunk: PageChunk,
}

pub struct IndexBuilder {
    config: IndexBuildConfig,
    chunker: PageChunker,
    pending: Vec<PendingChunk>,
    documents: usize,
}

impl IndexBuilder {
    pub fn new(config: IndexBuildConfig) -> Self {
        let chunker = PageChunker::new(config.chunk_size, config.chunk_overlap);
        Self {
            config,
            chunker,
            pending: Vec::new(),
            documents: 0,
        }
    }

    pub fn config(&self) -> &IndexBuildConfig {
        &self.config
    }

    pub fn document_count(&self) -> usize {
        self.documents
    }

    pub fn chunk_count(&self) -> usize {
        self.pending.len()
    }

    /// Queue one document's `(page_number, text)` pairs. Returns chunks added.
    pub fn add_document(&mut self, file_name: &str, pages: Vec<(u32, String)>) -> usize {
        if pages.iter().all(|(_, text)| text.trim().is_empty()) {
            warn!(file = file_name, "no text extracted, skipping");
            return 0;
        }

        let book = book_name_from_file(file_name);
        let chunks = self.chunker.chunk_pages(&pages);
        let added = chunks.len();
        debug!(file = file_name, pages = pages.len(), chunks = added, "chunked document");

        self.pending
            .extend(chunks.into_iter().map(|chunk| PendingChunk {
                file_name: file_name.to_string(),
                book: book.clone(),
                chunk,
            }));
        self.documents += 1;
        added
    }

    /// Queue a parsed [`PageDocument`]
    pub fn add_page_document(&mut self, doc: PageDocument) -> usize {
        let pages = doc.pages.into_iter().map(|p| (p.page, p.text)).collect();
        self.add_document(&doc.file, pages)
    }

    /// Embed every queued chunk and assemble the index
    pub async fn build<E: Embedder>(self, embedder: &E) -> Result<IndexFile, RagError> {
        if self.pending.is_empty() {
            return Err(IndexError::Empty.into());
        }

        let batch_size = self.config.batch_size.max(1);
        let mut records = Vec::with_capacity(self.pending.len());

        for batch in self.pending.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|p| p.chunk.text.clone()).collect();
            let embeddings = embedder.embed_batch(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(EmbedError::Shape(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embeddings.len()
                ))
                .into());
            }

            for (pending, mut embedding) in batch.iter().zip(embeddings) {
                l2_normalize(&mut embedding);
                let chunk = &pending.chunk;
                records.push(IndexRecord {
                    id: Some(format!("{}__chunk_{}", pending.book, chunk.index)),
                    chunk_id: Some(chunk.index),
                    source: format!(
                        "{}#pp.{}-{}",
                        pending.file_name,
                        chunk.pages.start(),
                        chunk.pages.end()
                    ),
                    book: pending.book.clone(),
                    pages: chunk.pages,
                    text: chunk.text.clone(),
                    embedding,
                });
            }
            debug!(done = records.len(), total = self.pending.len(), "embedded batch");
        }

        let embedding_dim = records.first().map(|r| r.embedding.len());
        info!(
            documents = self.documents,
            chunks = records.len(),
            dims = embedding_dim.unwrap_or(0),
            "index built"
        );

        Ok(IndexFile {
            metadata: Some(IndexMetadata {
                model: Some(self.config.model.clone()),
                chunk_size: Some(self.config.chunk_size),
                chunk_overlap: Some(self.config.chunk_overlap),
                total_chunks: Some(records.len()),
                embedding_dim,
            }),
            records,
        })
    }
}
