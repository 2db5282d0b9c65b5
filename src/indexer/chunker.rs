//! Page-aware fixed-window chunker
//!
//! Pages are joined with a blank line, cut into overlapping character
//! windows, and every window remembers which pages it spans.

use crate::index::PageRange;

const PAGE_SEPARATOR: &str = "\n\n";

/// A window of book text with the pages it covers
#[derive(Debug, Clone, PartialEq)]
pub struct PageChunk {
    pub text: String,
    /// Start char offset in the joined text
    pub start: usize,
    /// End char offset (exclusive)
    pub end: usize,
    /// Chunk index within the document
    pub index: usize,
    pub pages: PageRange,
}

#[derive(Debug, Clone, Copy)]
pub struct PageChunker {
    /// Window size in characters
    chunk_size: usize,
    /// Characters shared by consecutive windows
    overlap: usize,
}

impl Default for PageChunker {
    fn default() -> Self {
        Self {
            chunk_size: 1200, // ~200-250 tokens
            overlap: 200,
        }
    }
}

impl PageChunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            overlap,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance between consecutive window starts
    pub fn step(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap).max(1)
    }

    /// Chunk `(page_number, text)` pairs. Blank windows are dropped.
    pub fn chunk_pages(&self, pages: &[(u32, String)]) -> Vec<PageChunk> {
        if pages.is_empty() {
            return vec![];
        }

        // (page number, first char offset of that page)
        let mut page_starts: Vec<(u32, usize)> = Vec::with_capacity(pages.len());
        let mut chars: Vec<char> = Vec::new();
        for (i, (page_no, text)) in pages.iter().enumerate() {
            if i > 0 {
                chars.extend(PAGE_SEPARATOR.chars());
            }
            page_starts.push((*page_no, chars.len()));
            chars.extend(text.chars());
        }

        let page_at = |pos: usize| -> u32 {
            let idx = page_starts
                .partition_point(|&(_, start)| start <= pos)
                .saturating_sub(1);
            page_starts[idx].0
        };

        let n = chars.len();
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < n {
            let end = (start + self.chunk_size).min(n);
            let text: String = chars[start..end].iter().collect();

            if !text.trim().is_empty() {
                chunks.push(PageChunk {
                    text,
                    start,
                    end,
                    index: chunks.len(),
                    pages: PageRange::new(page_at(start), page_at(end - 1)),
                });
            }

            // later windows would sit entirely inside this one
            if end == n {
                break;
            }
            start += self.step();
        }

        chunks
    }
}
