//! BookRag: client-side retrieval-augmented Q&A over a book index
//!
//! Everything runs in the browser tab: a precomputed index of book passages
//! is fetched once, questions are embedded locally, the closest passages are
//! found by dot product, and a local chat model answers from those passages
//! only, with book and page citations.
//!
//! # Architecture
//!
//! - `index/` - DocumentIndex: index JSON loading and validation
//! - `embeddings/` - Embedder trait, tract ONNX embedder, JS output decoding
//! - `retrieval/` - Dot-product top-k over the whole index
//! - `prompt.rs` - Two-message grounded prompt
//! - `generation/` - Generator: candidate fallback, busy gate, reload-and-retry
//! - `session/` - RagSession: one question end to end, status reporting
//! - `render.rs` - HTML escaping and source list rendering
//! - `indexer/` - Offline index builder (page-aware chunking + batch embedding)
//! - `wasm.rs` - RagApp and the JS runtime adapters
//! - `logging.rs` - `tracing` events to the browser console
//!
//! # Usage (WASM)
//! ```javascript,ignore
//! import init, { RagApp } from 'bookrag';
//! import { pipeline } from '@xenova/transformers';
//! import { CreateMLCEngine, prebuiltAppConfig } from '@mlc-ai/web-llm';
//!
//! await init();
//!
//! const extractor = await pipeline('feature-extraction', 'Xenova/all-MiniLM-L6-v2');
//! const app = new RagApp(
//!   { indexUrl: 'index.json' },
//!   (text, opts) => extractor(text, opts),
//!   (modelId, opts) => CreateMLCEngine(modelId, opts),
//!   () => prebuiltAppConfig.model_list.map(m => m.model_id),
//!   (status) => { statusEl.textContent = status.message; },
//! );
//!
//! await app.init();
//! const result = await app.ask('Why did Thoreau go to the woods?', 5);
//! answerEl.textContent = result.answer;
//! sourcesEl.innerHTML = result.sourcesHtml;
//! ```

pub mod config;
pub mod embeddings;
pub mod error;
pub mod generation;
pub mod index;
pub mod indexer;
#[cfg(feature = "console-tracing")]
pub mod logging;
pub mod prompt;
pub mod render;
pub mod retrieval;
pub mod session;
pub mod wasm;

#[cfg(test)]
mod testing;

pub use config::RagConfig;
pub use embeddings::{Embedder, OnnxEmbedder};
pub use error::{EmbedError, GenerationError, IndexError, RagError, RetrievalError};
pub use generation::{ChatBackend, ChatEngine, Generator};
pub use index::{DocumentIndex, IndexFile, IndexRecord, PageRange};
pub use indexer::{IndexBuildConfig, IndexBuilder, PageDocument};
pub use prompt::{build_prompt, ChatMessage};
pub use render::escape_html;
pub use retrieval::{clamp_top_k, top_k_similar, Citation, ScoredPassage};
pub use session::{Answer, AskOutcome, RagSession, Status};

use wasm_bindgen::prelude::*;

// When the `wee_alloc` feature is enabled, use `wee_alloc` as the global
// allocator for smaller WASM bundle size.
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

/// Initialize panic hook and console logging for the browser
#[wasm_bindgen(start)]
pub fn main() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    #[cfg(feature = "console-tracing")]
    logging::init_console_logging(tracing::Level::INFO);
}

/// Get version information
#[wasm_bindgen]
pub fn version() -> String {
    format!("bookrag v{}", env!("CARGO_PKG_VERSION"))
}
