//! Precomputed passage index
//!
//! ```text
//! index.json → serde → IndexFile → validation → DocumentIndex (read-only)
//! ```

mod loader;
mod record;

pub use loader::DocumentIndex;
pub use record::{IndexFile, IndexMetadata, IndexRecord, PageRange};
