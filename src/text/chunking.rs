//! Token-budgeted document chunking for embedding pipelines
//!
//! Every strategy turns a [`Document`](crate::document::Document) into a lazy
//! stream of [`Chunk`]s through [`DocumentChunker::process`]. The header-path,
//! section-tree and semantic strategies share the greedy
//! [`ElementAccumulator`]; the markdown and token-window strategies cut text
//! on their own.

pub mod accumulator;
pub mod chunker;
pub mod config;
pub mod embedding;
pub mod error;
pub mod header_path;
pub mod markdown;
pub mod section_tree;
pub mod semantic;
pub mod token_window;
pub mod types;

// Re-export main public interfaces
pub use accumulator::{ElementAccumulator, ElementWindows};
pub use chunker::{DocumentChunker, build_chunker, chunk_documents};
pub use config::{
    ChunkerOptions, ChunkerSettings, ChunkingStatistics, ChunkingStrategy,
    load_chunker_settings_from_env,
};
pub use embedding::{EmbeddingGenerator, SharedEmbeddingGenerator};
pub use error::{BudgetUnit, ChunkingError, Result};
pub use header_path::HeaderPathChunker;
pub use markdown::MarkdownChunker;
pub use section_tree::SectionTreeChunker;
pub use semantic::SemanticChunker;
pub use token_window::TokenWindowChunker;
pub use types::{Chunk, ChunkKind, ElementGroup};
