//! Common chunker interface and strategy selection

use super::{
    config::{ChunkerOptions, ChunkerSettings, ChunkingStrategy},
    embedding::SharedEmbeddingGenerator,
    error::{ChunkingError, Result},
    header_path::HeaderPathChunker,
    markdown::MarkdownChunker,
    section_tree::SectionTreeChunker,
    semantic::SemanticChunker,
    token_window::TokenWindowChunker,
    types::Chunk,
};
use crate::document::Document;
use crate::text::tokenizer::Tokenizer;
use crate::util::cancel::CancelToken;
use futures::TryStreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Turns a document into a lazy sequence of chunks.
///
/// Every call starts an independent pass. Errors, cancellation included,
/// surface as the item being pulled and end the sequence.
pub trait DocumentChunker: Send + Sync {
    fn process<'a>(
        &'a self,
        document: &'a Arc<Document>,
        cancel: &'a CancelToken,
    ) -> BoxStream<'a, Result<Chunk>>;
}

/// Build the chunker selected by `settings.strategy`.
///
/// `generator` is only needed for [`ChunkingStrategy::Semantic`].
pub fn build_chunker<T: Tokenizer + 'static>(
    tokenizer: T,
    settings: &ChunkerSettings,
    generator: Option<SharedEmbeddingGenerator>,
) -> Result<Box<dyn DocumentChunker>> {
    let chunker: Box<dyn DocumentChunker> = match settings.strategy {
        ChunkingStrategy::HeaderPath => Box::new(HeaderPathChunker::new(
            ChunkerOptions::from_settings(tokenizer, settings)?,
        )),
        ChunkingStrategy::SectionTree => Box::new(SectionTreeChunker::new(
            ChunkerOptions::from_settings(tokenizer, settings)?,
        )),
        ChunkingStrategy::Markdown => Box::new(MarkdownChunker::new(
            settings.markdown_split_level(),
            settings.strip_headers,
        )?),
        ChunkingStrategy::Semantic => {
            let generator = generator.ok_or_else(|| {
                ChunkingError::configuration("semantic chunking requires an embedding generator")
            })?;
            Box::new(
                SemanticChunker::new(ChunkerOptions::from_settings(tokenizer, settings)?, generator)
                    .with_threshold_percentile(settings.threshold_percentile())?,
            )
        }
        ChunkingStrategy::TokenWindow => Box::new(TokenWindowChunker::new(
            ChunkerOptions::from_settings(tokenizer, settings)?,
        )),
    };
    info!("using {} chunking strategy", settings.strategy.as_str());
    Ok(chunker)
}

/// Chunk several documents one after another, stopping at the first error
pub async fn chunk_documents(
    chunker: &dyn DocumentChunker,
    documents: &[Arc<Document>],
    cancel: &CancelToken,
) -> Result<Vec<Vec<Chunk>>> {
    let batch_start = Instant::now();
    let mut results = Vec::with_capacity(documents.len());
    let mut total_chunks = 0;

    for document in documents {
        let chunks: Vec<Chunk> = chunker.process(document, cancel).try_collect().await?;
        total_chunks += chunks.len();
        results.push(chunks);
    }

    info!(
        "Batch chunking completed: {} documents, {} total chunks in {:.2}ms",
        documents.len(),
        total_chunks,
        batch_start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(results)
}
