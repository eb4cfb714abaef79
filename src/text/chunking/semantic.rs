//! Semantic-similarity chunker
//!
//! Embeds every element in one batch and starts a new group wherever the
//! cosine distance between an element and its successor is above the
//! configured percentile of all adjacent distances. Groups are then packed
//! with an empty context.

use super::{
    accumulator::ElementWindows,
    chunker::DocumentChunker,
    config::{ChunkerOptions, DEFAULT_THRESHOLD_PERCENTILE},
    embedding::{SharedEmbeddingGenerator, cosine_distance, percentile},
    error::{ChunkingError, Result},
    types::{Chunk, ElementGroup},
};
use crate::document::{Document, Element};
use crate::text::tokenizer::Tokenizer;
use crate::util::cancel::CancelToken;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

/// Distance recorded for the last element, which has no successor
pub const LAST_ELEMENT_DISTANCE: f64 = 0.0;

pub struct SemanticChunker<T: Tokenizer> {
    options: ChunkerOptions<T>,
    generator: SharedEmbeddingGenerator,
    threshold_percentile: f64,
}

impl<T: Tokenizer> SemanticChunker<T> {
    pub fn new(options: ChunkerOptions<T>, generator: SharedEmbeddingGenerator) -> Self {
        Self {
            options,
            generator,
            threshold_percentile: DEFAULT_THRESHOLD_PERCENTILE,
        }
    }

    pub fn with_threshold_percentile(mut self, threshold_percentile: f64) -> Result<Self> {
        if !(0.0..=100.0).contains(&threshold_percentile) {
            return Err(ChunkingError::configuration(format!(
                "threshold_percentile must be within 0..=100, got {threshold_percentile}"
            )));
        }
        self.threshold_percentile = threshold_percentile;
        Ok(self)
    }

    pub fn threshold_percentile(&self) -> f64 {
        self.threshold_percentile
    }

    pub fn options(&self) -> &ChunkerOptions<T> {
        &self.options
    }

    /// Split the flattened document into topically coherent groups
    pub async fn groups<'a>(
        &self,
        document: &'a Document,
        cancel: &CancelToken,
    ) -> Result<Vec<ElementGroup<'a>>> {
        if cancel.is_cancelled() {
            return Err(ChunkingError::Cancelled);
        }
        let (elements, contents): (Vec<&'a Element>, Vec<String>) = document
            .enumerate_content()
            .filter_map(|element| {
                let content = element.semantic_content();
                (!content.is_empty()).then(|| (element, content.into_owned()))
            })
            .unzip();
        if elements.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "embedding {} elements with {}",
            contents.len(),
            self.generator.identify()
        );
        let embeddings = self.generator.generate(&contents, cancel).await?;
        if cancel.is_cancelled() {
            return Err(ChunkingError::Cancelled);
        }
        if embeddings.len() != contents.len() {
            warn!(
                "embedding generator returned {} vectors for {} inputs",
                embeddings.len(),
                contents.len()
            );
            return Err(ChunkingError::validation(format!(
                "expected {} embeddings, got {}",
                contents.len(),
                embeddings.len()
            )));
        }

        let distances: Vec<f64> = embeddings
            .windows(2)
            .map(|pair| cosine_distance(&pair[0], &pair[1]))
            .chain(std::iter::once(LAST_ELEMENT_DISTANCE))
            .collect();
        let threshold = percentile(&distances, self.threshold_percentile);

        let mut groups = Vec::new();
        let mut current = Vec::new();
        for (element, distance) in elements.into_iter().zip(&distances) {
            current.push(element);
            if *distance > threshold {
                groups.push(ElementGroup::new("", std::mem::take(&mut current)));
            }
        }
        if !current.is_empty() {
            groups.push(ElementGroup::new("", current));
        }
        debug!(
            "split {} elements into {} groups at distance threshold {:.4} (p{})",
            distances.len(),
            groups.len(),
            threshold,
            self.threshold_percentile
        );
        Ok(groups)
    }
}

impl<T: Tokenizer> DocumentChunker for SemanticChunker<T> {
    fn process<'a>(
        &'a self,
        document: &'a Arc<Document>,
        cancel: &'a CancelToken,
    ) -> BoxStream<'a, Result<Chunk>> {
        stream::once(async move {
            let groups = self.groups(document, cancel).await?;
            Ok::<_, ChunkingError>(stream::iter(ElementWindows::new(
                &self.options,
                document,
                groups.into_iter().map(Ok),
                cancel.clone(),
            )))
        })
        .try_flatten()
        .boxed()
    }
}
