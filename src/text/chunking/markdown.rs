//! Markdown-level chunker
//!
//! Splits the flattened document on header boundaries only. Headers up to
//! `split_level` open a new chunk; everything else, deeper headers included,
//! is copied verbatim as markdown. Not token-aware.

use super::{
    chunker::DocumentChunker,
    config::DEFAULT_MARKDOWN_SPLIT_LEVEL,
    error::{ChunkingError, Result},
    header_path::MAX_HEADER_LEVELS,
    types::{Chunk, ChunkKind},
};
use crate::document::{Document, Element};
use crate::util::cancel::CancelToken;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkdownChunker {
    split_level: usize,
    strip_headers: bool,
}

impl Default for MarkdownChunker {
    fn default() -> Self {
        Self {
            split_level: DEFAULT_MARKDOWN_SPLIT_LEVEL,
            strip_headers: false,
        }
    }
}

impl MarkdownChunker {
    pub fn new(split_level: usize, strip_headers: bool) -> Result<Self> {
        if !(1..=MAX_HEADER_LEVELS).contains(&split_level) {
            return Err(ChunkingError::configuration(format!(
                "split_level must be within 1..={MAX_HEADER_LEVELS}, got {split_level}"
            )));
        }
        Ok(Self {
            split_level,
            strip_headers,
        })
    }

    pub fn split_level(&self) -> usize {
        self.split_level
    }

    pub fn strip_headers(&self) -> bool {
        self.strip_headers
    }

    /// Chunk the whole document at once
    pub fn chunk_document(&self, document: &Arc<Document>, cancel: &CancelToken) -> Result<Vec<Chunk>> {
        let elements: Vec<&Element> = document.enumerate_content().collect();
        let mut pass = Pass {
            chunker: self,
            document: Arc::downgrade(document),
            cancel,
            chunks: Vec::new(),
        };

        let mut cursor = 0;
        while cursor < elements.len() {
            cursor = pass.parse_level(&elements, cursor, 1, "")?;
        }
        info!(
            "markdown chunking completed: {} elements -> {} chunks",
            elements.len(),
            pass.chunks.len()
        );
        Ok(pass.chunks)
    }
}

impl DocumentChunker for MarkdownChunker {
    fn process<'a>(
        &'a self,
        document: &'a Arc<Document>,
        cancel: &'a CancelToken,
    ) -> BoxStream<'a, Result<Chunk>> {
        stream::once(async move { self.chunk_document(document, cancel) })
            .map_ok(|chunks| stream::iter(chunks.into_iter().map(Ok::<_, ChunkingError>)))
            .try_flatten()
            .boxed()
    }
}

/// State of one chunking pass
struct Pass<'c> {
    chunker: &'c MarkdownChunker,
    document: Weak<Document>,
    cancel: &'c CancelToken,
    chunks: Vec<Chunk>,
}

impl Pass<'_> {
    /// Consume elements belonging to `level` starting at `cursor`.
    ///
    /// Returns the index of the first element not consumed, which is either
    /// the end or a header shallower than `level`.
    fn parse_level(
        &mut self,
        elements: &[&Element],
        mut cursor: usize,
        level: usize,
        context: &str,
    ) -> Result<usize> {
        let mut text = String::new();
        let mut last_header: Option<String> = None;

        while cursor < elements.len() {
            if self.cancel.is_cancelled() {
                return Err(ChunkingError::Cancelled);
            }
            let element = elements[cursor];
            let header_level = element.header_level();

            if header_level == 0 || header_level > self.chunker.split_level {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(&element.markdown());
                cursor += 1;
            } else if header_level == level {
                self.flush(&mut text, context, last_header.as_deref());
                last_header = Some(element.markdown().into_owned());
                cursor += 1;
            } else if header_level < level {
                break;
            } else {
                self.flush(&mut text, context, last_header.as_deref());
                let nested = join_context(context, last_header.as_deref());
                cursor = self.parse_level(elements, cursor, level + 1, &nested)?;
            }
        }

        self.flush(&mut text, context, last_header.as_deref());
        Ok(cursor)
    }

    fn flush(&mut self, text: &mut String, context: &str, header: Option<&str>) {
        if text.trim().is_empty() {
            text.clear();
            return;
        }
        let context = join_context(context, header);
        let content = if self.chunker.strip_headers || context.is_empty() {
            std::mem::take(text)
        } else {
            let content = format!("{context}\n{text}");
            text.clear();
            content
        };
        let index = self.chunks.len();
        debug!(
            "section chunk {} under '{}': {} bytes",
            index,
            context,
            content.len()
        );
        self.chunks.push(Chunk::new(
            content,
            context,
            self.document.clone(),
            ChunkKind::Section,
            None,
            index,
        ));
    }
}

fn join_context(context: &str, header: Option<&str>) -> String {
    match header {
        Some(header) if context.is_empty() => header.to_string(),
        Some(header) => format!("{context} {header}"),
        None => context.to_string(),
    }
}
