//! Token-window chunker
//!
//! Runs over top-level sections only and cuts their concatenated text into
//! windows of at most `max_tokens_per_chunk` tokens. Each window after the
//! first starts with the trailing `overlap_tokens` of the previous one.
//! Element boundaries are not respected here, so tables can be cut mid-row.

use super::{
    chunker::DocumentChunker,
    config::{ChunkerOptions, ChunkingStatistics},
    error::{BudgetUnit, ChunkingError, IntoChunkingError, Result},
    types::{Chunk, ChunkKind},
};
use crate::document::{Document, Section};
use crate::text::tokenizer::Tokenizer;
use crate::util::cancel::CancelToken;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct TokenWindowChunker<T: Tokenizer> {
    options: ChunkerOptions<T>,
}

impl<T: Tokenizer> TokenWindowChunker<T> {
    pub fn new(options: ChunkerOptions<T>) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ChunkerOptions<T> {
        &self.options
    }

    pub fn chunks<'a>(&'a self, document: &'a Arc<Document>, cancel: CancelToken) -> TokenWindows<'a, T> {
        TokenWindows {
            options: &self.options,
            document: Arc::downgrade(document),
            sections: document.sections().iter(),
            buffer: String::new(),
            buffer_tokens: 0,
            overlap_only: false,
            ready: VecDeque::new(),
            next_index: 0,
            cancel,
            started: Instant::now(),
            statistics: ChunkingStatistics::new(),
            done: false,
        }
    }
}

impl<T: Tokenizer> DocumentChunker for TokenWindowChunker<T> {
    fn process<'a>(
        &'a self,
        document: &'a Arc<Document>,
        cancel: &'a CancelToken,
    ) -> BoxStream<'a, Result<Chunk>> {
        stream::iter(self.chunks(document, cancel.clone())).boxed()
    }
}

/// Lazy window sequence, one section consumed per step
pub struct TokenWindows<'a, T: Tokenizer> {
    options: &'a ChunkerOptions<T>,
    document: Weak<Document>,
    sections: std::slice::Iter<'a, Section>,
    buffer: String,
    buffer_tokens: usize,
    /// buffer holds nothing but the overlap carried from the last window
    overlap_only: bool,
    ready: VecDeque<Chunk>,
    next_index: usize,
    cancel: CancelToken,
    started: Instant,
    statistics: ChunkingStatistics,
    done: bool,
}

impl<T: Tokenizer> TokenWindows<'_, T> {
    pub fn statistics(&self) -> &ChunkingStatistics {
        &self.statistics
    }

    fn step(&mut self) -> Result<()> {
        let Some(section) = self.sections.next() else {
            if !self.buffer.is_empty() && !self.overlap_only {
                self.emit();
            }
            self.done = true;
            self.statistics.finish_total_timing(self.started);
            self.statistics.calculate_derived_metrics();
            info!(
                "token window chunking completed: {} chunks",
                self.statistics.total_chunks_created
            );
            debug!("{}", self.statistics.summary());
            return Ok(());
        };

        let text = section.semantic_content();
        if text.is_empty() {
            self.statistics.record_skipped_element();
            return Ok(());
        }
        self.statistics.record_element();
        let content = if self.buffer.is_empty() {
            text
        } else {
            format!("\n{text}")
        };
        self.push_content(content)
    }

    fn push_content(&mut self, mut content: String) -> Result<()> {
        let max = self.options.max_tokens_per_chunk();
        let consider_normalization = self.options.consider_normalization();
        let mut content_tokens = self.count_tokens(&content)?;
        if self.buffer_tokens + content_tokens >= max {
            self.statistics.record_split_element();
        }

        while self.buffer_tokens + content_tokens >= max {
            let found = self
                .options
                .tokenizer()
                .index_by_token_count(&content, max - self.buffer_tokens, consider_normalization)
                .into_chunking_error()?;
            if let Some(normalized) = found.normalized {
                content = normalized;
            }
            let index = found.index.min(content.len());

            if index == 0 {
                if self.overlap_only {
                    debug!("dropping {} overlap tokens to make room", self.buffer_tokens);
                    self.buffer.clear();
                    self.buffer_tokens = 0;
                    self.overlap_only = false;
                } else if self.buffer.is_empty() {
                    warn!(
                        "not even a single token of section content fits in {} tokens",
                        max
                    );
                    return Err(ChunkingError::budget_exceeded(BudgetUnit::Content, max));
                } else {
                    self.emit();
                    self.carry_overlap()?;
                }
            } else {
                self.buffer.push_str(&content[..index]);
                self.buffer_tokens += found.token_count;
                content.replace_range(..index, "");
                self.emit();
                self.carry_overlap()?;
            }

            if self.buffer.is_empty() && content.starts_with('\n') {
                content.remove(0);
            }
            content_tokens = self.count_tokens(&content)?;
        }

        if !content.is_empty() {
            self.buffer.push_str(&content);
            self.buffer_tokens += content_tokens;
            self.overlap_only = false;
        }
        Ok(())
    }

    fn emit(&mut self) {
        let chunk = Chunk::new(
            self.buffer.clone(),
            String::new(),
            self.document.clone(),
            ChunkKind::Window,
            Some(self.buffer_tokens),
            self.next_index,
        );
        debug!(
            "window {}: {} tokens, {} bytes",
            chunk.index,
            self.buffer_tokens,
            chunk.content.len()
        );
        self.statistics
            .record_chunk(ChunkKind::Window, Some(self.buffer_tokens));
        self.next_index += 1;
        self.ready.push_back(chunk);
    }

    /// Replace the buffer with the trailing overlap of the window just emitted
    fn carry_overlap(&mut self) -> Result<()> {
        let overlap = self.options.overlap_tokens();
        if overlap == 0 {
            self.buffer.clear();
            self.buffer_tokens = 0;
            self.overlap_only = false;
            return Ok(());
        }
        let found = self
            .options
            .tokenizer()
            .index_by_token_count_from_end(
                &self.buffer,
                overlap,
                self.options.consider_normalization(),
            )
            .into_chunking_error()?;
        let tail = match found.normalized {
            Some(normalized) => normalized[found.index.min(normalized.len())..].to_string(),
            None => self.buffer[found.index.min(self.buffer.len())..].to_string(),
        };
        self.buffer = tail;
        self.buffer_tokens = found.token_count;
        self.overlap_only = !self.buffer.is_empty();
        Ok(())
    }

    fn count_tokens(&self, text: &str) -> Result<usize> {
        self.options
            .tokenizer()
            .count_tokens(text, self.options.consider_normalization())
            .into_chunking_error()
    }
}

impl<T: Tokenizer> Iterator for TokenWindows<'_, T> {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if !self.done && self.cancel.is_cancelled() {
                self.ready.clear();
                self.done = true;
                return Some(Err(ChunkingError::Cancelled));
            }
            if let Some(chunk) = self.ready.pop_front() {
                return Some(Ok(chunk));
            }
            if self.done {
                return None;
            }
            if let Err(error) = self.step() {
                self.ready.clear();
                self.done = true;
                return Some(Err(error));
            }
        }
    }
}
