//! Configuration and statistics for document chunking

use super::error::{ChunkingError, Result};
use super::types::ChunkKind;
use crate::text::tokenizer::Tokenizer;
use anyhow::Context;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_TOKENS_PER_CHUNK: usize = 2000;
pub const DEFAULT_OVERLAP_TOKENS: usize = 500;
pub const DEFAULT_MARKDOWN_SPLIT_LEVEL: usize = 3;
pub const DEFAULT_THRESHOLD_PERCENTILE: f64 = 95.0;

/// Token budget shared by the token-aware chunkers.
///
/// `overlap_tokens < max_tokens_per_chunk` holds after every mutation.
pub struct ChunkerOptions<T: Tokenizer> {
    tokenizer: Arc<T>,
    max_tokens_per_chunk: usize,
    overlap_tokens: usize,
    /// overlap follows the budget until set explicitly
    overlap_explicit: bool,
    consider_normalization: bool,
}

impl<T: Tokenizer> Clone for ChunkerOptions<T> {
    fn clone(&self) -> Self {
        Self {
            tokenizer: Arc::clone(&self.tokenizer),
            max_tokens_per_chunk: self.max_tokens_per_chunk,
            overlap_tokens: self.overlap_tokens,
            overlap_explicit: self.overlap_explicit,
            consider_normalization: self.consider_normalization,
        }
    }
}

impl<T: Tokenizer> std::fmt::Debug for ChunkerOptions<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkerOptions")
            .field("tokenizer", &std::any::type_name::<T>())
            .field("max_tokens_per_chunk", &self.max_tokens_per_chunk)
            .field("overlap_tokens", &self.overlap_tokens)
            .field("consider_normalization", &self.consider_normalization)
            .finish()
    }
}

impl<T: Tokenizer> ChunkerOptions<T> {
    pub fn new(tokenizer: T) -> Self {
        Self::from_arc(Arc::new(tokenizer))
    }

    /// Share a tokenizer that is already behind an `Arc`
    pub fn from_arc(tokenizer: Arc<T>) -> Self {
        Self {
            tokenizer,
            max_tokens_per_chunk: DEFAULT_MAX_TOKENS_PER_CHUNK,
            overlap_tokens: DEFAULT_OVERLAP_TOKENS,
            overlap_explicit: false,
            consider_normalization: false,
        }
    }

    /// Build options from deserialized settings
    pub fn from_settings(tokenizer: T, settings: &ChunkerSettings) -> Result<Self> {
        let mut options = Self::new(tokenizer);
        if let Some(max) = settings.max_tokens_per_chunk {
            options.set_max_tokens_per_chunk(max)?;
        }
        if let Some(overlap) = settings.overlap_tokens {
            options.set_overlap_tokens(overlap)?;
        }
        options.consider_normalization = settings.consider_normalization;
        Ok(options)
    }

    pub fn with_max_tokens_per_chunk(mut self, max_tokens_per_chunk: usize) -> Result<Self> {
        self.set_max_tokens_per_chunk(max_tokens_per_chunk)?;
        Ok(self)
    }

    pub fn with_overlap_tokens(mut self, overlap_tokens: usize) -> Result<Self> {
        self.set_overlap_tokens(overlap_tokens)?;
        Ok(self)
    }

    pub fn with_consider_normalization(mut self, consider_normalization: bool) -> Self {
        self.consider_normalization = consider_normalization;
        self
    }

    pub fn set_max_tokens_per_chunk(&mut self, max_tokens_per_chunk: usize) -> Result<()> {
        if max_tokens_per_chunk == 0 {
            return Err(ChunkingError::configuration(
                "max_tokens_per_chunk must be greater than 0",
            ));
        }
        if !self.overlap_explicit {
            self.overlap_tokens = if max_tokens_per_chunk <= DEFAULT_OVERLAP_TOKENS {
                0
            } else {
                DEFAULT_OVERLAP_TOKENS
            };
        } else if self.overlap_tokens >= max_tokens_per_chunk {
            return Err(ChunkingError::configuration(format!(
                "max_tokens_per_chunk ({max_tokens_per_chunk}) must be greater than overlap_tokens ({})",
                self.overlap_tokens
            )));
        }
        self.max_tokens_per_chunk = max_tokens_per_chunk;
        Ok(())
    }

    pub fn set_overlap_tokens(&mut self, overlap_tokens: usize) -> Result<()> {
        if overlap_tokens >= self.max_tokens_per_chunk {
            return Err(ChunkingError::configuration(format!(
                "overlap_tokens ({overlap_tokens}) must be less than max_tokens_per_chunk ({})",
                self.max_tokens_per_chunk
            )));
        }
        self.overlap_tokens = overlap_tokens;
        self.overlap_explicit = true;
        Ok(())
    }

    pub fn tokenizer(&self) -> &T {
        &self.tokenizer
    }

    pub fn max_tokens_per_chunk(&self) -> usize {
        self.max_tokens_per_chunk
    }

    pub fn overlap_tokens(&self) -> usize {
        self.overlap_tokens
    }

    pub fn consider_normalization(&self) -> bool {
        self.consider_normalization
    }
}

/// Chunking strategy selectable from settings
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    /// Pack elements under the path of preceding headers
    #[default]
    HeaderPath,
    /// Pack elements under the context of their enclosing sections
    SectionTree,
    /// Split on header boundaries only, not token-aware
    Markdown,
    /// Split where adjacent embeddings diverge, then pack
    Semantic,
    /// Fixed token windows over sections with overlap
    TokenWindow,
}

impl ChunkingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkingStrategy::HeaderPath => "header_path",
            ChunkingStrategy::SectionTree => "section_tree",
            ChunkingStrategy::Markdown => "markdown",
            ChunkingStrategy::Semantic => "semantic",
            ChunkingStrategy::TokenWindow => "token_window",
        }
    }
}

/// Serializable chunker knobs, usually read from `CHUNKER_*` variables
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ChunkerSettings {
    #[serde(default)]
    pub strategy: ChunkingStrategy,
    pub max_tokens_per_chunk: Option<usize>,
    pub overlap_tokens: Option<usize>,
    #[serde(default)]
    pub consider_normalization: bool,
    pub markdown_split_level: Option<usize>,
    #[serde(default)]
    pub strip_headers: bool,
    pub threshold_percentile: Option<f64>,
}

impl ChunkerSettings {
    pub fn markdown_split_level(&self) -> usize {
        self.markdown_split_level
            .unwrap_or(DEFAULT_MARKDOWN_SPLIT_LEVEL)
    }

    pub fn threshold_percentile(&self) -> f64 {
        self.threshold_percentile
            .unwrap_or(DEFAULT_THRESHOLD_PERCENTILE)
    }
}

pub fn load_chunker_settings_from_env() -> anyhow::Result<ChunkerSettings> {
    envy::prefixed("CHUNKER_")
        .from_env::<ChunkerSettings>()
        .context("cannot read chunker settings from env:")
}

/// Counters collected over one chunking pass
#[derive(Debug, Clone, Default)]
pub struct ChunkingStatistics {
    pub total_processing_time: Duration,

    /// Input statistics
    pub processed_element_count: usize,
    pub skipped_element_count: usize,
    pub split_element_count: usize,
    pub split_table_count: usize,

    /// Output chunk statistics
    pub total_chunks_created: usize,
    pub packed_chunks: usize,
    pub table_row_chunks: usize,
    pub split_element_chunks: usize,
    pub window_chunks: usize,
    pub section_chunks: usize,

    /// Token statistics
    pub total_tokens: usize,
    pub avg_tokens_per_chunk: f32,
    pub max_tokens_in_chunk: usize,
    pub min_tokens_in_chunk: usize,

    pub chunks_per_second: f32,
}

impl ChunkingStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish_total_timing(&mut self, start: Instant) {
        self.total_processing_time = start.elapsed();
    }

    pub fn record_element(&mut self) {
        self.processed_element_count += 1;
    }

    pub fn record_skipped_element(&mut self) {
        self.skipped_element_count += 1;
    }

    pub fn record_split_element(&mut self) {
        self.split_element_count += 1;
    }

    pub fn record_split_table(&mut self) {
        self.split_table_count += 1;
    }

    pub fn record_chunk(&mut self, kind: ChunkKind, token_count: Option<usize>) {
        self.total_chunks_created += 1;
        match kind {
            ChunkKind::Packed => self.packed_chunks += 1,
            ChunkKind::TableRows => self.table_row_chunks += 1,
            ChunkKind::SplitElement => self.split_element_chunks += 1,
            ChunkKind::Window => self.window_chunks += 1,
            ChunkKind::Section => self.section_chunks += 1,
        }
        if let Some(tokens) = token_count {
            self.total_tokens += tokens;
            if self.max_tokens_in_chunk == 0 || tokens > self.max_tokens_in_chunk {
                self.max_tokens_in_chunk = tokens;
            }
            if self.min_tokens_in_chunk == 0 || tokens < self.min_tokens_in_chunk {
                self.min_tokens_in_chunk = tokens;
            }
        }
    }

    /// Call after all processing is complete
    pub fn calculate_derived_metrics(&mut self) {
        if self.total_chunks_created > 0 {
            self.avg_tokens_per_chunk = self.total_tokens as f32 / self.total_chunks_created as f32;
        }
        let total_seconds = self.total_processing_time.as_secs_f32();
        if total_seconds > 0.0 {
            self.chunks_per_second = self.total_chunks_created as f32 / total_seconds;
        }
    }

    /// Get summary as string for logging
    pub fn summary(&self) -> String {
        format!(
            "Chunking Stats: {} elements ({} skipped, {} split, {} tables split) -> {} chunks \
            ({:.1} avg tokens/chunk, max {}) in {:.2}ms | {:.1} chunks/s",
            self.processed_element_count,
            self.skipped_element_count,
            self.split_element_count,
            self.split_table_count,
            self.total_chunks_created,
            self.avg_tokens_per_chunk,
            self.max_tokens_in_chunk,
            self.total_processing_time.as_secs_f64() * 1000.0,
            self.chunks_per_second
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::tokenizer::WordTokenizer;

    #[test]
    fn test_default_options() {
        let options = ChunkerOptions::new(WordTokenizer);
        assert_eq!(options.max_tokens_per_chunk(), 2000);
        assert_eq!(options.overlap_tokens(), 500);
        assert!(!options.consider_normalization());
    }

    #[test]
    fn test_small_budget_drops_default_overlap() {
        let options = ChunkerOptions::new(WordTokenizer)
            .with_max_tokens_per_chunk(500)
            .unwrap();
        assert_eq!(options.overlap_tokens(), 0);

        let options = options.with_max_tokens_per_chunk(501).unwrap();
        assert_eq!(options.overlap_tokens(), 500);
    }

    #[test]
    fn test_options_validation() {
        assert!(
            ChunkerOptions::new(WordTokenizer)
                .with_max_tokens_per_chunk(0)
                .is_err()
        );

        let options = ChunkerOptions::new(WordTokenizer)
            .with_max_tokens_per_chunk(100)
            .unwrap();
        assert!(options.clone().with_overlap_tokens(100).is_err());
        assert!(options.clone().with_overlap_tokens(0).is_ok());

        let mut options = options.with_overlap_tokens(40).unwrap();
        // explicit overlap now constrains the budget
        assert!(matches!(
            options.set_max_tokens_per_chunk(40),
            Err(ChunkingError::Configuration(_))
        ));
        assert_eq!(options.max_tokens_per_chunk(), 100);
        assert!(options.set_max_tokens_per_chunk(41).is_ok());
        assert_eq!(options.overlap_tokens(), 40);
    }

    #[test]
    fn test_options_from_settings() {
        let settings = ChunkerSettings {
            max_tokens_per_chunk: Some(300),
            overlap_tokens: Some(30),
            consider_normalization: true,
            ..Default::default()
        };
        let options = ChunkerOptions::from_settings(WordTokenizer, &settings).unwrap();
        assert_eq!(options.max_tokens_per_chunk(), 300);
        assert_eq!(options.overlap_tokens(), 30);
        assert!(options.consider_normalization());

        let invalid = ChunkerSettings {
            max_tokens_per_chunk: Some(10),
            overlap_tokens: Some(10),
            ..Default::default()
        };
        assert!(ChunkerOptions::from_settings(WordTokenizer, &invalid).is_err());
    }

    #[test]
    fn test_settings_from_env_vars() {
        let vars = vec![
            ("CHUNKER_MAX_TOKENS_PER_CHUNK".to_string(), "512".to_string()),
            ("CHUNKER_STRIP_HEADERS".to_string(), "true".to_string()),
            ("CHUNKER_THRESHOLD_PERCENTILE".to_string(), "90.5".to_string()),
            ("CHUNKER_STRATEGY".to_string(), "token_window".to_string()),
        ];
        let settings: ChunkerSettings = envy::prefixed("CHUNKER_").from_iter(vars).unwrap();
        assert_eq!(settings.max_tokens_per_chunk, Some(512));
        assert!(settings.strip_headers);
        assert!(!settings.consider_normalization);
        assert_eq!(settings.threshold_percentile(), 90.5);
        assert_eq!(settings.markdown_split_level(), DEFAULT_MARKDOWN_SPLIT_LEVEL);
        assert_eq!(settings.strategy, ChunkingStrategy::TokenWindow);

        let defaults: ChunkerSettings = envy::prefixed("CHUNKER_")
            .from_iter(Vec::<(String, String)>::new())
            .unwrap();
        assert_eq!(defaults, ChunkerSettings::default());
        assert_eq!(defaults.strategy.as_str(), "header_path");
    }

    #[test]
    fn test_chunking_statistics() {
        let mut stats = ChunkingStatistics::new();
        stats.record_element();
        stats.record_element();
        stats.record_skipped_element();
        stats.record_split_table();
        stats.record_chunk(ChunkKind::Packed, Some(50));
        stats.record_chunk(ChunkKind::TableRows, Some(75));
        stats.record_chunk(ChunkKind::Section, None);
        stats.finish_total_timing(Instant::now() - Duration::from_millis(5));
        stats.calculate_derived_metrics();

        assert_eq!(stats.total_chunks_created, 3);
        assert_eq!(stats.packed_chunks, 1);
        assert_eq!(stats.table_row_chunks, 1);
        assert_eq!(stats.section_chunks, 1);
        assert_eq!(stats.total_tokens, 125);
        assert_eq!(stats.max_tokens_in_chunk, 75);
        assert_eq!(stats.min_tokens_in_chunk, 50);
        assert!(stats.chunks_per_second > 0.0);

        let summary = stats.summary();
        assert!(summary.contains("2 elements"));
        assert!(summary.contains("3 chunks"));
    }
}
