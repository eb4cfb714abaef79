//! Tokenizer abstraction consumed by the chunkers
//!
//! All indexes are byte offsets into the given text and always fall on a
//! `char` boundary, so `&text[..index]` is always valid.

use itertools::Itertools;

/// Result of a budget lookup on a text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenIndex {
    /// Byte index into `normalized` when present, otherwise into the input text
    pub index: usize,
    /// Normalized form of the input, when normalization was considered and changed it
    pub normalized: Option<String>,
    /// Token count of the selected slice
    pub token_count: usize,
}

/// Generic tokenizer trait
///
/// Abstracts the tokenizer so any implementation (HuggingFace tokenizers,
/// tiktoken, simple estimators) can drive the chunkers.
pub trait Tokenizer: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Count the tokens of `text`
    fn count_tokens(&self, text: &str, consider_normalization: bool) -> Result<usize, Self::Error>;

    /// Largest prefix of `text` holding at most `max_token_count` tokens.
    ///
    /// The returned index is the end of that prefix.
    fn index_by_token_count(
        &self,
        text: &str,
        max_token_count: usize,
        consider_normalization: bool,
    ) -> Result<TokenIndex, Self::Error>;

    /// Largest suffix of `text` holding at most `max_token_count` tokens.
    ///
    /// The returned index is the start of that suffix.
    fn index_by_token_count_from_end(
        &self,
        text: &str,
        max_token_count: usize,
        consider_normalization: bool,
    ) -> Result<TokenIndex, Self::Error>;
}

/// One token per whitespace separated word.
///
/// Normalization collapses whitespace runs into a single space.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordTokenizer;

impl WordTokenizer {
    pub fn new() -> Self {
        Self
    }

    /// (start, end) byte spans of each word
    fn word_spans(text: &str) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        let mut start = None;
        for (pos, c) in text.char_indices() {
            match (c.is_whitespace(), start) {
                (true, Some(s)) => {
                    spans.push((s, pos));
                    start = None;
                }
                (false, None) => start = Some(pos),
                _ => {}
            }
        }
        if let Some(s) = start {
            spans.push((s, text.len()));
        }
        spans
    }

    fn normalize(text: &str) -> Option<String> {
        let normalized = text.split_whitespace().join(" ");
        (normalized != text).then_some(normalized)
    }
}

impl Tokenizer for WordTokenizer {
    type Error = std::convert::Infallible;

    fn count_tokens(&self, text: &str, _consider_normalization: bool) -> Result<usize, Self::Error> {
        Ok(text.split_whitespace().count())
    }

    fn index_by_token_count(
        &self,
        text: &str,
        max_token_count: usize,
        consider_normalization: bool,
    ) -> Result<TokenIndex, Self::Error> {
        let normalized = if consider_normalization {
            Self::normalize(text)
        } else {
            None
        };
        let source = normalized.as_deref().unwrap_or(text);
        let spans = Self::word_spans(source);
        let (index, token_count) = if spans.len() <= max_token_count {
            (source.len(), spans.len())
        } else if max_token_count == 0 {
            (0, 0)
        } else {
            // the prefix runs up to the first word that no longer fits
            (spans[max_token_count].0, max_token_count)
        };
        Ok(TokenIndex {
            index,
            normalized,
            token_count,
        })
    }

    fn index_by_token_count_from_end(
        &self,
        text: &str,
        max_token_count: usize,
        consider_normalization: bool,
    ) -> Result<TokenIndex, Self::Error> {
        let normalized = if consider_normalization {
            Self::normalize(text)
        } else {
            None
        };
        let source = normalized.as_deref().unwrap_or(text);
        let spans = Self::word_spans(source);
        let (index, token_count) = if spans.len() <= max_token_count {
            (0, spans.len())
        } else if max_token_count == 0 {
            (source.len(), 0)
        } else {
            (spans[spans.len() - max_token_count].0, max_token_count)
        };
        Ok(TokenIndex {
            index,
            normalized,
            token_count,
        })
    }
}

/// Rough estimate of 4 bytes per token
#[derive(Debug, Clone, Copy)]
pub struct CharacterEstimationTokenizer {
    bytes_per_token: usize,
}

impl Default for CharacterEstimationTokenizer {
    fn default() -> Self {
        Self { bytes_per_token: 4 }
    }
}

impl CharacterEstimationTokenizer {
    pub fn new(bytes_per_token: usize) -> Self {
        Self {
            bytes_per_token: bytes_per_token.max(1),
        }
    }

    fn floor_boundary(text: &str, mut index: usize) -> usize {
        while !text.is_char_boundary(index) {
            index -= 1;
        }
        index
    }

    fn ceil_boundary(text: &str, mut index: usize) -> usize {
        while !text.is_char_boundary(index) {
            index += 1;
        }
        index
    }
}

impl Tokenizer for CharacterEstimationTokenizer {
    type Error = std::convert::Infallible;

    fn count_tokens(&self, text: &str, _consider_normalization: bool) -> Result<usize, Self::Error> {
        Ok(text.len().div_ceil(self.bytes_per_token))
    }

    fn index_by_token_count(
        &self,
        text: &str,
        max_token_count: usize,
        _consider_normalization: bool,
    ) -> Result<TokenIndex, Self::Error> {
        let limit = max_token_count.saturating_mul(self.bytes_per_token);
        let index = Self::floor_boundary(text, limit.min(text.len()));
        Ok(TokenIndex {
            index,
            normalized: None,
            token_count: index.div_ceil(self.bytes_per_token),
        })
    }

    fn index_by_token_count_from_end(
        &self,
        text: &str,
        max_token_count: usize,
        _consider_normalization: bool,
    ) -> Result<TokenIndex, Self::Error> {
        let limit = max_token_count.saturating_mul(self.bytes_per_token);
        let index = Self::ceil_boundary(text, text.len().saturating_sub(limit));
        Ok(TokenIndex {
            index,
            normalized: None,
            token_count: (text.len() - index).div_ceil(self.bytes_per_token),
        })
    }
}

#[cfg(feature = "huggingface")]
pub use self::huggingface::HuggingFaceTokenizer;

#[cfg(feature = "huggingface")]
mod huggingface {
    use super::{TokenIndex, Tokenizer};
    use crate::text::chunking::error::ChunkingError;

    /// Adapter over a HuggingFace `tokenizers` model using token byte offsets
    pub struct HuggingFaceTokenizer {
        inner: tokenizers::Tokenizer,
    }

    impl HuggingFaceTokenizer {
        pub fn new(inner: tokenizers::Tokenizer) -> Self {
            Self { inner }
        }

        pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ChunkingError> {
            tokenizers::Tokenizer::from_file(path)
                .map(Self::new)
                .map_err(|e| ChunkingError::tokenizer(e.to_string()))
        }

        fn offsets(&self, text: &str) -> Result<Vec<(usize, usize)>, ChunkingError> {
            self.inner
                .encode(text, false)
                .map(|encoding| encoding.get_offsets().to_vec())
                .map_err(|e| ChunkingError::tokenizer(e.to_string()))
        }

        fn floor_boundary(text: &str, mut index: usize) -> usize {
            index = index.min(text.len());
            while !text.is_char_boundary(index) {
                index -= 1;
            }
            index
        }
    }

    impl Tokenizer for HuggingFaceTokenizer {
        type Error = ChunkingError;

        fn count_tokens(&self, text: &str, _consider_normalization: bool) -> Result<usize, Self::Error> {
            Ok(self.offsets(text)?.len())
        }

        fn index_by_token_count(
            &self,
            text: &str,
            max_token_count: usize,
            _consider_normalization: bool,
        ) -> Result<TokenIndex, Self::Error> {
            let offsets = self.offsets(text)?;
            if offsets.len() <= max_token_count {
                return Ok(TokenIndex {
                    index: text.len(),
                    normalized: None,
                    token_count: offsets.len(),
                });
            }
            // cut where the first token that no longer fits starts
            let index = Self::floor_boundary(text, offsets[max_token_count].0);
            let token_count = offsets.iter().take_while(|(_, end)| *end <= index).count();
            Ok(TokenIndex {
                index,
                normalized: None,
                token_count,
            })
        }

        fn index_by_token_count_from_end(
            &self,
            text: &str,
            max_token_count: usize,
            _consider_normalization: bool,
        ) -> Result<TokenIndex, Self::Error> {
            let offsets = self.offsets(text)?;
            if offsets.len() <= max_token_count {
                return Ok(TokenIndex {
                    index: 0,
                    normalized: None,
                    token_count: offsets.len(),
                });
            }
            if max_token_count == 0 {
                return Ok(TokenIndex {
                    index: text.len(),
                    normalized: None,
                    token_count: 0,
                });
            }
            let mut index = offsets[offsets.len() - max_token_count].0.min(text.len());
            while !text.is_char_boundary(index) {
                index += 1;
            }
            let token_count = offsets.iter().filter(|(start, _)| *start >= index).count();
            Ok(TokenIndex {
                index,
                normalized: None,
                token_count,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_tokenizer_count() {
        let tokenizer = WordTokenizer::new();
        assert_eq!(tokenizer.count_tokens("", false).unwrap(), 0);
        assert_eq!(tokenizer.count_tokens("  one two\nthree  ", false).unwrap(), 3);
    }

    #[test]
    fn test_word_tokenizer_index_from_start() {
        let tokenizer = WordTokenizer::new();
        let text = "alpha beta gamma delta";
        let found = tokenizer.index_by_token_count(text, 2, false).unwrap();
        assert_eq!(&text[..found.index], "alpha beta ");
        assert_eq!(found.token_count, 2);
        assert!(found.normalized.is_none());

        let all = tokenizer.index_by_token_count(text, 10, false).unwrap();
        assert_eq!(all.index, text.len());
        assert_eq!(all.token_count, 4);

        let none = tokenizer.index_by_token_count(text, 0, false).unwrap();
        assert_eq!(none.index, 0);
    }

    #[test]
    fn test_word_tokenizer_index_from_end() {
        let tokenizer = WordTokenizer::new();
        let text = "alpha beta gamma delta";
        let found = tokenizer.index_by_token_count_from_end(text, 2, false).unwrap();
        assert_eq!(&text[found.index..], "gamma delta");
        assert_eq!(found.token_count, 2);

        let all = tokenizer.index_by_token_count_from_end(text, 4, false).unwrap();
        assert_eq!(all.index, 0);

        let none = tokenizer.index_by_token_count_from_end(text, 0, false).unwrap();
        assert_eq!(none.index, text.len());
    }

    #[test]
    fn test_word_tokenizer_normalization() {
        let tokenizer = WordTokenizer::new();
        let found = tokenizer
            .index_by_token_count("a   b\n\nc d", 3, true)
            .unwrap();
        assert_eq!(found.normalized.as_deref(), Some("a b c d"));
        assert_eq!(&found.normalized.unwrap()[..found.index], "a b c ");

        let unchanged = tokenizer.index_by_token_count("a b", 1, true).unwrap();
        assert!(unchanged.normalized.is_none());
    }

    #[test]
    fn test_character_estimation_tokenizer() {
        let tokenizer = CharacterEstimationTokenizer::default();
        assert_eq!(tokenizer.count_tokens("hello world test", false).unwrap(), 4);
        assert_eq!(tokenizer.count_tokens("short", false).unwrap(), 2);

        let found = tokenizer.index_by_token_count("hello world test", 2, false).unwrap();
        assert_eq!(found.index, 8);
        let found = tokenizer
            .index_by_token_count_from_end("hello world test", 1, false)
            .unwrap();
        assert_eq!(found.index, 12);
    }

    #[test]
    fn test_character_estimation_respects_char_boundaries() {
        let tokenizer = CharacterEstimationTokenizer::default();
        // each character is 3 bytes
        let text = "これはテスト";
        let found = tokenizer.index_by_token_count(text, 1, false).unwrap();
        assert_eq!(found.index, 3);
        assert!(text.is_char_boundary(found.index));

        let found = tokenizer.index_by_token_count_from_end(text, 1, false).unwrap();
        assert_eq!(found.index, 15);
        assert!(text.is_char_boundary(found.index));
    }
}
