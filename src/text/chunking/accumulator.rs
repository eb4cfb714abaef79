//! Greedy element packer shared by the context-path chunkers
//!
//! [`ElementAccumulator`] packs an ordered list of elements into chunks that
//! never exceed the token budget, each chunk prefixed by a fixed context
//! string. Token counts are tracked incrementally so placed content is never
//! tokenized twice, and the context is tokenized once per group.
//!
//! [`ElementWindows`] drives an accumulator lazily over a sequence of
//! [`ElementGroup`]s, producing one chunk per `next()` call.

use super::{
    config::{ChunkerOptions, ChunkingStatistics},
    error::{BudgetUnit, ChunkingError, IntoChunkingError, Result},
    types::{Chunk, ChunkKind, ElementGroup},
};
use crate::document::{Document, Element, Table};
use crate::text::tokenizer::Tokenizer;
use crate::util::cancel::CancelToken;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Packs elements into token-bounded chunks under a fixed context.
///
/// The buffer is allocated once per pass and truncated back to the context on
/// every commit.
pub struct ElementAccumulator<'o, T: Tokenizer> {
    options: &'o ChunkerOptions<T>,
    document: Weak<Document>,
    buffer: String,
    context_len: usize,
    context_tokens: usize,
    /// cost of the newline joining two pieces of the buffer
    separator_tokens: usize,
    total: usize,
    kind: ChunkKind,
    next_index: usize,
    statistics: ChunkingStatistics,
}

impl<'o, T: Tokenizer> ElementAccumulator<'o, T> {
    pub fn new(options: &'o ChunkerOptions<T>, document: &Arc<Document>) -> Self {
        Self {
            options,
            document: Arc::downgrade(document),
            buffer: String::new(),
            context_len: 0,
            context_tokens: 0,
            separator_tokens: 0,
            total: 0,
            kind: ChunkKind::Packed,
            next_index: 0,
            statistics: ChunkingStatistics::new(),
        }
    }

    /// Pack `elements` under `context` and return every chunk at once
    pub fn process<'e>(
        &mut self,
        context: &str,
        elements: impl IntoIterator<Item = &'e Element>,
    ) -> Result<Vec<Chunk>> {
        let mut out = VecDeque::new();
        self.begin(context)?;
        for element in elements {
            self.push(element, &mut out)?;
        }
        self.finish(&mut out);
        Ok(out.into())
    }

    /// Start a new group under `context`.
    ///
    /// Fails when the context alone does not leave room for any content.
    pub fn begin(&mut self, context: &str) -> Result<()> {
        let max = self.max_tokens();
        let context_tokens = self.count_tokens(context)?;
        if context_tokens >= max {
            warn!(
                "context uses {} tokens, budget is {} tokens",
                context_tokens, max
            );
            return Err(ChunkingError::budget_exceeded(BudgetUnit::Context, max));
        }
        self.separator_tokens = self.count_tokens("\n")?;
        self.buffer.clear();
        self.buffer.push_str(context);
        self.context_len = context.len();
        self.context_tokens = context_tokens;
        self.total = context_tokens;
        self.kind = ChunkKind::Packed;
        Ok(())
    }

    /// Place one element, committing finished chunks into `out`
    pub fn push(&mut self, element: &Element, out: &mut VecDeque<Chunk>) -> Result<()> {
        let content = element.semantic_content();
        if content.is_empty() {
            self.statistics.record_skipped_element();
            return Ok(());
        }
        self.statistics.record_element();

        let max = self.max_tokens();
        let tokens = self.count_tokens(&content)?;
        if self.total + self.separator_cost() + tokens > max
            && self.has_content()
            && self.context_tokens + self.fresh_separator_cost() + tokens <= max
        {
            // fits whole in a fresh chunk
            self.commit(out);
        }

        let cost = self.separator_cost() + tokens;
        if self.total + cost <= max {
            self.append(&content);
            self.total += cost;
        } else {
            match element {
                Element::Table(table) => self.push_table(table, out)?,
                _ => self.push_oversized(content.into_owned(), out)?,
            }
        }

        if self.total >= max {
            self.commit(out);
        }
        Ok(())
    }

    /// Emit whatever is left beyond the context
    pub fn finish(&mut self, out: &mut VecDeque<Chunk>) {
        self.commit(out);
    }

    pub fn statistics(&self) -> &ChunkingStatistics {
        &self.statistics
    }

    fn push_table(&mut self, table: &Table, out: &mut VecDeque<Chunk>) -> Result<()> {
        let max = self.max_tokens();
        let header = table.header_markdown();
        let header_tokens = self.count_tokens(&header)?;
        if self.context_tokens + self.fresh_separator_cost() + header_tokens >= max {
            warn!(
                "table header uses {} tokens with {} context tokens, budget is {} tokens",
                header_tokens, self.context_tokens, max
            );
            return Err(ChunkingError::budget_exceeded(BudgetUnit::TableHeader, max));
        }
        self.statistics.record_split_table();

        if self.total + self.separator_cost() + header_tokens >= max {
            // no room left to start the table here
            self.commit(out);
        }
        let mut before_header = self.total;
        self.total += self.separator_cost() + header_tokens;

        let mut rows = header.clone();
        let mut rows_in_chunk = 0;
        for row in 1..table.row_count() {
            let row_markdown = table.row_markdown(row);
            let row_tokens = self.separator_tokens + self.count_tokens(&row_markdown)?;

            if self.total + row_tokens > max {
                if rows_in_chunk > 0 {
                    self.append(&rows);
                    self.kind = ChunkKind::TableRows;
                } else {
                    // header was never placed
                    self.total = before_header;
                }
                self.commit(out);
                rows.truncate(header.len());
                rows_in_chunk = 0;
                before_header = self.total;
                self.total += self.separator_cost() + header_tokens;

                if self.total + row_tokens > max {
                    warn!(
                        "table row {} uses {} tokens, does not fit a fresh chunk of {} tokens",
                        row, row_tokens, max
                    );
                    return Err(ChunkingError::budget_exceeded(BudgetUnit::TableRow, max));
                }
            }

            rows.push('\n');
            rows.push_str(&row_markdown);
            rows_in_chunk += 1;
            self.total += row_tokens;
        }

        self.append(&rows);
        self.kind = ChunkKind::TableRows;
        Ok(())
    }

    fn push_oversized(&mut self, mut text: String, out: &mut VecDeque<Chunk>) -> Result<()> {
        let max = self.max_tokens();
        let consider_normalization = self.options.consider_normalization();
        self.statistics.record_split_element();
        debug!(
            "splitting element of {} bytes into the remaining {} tokens",
            text.len(),
            max.saturating_sub(self.total + self.separator_cost())
        );

        let mut offset = 0;
        while offset < text.len() {
            let separator = self.separator_cost();
            let budget = max.saturating_sub(self.total + separator);
            let found = self
                .options
                .tokenizer()
                .index_by_token_count(&text[offset..], budget, consider_normalization)
                .into_chunking_error()?;
            if let Some(normalized) = found.normalized {
                // indexes now refer to the normalized remainder
                text = normalized;
                offset = 0;
            }
            let window = &text[offset..];
            let mut index = found.index.min(window.len());
            let mut tokens = found.token_count;

            if index > 0 {
                if index < window.len() {
                    if let Some(newline) = window[..index].rfind('\n').filter(|nl| *nl > 0) {
                        if newline + 1 < index {
                            index = newline + 1;
                            tokens = self.count_tokens(&window[..index])?;
                        }
                    }
                }
                self.append(&window[..index]);
                self.total += separator + tokens;
                self.kind = ChunkKind::SplitElement;
                offset += index;
            } else if !self.has_content() {
                warn!(
                    "not even a single token fits after {} context tokens, budget is {} tokens",
                    self.context_tokens, max
                );
                return Err(ChunkingError::budget_exceeded(BudgetUnit::Content, max));
            }

            if offset < text.len() {
                self.commit(out);
            }
        }
        Ok(())
    }

    fn commit(&mut self, out: &mut VecDeque<Chunk>) {
        if self.has_content() {
            let chunk = Chunk::new(
                self.buffer.clone(),
                self.buffer[..self.context_len].to_string(),
                self.document.clone(),
                self.kind,
                Some(self.total),
                self.next_index,
            );
            debug!(
                "committed chunk {}: {} tokens, {} bytes ({})",
                chunk.index,
                self.total,
                chunk.content.len(),
                chunk.kind
            );
            self.statistics.record_chunk(self.kind, Some(self.total));
            self.next_index += 1;
            out.push_back(chunk);
        }
        self.buffer.truncate(self.context_len);
        self.total = self.context_tokens;
        self.kind = ChunkKind::Packed;
    }

    fn append(&mut self, text: &str) {
        if !self.buffer.is_empty() {
            self.buffer.push('\n');
        }
        self.buffer.push_str(text);
    }

    /// Separator cost of appending to the buffer as it is now
    fn separator_cost(&self) -> usize {
        if self.buffer.is_empty() {
            0
        } else {
            self.separator_tokens
        }
    }

    /// Separator cost of the first piece after a commit
    fn fresh_separator_cost(&self) -> usize {
        if self.context_len == 0 {
            0
        } else {
            self.separator_tokens
        }
    }

    fn has_content(&self) -> bool {
        self.buffer.len() > self.context_len
    }

    fn max_tokens(&self) -> usize {
        self.options.max_tokens_per_chunk()
    }

    fn count_tokens(&self, text: &str) -> Result<usize> {
        self.options
            .tokenizer()
            .count_tokens(text, self.options.consider_normalization())
            .into_chunking_error()
    }
}

/// Lazy chunk sequence over element groups.
///
/// Cancellation is checked before every step. Once an error is returned the
/// sequence is over and chunks buffered for the in-progress group are dropped.
pub struct ElementWindows<'a, T: Tokenizer, G> {
    accumulator: ElementAccumulator<'a, T>,
    groups: G,
    current: Option<std::vec::IntoIter<&'a Element>>,
    ready: VecDeque<Chunk>,
    cancel: CancelToken,
    started: Instant,
    done: bool,
}

impl<'a, T, G> ElementWindows<'a, T, G>
where
    T: Tokenizer,
    G: Iterator<Item = Result<ElementGroup<'a>>>,
{
    pub fn new(
        options: &'a ChunkerOptions<T>,
        document: &Arc<Document>,
        groups: G,
        cancel: CancelToken,
    ) -> Self {
        Self {
            accumulator: ElementAccumulator::new(options, document),
            groups,
            current: None,
            ready: VecDeque::new(),
            cancel,
            started: Instant::now(),
            done: false,
        }
    }

    pub fn statistics(&self) -> &ChunkingStatistics {
        self.accumulator.statistics()
    }

    fn step(&mut self) -> Result<()> {
        match &mut self.current {
            Some(elements) => match elements.next() {
                Some(element) => self.accumulator.push(element, &mut self.ready),
                None => {
                    self.accumulator.finish(&mut self.ready);
                    self.current = None;
                    Ok(())
                }
            },
            None => match self.groups.next() {
                Some(group) => {
                    let group = group?;
                    if !group.is_empty() {
                        self.accumulator.begin(&group.context)?;
                        self.current = Some(group.elements.into_iter());
                    }
                    Ok(())
                }
                None => {
                    self.done = true;
                    self.finish_statistics();
                    Ok(())
                }
            },
        }
    }

    fn finish_statistics(&mut self) {
        let stats = &mut self.accumulator.statistics;
        stats.finish_total_timing(self.started);
        stats.calculate_derived_metrics();
        info!(
            "element chunking completed: {} chunks",
            stats.total_chunks_created
        );
        debug!("{}", stats.summary());
    }

    fn fail(&mut self, error: ChunkingError) -> Option<Result<Chunk>> {
        self.ready.clear();
        self.current = None;
        self.done = true;
        Some(Err(error))
    }
}

impl<'a, T, G> Iterator for ElementWindows<'a, T, G>
where
    T: Tokenizer,
    G: Iterator<Item = Result<ElementGroup<'a>>>,
{
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if !self.done && self.cancel.is_cancelled() {
                return self.fail(ChunkingError::Cancelled);
            }
            if let Some(chunk) = self.ready.pop_front() {
                return Some(Ok(chunk));
            }
            if self.done {
                return None;
            }
            if let Err(error) = self.step() {
                return self.fail(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Image, Paragraph, Table};
    use crate::text::tokenizer::{CharacterEstimationTokenizer, TokenIndex, WordTokenizer};
    use crate::util::cancel::cancel_pair;
    use itertools::Itertools;

    fn words(prefix: &str, count: usize) -> String {
        (0..count).map(|i| format!("{prefix}{i}")).join(" ")
    }

    fn options(max: usize) -> ChunkerOptions<WordTokenizer> {
        ChunkerOptions::new(WordTokenizer)
            .with_max_tokens_per_chunk(max)
            .unwrap()
            .with_overlap_tokens(0)
            .unwrap()
    }

    fn paragraph(text: impl Into<String>) -> Element {
        Element::Paragraph(Paragraph::new(text))
    }

    fn doc() -> Arc<Document> {
        Arc::new(Document::new("test"))
    }

    #[test]
    fn test_packs_whole_paragraphs() {
        let options = options(25);
        let doc = doc();
        let elements = [
            paragraph(words("a", 10)),
            paragraph(words("b", 10)),
            paragraph(words("c", 10)),
        ];
        let chunks = ElementAccumulator::new(&options, &doc)
            .process("", &elements)
            .unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, format!("{}\n{}", words("a", 10), words("b", 10)));
        assert_eq!(chunks[0].token_count, Some(20));
        assert_eq!(chunks[1].content, words("c", 10));
        assert_eq!(chunks[1].token_count, Some(10));
        assert_eq!(chunks[0].kind, ChunkKind::Packed);
        assert_eq!((chunks[0].index, chunks[1].index), (0, 1));
    }

    #[test]
    fn test_table_rows_repeat_header() {
        // header + separator = 6 tokens, each row = 3 tokens
        let options = options(12);
        let doc = doc();
        let table = Table::from_text_rows([["h"], ["r1"], ["r2"], ["r3"], ["r4"], ["r5"]]);
        let elements = [Element::Table(table)];
        let chunks = ElementAccumulator::new(&options, &doc)
            .process("", &elements)
            .unwrap();

        let header = "| h |\n| --- |";
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].content, format!("{header}\n| r1 |\n| r2 |"));
        assert_eq!(chunks[1].content, format!("{header}\n| r3 |\n| r4 |"));
        assert_eq!(chunks[2].content, format!("{header}\n| r5 |"));
        assert_eq!(chunks[0].token_count, Some(12));
        assert_eq!(chunks[2].token_count, Some(9));
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::TableRows));
    }

    #[test]
    fn test_table_never_splits_a_row() {
        let options = options(20);
        let doc = doc();
        let rows: Vec<Vec<String>> = std::iter::once(vec!["name".to_string(), "value".to_string()])
            .chain((0..12).map(|i| vec![format!("row{i}"), words("v", i % 4 + 1)]))
            .collect();
        let table = Table::from_text_rows(rows);
        let elements = [paragraph(words("p", 5)), Element::Table(table.clone())];
        let chunks = ElementAccumulator::new(&options, &doc)
            .process("# Ctx", &elements)
            .unwrap();

        for row in 1..table.row_count() {
            let line = table.row_markdown(row);
            let holders = chunks
                .iter()
                .filter(|c| c.content.lines().any(|l| l == line))
                .count();
            assert_eq!(holders, 1, "row {row} must appear whole in exactly one chunk");
        }
        for chunk in &chunks {
            assert!(WordTokenizer.count_tokens(&chunk.content, false).unwrap() <= 20);
            assert!(chunk.content.starts_with("# Ctx\n"));
        }
    }

    #[test]
    fn test_oversized_paragraph_is_sliced_under_context() {
        let options = options(5);
        let doc = doc();
        let elements = [paragraph(words("w", 10))];
        let chunks = ElementAccumulator::new(&options, &doc)
            .process("ctx one two", &elements)
            .unwrap();

        assert_eq!(chunks.len(), 5);
        for (i, chunk) in chunks.iter().enumerate() {
            assert!(chunk.content.starts_with("ctx one two\n"));
            assert_eq!(chunk.context, "ctx one two");
            assert_eq!(chunk.token_count, Some(5));
            assert_eq!(chunk.kind, ChunkKind::SplitElement);
            let body: Vec<_> = chunk.body().split_whitespace().collect();
            assert_eq!(body, vec![format!("w{}", i * 2), format!("w{}", i * 2 + 1)]);
        }
    }

    #[test]
    fn test_oversized_element_fills_remaining_budget_first() {
        let options = options(8);
        let doc = doc();
        let elements = [paragraph(words("a", 3)), paragraph(words("b", 12))];
        let chunks = ElementAccumulator::new(&options, &doc)
            .process("", &elements)
            .unwrap();

        assert_eq!(chunks[0].content, format!("{}\nb0 b1 b2 b3 b4 ", words("a", 3)));
        assert_eq!(chunks[0].token_count, Some(8));
        let rebuilt = chunks
            .iter()
            .flat_map(|c| c.content.split_whitespace())
            .filter(|w| w.starts_with('b'))
            .join(" ");
        assert_eq!(rebuilt, words("b", 12));
    }

    #[test]
    fn test_split_backs_off_to_newline() {
        let options = options(4);
        let doc = doc();
        let elements = [paragraph("a b c\nd e f g")];
        let chunks = ElementAccumulator::new(&options, &doc)
            .process("", &elements)
            .unwrap();

        let contents: Vec<_> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["a b c\n", "d e f g"]);
        assert_eq!(chunks[0].token_count, Some(3));
        assert_eq!(chunks[1].token_count, Some(4));
    }

    #[test]
    fn test_commits_when_budget_reached_exactly() {
        let options = options(4);
        let doc = doc();
        let elements = [paragraph("a b"), paragraph("c d"), paragraph("e")];
        let chunks = ElementAccumulator::new(&options, &doc)
            .process("", &elements)
            .unwrap();
        let contents: Vec<_> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["a b\nc d", "e"]);
    }

    fn estimated(max: usize) -> ChunkerOptions<CharacterEstimationTokenizer> {
        ChunkerOptions::new(CharacterEstimationTokenizer::default())
            .with_max_tokens_per_chunk(max)
            .unwrap()
    }

    #[test]
    fn test_newline_separator_counts_against_budget() {
        // "\n" costs one estimated token on its own
        let options = estimated(2);
        let doc = doc();
        let elements = [paragraph("aaaa"), paragraph("bbbb")];
        let chunks = ElementAccumulator::new(&options, &doc)
            .process("", &elements)
            .unwrap();

        let contents: Vec<_> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["aaaa", "bbbb"]);
        assert!(chunks.iter().all(|c| c.token_count == Some(1)));
    }

    #[test]
    fn test_estimated_tokens_stay_within_budget() {
        let options = estimated(12);
        let doc = doc();
        let rows: Vec<Vec<String>> = std::iter::once(vec!["h".to_string()])
            .chain((1..=6).map(|i| vec![format!("r{i}")]))
            .collect();
        let long = (0..20).map(|_| "cccc").join("\n");
        let elements = [
            paragraph("aaaa"),
            paragraph("bbbbbbbb"),
            Element::Table(Table::from_text_rows(rows)),
            paragraph(long),
        ];
        let chunks = ElementAccumulator::new(&options, &doc)
            .process("ctx", &elements)
            .unwrap();

        assert!(chunks.len() > 3);
        let tokenizer = CharacterEstimationTokenizer::default();
        for chunk in &chunks {
            let recounted = tokenizer.count_tokens(&chunk.content, false).unwrap();
            assert!(
                recounted <= 12,
                "{recounted} tokens in {:?}",
                chunk.content
            );
            assert!(chunk.token_count.unwrap() <= 12);
            assert!(recounted <= chunk.token_count.unwrap());
            assert!(chunk.content.starts_with("ctx\n"));
        }
        assert!(chunks.iter().any(|c| c.kind == ChunkKind::TableRows));
        let c_count: usize = chunks.iter().map(|c| c.content.matches("cccc").count()).sum();
        assert_eq!(c_count, 20);
    }

    #[test]
    fn test_skips_images_without_text() {
        let options = options(10);
        let doc = doc();
        let elements = [
            Element::Image(Image::new().with_source("x.png")),
            paragraph("visible"),
            Element::Image(Image::new().with_alternative_text("a chart")),
        ];
        let mut accumulator = ElementAccumulator::new(&options, &doc);
        let chunks = accumulator.process("", &elements).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "visible\na chart");
        assert_eq!(accumulator.statistics().skipped_element_count, 1);
        assert_eq!(accumulator.statistics().processed_element_count, 2);
    }

    #[test]
    fn test_context_alone_exceeding_budget_fails() {
        let options = options(3);
        let doc = doc();
        let elements = [paragraph("body")];
        let err = ElementAccumulator::new(&options, &doc)
            .process("one two three", &elements)
            .unwrap_err();
        assert!(matches!(
            err,
            ChunkingError::TokenBudgetExceeded {
                unit: BudgetUnit::Context,
                max_tokens: 3
            }
        ));
    }

    #[test]
    fn test_table_header_exceeding_budget_fails() {
        let options = options(6);
        let doc = doc();
        let table = Table::from_text_rows([["h"], ["r1"], ["r2"], ["r3"]]);
        let err = ElementAccumulator::new(&options, &doc)
            .process("", &[Element::Table(table)])
            .unwrap_err();
        assert!(matches!(
            err,
            ChunkingError::TokenBudgetExceeded {
                unit: BudgetUnit::TableHeader,
                ..
            }
        ));
    }

    #[test]
    fn test_table_row_exceeding_fresh_chunk_fails() {
        let options = options(10);
        let doc = doc();
        let long_cell = words("x", 8);
        let table = Table::from_text_rows([vec!["h".to_string()], vec!["ok".to_string()], vec![long_cell]]);
        let err = ElementAccumulator::new(&options, &doc)
            .process("", &[Element::Table(table)])
            .unwrap_err();
        assert!(matches!(
            err,
            ChunkingError::TokenBudgetExceeded {
                unit: BudgetUnit::TableRow,
                ..
            }
        ));
    }

    /// Treats any text as a single unbreakable unit worth one token per word
    struct IndivisibleTokenizer;

    impl Tokenizer for IndivisibleTokenizer {
        type Error = std::convert::Infallible;

        fn count_tokens(&self, text: &str, _: bool) -> std::result::Result<usize, Self::Error> {
            Ok(text.split_whitespace().count())
        }

        fn index_by_token_count(
            &self,
            text: &str,
            max_token_count: usize,
            _: bool,
        ) -> std::result::Result<TokenIndex, Self::Error> {
            let count = text.split_whitespace().count();
            let index = if count <= max_token_count { text.len() } else { 0 };
            Ok(TokenIndex {
                index,
                normalized: None,
                token_count: if index == 0 { 0 } else { count },
            })
        }

        fn index_by_token_count_from_end(
            &self,
            text: &str,
            max_token_count: usize,
            consider_normalization: bool,
        ) -> std::result::Result<TokenIndex, Self::Error> {
            self.index_by_token_count(text, max_token_count, consider_normalization)
        }
    }

    #[test]
    fn test_unsplittable_content_fails() {
        let options = ChunkerOptions::new(IndivisibleTokenizer)
            .with_max_tokens_per_chunk(5)
            .unwrap();
        let doc = doc();
        let elements = [paragraph("short"), paragraph(words("w", 10))];
        let err = ElementAccumulator::new(&options, &doc)
            .process("", &elements)
            .unwrap_err();
        assert!(matches!(
            err,
            ChunkingError::TokenBudgetExceeded {
                unit: BudgetUnit::Content,
                max_tokens: 5
            }
        ));
    }

    #[test]
    fn test_normalized_text_is_used_for_slices() {
        let options = options(3).with_consider_normalization(true);
        let doc = doc();
        let elements = [paragraph("a   b\n\nc d   e f")];
        let chunks = ElementAccumulator::new(&options, &doc)
            .process("", &elements)
            .unwrap();
        let contents: Vec<_> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["a b c ", "d e f"]);
    }

    #[test]
    fn test_windows_are_lazy_and_idempotent() {
        let options = options(6);
        let doc = doc();
        let elements: Vec<Element> = (0..6).map(|i| paragraph(words(&format!("p{i}_"), 4))).collect();
        let groups = || {
            vec![
                Ok(ElementGroup::new("A", elements[..3].iter().collect())),
                Ok(ElementGroup::new("", Vec::new())),
                Ok(ElementGroup::new("B", elements[3..].iter().collect())),
            ]
            .into_iter()
        };

        let mut windows = ElementWindows::new(&options, &doc, groups(), CancelToken::none());
        let first = windows.next().unwrap().unwrap();
        assert_eq!(first.context, "A");
        assert_eq!(windows.statistics().processed_element_count, 2);

        let rest: Vec<_> = windows.collect::<Result<_>>().unwrap();
        let mut all = vec![first];
        all.extend(rest);
        assert_eq!(all.len(), 6);
        assert!(all[3..].iter().all(|c| c.context == "B"));

        let again: Vec<_> = ElementWindows::new(&options, &doc, groups(), CancelToken::none())
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(all, again);
    }

    #[test]
    fn test_windows_stop_on_cancel() {
        let options = options(6);
        let doc = doc();
        let elements: Vec<Element> = (0..4).map(|i| paragraph(words(&format!("p{i}_"), 4))).collect();
        let groups = vec![Ok(ElementGroup::new("", elements.iter().collect()))].into_iter();
        let (token, trigger) = cancel_pair();
        let mut windows = ElementWindows::new(&options, &doc, groups, token);

        assert!(windows.next().unwrap().is_ok());
        trigger.cancel();
        assert!(matches!(windows.next(), Some(Err(ChunkingError::Cancelled))));
        assert!(windows.next().is_none());
    }

    #[test]
    fn test_windows_end_after_error() {
        let options = options(2);
        let doc = doc();
        let elements = [paragraph("x")];
        let groups = vec![
            Ok(ElementGroup::new("way too long context", elements.iter().collect())),
            Ok(ElementGroup::new("", elements.iter().collect())),
        ]
        .into_iter();
        let mut windows = ElementWindows::new(&options, &doc, groups, CancelToken::none());
        assert!(matches!(
            windows.next(),
            Some(Err(ChunkingError::TokenBudgetExceeded { .. }))
        ));
        assert!(windows.next().is_none());
    }
}
