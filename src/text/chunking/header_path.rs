//! Header-path chunker
//!
//! Walks the flattened element sequence and packs the elements between two
//! headers under the path of headers seen so far. Headers only ever appear
//! as context, never as chunk body.

use super::{
    accumulator::ElementWindows,
    chunker::DocumentChunker,
    config::ChunkerOptions,
    error::Result,
    types::{Chunk, ElementGroup},
};
use crate::document::{Content, Document, Element};
use crate::text::tokenizer::Tokenizer;
use crate::util::cancel::CancelToken;
use futures::stream::{self, BoxStream, StreamExt};
use itertools::Itertools;
use std::sync::Arc;

pub const MAX_HEADER_LEVELS: usize = 10;

pub struct HeaderPathChunker<T: Tokenizer> {
    options: ChunkerOptions<T>,
}

impl<T: Tokenizer> HeaderPathChunker<T> {
    pub fn new(options: ChunkerOptions<T>) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ChunkerOptions<T> {
        &self.options
    }

    /// Lazy chunk iterator over `document`
    pub fn chunks<'a>(
        &'a self,
        document: &'a Arc<Document>,
        cancel: CancelToken,
    ) -> ElementWindows<'a, T, HeaderPathGroups<'a>> {
        ElementWindows::new(
            &self.options,
            document,
            HeaderPathGroups::new(document),
            cancel,
        )
    }
}

impl<T: Tokenizer> DocumentChunker for HeaderPathChunker<T> {
    fn process<'a>(
        &'a self,
        document: &'a Arc<Document>,
        cancel: &'a CancelToken,
    ) -> BoxStream<'a, Result<Chunk>> {
        stream::iter(self.chunks(document, cancel.clone())).boxed()
    }
}

/// Runs of non-header elements, each under the header path preceding it
pub struct HeaderPathGroups<'a> {
    content: Content<'a>,
    /// one slot per level 0..=MAX_HEADER_LEVELS
    headers: [Option<String>; MAX_HEADER_LEVELS + 1],
    pending: Vec<&'a Element>,
}

impl<'a> HeaderPathGroups<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self {
            content: document.enumerate_content(),
            headers: Default::default(),
            pending: Vec::new(),
        }
    }

    fn context(&self) -> String {
        self.headers
            .iter()
            .flatten()
            .filter(|h| !h.is_empty())
            .join(" ")
    }

    fn take_pending(&mut self) -> Option<ElementGroup<'a>> {
        if self.pending.is_empty() {
            return None;
        }
        let elements = std::mem::take(&mut self.pending);
        Some(ElementGroup::new(self.context(), elements))
    }

    fn record_header(&mut self, element: &Element) {
        // levels past the array share its last slot
        let slot = element.header_level().min(MAX_HEADER_LEVELS);
        self.headers[slot] = Some(element.markdown().into_owned());
        for deeper in &mut self.headers[slot + 1..] {
            *deeper = None;
        }
    }
}

impl<'a> Iterator for HeaderPathGroups<'a> {
    type Item = Result<ElementGroup<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let Some(element) = self.content.next() else {
                return self.take_pending().map(Ok);
            };
            if element.is_header() {
                let group = self.take_pending();
                self.record_header(element);
                if let Some(group) = group {
                    return Some(Ok(group));
                }
            } else {
                self.pending.push(element);
            }
        }
    }
}
