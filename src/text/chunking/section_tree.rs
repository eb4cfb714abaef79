//! Section-tree chunker
//!
//! Follows the nesting of [`Section`]s: a section that opens with a header
//! extends the context inherited from its parent, and the body elements
//! between nested sections are packed under that context.

use super::{
    accumulator::ElementWindows,
    chunker::DocumentChunker,
    config::ChunkerOptions,
    error::Result,
    types::{Chunk, ElementGroup},
};
use crate::document::{Document, Element, Section};
use crate::text::tokenizer::Tokenizer;
use crate::util::cancel::CancelToken;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;

type Groups<'a> = std::iter::Map<
    std::vec::IntoIter<ElementGroup<'a>>,
    fn(ElementGroup<'a>) -> Result<ElementGroup<'a>>,
>;

pub struct SectionTreeChunker<T: Tokenizer> {
    options: ChunkerOptions<T>,
}

impl<T: Tokenizer> SectionTreeChunker<T> {
    pub fn new(options: ChunkerOptions<T>) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ChunkerOptions<T> {
        &self.options
    }

    /// Lazy chunk iterator over `document`.
    ///
    /// The grouping is resolved up front; packing happens as the iterator is
    /// pulled.
    pub fn chunks<'a>(
        &'a self,
        document: &'a Arc<Document>,
        cancel: CancelToken,
    ) -> ElementWindows<'a, T, Groups<'a>> {
        let mut groups = Vec::new();
        for section in document.sections() {
            collect_groups(section, "", &mut groups);
        }
        let ready: fn(ElementGroup<'a>) -> Result<ElementGroup<'a>> = Ok;
        let groups: Groups<'a> = groups.into_iter().map(ready);
        ElementWindows::new(&self.options, document, groups, cancel)
    }
}

impl<T: Tokenizer> DocumentChunker for SectionTreeChunker<T> {
    fn process<'a>(
        &'a self,
        document: &'a Arc<Document>,
        cancel: &'a CancelToken,
    ) -> BoxStream<'a, Result<Chunk>> {
        stream::iter(self.chunks(document, cancel.clone())).boxed()
    }
}

/// Depth-first grouping of `section` under `parent_context`
pub fn collect_groups<'a>(
    section: &'a Section,
    parent_context: &str,
    out: &mut Vec<ElementGroup<'a>>,
) {
    let mut elements = section.elements();
    let context = match elements.first() {
        Some(first) if first.is_header() => {
            elements = &elements[1..];
            let header = first.markdown();
            if parent_context.is_empty() {
                header.into_owned()
            } else {
                format!("{parent_context} {header}")
            }
        }
        _ => parent_context.to_string(),
    };

    let mut pending = Vec::new();
    for element in elements {
        match element {
            Element::Section(nested) => {
                if !pending.is_empty() {
                    out.push(ElementGroup::new(context.clone(), std::mem::take(&mut pending)));
                }
                collect_groups(nested, &context, out);
            }
            _ => pending.push(element),
        }
    }
    if !pending.is_empty() {
        out.push(ElementGroup::new(context, pending));
    }
}
