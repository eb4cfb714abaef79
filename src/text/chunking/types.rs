//! Core data structures for document chunking

use crate::document::{Document, Element};
use std::sync::{Arc, Weak};

/// Bounded-size text unit ready for embedding
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Chunk content, prefixed by the context when one was active
    pub content: String,
    /// Header/section path active when the chunk was built
    pub context: String,
    /// Provenance only, never keeps the document alive
    pub document: Weak<Document>,
    /// How the chunk was produced
    pub kind: ChunkKind,
    /// Token count tracked while packing, if the strategy is token-aware
    pub token_count: Option<usize>,
    /// Position of this chunk in its pass
    pub index: usize,
}

impl Chunk {
    pub fn new(
        content: String,
        context: String,
        document: Weak<Document>,
        kind: ChunkKind,
        token_count: Option<usize>,
        index: usize,
    ) -> Self {
        Self {
            content,
            context,
            document,
            kind,
            token_count,
            index,
        }
    }

    /// Source document, if it is still alive
    pub fn document(&self) -> Option<Arc<Document>> {
        self.document.upgrade()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Content without the leading context line
    pub fn body(&self) -> &str {
        if self.context.is_empty() {
            return &self.content;
        }
        self.content
            .strip_prefix(self.context.as_str())
            .map(|rest| rest.strip_prefix('\n').unwrap_or(rest))
            .unwrap_or(&self.content)
    }
}

impl PartialEq for Chunk {
    fn eq(&self, other: &Self) -> bool {
        self.content == other.content
            && self.context == other.context
            && self.kind == other.kind
            && self.token_count == other.token_count
            && self.index == other.index
            && Weak::ptr_eq(&self.document, &other.document)
    }
}

/// How a chunk came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkKind {
    /// Whole elements packed together
    Packed,
    /// Header row plus a run of table rows
    TableRows,
    /// Slice of an element too large for a single chunk
    SplitElement,
    /// Sliding token window over section text
    Window,
    /// Text between two header boundaries
    Section,
}

impl ChunkKind {
    pub fn description(&self) -> &'static str {
        match self {
            ChunkKind::Packed => "Packed elements",
            ChunkKind::TableRows => "Table rows with header",
            ChunkKind::SplitElement => "Split element",
            ChunkKind::Window => "Token window",
            ChunkKind::Section => "Header section",
        }
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Elements packed under one shared context
#[derive(Debug, Clone, Default)]
pub struct ElementGroup<'a> {
    pub context: String,
    pub elements: Vec<&'a Element>,
}

impl<'a> ElementGroup<'a> {
    pub fn new(context: impl Into<String>, elements: Vec<&'a Element>) -> Self {
        Self {
            context: context.into(),
            elements,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}
