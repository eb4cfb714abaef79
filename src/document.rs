//! Parsed document model consumed by the chunkers
//!
//! A [`Document`] is an ordered list of [`Section`]s, each an ordered list of
//! [`Element`]s. Sections nest: a section can appear as an element of its
//! parent. The model is immutable once built and only read by the chunking
//! engine.

use itertools::Itertools;
use std::borrow::Cow;

/// Parsed document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// Identifier of the source (path, url, ...)
    pub identifier: String,
    sections: Vec<Section>,
}

impl Document {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            sections: Vec::new(),
        }
    }

    /// Append a top-level section (builder style)
    pub fn with_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    pub fn push_section(&mut self, section: Section) {
        self.sections.push(section);
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Depth-first flattening of every element in the document.
    ///
    /// Nested sections are descended into and are not yielded themselves.
    pub fn enumerate_content(&self) -> Content<'_> {
        Content {
            sections: self.sections.iter(),
            stack: Vec::new(),
        }
    }
}

/// Iterator returned by [`Document::enumerate_content`]
pub struct Content<'a> {
    sections: std::slice::Iter<'a, Section>,
    stack: Vec<std::slice::Iter<'a, Element>>,
}

impl<'a> Iterator for Content<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let Some(top) = self.stack.last_mut() else {
                let section = self.sections.next()?;
                self.stack.push(section.elements.iter());
                continue;
            };
            match top.next() {
                Some(Element::Section(nested)) => self.stack.push(nested.elements.iter()),
                Some(element) => return Some(element),
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

/// Ordered group of elements, possibly nested inside another section
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Section {
    elements: Vec<Element>,
}

impl Section {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element (builder style)
    pub fn with(mut self, element: impl Into<Element>) -> Self {
        self.elements.push(element.into());
        self
    }

    pub fn push(&mut self, element: impl Into<Element>) {
        self.elements.push(element.into());
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn markdown(&self) -> String {
        join_non_empty(self.elements.iter().map(|e| e.markdown()))
    }

    pub fn semantic_content(&self) -> String {
        join_non_empty(self.elements.iter().map(|e| e.semantic_content()))
    }
}

fn join_non_empty<'a>(parts: impl Iterator<Item = Cow<'a, str>>) -> String {
    parts.filter(|p| !p.is_empty()).join("\n")
}

/// Document element
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Header(Header),
    Paragraph(Paragraph),
    Table(Table),
    Image(Image),
    Section(Section),
}

impl Element {
    /// Markdown rendering used when the element is placed in a chunk
    pub fn markdown(&self) -> Cow<'_, str> {
        match self {
            Element::Header(header) => Cow::Owned(header.markdown()),
            Element::Paragraph(paragraph) => Cow::Borrowed(&paragraph.text),
            Element::Table(table) => Cow::Owned(table.markdown()),
            Element::Image(image) => Cow::Owned(image.markdown()),
            Element::Section(section) => Cow::Owned(section.markdown()),
        }
    }

    /// Textual projection placed in chunks and sent to embedding.
    ///
    /// Same as the markdown except for images, which contribute their
    /// alternative and OCR text (empty when they have neither).
    pub fn semantic_content(&self) -> Cow<'_, str> {
        match self {
            Element::Header(header) => Cow::Owned(header.markdown()),
            Element::Paragraph(paragraph) => Cow::Borrowed(&paragraph.text),
            Element::Table(table) => Cow::Owned(table.markdown()),
            Element::Image(image) => image.semantic_content(),
            Element::Section(section) => Cow::Owned(section.semantic_content()),
        }
    }

    /// Header level, 0 for anything that is not a header
    pub fn header_level(&self) -> usize {
        match self {
            Element::Header(header) => header.level,
            _ => 0,
        }
    }

    pub fn is_header(&self) -> bool {
        matches!(self, Element::Header(_))
    }
}

impl From<Header> for Element {
    fn from(value: Header) -> Self {
        Element::Header(value)
    }
}

impl From<Paragraph> for Element {
    fn from(value: Paragraph) -> Self {
        Element::Paragraph(value)
    }
}

impl From<Table> for Element {
    fn from(value: Table) -> Self {
        Element::Table(value)
    }
}

impl From<Image> for Element {
    fn from(value: Image) -> Self {
        Element::Image(value)
    }
}

impl From<Section> for Element {
    fn from(value: Section) -> Self {
        Element::Section(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub level: usize,
    pub text: String,
}

impl Header {
    pub fn new(level: usize, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }

    pub fn markdown(&self) -> String {
        format!("{} {}", "#".repeat(self.level.max(1)), self.text)
    }
}

/// Text-bearing block (paragraph, list item, code block, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paragraph {
    pub text: String,
}

impl Paragraph {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Table of cells; row 0 is the header row.
///
/// Rows are padded with empty cells so every row has `column_count` cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    cells: Vec<Vec<Option<Element>>>,
    columns: usize,
}

impl Table {
    pub fn new(rows: Vec<Vec<Option<Element>>>) -> Self {
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        let cells = rows
            .into_iter()
            .map(|mut row| {
                row.resize(columns, None);
                row
            })
            .collect();
        Self { cells, columns }
    }

    /// Build a table whose cells are plain paragraphs
    pub fn from_text_rows<R, S>(rows: impl IntoIterator<Item = R>) -> Self
    where
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            rows.into_iter()
                .map(|row| {
                    row.into_iter()
                        .map(|text| Some(Element::Paragraph(Paragraph::new(text))))
                        .collect()
                })
                .collect(),
        )
    }

    pub fn row_count(&self) -> usize {
        self.cells.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&Element> {
        self.cells.get(row)?.get(column)?.as_ref()
    }

    /// Markdown line for a single row, e.g. `| a | b |`
    pub fn row_markdown(&self, row: usize) -> String {
        let cells = (0..self.columns)
            .map(|column| {
                self.cell(row, column)
                    .map(|c| c.markdown().replace('\n', " ").replace('|', "\\|"))
                    .unwrap_or_default()
            })
            .join(" | ");
        format!("| {cells} |")
    }

    /// Header row followed by the separator row
    pub fn header_markdown(&self) -> String {
        if self.cells.is_empty() {
            return String::new();
        }
        let separator = std::iter::repeat_n("---", self.columns).join(" | ");
        format!("{}\n| {separator} |", self.row_markdown(0))
    }

    pub fn markdown(&self) -> String {
        let mut markdown = self.header_markdown();
        for row in 1..self.row_count() {
            markdown.push('\n');
            markdown.push_str(&self.row_markdown(row));
        }
        markdown
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    pub alternative_text: Option<String>,
    /// OCR text
    pub text: Option<String>,
    pub source: Option<String>,
}

impl Image {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alternative_text(mut self, alternative_text: impl Into<String>) -> Self {
        self.alternative_text = Some(alternative_text.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn alternative_text(&self) -> Option<&str> {
        self.alternative_text.as_deref()
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn markdown(&self) -> String {
        format!(
            "![{}]({})",
            self.alternative_text.as_deref().unwrap_or_default(),
            self.source.as_deref().unwrap_or_default()
        )
    }

    fn semantic_content(&self) -> Cow<'_, str> {
        let alt = self.alternative_text.as_deref().unwrap_or_default();
        let ocr = self.text.as_deref().unwrap_or_default();
        match (alt.is_empty(), ocr.is_empty()) {
            (true, true) => Cow::Borrowed(""),
            (false, true) => Cow::Borrowed(alt),
            (true, false) => Cow::Borrowed(ocr),
            (false, false) => Cow::Owned(format!("{alt}\n{ocr}")),
        }
    }
}
