//! Markdown Abstract Syntax Tree
//!
//! This module defines the AST nodes for representing Markdown documents.
//! The renderer builds this tree from a document snapshot; the serializer
//! turns it into text.

/// A block-level Markdown node
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Root document container
    Document(Vec<Block>),

    /// Heading with level and inline content.
    ///
    /// Levels above 6 have no Markdown form and serialize as paragraphs.
    Heading { level: u8, content: Vec<Inline> },

    /// Paragraph containing inline content
    Paragraph(Vec<Inline>),

    /// Block quote containing nested blocks
    BlockQuote(Vec<Block>),

    /// A run of list items that share one marker family
    List(Vec<ListItem>),

    /// Fenced code block
    CodeBlock {
        language: Option<String>,
        code: String,
    },

    /// Thematic break (horizontal rule)
    ThematicBreak,

    /// Pipe table. The first row is the header row; later rows may be
    /// shorter than the header.
    Table {
        headers: Vec<Vec<Inline>>,
        rows: Vec<Vec<Vec<Inline>>>,
    },

    /// Raw HTML block, used for inert placeholders
    HtmlBlock(String),
}

/// The marker that introduces a list item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMarker {
    /// `- item`
    Bullet,
    /// `N. item`, with the number already reconstructed
    Ordered(u32),
    /// `- [ ] item` / `- [x] item`
    Task { done: bool },
}

impl ListMarker {
    /// Whether two markers belong to the same list
    pub fn same_family(&self, other: &ListMarker) -> bool {
        matches!(
            (self, other),
            (ListMarker::Bullet, ListMarker::Bullet)
                | (ListMarker::Ordered(_), ListMarker::Ordered(_))
                | (ListMarker::Task { .. }, ListMarker::Task { .. })
        )
    }
}

/// A list item containing blocks
#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    pub marker: ListMarker,
    pub content: Vec<Block>,
}

impl ListItem {
    pub fn new(marker: ListMarker, content: Vec<Block>) -> Self {
        Self { marker, content }
    }

    pub fn from_inlines(marker: ListMarker, inlines: Vec<Inline>) -> Self {
        Self {
            marker,
            content: vec![Block::Paragraph(inlines)],
        }
    }
}

/// An inline Markdown node
#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    /// Plain text
    Text(String),

    /// Strong emphasis (bold)
    Strong(Vec<Inline>),

    /// Emphasis (italic)
    Emphasis(Vec<Inline>),

    /// Strikethrough
    Strikethrough(Vec<Inline>),

    /// Inline code
    Code(String),

    /// Inline equation source, rendered as `$source$`
    Math(String),

    /// Link with text, URL, and optional title
    Link {
        content: Vec<Inline>,
        url: String,
        title: Option<String>,
    },

    /// Image with alt text, URL, and optional title
    Image {
        alt: String,
        url: String,
        title: Option<String>,
    },

    /// Foreground and/or background color wrapped around content.
    /// Colors are canonical `#rrggbb` strings.
    Colored {
        foreground: Option<String>,
        background: Option<String>,
        content: Vec<Inline>,
    },
}

impl Block {
    /// Check if this block is empty/blank
    pub fn is_blank(&self) -> bool {
        match self {
            Block::Document(blocks) => blocks.iter().all(|b| b.is_blank()),
            Block::Paragraph(inlines) => inlines.iter().all(|i| i.is_blank()),
            Block::Heading { content, .. } => content.iter().all(|i| i.is_blank()),
            Block::BlockQuote(blocks) => blocks.iter().all(|b| b.is_blank()),
            Block::List(items) => items.is_empty(),
            Block::CodeBlock { .. } => false,
            Block::Table { headers, rows } => headers.is_empty() && rows.is_empty(),
            Block::ThematicBreak => false,
            Block::HtmlBlock(html) => html.trim().is_empty(),
        }
    }
}

impl ListItem {
    pub fn is_blank(&self) -> bool {
        self.content.iter().all(|b| b.is_blank())
    }
}

impl Inline {
    /// Check if this inline is empty/blank
    pub fn is_blank(&self) -> bool {
        match self {
            Inline::Text(text) => text.trim().is_empty(),
            Inline::Strong(inlines)
            | Inline::Emphasis(inlines)
            | Inline::Strikethrough(inlines)
            | Inline::Colored {
                content: inlines, ..
            } => inlines.iter().all(|i| i.is_blank()),
            Inline::Code(code) => code.is_empty(),
            Inline::Math(source) => source.trim().is_empty(),
            Inline::Link { content, .. } => content.iter().all(|i| i.is_blank()),
            Inline::Image { .. } => false,
        }
    }

    /// Get the text content of this inline with all markup dropped
    pub fn plain_text(&self) -> String {
        match self {
            Inline::Text(t) | Inline::Code(t) | Inline::Math(t) => t.clone(),
            Inline::Strong(inner)
            | Inline::Emphasis(inner)
            | Inline::Strikethrough(inner)
            | Inline::Colored { content: inner, .. }
            | Inline::Link { content: inner, .. } => inlines_plain_text(inner),
            Inline::Image { alt, .. } => alt.clone(),
        }
    }
}

/// Helper to concatenate the plain text of an inline slice
pub fn inlines_plain_text(inlines: &[Inline]) -> String {
    inlines.iter().map(|i| i.plain_text()).collect()
}
