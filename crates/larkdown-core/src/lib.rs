//! larkdown-core - Markdown AST and serialization
//!
//! This crate provides the core data structures and serialization for Markdown.
//! It is used by `larkdown`, which builds the AST from a captured document
//! snapshot.
//!
//! # Architecture
//!
//! ```text
//!                            ┌──────────────┐
//! Document Snapshot ────────▶│ Markdown AST │ ──▶ Markdown String
//!                            └──────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use larkdown_core::{Block, Inline, Options, serialize};
//!
//! let ast = Block::Document(vec![
//!     Block::Heading {
//!         level: 1,
//!         content: vec![Inline::Text("Hello World".to_string())],
//!     },
//!     Block::Paragraph(vec![
//!         Inline::Text("This is ".to_string()),
//!         Inline::Strong(vec![Inline::Text("bold".to_string())]),
//!         Inline::Text(" text.".to_string()),
//!     ]),
//! ]);
//!
//! let markdown = serialize(&ast, &Options::default());
//! assert_eq!(markdown, "# Hello World\n\nThis is **bold** text.\n");
//! ```

mod ast;
mod options;
mod serialize;

pub use ast::{inlines_plain_text, Block, Inline, ListItem, ListMarker};
pub use options::{HeadingStyle, Options};
pub use serialize::{escape_html, escape_table_cell, serialize};
