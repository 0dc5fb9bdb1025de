//! # larkdown
//!
//! Render captured Feishu/Lark documents to Markdown.
//!
//! ## Design
//!
//! The page's document model is captured once as a JSON snapshot (see
//! `larkdown-session`). This crate validates that capture into a typed block
//! tree and renders it synchronously:
//!
//! - **Typed model**: a closed set of block kinds with an `unknown` fallback
//! - **One style path**: text runs and sheet cells resolve to the same
//!   style attributes
//! - **Never aborts on a block**: anomalies become placeholders plus warnings
//!
//! ## Example
//!
//! ```rust
//! use larkdown::LarkdownService;
//! use serde_json::json;
//!
//! let capture = json!({
//!     "title": "Notes",
//!     "root": {"id": "root", "type": "page", "children": [
//!         {"id": "h", "type": "heading1", "ops": [{"insert": "Title"}]},
//!         {"id": "a", "type": "ordered", "ops": [{"insert": "a"}]},
//!         {"id": "b", "type": "ordered", "ops": [{"insert": "b"}]}
//!     ]}
//! });
//!
//! let rendered = LarkdownService::new().render_capture(&capture).unwrap();
//! assert_eq!(rendered.markdown, "# Title\n\n1. a\n2. b\n");
//! ```

mod convert;
pub mod inline;
pub mod model;
pub mod numbering;
mod service;
pub mod sheet;
pub mod snapshot;
pub mod style;

pub use convert::{convert, Conversion};
pub use model::{
    Block, BlockKind, ImageReference, Mention, RenderWarning, RunAttributes, Snapshot, StyledRun,
    IMAGE_PLACEHOLDER_PREFIX,
};
pub use service::{HeadingStyle, LarkdownOptions, LarkdownService, Rendered};
pub use sheet::{dom_table, DomCell, RawCell, RawSheet, SheetGrid, StyleTable};
pub use snapshot::SnapshotLimits;
pub use style::{normalize_color, resolve_foreground, StyleAttributes, DEFAULT_FOREGROUND};

/// Error type for larkdown operations
#[derive(Debug, thiserror::Error)]
pub enum LarkdownError {
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LarkdownError>;
