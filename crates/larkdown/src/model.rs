//! Typed snapshot model
//!
//! A [`Snapshot`] is the validated, acyclic copy of the document tree taken
//! from the page. Every block kind the renderer understands has its own
//! variant; anything else ends up in [`BlockKind::Unknown`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::sheet::RawSheet;

/// Prefix of the placeholder link emitted for images until they are resolved
pub const IMAGE_PLACEHOLDER_PREFIX: &str = "__IMAGE_TOKEN__";

/// A node of the document tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub kind: BlockKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Block>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub runs: Vec<StyledRun>,
}

impl Block {
    pub fn new(id: impl Into<String>, kind: BlockKind) -> Self {
        Self {
            id: id.into(),
            kind,
            children: Vec::new(),
            runs: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Block>) -> Self {
        self.children = children;
        self
    }

    pub fn with_runs(mut self, runs: Vec<StyledRun>) -> Self {
        self.runs = runs;
        self
    }

    /// Plain text of the runs, markup dropped
    pub fn plain_text(&self) -> String {
        self.runs
            .iter()
            .filter(|run| !run.attrs.paragraph_break)
            .map(|run| run.text.as_str())
            .collect()
    }

    /// Visit this block and all descendants in document order
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Block)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

/// The closed set of block kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    Page,
    Text,
    /// `heading1` through `heading9`
    Heading {
        level: u8,
    },
    Bullet,
    Ordered,
    Todo {
        done: bool,
    },
    Code {
        language: Option<String>,
    },
    Table {
        columns: usize,
    },
    TableCell,
    Sheet {
        token: String,
    },
    Image {
        token: String,
        name: String,
    },
    Divider,
    QuoteContainer,
    Callout,
    Grid,
    GridColumn,
    Iframe {
        url: Option<String>,
    },
    /// Third-party widget; `source` holds diagram text when the widget has any
    EmbeddedWidget {
        source: Option<String>,
    },
    /// Stand-in for a subtree defined elsewhere. Its children are a copy of
    /// that subtree. `truncated` marks a reference that was not expanded
    /// because the expansion depth bound was reached.
    SyncedReference {
        source: Option<String>,
        truncated: bool,
    },
    ToggleHeading,
    /// A kind outside this enumeration, or a known kind whose payload did
    /// not have the expected shape
    Unknown {
        kind: String,
        reason: String,
    },
}

impl BlockKind {
    /// The source-side name of this kind
    pub fn name(&self) -> String {
        match self {
            BlockKind::Page => "page".to_string(),
            BlockKind::Text => "text".to_string(),
            BlockKind::Heading { level } => format!("heading{}", level),
            BlockKind::Bullet => "bullet".to_string(),
            BlockKind::Ordered => "ordered".to_string(),
            BlockKind::Todo { .. } => "todo".to_string(),
            BlockKind::Code { .. } => "code".to_string(),
            BlockKind::Table { .. } => "table".to_string(),
            BlockKind::TableCell => "table_cell".to_string(),
            BlockKind::Sheet { .. } => "sheet".to_string(),
            BlockKind::Image { .. } => "image".to_string(),
            BlockKind::Divider => "divider".to_string(),
            BlockKind::QuoteContainer => "quote_container".to_string(),
            BlockKind::Callout => "callout".to_string(),
            BlockKind::Grid => "grid".to_string(),
            BlockKind::GridColumn => "grid_column".to_string(),
            BlockKind::Iframe { .. } => "iframe".to_string(),
            BlockKind::EmbeddedWidget { .. } => "embedded_widget".to_string(),
            BlockKind::SyncedReference { .. } => "synced_reference".to_string(),
            BlockKind::ToggleHeading => "toggle_heading".to_string(),
            BlockKind::Unknown { kind, .. } => kind.clone(),
        }
    }

    pub fn is_list_item(&self) -> bool {
        matches!(
            self,
            BlockKind::Bullet | BlockKind::Ordered | BlockKind::Todo { .. }
        )
    }
}

/// A span of text with its attributes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyledRun {
    pub text: String,
    #[serde(default)]
    pub attrs: RunAttributes,
}

impl StyledRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attrs: RunAttributes::default(),
        }
    }

    pub fn with_attrs(text: impl Into<String>, attrs: RunAttributes) -> Self {
        Self {
            text: text.into(),
            attrs,
        }
    }
}

/// Inline attributes of a run, as captured (colors not yet normalized)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunAttributes {
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub inline_code: bool,
    /// Link target, already percent-decoded
    pub link: Option<String>,
    pub foreground: Option<String>,
    pub background: Option<String>,
    /// Inline equation source
    pub equation: Option<String>,
    pub mention: Option<Mention>,
    /// The run only separates paragraphs and contributes no text
    pub paragraph_break: bool,
}

/// An inline reference to another document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub title: String,
    pub url: String,
}

/// A validated capture of one document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub title: String,
    pub root: Block,
    /// Spreadsheet grids keyed by the sheet token as captured
    #[serde(default)]
    pub sheets: BTreeMap<String, RawSheet>,
    /// Structural problems found while validating the capture
    #[serde(skip)]
    pub capture_warnings: Vec<RenderWarning>,
}

impl Default for Block {
    fn default() -> Self {
        Block::new("", BlockKind::Page)
    }
}

impl Snapshot {
    pub fn new(title: impl Into<String>, root: Block) -> Self {
        Self {
            title: title.into(),
            root,
            sheets: BTreeMap::new(),
            capture_warnings: Vec::new(),
        }
    }

    /// Number of blocks in the tree, root included
    pub fn block_count(&self) -> usize {
        let mut count = 0;
        self.root.walk(&mut |_| count += 1);
        count
    }
}

/// An image found while rendering, resolved later by the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub token: String,
    pub name: String,
    pub block_id: String,
    pub url: Option<String>,
    pub local_path: Option<String>,
}

impl ImageReference {
    pub fn new(
        token: impl Into<String>,
        name: impl Into<String>,
        block_id: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            name: name.into(),
            block_id: block_id.into(),
            url: None,
            local_path: None,
        }
    }

    /// The link target emitted in the Markdown until the image is resolved
    pub fn placeholder(&self) -> String {
        format!("{}{}", IMAGE_PLACEHOLDER_PREFIX, self.token)
    }
}

/// A per-block anomaly. Recorded next to the output, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderWarning {
    #[error("table {block_id}: {cells} cells do not fill {columns} columns")]
    TableShape {
        block_id: String,
        columns: usize,
        cells: usize,
    },

    #[error("block {block_id}: unsupported kind `{kind}` ({reason})")]
    UnknownKind {
        block_id: String,
        kind: String,
        reason: String,
    },

    #[error("sheet {sheet}: style reference `{style_id}` not found")]
    UnresolvedStyle { sheet: String, style_id: String },

    #[error("sheet {sheet}: cell ({row}, {col}) unreadable: {reason}")]
    UnreadableCell {
        sheet: String,
        row: usize,
        col: usize,
        reason: String,
    },

    #[error("sheet {sheet}: captured cell #{index} has no usable position: {reason}")]
    MalformedCell {
        sheet: String,
        index: usize,
        reason: String,
    },

    #[error("block {block_id}: sheet {token} was not captured")]
    MissingSheet { block_id: String, token: String },

    #[error("block {block_id}: synced reference to {reference} not expanded, depth bound reached")]
    SyncedDepthExceeded { block_id: String, reference: String },

    #[error("duplicate block id {block_id}, renamed to {renamed}")]
    DuplicateBlockId { block_id: String, renamed: String },
}
