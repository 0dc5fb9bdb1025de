//! Capture validation
//!
//! The page-side capture script returns loosely typed JSON:
//!
//! ```text
//! { "title": "...",
//!   "root":   { "id", "type", "children": [...], "ops": [...], "text", "data": {...} },
//!   "synced": { "<source id>": <block>, ... },
//!   "sheets": { "<token>": { "rowCount", "colCount", "cells", "styles" }, ... } }
//! ```
//!
//! This module turns it into a typed [`Snapshot`]. A block whose shape does
//! not validate becomes [`BlockKind::Unknown`]; only a missing root fails.

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::model::{Block, BlockKind, Mention, RenderWarning, RunAttributes, Snapshot, StyledRun};
use crate::sheet::RawSheet;
use crate::{LarkdownError, Result};

/// Bounds applied while building the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotLimits {
    /// How many synced references may be expanded inside one another
    pub synced_depth: usize,
    /// Deepest nesting kept; deeper blocks become placeholders
    pub max_depth: usize,
}

impl Default for SnapshotLimits {
    fn default() -> Self {
        Self {
            synced_depth: 4,
            max_depth: 64,
        }
    }
}

impl Snapshot {
    /// Validate a capture into a snapshot
    pub fn from_capture(capture: &Value, limits: SnapshotLimits) -> Result<Snapshot> {
        let object = capture.as_object().ok_or_else(|| {
            LarkdownError::InvalidSnapshot("capture is not a JSON object".to_string())
        })?;

        if let Some(error) = object.get("error").and_then(Value::as_str) {
            return Err(LarkdownError::InvalidSnapshot(error.to_string()));
        }

        let root_value = object
            .get("root")
            .filter(|root| root.is_object())
            .ok_or_else(|| LarkdownError::InvalidSnapshot("document root is missing".to_string()))?;

        let empty = Map::new();
        let synced = object
            .get("synced")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        let mut builder = TreeBuilder {
            synced,
            limits,
            seen_ids: HashSet::new(),
            warnings: Vec::new(),
        };
        let root = builder.build(root_value, 0, 0);

        let mut sheets = BTreeMap::new();
        if let Some(raw_sheets) = object.get("sheets").and_then(Value::as_object) {
            for (token, raw) in raw_sheets {
                match RawSheet::from_capture(raw) {
                    Ok(sheet) => {
                        sheets.insert(token.clone(), sheet);
                    }
                    Err(e) => warn!("Dropping malformed sheet capture {}: {}", token, e),
                }
            }
        }

        let title = object
            .get("title")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| root.plain_text().trim().to_string());

        let snapshot = Snapshot {
            title,
            root,
            sheets,
            capture_warnings: builder.warnings,
        };
        debug!(
            "Validated snapshot: {} blocks, {} sheets",
            snapshot.block_count(),
            snapshot.sheets.len()
        );
        Ok(snapshot)
    }

    /// Parse a capture from its JSON text
    pub fn from_json(json: &str, limits: SnapshotLimits) -> Result<Snapshot> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_capture(&value, limits)
    }
}

struct TreeBuilder<'a> {
    synced: &'a Map<String, Value>,
    limits: SnapshotLimits,
    seen_ids: HashSet<String>,
    warnings: Vec<RenderWarning>,
}

impl TreeBuilder<'_> {
    /// `depth` is the nesting depth, `synced_level` the number of synced
    /// references already expanded above this block
    fn build(&mut self, value: &Value, depth: usize, synced_level: usize) -> Block {
        let synced = self.synced;
        let id = self.unique_id(block_id(value));
        let type_name = value.get("type").and_then(Value::as_str).unwrap_or("");
        let data = value.get("data").unwrap_or(&Value::Null);

        if depth > self.limits.max_depth {
            return Block::new(
                id,
                BlockKind::Unknown {
                    kind: type_name.to_string(),
                    reason: format!("nested deeper than {}", self.limits.max_depth),
                },
            );
        }

        let mut kind = parse_kind(type_name, data);
        let runs = parse_runs(value);

        let child_values: &[Value] = value
            .get("children")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let children = match &mut kind {
            BlockKind::SyncedReference { source, truncated } => {
                if synced_level >= self.limits.synced_depth {
                    *truncated = true;
                    Vec::new()
                } else if !child_values.is_empty() {
                    self.build_all(child_values, depth + 1, synced_level + 1)
                } else {
                    let target = source.as_ref().and_then(|s| synced.get(s));
                    match target {
                        Some(target) => {
                            let target_children = target
                                .get("children")
                                .and_then(Value::as_array)
                                .map(Vec::as_slice)
                                .unwrap_or(&[]);
                            self.build_all(target_children, depth + 1, synced_level + 1)
                        }
                        None => Vec::new(),
                    }
                }
            }
            _ => self.build_all(child_values, depth + 1, synced_level),
        };

        Block {
            id,
            kind,
            children,
            runs,
        }
    }

    fn build_all(&mut self, values: &[Value], depth: usize, synced_level: usize) -> Vec<Block> {
        values
            .iter()
            .filter(|v| v.is_object())
            .map(|v| self.build(v, depth, synced_level))
            .collect()
    }

    /// Block ids stay unique; a repeat (typically a synced subtree expanded
    /// twice) is renamed
    fn unique_id(&mut self, id: String) -> String {
        if self.seen_ids.insert(id.clone()) {
            return id;
        }

        let mut n = 2;
        let renamed = loop {
            let candidate = format!("{}#{}", id, n);
            if !self.seen_ids.contains(&candidate) {
                break candidate;
            }
            n += 1;
        };
        self.seen_ids.insert(renamed.clone());
        self.warnings.push(RenderWarning::DuplicateBlockId {
            block_id: id,
            renamed: renamed.clone(),
        });
        renamed
    }
}

fn block_id(value: &Value) -> String {
    match value.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn unknown(kind: &str, reason: &str) -> BlockKind {
    BlockKind::Unknown {
        kind: kind.to_string(),
        reason: reason.to_string(),
    }
}

fn data_str<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Map a source type name and its payload to a kind
fn parse_kind(type_name: &str, data: &Value) -> BlockKind {
    if let Some(level) = type_name.strip_prefix("heading") {
        return match level.parse::<u8>() {
            Ok(level @ 1..=9) => BlockKind::Heading { level },
            _ => unknown(type_name, "heading level outside 1..9"),
        };
    }

    match type_name {
        "page" => BlockKind::Page,
        "text" => BlockKind::Text,
        "bullet" => BlockKind::Bullet,
        "ordered" => BlockKind::Ordered,
        "todo" => BlockKind::Todo {
            done: data.get("done").is_some_and(truthy),
        },
        "code" => BlockKind::Code {
            language: data_str(data, "language").map(str::to_lowercase),
        },
        "table" => match data.get("columns").and_then(Value::as_u64) {
            Some(columns) if columns > 0 => BlockKind::Table {
                columns: columns as usize,
            },
            _ => unknown(type_name, "table without a column count"),
        },
        "table_cell" => BlockKind::TableCell,
        "sheet" => match data_str(data, "token") {
            Some(token) => BlockKind::Sheet {
                token: token.to_string(),
            },
            None => unknown(type_name, "sheet without a token"),
        },
        "image" => match data_str(data, "token") {
            Some(token) => BlockKind::Image {
                token: token.to_string(),
                name: data_str(data, "name").unwrap_or("image").to_string(),
            },
            None => unknown(type_name, "image without a token"),
        },
        "divider" => BlockKind::Divider,
        "quote_container" => BlockKind::QuoteContainer,
        "callout" => BlockKind::Callout,
        "grid" => BlockKind::Grid,
        "grid_column" => BlockKind::GridColumn,
        "iframe" => BlockKind::Iframe {
            url: data_str(data, "url").map(str::to_string),
        },
        "isv" | "embedded_widget" => BlockKind::EmbeddedWidget {
            source: data_str(data, "data").map(str::to_string),
        },
        "synced_source" | "synced_reference" => BlockKind::SyncedReference {
            source: data_str(data, "sourceId").map(str::to_string),
            truncated: false,
        },
        "toggle_heading" => BlockKind::ToggleHeading,
        "" => unknown("unknown", "block without a type"),
        other => unknown(other, "unrecognized kind"),
    }
}

/// Boolean attributes arrive as `true` or `"true"`
fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s == "true",
        Value::Number(n) => n.as_u64().is_some_and(|n| n != 0),
        _ => false,
    }
}

fn parse_runs(value: &Value) -> Vec<StyledRun> {
    if let Some(ops) = value.get("ops").and_then(Value::as_array) {
        return ops.iter().filter_map(parse_op).collect();
    }

    match value.get("text").and_then(Value::as_str) {
        Some(text) => {
            let text = text.strip_suffix('\n').unwrap_or(text);
            if text.is_empty() {
                Vec::new()
            } else {
                vec![StyledRun::plain(text)]
            }
        }
        None => Vec::new(),
    }
}

/// One rich-text operation `{insert, attributes}`
fn parse_op(op: &Value) -> Option<StyledRun> {
    let text = op.get("insert").and_then(Value::as_str)?.to_string();
    let raw = op.get("attributes").and_then(Value::as_object);

    let mut attrs = RunAttributes::default();

    let Some(raw) = raw else {
        attrs.paragraph_break = text == "\n";
        return Some(StyledRun::with_attrs(text, attrs));
    };

    let get_flag = |key: &str| raw.get(key).is_some_and(truthy);
    let get_str = |key: &str| {
        raw.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    attrs.bold = get_flag("bold");
    attrs.italic = get_flag("italic");
    attrs.strikethrough = get_flag("strikethrough");
    attrs.inline_code = get_flag("inlineCode");
    attrs.paragraph_break = get_flag("fixEnter");
    attrs.foreground = get_str("textHighlight");
    attrs.background = get_str("textHighlightBackground");
    attrs.equation = get_str("equation")
        .map(|eq| eq.trim_end_matches('\n').to_string())
        .filter(|eq| !eq.is_empty());
    attrs.link = get_str("link").map(|link| decode_link(&link));
    attrs.mention = get_str("inline-component").and_then(|raw| parse_mention(&raw));

    Some(StyledRun::with_attrs(text, attrs))
}

/// Links are stored percent-encoded
fn decode_link(link: &str) -> String {
    match urlencoding::decode(link) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => link.to_string(),
    }
}

fn parse_mention(raw: &str) -> Option<Mention> {
    let component: Value = serde_json::from_str(raw).ok()?;
    if component.get("type").and_then(Value::as_str) != Some("mention_doc") {
        return None;
    }
    let data = component.get("data")?;
    Some(Mention {
        title: data.get("title").and_then(Value::as_str).unwrap_or("").to_string(),
        url: data.get("raw_url").and_then(Value::as_str)?.to_string(),
    })
}
