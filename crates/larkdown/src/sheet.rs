//! Embedded spreadsheet extraction
//!
//! Sheets are rendered to a canvas, so the capture script reads the grid
//! from the spreadsheet engine instead of the DOM. Styles are stored once in
//! a reference table and cells point at them by id; [`StyleTable`] resolves
//! each id once per sheet and shares the result between cells.
//!
//! When the engine never loaded a sheet, the capture may carry the rows of
//! the table the page drew instead; [`dom_table`] renders those.

use std::collections::HashMap;

use indexmap::IndexMap;
use larkdown_core::{Block, Inline};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::inline::styled_text;
use crate::model::RenderWarning;
use crate::style::StyleAttributes;
use crate::{LarkdownError, Result};

/// A sheet grid as captured
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSheet {
    #[serde(default)]
    pub row_count: usize,
    #[serde(default)]
    pub col_count: usize,
    #[serde(default)]
    pub cells: Vec<RawCell>,
    /// Style reference table: id -> style object
    #[serde(default)]
    pub styles: IndexMap<String, Value>,
    /// Rows of the page's own table, captured when the grid was not loaded
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dom: Vec<Vec<DomCell>>,
    /// Cells that could not be placed: (index in the capture, reason)
    #[serde(skip)]
    pub malformed: Vec<(usize, String)>,
}

impl RawSheet {
    /// Read a captured sheet one cell at a time.
    ///
    /// Only unusable dimensions reject the sheet. A malformed cell with a
    /// readable position is kept as an unreadable cell; one without is
    /// recorded in `malformed`.
    pub fn from_capture(value: &Value) -> Result<RawSheet> {
        let object = value
            .as_object()
            .ok_or_else(|| LarkdownError::InvalidSnapshot("sheet is not an object".to_string()))?;

        let mut sheet = RawSheet {
            row_count: dimension(object, "rowCount")?,
            col_count: dimension(object, "colCount")?,
            ..Default::default()
        };

        if let Some(styles) = object.get("styles").and_then(Value::as_object) {
            sheet.styles = styles.iter().map(|(id, style)| (id.clone(), style.clone())).collect();
        }

        for (index, raw) in object
            .get("cells")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .enumerate()
        {
            match serde_json::from_value::<RawCell>(raw.clone()) {
                Ok(cell) => sheet.cells.push(cell),
                Err(e) => match (position(raw, "r"), position(raw, "c")) {
                    (Some(r), Some(c)) => sheet.cells.push(RawCell {
                        r,
                        c,
                        error: Some(e.to_string()),
                        ..Default::default()
                    }),
                    _ => sheet.malformed.push((index, e.to_string())),
                },
            }
        }

        if let Some(rows) = object.get("dom").and_then(Value::as_array) {
            sheet.dom = rows
                .iter()
                .map(|row| {
                    row.as_array()
                        .map(|cells| cells.iter().map(DomCell::from_capture).collect())
                        .unwrap_or_default()
                })
                .collect();
        }

        Ok(sheet)
    }

    /// Whether the engine's grid was captured
    pub fn has_grid(&self) -> bool {
        self.row_count > 0 || self.col_count > 0 || !self.cells.is_empty()
    }
}

fn dimension(object: &Map<String, Value>, key: &str) -> Result<usize> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(0),
        Some(value) => value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| LarkdownError::InvalidSnapshot(format!("{} is {}", key, value))),
    }
}

fn position(cell: &Value, key: &str) -> Option<usize> {
    cell.get(key)?.as_u64().and_then(|n| usize::try_from(n).ok())
}

/// One cell of a table read from the page: its text and inline CSS
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomCell {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub style: String,
}

impl DomCell {
    fn from_capture(value: &Value) -> DomCell {
        match value {
            Value::String(text) => DomCell {
                text: text.clone(),
                style: String::new(),
            },
            _ => DomCell {
                text: value.get("text").map(value_text).unwrap_or_default(),
                style: value
                    .get("style")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
        }
    }
}

/// One captured cell. Cells without content are usually absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCell {
    pub r: usize,
    pub c: usize,
    #[serde(default)]
    pub value: Value,
    /// Display text, preferred over `value`
    #[serde(default)]
    pub text: Option<String>,
    /// Style reference id
    #[serde(default)]
    pub style: Option<Value>,
    /// Rich-text segments `{text, style}`
    #[serde(default)]
    pub segments: Vec<Value>,
    /// Set when the page failed to read this cell
    #[serde(default)]
    pub error: Option<String>,
}

impl RawCell {
    fn style_id(&self) -> Option<String> {
        match self.style.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn display_text(&self) -> String {
        if let Some(text) = self.text.as_deref().filter(|t| !t.is_empty()) {
            return text.to_string();
        }
        value_text(&self.value)
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Object(map) => map
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        Value::Array(_) => value.to_string(),
    }
}

/// Resolved style references for one sheet
pub struct StyleTable<'a> {
    source: &'a IndexMap<String, Value>,
    resolved: IndexMap<String, Option<StyleAttributes>>,
}

impl<'a> StyleTable<'a> {
    pub fn new(source: &'a IndexMap<String, Value>) -> Self {
        Self {
            source,
            resolved: IndexMap::new(),
        }
    }

    /// Resolve a style id. Unknown ids fall back to the default style and
    /// are reported once.
    pub fn resolve(
        &mut self,
        id: &str,
        sheet: &str,
        warnings: &mut Vec<RenderWarning>,
    ) -> StyleAttributes {
        if let Some(entry) = self.resolved.get(id) {
            return entry.clone().unwrap_or_default();
        }

        let entry = self.source.get(id).map(StyleAttributes::from_sheet_style);
        if entry.is_none() {
            let warning = RenderWarning::UnresolvedStyle {
                sheet: sheet.to_string(),
                style_id: id.to_string(),
            };
            warn!("{}", warning);
            warnings.push(warning);
        }
        self.resolved.insert(id.to_string(), entry.clone());
        entry.unwrap_or_default()
    }

    /// Number of distinct ids looked up so far
    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

/// A resolved sheet: every cell of the grid as inline content
#[derive(Debug, Clone, PartialEq)]
pub struct SheetGrid {
    pub token: String,
    pub row_count: usize,
    pub col_count: usize,
    pub rows: Vec<Vec<Vec<Inline>>>,
}

impl SheetGrid {
    /// Resolve the full grid of a captured sheet
    pub fn extract(token: &str, raw: &RawSheet, warnings: &mut Vec<RenderWarning>) -> SheetGrid {
        let (row_count, col_count) = dimensions(raw);
        let mut styles = StyleTable::new(&raw.styles);

        for (index, reason) in &raw.malformed {
            let warning = RenderWarning::MalformedCell {
                sheet: token.to_string(),
                index: *index,
                reason: reason.clone(),
            };
            warn!("{}", warning);
            warnings.push(warning);
        }

        let by_position: HashMap<(usize, usize), &RawCell> =
            raw.cells.iter().map(|cell| ((cell.r, cell.c), cell)).collect();

        let mut rows = Vec::with_capacity(row_count);
        for r in 0..row_count {
            let mut row = Vec::with_capacity(col_count);
            for c in 0..col_count {
                let content = match by_position.get(&(r, c)) {
                    Some(cell) => cell_content(token, cell, &mut styles, warnings),
                    None => Vec::new(),
                };
                row.push(content);
            }
            rows.push(row);
        }

        debug!(
            "Sheet {}: {}x{} grid, {} distinct styles",
            token,
            row_count,
            col_count,
            styles.len()
        );

        SheetGrid {
            token: token.to_string(),
            row_count,
            col_count,
            rows,
        }
    }

    /// The grid as a pipe table with the first row as header
    pub fn into_table(self) -> Option<Block> {
        let mut rows = self.rows.into_iter();
        let headers = rows.next()?;
        if headers.is_empty() {
            return None;
        }
        Some(Block::Table {
            headers,
            rows: rows.collect(),
        })
    }
}

/// The page's table as a pipe table, first row as header. Short rows are
/// padded to the widest row.
pub fn dom_table(rows: &[Vec<DomCell>]) -> Option<Block> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return None;
    }

    let mut grid = rows.iter().map(|row| {
        let mut cells: Vec<Vec<Inline>> = row.iter().map(dom_cell_content).collect();
        cells.resize_with(width, Vec::new);
        cells
    });
    let headers = grid.next()?;
    Some(Block::Table {
        headers,
        rows: grid.collect(),
    })
}

fn dom_cell_content(cell: &DomCell) -> Vec<Inline> {
    let text = cell.text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return Vec::new();
    }
    vec![styled_text(text, &StyleAttributes::from_css(&cell.style))]
}

/// Grid size; a capture without dimensions is sized by its cells
fn dimensions(raw: &RawSheet) -> (usize, usize) {
    let rows = if raw.row_count > 0 {
        raw.row_count
    } else {
        raw.cells.iter().map(|cell| cell.r + 1).max().unwrap_or(0)
    };
    let cols = if raw.col_count > 0 {
        raw.col_count
    } else {
        raw.cells.iter().map(|cell| cell.c + 1).max().unwrap_or(0)
    };
    (rows, cols)
}

fn cell_content(
    token: &str,
    cell: &RawCell,
    styles: &mut StyleTable<'_>,
    warnings: &mut Vec<RenderWarning>,
) -> Vec<Inline> {
    if let Some(reason) = &cell.error {
        let warning = RenderWarning::UnreadableCell {
            sheet: token.to_string(),
            row: cell.r,
            col: cell.c,
            reason: reason.clone(),
        };
        warn!("{}", warning);
        warnings.push(warning);
        return Vec::new();
    }

    let style = match cell.style_id() {
        Some(id) => styles.resolve(&id, token, warnings),
        None => StyleAttributes::default(),
    };

    if !cell.segments.is_empty() {
        return cell
            .segments
            .iter()
            .filter_map(|segment| {
                let text = segment
                    .get("text")
                    .or_else(|| segment.get("value"))
                    .map(value_text)
                    .unwrap_or_default();
                if text.is_empty() {
                    return None;
                }
                let segment_style = segment
                    .get("style")
                    .or_else(|| segment.get("attr"))
                    .unwrap_or(&Value::Null);
                Some(styled_text(
                    text,
                    &StyleAttributes::from_segment(segment_style, &style),
                ))
            })
            .collect();
    }

    let text = cell.display_text();
    if text.is_empty() {
        Vec::new()
    } else {
        vec![styled_text(text, &style)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larkdown_core::{serialize, Options};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn raw(value: Value) -> RawSheet {
        serde_json::from_value(value).unwrap()
    }

    fn render(sheet: &RawSheet) -> (String, Vec<RenderWarning>) {
        let mut warnings = Vec::new();
        let table = SheetGrid::extract("shtcn_abc", sheet, &mut warnings)
            .into_table()
            .unwrap();
        (serialize(&table, &Options::default()), warnings)
    }

    #[test]
    fn test_full_grid_is_read() {
        let sheet = raw(json!({
            "rowCount": 3,
            "colCount": 2,
            "cells": [
                {"r": 0, "c": 0, "value": "Name"},
                {"r": 0, "c": 1, "value": "Qty"},
                {"r": 1, "c": 0, "value": "apple"},
                {"r": 1, "c": 1, "value": 3},
                {"r": 2, "c": 1, "value": 4.5, "text": "4.50"}
            ]
        }));
        let (markdown, warnings) = render(&sheet);
        assert_eq!(
            markdown,
            "| Name | Qty |\n| --- | --- |\n| apple | 3 |\n|  | 4.50 |\n"
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_shared_style_resolved_once() {
        let sheet = raw(json!({
            "rowCount": 2,
            "colCount": 2,
            "styles": {
                "1": {"foreColor": "#d83931", "font": {"fontWeight": 700}},
                "2": {"backColor": "rgb(255, 246, 122)"}
            },
            "cells": [
                {"r": 0, "c": 0, "value": "a", "style": 1},
                {"r": 0, "c": 1, "value": "b", "style": "1"},
                {"r": 1, "c": 0, "value": "c", "style": 2},
                {"r": 1, "c": 1, "value": "d", "style": 2}
            ]
        }));

        let mut warnings = Vec::new();
        let mut table = StyleTable::new(&sheet.styles);
        let first = table.resolve("1", "s", &mut warnings);
        let again = table.resolve("1", "s", &mut warnings);
        assert_eq!(first, again);
        assert_eq!(table.len(), 1);

        let (markdown, _) = render(&sheet);
        assert_eq!(
            markdown,
            "| <font color=\"#d83931\">**a**</font> | <font color=\"#d83931\">**b**</font> |\n\
             | --- | --- |\n\
             | <mark style=\"background:#fff67a\">c</mark> | <mark style=\"background:#fff67a\">d</mark> |\n"
        );
    }

    #[test]
    fn test_unresolved_style_falls_back() {
        let sheet = raw(json!({
            "rowCount": 1,
            "colCount": 2,
            "cells": [
                {"r": 0, "c": 0, "value": "x", "style": 9},
                {"r": 0, "c": 1, "value": "y", "style": 9}
            ]
        }));
        let (markdown, warnings) = render(&sheet);
        assert_eq!(markdown, "| x | y |\n| --- | --- |\n");
        assert_eq!(
            warnings,
            vec![RenderWarning::UnresolvedStyle {
                sheet: "shtcn_abc".to_string(),
                style_id: "9".to_string()
            }]
        );
    }

    #[test]
    fn test_segments_use_run_composition() {
        let sheet = raw(json!({
            "rowCount": 1,
            "colCount": 1,
            "cells": [{"r": 0, "c": 0, "segments": [
                {"text": "bold", "style": {"bl": 1}},
                {"text": " and "},
                {"text": "struck", "style": {"st": true}}
            ]}]
        }));
        let (markdown, _) = render(&sheet);
        assert_eq!(markdown, "| **bold** and ~~struck~~ |\n| --- |\n");
    }

    #[test]
    fn test_unreadable_cell_degrades() {
        let sheet = raw(json!({
            "rowCount": 1,
            "colCount": 2,
            "cells": [
                {"r": 0, "c": 0, "error": "getValue threw"},
                {"r": 0, "c": 1, "value": "ok"}
            ]
        }));
        let (markdown, warnings) = render(&sheet);
        assert_eq!(markdown, "|  | ok |\n| --- | --- |\n");
        assert!(matches!(
            warnings.as_slice(),
            [RenderWarning::UnreadableCell { row: 0, col: 0, .. }]
        ));
    }

    #[test]
    fn test_pipes_and_newlines_are_escaped() {
        let sheet = raw(json!({
            "rowCount": 1,
            "colCount": 1,
            "cells": [{"r": 0, "c": 0, "value": "a|b\nc"}]
        }));
        let (markdown, _) = render(&sheet);
        assert_eq!(markdown, "| a\\|b<br>c |\n| --- |\n");
    }

    #[test]
    fn test_dimensions_from_cells() {
        let sheet = raw(json!({"cells": [{"r": 1, "c": 2, "value": "z"}]}));
        let mut warnings = Vec::new();
        let grid = SheetGrid::extract("t", &sheet, &mut warnings);
        assert_eq!((grid.row_count, grid.col_count), (2, 3));
    }

    #[test]
    fn test_malformed_cell_keeps_the_rest_of_the_sheet() {
        let sheet = RawSheet::from_capture(&json!({
            "rowCount": 2,
            "colCount": 2,
            "cells": [
                {"r": 0, "c": 0, "text": "head"},
                {"r": null, "c": 0, "text": "bad"},
                {"r": 1, "c": 1, "text": 7},
                {"r": 0, "c": 1, "value": "side"}
            ]
        }))
        .unwrap();

        let (markdown, warnings) = render(&sheet);
        assert_eq!(markdown, "| head | side |\n| --- | --- |\n|  |  |\n");
        assert!(matches!(
            warnings.as_slice(),
            [
                RenderWarning::MalformedCell { index: 1, .. },
                RenderWarning::UnreadableCell { row: 1, col: 1, .. }
            ]
        ));
    }

    #[test]
    fn test_unusable_dimensions_reject_the_sheet() {
        assert!(RawSheet::from_capture(&json!({"rowCount": "many"})).is_err());
        assert!(RawSheet::from_capture(&json!({"rowCount": -1, "colCount": 1})).is_err());
        assert!(RawSheet::from_capture(&json!([1, 2])).is_err());

        let sheet = RawSheet::from_capture(&json!({"cells": "none", "styles": 3})).unwrap();
        assert!(!sheet.has_grid());
    }

    #[test]
    fn test_dom_table_keeps_inline_styles() {
        let sheet = RawSheet::from_capture(&json!({
            "dom": [
                [{"text": "Item", "style": ""}, {"text": "Owner"}, "Due"],
                [
                    {"text": "old\nplan", "style": "text-decoration: line-through"},
                    {"text": "Ann", "style": "color: rgb(216, 57, 49); background-color: #FFF67A"}
                ],
                [{"text": "black", "style": "color: rgb(0, 0, 0)"}]
            ]
        }))
        .unwrap();
        assert!(!sheet.has_grid());

        let table = dom_table(&sheet.dom).unwrap();
        assert_eq!(
            serialize(&table, &Options::default()),
            "| Item | Owner | Due |\n\
             | --- | --- | --- |\n\
             | ~~old plan~~ | <mark style=\"background:#fff67a\"><font color=\"#d83931\">Ann</font></mark> |  |\n\
             | black |  |  |\n"
        );
        assert_eq!(dom_table(&[]), None);
    }

    #[test]
    fn test_empty_sheet_has_no_table() {
        let mut warnings = Vec::new();
        let grid = SheetGrid::extract("t", &RawSheet::default(), &mut warnings);
        assert_eq!(grid.into_table(), None);
    }
}
