//! Convert a snapshot tree to Markdown AST
//!
//! This module walks the typed block tree and builds the Markdown AST
//! defined in larkdown-core. It never fails: blocks it cannot express
//! become inert placeholders and a warning.

use std::collections::BTreeMap;

use larkdown_core::{Block as MdBlock, Inline, ListItem, ListMarker};
use tracing::{debug, warn};

use crate::inline::compose_runs;
use crate::model::{Block, BlockKind, ImageReference, RenderWarning, Snapshot};
use crate::numbering::sequence_numbers;
use crate::sheet::{dom_table, RawSheet, SheetGrid};

/// Result of converting one snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub document: MdBlock,
    pub images: Vec<ImageReference>,
    pub warnings: Vec<RenderWarning>,
}

/// Convert a snapshot to a Markdown AST document
pub fn convert(snapshot: &Snapshot) -> Conversion {
    let mut ctx = Context {
        sheets: &snapshot.sheets,
        images: Vec::new(),
        warnings: Vec::new(),
    };

    let blocks = match snapshot.root.kind {
        BlockKind::Page => convert_children(&snapshot.root.children, &mut ctx),
        _ => convert_block(&snapshot.root, &mut ctx),
    };

    Conversion {
        document: MdBlock::Document(blocks),
        images: ctx.images,
        warnings: ctx.warnings,
    }
}

/// Per-conversion state. Owned by one call to [`convert`].
struct Context<'a> {
    sheets: &'a BTreeMap<String, RawSheet>,
    images: Vec<ImageReference>,
    warnings: Vec<RenderWarning>,
}

impl Context<'_> {
    fn warn(&mut self, warning: RenderWarning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// Look a sheet up by token, or by the sheet id after the last `_`
    fn sheet(&self, token: &str) -> Option<&RawSheet> {
        if let Some(sheet) = self.sheets.get(token) {
            return Some(sheet);
        }
        let key = sheet_key(token);
        self.sheets
            .iter()
            .find(|(candidate, _)| sheet_key(candidate) == key)
            .map(|(_, sheet)| sheet)
    }
}

fn sheet_key(token: &str) -> &str {
    token.rsplit('_').next().unwrap_or(token)
}

/// Convert a sibling list. Consecutive list items of one family share a list.
fn convert_children(children: &[Block], ctx: &mut Context<'_>) -> Vec<MdBlock> {
    let numbers = sequence_numbers(children);
    let mut blocks: Vec<MdBlock> = Vec::new();

    for (child, number) in children.iter().zip(numbers) {
        let Some(marker) = list_marker(&child.kind, number) else {
            blocks.extend(convert_block(child, ctx));
            continue;
        };

        let item = convert_list_item(child, marker, ctx);
        match blocks.last_mut() {
            Some(MdBlock::List(items))
                if items
                    .last()
                    .is_some_and(|last| last.marker.same_family(&marker)) =>
            {
                items.push(item)
            }
            _ => blocks.push(MdBlock::List(vec![item])),
        }
    }

    blocks
}

fn list_marker(kind: &BlockKind, number: Option<u32>) -> Option<ListMarker> {
    match kind {
        BlockKind::Bullet => Some(ListMarker::Bullet),
        BlockKind::Ordered => Some(ListMarker::Ordered(number.unwrap_or(1))),
        BlockKind::Todo { done } => Some(ListMarker::Task { done: *done }),
        _ => None,
    }
}

fn convert_list_item(block: &Block, marker: ListMarker, ctx: &mut Context<'_>) -> ListItem {
    let mut content = vec![MdBlock::Paragraph(compose_runs(&block.runs))];
    content.extend(convert_children(&block.children, ctx));
    ListItem::new(marker, content)
}

/// A block followed by its children, unindented
fn with_children(first: MdBlock, block: &Block, ctx: &mut Context<'_>) -> Vec<MdBlock> {
    let mut blocks = vec![first];
    blocks.extend(convert_children(&block.children, ctx));
    blocks
}

/// Convert one block
fn convert_block(block: &Block, ctx: &mut Context<'_>) -> Vec<MdBlock> {
    match &block.kind {
        BlockKind::Page | BlockKind::TableCell | BlockKind::GridColumn => {
            convert_children(&block.children, ctx)
        }

        BlockKind::Text | BlockKind::ToggleHeading => {
            with_children(MdBlock::Paragraph(compose_runs(&block.runs)), block, ctx)
        }

        BlockKind::Heading { level } => with_children(
            MdBlock::Heading {
                level: *level,
                content: compose_runs(&block.runs),
            },
            block,
            ctx,
        ),

        BlockKind::Bullet | BlockKind::Ordered | BlockKind::Todo { .. } => {
            // Only reached for a list item without siblings, e.g. as the root
            match list_marker(&block.kind, Some(1)) {
                Some(marker) => vec![MdBlock::List(vec![convert_list_item(block, marker, ctx)])],
                None => Vec::new(),
            }
        }

        BlockKind::Code { language } => vec![MdBlock::CodeBlock {
            language: language.clone(),
            code: code_text(block),
        }],

        BlockKind::Table { columns } => convert_table(block, *columns, ctx),

        BlockKind::Sheet { token } => convert_sheet(block, token, ctx),

        BlockKind::Image { token, name } => {
            vec![MdBlock::Paragraph(vec![image_inline(block, token, name, ctx)])]
        }

        BlockKind::Divider => vec![MdBlock::ThematicBreak],

        BlockKind::QuoteContainer | BlockKind::Callout => {
            let inner = convert_children(&block.children, ctx);
            if inner.is_empty() {
                Vec::new()
            } else {
                vec![MdBlock::BlockQuote(inner)]
            }
        }

        BlockKind::Grid => block
            .children
            .iter()
            .flat_map(|column| convert_block(column, ctx))
            .collect(),

        BlockKind::Iframe { url } => match url {
            Some(url) => vec![MdBlock::Paragraph(vec![Inline::Link {
                content: vec![Inline::Text("iframe".to_string())],
                url: url.clone(),
                title: None,
            }])],
            None => Vec::new(),
        },

        BlockKind::EmbeddedWidget { source } => match source {
            Some(source) => vec![MdBlock::CodeBlock {
                language: Some("mermaid".to_string()),
                code: source.trim_end_matches('\n').to_string(),
            }],
            None => {
                ctx.warn(RenderWarning::UnknownKind {
                    block_id: block.id.clone(),
                    kind: block.kind.name(),
                    reason: "widget without diagram data".to_string(),
                });
                vec![placeholder(&block.kind.name())]
            }
        },

        BlockKind::SyncedReference { source, truncated } => {
            if *truncated {
                let reference = source.clone().unwrap_or_else(|| block.id.clone());
                ctx.warn(RenderWarning::SyncedDepthExceeded {
                    block_id: block.id.clone(),
                    reference: reference.clone(),
                });
                vec![MdBlock::HtmlBlock(format!(
                    "<!-- synced block not expanded: {} -->",
                    reference
                ))]
            } else {
                convert_children(&block.children, ctx)
            }
        }

        BlockKind::Unknown { kind, reason } => {
            ctx.warn(RenderWarning::UnknownKind {
                block_id: block.id.clone(),
                kind: kind.clone(),
                reason: reason.clone(),
            });
            vec![placeholder(kind)]
        }
    }
}

/// Register an image and link its placeholder
fn image_inline(block: &Block, token: &str, name: &str, ctx: &mut Context<'_>) -> Inline {
    let image = ImageReference::new(token, name, block.id.as_str());
    let url = image.placeholder();
    ctx.images.push(image);
    Inline::Image {
        alt: name.to_string(),
        url,
        title: None,
    }
}

fn placeholder(kind: &str) -> MdBlock {
    MdBlock::HtmlBlock(format!("<!-- unsupported block: {} -->", kind))
}

/// Code text: every run including newlines, else the children's text
fn code_text(block: &Block) -> String {
    let text: String = block.runs.iter().map(|run| run.text.as_str()).collect();
    let text = text.trim_end_matches('\n');
    if !text.is_empty() {
        return text.to_string();
    }

    block
        .children
        .iter()
        .map(|child| {
            let line: String = child.runs.iter().map(|run| run.text.as_str()).collect();
            line.trim_end_matches('\n').to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Native table: cells are the children in row-major order
fn convert_table(block: &Block, columns: usize, ctx: &mut Context<'_>) -> Vec<MdBlock> {
    let columns = columns.max(1);
    let cells: Vec<Vec<Inline>> = block
        .children
        .iter()
        .map(|cell| cell_inlines(cell, ctx))
        .collect();
    if cells.is_empty() {
        return Vec::new();
    }

    if cells.len() % columns != 0 {
        ctx.warn(RenderWarning::TableShape {
            block_id: block.id.clone(),
            columns,
            cells: cells.len(),
        });
    }

    let mut rows = cells.chunks(columns).map(<[Vec<Inline>]>::to_vec);
    let Some(headers) = rows.next() else {
        return Vec::new();
    };

    vec![MdBlock::Table {
        headers,
        rows: rows.collect(),
    }]
}

/// A table cell as one line of inline content. Paragraphs and images are
/// joined by a space; list items and code lines each start a new line.
fn cell_inlines(cell: &Block, ctx: &mut Context<'_>) -> Vec<Inline> {
    let mut inlines = Vec::new();
    push_cell_part(&mut inlines, compose_runs(&cell.runs), " ");
    cell_blocks(&cell.children, &mut inlines, ctx);
    inlines
}

fn cell_blocks(blocks: &[Block], inlines: &mut Vec<Inline>, ctx: &mut Context<'_>) {
    let numbers = sequence_numbers(blocks);
    for (block, number) in blocks.iter().zip(numbers) {
        match &block.kind {
            BlockKind::Image { token, name } => {
                let image = image_inline(block, token, name, ctx);
                push_cell_part(inlines, vec![image], " ");
            }
            BlockKind::Code { .. } => {
                for line in code_text(block).lines().filter(|line| !line.trim().is_empty()) {
                    push_cell_part(inlines, vec![Inline::Code(line.to_string())], "\n");
                }
                continue;
            }
            kind => match list_marker(kind, number) {
                Some(marker) => {
                    let mut item = vec![Inline::Text(marker_text(marker))];
                    item.extend(compose_runs(&block.runs));
                    push_cell_part(inlines, item, "\n");
                }
                None => push_cell_part(inlines, compose_runs(&block.runs), " "),
            },
        }
        cell_blocks(&block.children, inlines, ctx);
    }
}

/// Append a part unless it is blank; a newline becomes `<br>` in the table
fn push_cell_part(inlines: &mut Vec<Inline>, part: Vec<Inline>, separator: &str) {
    if part.iter().all(Inline::is_blank) {
        return;
    }
    if !inlines.is_empty() {
        inlines.push(Inline::Text(separator.to_string()));
    }
    inlines.extend(part);
}

fn marker_text(marker: ListMarker) -> String {
    match marker {
        ListMarker::Bullet => "- ".to_string(),
        ListMarker::Ordered(number) => format!("{}. ", number),
        ListMarker::Task { done: true } => "[x] ".to_string(),
        ListMarker::Task { done: false } => "[ ] ".to_string(),
    }
}

fn convert_sheet(block: &Block, token: &str, ctx: &mut Context<'_>) -> Vec<MdBlock> {
    let Some(raw) = ctx.sheet(token) else {
        ctx.warn(RenderWarning::MissingSheet {
            block_id: block.id.clone(),
            token: token.to_string(),
        });
        return vec![MdBlock::BlockQuote(vec![MdBlock::Paragraph(vec![
            Inline::Text(format!("⚠️ Sheet not loaded ({})", token)),
        ])])];
    };

    if !raw.has_grid() && !raw.dom.is_empty() {
        debug!("Sheet {} rendered from the page table", token);
        return dom_table(&raw.dom).into_iter().collect();
    }

    let mut warnings = Vec::new();
    let grid = SheetGrid::extract(token, raw, &mut warnings);
    ctx.warnings.extend(warnings);

    grid.into_table().into_iter().collect()
}
