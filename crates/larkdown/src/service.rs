//! LarkdownService - the main entry point for snapshot to Markdown rendering.

use larkdown_core::{Block as MdBlock, Inline};
use serde_json::Value;
use tracing::debug;

use crate::convert::convert;
use crate::model::{ImageReference, RenderWarning, Snapshot};
use crate::snapshot::SnapshotLimits;
use crate::Result;

// Re-export options from core
pub use larkdown_core::{HeadingStyle, Options as LarkdownOptions};

/// Markdown rendered from one snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub title: String,
    pub markdown: String,
    /// Images referenced by placeholder links, in document order
    pub images: Vec<ImageReference>,
    /// Capture and render warnings, capture first
    pub warnings: Vec<RenderWarning>,
}

/// The main service for rendering snapshots to Markdown
pub struct LarkdownService {
    options: LarkdownOptions,
    limits: SnapshotLimits,
}

impl LarkdownService {
    /// Create a new LarkdownService with default options
    pub fn new() -> Self {
        Self {
            options: LarkdownOptions::default(),
            limits: SnapshotLimits::default(),
        }
    }

    /// Create a LarkdownService with custom options
    pub fn with_options(options: LarkdownOptions) -> Self {
        Self {
            options,
            limits: SnapshotLimits::default(),
        }
    }

    /// Set the bounds used when validating captures
    pub fn with_limits(mut self, limits: SnapshotLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Render a snapshot. Rendering the same snapshot twice gives the same output.
    pub fn render(&self, snapshot: &Snapshot) -> Rendered {
        let conversion = convert(snapshot);

        let mut document = conversion.document;
        if self.options.title_heading {
            prepend_title(&mut document, &snapshot.title);
        }

        let markdown = larkdown_core::serialize(&document, &self.options);

        let mut warnings = snapshot.capture_warnings.clone();
        warnings.extend(conversion.warnings);

        debug!(
            "Rendered {:?}: {} bytes, {} images, {} warnings",
            snapshot.title,
            markdown.len(),
            conversion.images.len(),
            warnings.len()
        );

        Rendered {
            title: snapshot.title.clone(),
            markdown,
            images: conversion.images,
            warnings,
        }
    }

    /// Validate a raw capture and render it
    pub fn render_capture(&self, capture: &Value) -> Result<Rendered> {
        let snapshot = Snapshot::from_capture(capture, self.limits)?;
        Ok(self.render(&snapshot))
    }

    /// Validate a capture given as JSON text and render it
    pub fn render_json(&self, json: &str) -> Result<Rendered> {
        let snapshot = Snapshot::from_json(json, self.limits)?;
        Ok(self.render(&snapshot))
    }

    /// Get the current options
    pub fn options(&self) -> &LarkdownOptions {
        &self.options
    }

    /// Get mutable access to options
    pub fn options_mut(&mut self) -> &mut LarkdownOptions {
        &mut self.options
    }

    pub fn limits(&self) -> SnapshotLimits {
        self.limits
    }
}

impl Default for LarkdownService {
    fn default() -> Self {
        Self::new()
    }
}

/// Add `# title` unless the document already opens with a heading
fn prepend_title(document: &mut MdBlock, title: &str) {
    let title = title.trim();
    if title.is_empty() {
        return;
    }
    let MdBlock::Document(blocks) = document else {
        return;
    };

    let opens_with_heading = blocks
        .iter()
        .find(|block| !block.is_blank())
        .is_some_and(|block| matches!(block, MdBlock::Heading { level, .. } if *level <= 6));

    if !opens_with_heading {
        blocks.insert(
            0,
            MdBlock::Heading {
                level: 1,
                content: vec![Inline::Text(title.to_string())],
            },
        );
    }
}
