//! Rich-text composition
//!
//! Builds inline Markdown nodes from styled runs. Markup nests in a fixed
//! order, innermost first: bold/italic, strikethrough, color, link. Inline
//! code replaces the first three.

use larkdown_core::Inline;

use crate::model::StyledRun;
use crate::style::StyleAttributes;

/// Compose a paragraph's runs
pub fn compose_runs(runs: &[StyledRun]) -> Vec<Inline> {
    runs.iter().filter_map(compose_run).collect()
}

/// Compose a single run; paragraph-break markers and empty runs yield nothing
pub fn compose_run(run: &StyledRun) -> Option<Inline> {
    let attrs = &run.attrs;
    if attrs.paragraph_break {
        return None;
    }

    if let Some(equation) = &attrs.equation {
        return Some(Inline::Math(equation.clone()));
    }

    let mut text = run.text.clone();
    let mut link = attrs.link.clone();
    if let Some(mention) = &attrs.mention {
        text.push_str(&mention.title);
        link = Some(mention.url.clone());
    }

    if text.is_empty() {
        return None;
    }

    let inline = if attrs.inline_code {
        Inline::Code(text)
    } else {
        styled_text(text, &StyleAttributes::from_run(attrs))
    };

    Some(match link {
        Some(url) => Inline::Link {
            content: vec![inline],
            url,
            title: None,
        },
        None => inline,
    })
}

/// Apply a resolved style to plain text
pub fn styled_text(text: impl Into<String>, style: &StyleAttributes) -> Inline {
    let mut inline = Inline::Text(text.into());

    if style.italic {
        inline = Inline::Emphasis(vec![inline]);
    }
    if style.bold {
        inline = Inline::Strong(vec![inline]);
    }
    if style.strikethrough {
        inline = Inline::Strikethrough(vec![inline]);
    }
    if style.has_color() {
        inline = Inline::Colored {
            foreground: style.foreground.clone(),
            background: style.background.clone(),
            content: vec![inline],
        };
    }

    inline
}
