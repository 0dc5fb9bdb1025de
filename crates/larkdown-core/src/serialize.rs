//! Markdown AST serialization
//!
//! Converts Markdown AST nodes into Markdown text.

use crate::ast::{Block, Inline, ListItem, ListMarker};
use crate::options::{HeadingStyle, Options};

/// Serialize a block to Markdown string.
///
/// Non-empty output always ends with exactly one newline.
pub fn serialize(block: &Block, options: &Options) -> String {
    let mut output = String::with_capacity(4096);
    serialize_block(block, options, &mut output);

    collapse_and_trim(&mut output);
    if !output.is_empty() {
        output.push('\n');
    }
    output
}

fn serialize_block(block: &Block, options: &Options, out: &mut String) {
    match block {
        Block::Document(blocks) => serialize_blocks(blocks, options, out),

        Block::Heading { level, content } => serialize_heading(*level, content, options, out),

        Block::Paragraph(inlines) => serialize_paragraph(inlines, options, out),

        Block::BlockQuote(blocks) => {
            let start_len = out.len();
            serialize_blocks(blocks, options, out);

            // Process the content we just wrote to add > prefixes
            let content = out[start_len..].trim_end().to_string();
            out.truncate(start_len);
            if content.is_empty() {
                return;
            }

            for (i, line) in content.lines().enumerate() {
                if i > 0 {
                    out.push('\n');
                }
                out.push('>');
                if !line.is_empty() {
                    out.push(' ');
                    out.push_str(line);
                }
            }
            out.push_str("\n\n");
        }

        Block::List(items) => serialize_list(items, options, out),

        Block::CodeBlock { language, code } => {
            serialize_code_block(language.as_deref(), code, options, out)
        }

        Block::ThematicBreak => {
            out.push_str(&options.hr);
            out.push_str("\n\n");
        }

        Block::Table { headers, rows } => serialize_table(headers, rows, options, out),

        Block::HtmlBlock(html) => {
            out.push_str(html);
            out.push_str("\n\n");
        }
    }
}

fn serialize_blocks(blocks: &[Block], options: &Options, out: &mut String) {
    for block in blocks {
        if !block.is_blank() {
            serialize_block(block, options, out);
        }
    }
}

fn serialize_paragraph(inlines: &[Inline], options: &Options, out: &mut String) {
    let start_len = out.len();
    serialize_inlines(inlines, options, out);
    if out[start_len..].trim().is_empty() {
        out.truncate(start_len);
    } else {
        out.push_str("\n\n");
    }
}

fn serialize_heading(level: u8, content: &[Inline], options: &Options, out: &mut String) {
    if level > 6 {
        serialize_paragraph(content, options, out);
        return;
    }

    let start_len = out.len();
    serialize_inlines(content, options, out);

    if out[start_len..].trim().is_empty() {
        out.truncate(start_len);
        return;
    }

    let text_len = out[start_len..].chars().count();

    match options.heading_style {
        HeadingStyle::Setext if level <= 2 => {
            out.push('\n');
            let underline = if level == 1 { '=' } else { '-' };
            for _ in 0..text_len {
                out.push(underline);
            }
            out.push_str("\n\n");
        }
        _ => {
            // Need to prepend hashes - shift content
            let text = out[start_len..].to_string();
            out.truncate(start_len);
            for _ in 0..level.max(1) {
                out.push('#');
            }
            out.push(' ');
            out.push_str(&text);
            out.push_str("\n\n");
        }
    }
}

fn list_marker(marker: &ListMarker, options: &Options) -> String {
    match marker {
        ListMarker::Bullet => options.bullet_list_marker.to_string(),
        ListMarker::Ordered(number) => format!("{}.", number),
        ListMarker::Task { done } => {
            format!(
                "{} [{}]",
                options.bullet_list_marker,
                if *done { 'x' } else { ' ' }
            )
        }
    }
}

fn serialize_list(items: &[ListItem], options: &Options, out: &mut String) {
    if items.is_empty() {
        return;
    }

    for item in items {
        let marker = list_marker(&item.marker, options);
        out.push_str(&marker);
        out.push(' ');

        // Continuation lines align with the item text
        serialize_list_item(item, options, marker.chars().count() + 1, out);
    }

    out.push('\n');
}

fn serialize_list_item(item: &ListItem, options: &Options, prefix_len: usize, out: &mut String) {
    let start_len = out.len();

    for (i, block) in item.content.iter().enumerate() {
        match block {
            Block::Paragraph(inlines) => {
                serialize_inlines(inlines, options, out);
                match item.content.get(i + 1) {
                    Some(Block::List(_)) => out.push('\n'),
                    Some(_) => out.push_str("\n\n"),
                    None => {}
                }
            }
            _ => {
                if i > 0 && !out[start_len..].ends_with('\n') {
                    out.push('\n');
                }
                serialize_block(block, options, out);
            }
        }
    }

    // Indent continuation lines
    let content = out[start_len..].trim_end().to_string();
    out.truncate(start_len);

    if content.starts_with('\n') || content.is_empty() {
        // Drop the space after the marker when the item has no text
        if out.ends_with(' ') {
            out.pop();
        }
    }

    let continuation_indent = " ".repeat(prefix_len);

    for (i, line) in content.lines().enumerate() {
        if i > 0 && !line.is_empty() {
            out.push_str(&continuation_indent);
        }
        out.push_str(line);
        out.push('\n');
    }
    if content.is_empty() {
        out.push('\n');
    }
}

fn fence_for(code: &str, options: &Options) -> String {
    let Some(fence_char) = options.fence.chars().next() else {
        return "```".to_string();
    };

    // Longest run of the fence character inside the code
    let mut longest = 0;
    let mut current = 0;
    for c in code.chars() {
        if c == fence_char {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }

    let base = options.fence.chars().count();
    if longest >= base {
        fence_char.to_string().repeat(longest + 1)
    } else {
        options.fence.clone()
    }
}

fn serialize_code_block(language: Option<&str>, code: &str, options: &Options, out: &mut String) {
    let fence = fence_for(code, options);
    out.push_str(&fence);
    out.push_str(language.unwrap_or(""));
    out.push('\n');
    if !code.is_empty() {
        out.push_str(code);
        out.push('\n');
    }
    out.push_str(&fence);
    out.push_str("\n\n");
}

fn serialize_table(
    headers: &[Vec<Inline>],
    rows: &[Vec<Vec<Inline>>],
    options: &Options,
    out: &mut String,
) {
    if headers.is_empty() {
        return;
    }

    serialize_table_row(headers, options, out);

    // Separator row
    out.push('|');
    for _ in headers {
        out.push_str(" --- |");
    }
    out.push('\n');

    // Data rows; a short trailing row keeps only the cells it has
    for row in rows {
        serialize_table_row(row, options, out);
    }

    out.push('\n');
}

fn serialize_table_row(cells: &[Vec<Inline>], options: &Options, out: &mut String) {
    out.push('|');
    for cell in cells {
        let mut text = String::new();
        serialize_inlines(cell, options, &mut text);
        out.push(' ');
        out.push_str(&escape_table_cell(text.trim()));
        out.push_str(" |");
    }
    out.push('\n');
}

fn serialize_inlines(inlines: &[Inline], options: &Options, out: &mut String) {
    for inline in inlines {
        serialize_inline(inline, options, out);
    }
}

/// Wrap the content written since `start` in `open`/`close`, or drop it when blank
fn wrap_from(out: &mut String, start: usize, open: &str, close: &str) {
    if out[start..].trim().is_empty() {
        out.truncate(start);
    } else {
        let inner = out[start..].to_string();
        out.truncate(start);
        out.push_str(open);
        out.push_str(&inner);
        out.push_str(close);
    }
}

fn serialize_inline(inline: &Inline, options: &Options, out: &mut String) {
    match inline {
        Inline::Text(text) => out.push_str(text),

        Inline::Strong(content) => {
            let start = out.len();
            serialize_inlines(content, options, out);
            let delimiter = options.strong_delimiter.as_str();
            wrap_from(out, start, delimiter, delimiter);
        }

        Inline::Emphasis(content) => {
            let start = out.len();
            serialize_inlines(content, options, out);
            let delimiter = options.em_delimiter.to_string();
            wrap_from(out, start, &delimiter, &delimiter);
        }

        Inline::Strikethrough(content) => {
            let start = out.len();
            serialize_inlines(content, options, out);
            wrap_from(out, start, "~~", "~~");
        }

        Inline::Code(code) => {
            if !code.is_empty() {
                let backticks = if code.contains('`') { "``" } else { "`" };
                let space = if code.starts_with('`') || code.ends_with('`') {
                    " "
                } else {
                    ""
                };
                out.push_str(backticks);
                out.push_str(space);
                out.push_str(code);
                out.push_str(space);
                out.push_str(backticks);
            }
        }

        Inline::Math(source) => {
            if !source.trim().is_empty() {
                out.push('$');
                out.push_str(source);
                out.push('$');
            }
        }

        Inline::Link {
            content,
            url,
            title,
        } => {
            out.push('[');
            serialize_inlines(content, options, out);
            out.push_str("](");
            out.push_str(url);
            if let Some(t) = title {
                out.push_str(" \"");
                out.push_str(t);
                out.push('"');
            }
            out.push(')');
        }

        Inline::Image { alt, url, title } => {
            out.push_str("![");
            out.push_str(alt);
            out.push_str("](");
            out.push_str(url);
            if let Some(t) = title {
                out.push_str(" \"");
                out.push_str(t);
                out.push('"');
            }
            out.push(')');
        }

        Inline::Colored {
            foreground,
            background,
            content,
        } => {
            let start = out.len();
            serialize_inlines(content, options, out);
            if !options.color_markup || out[start..].is_empty() {
                return;
            }

            let mut wrapped = escape_html(&out[start..]);
            out.truncate(start);
            if let Some(fg) = foreground {
                wrapped = format!("<font color=\"{}\">{}</font>", fg, wrapped);
            }
            if let Some(bg) = background {
                wrapped = format!("<mark style=\"background:{}\">{}</mark>", bg, wrapped);
            }
            out.push_str(&wrapped);
        }
    }
}

/// Escape the characters that would otherwise open or close HTML markup
pub fn escape_html(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            _ => result.push(c),
        }
    }
    result
}

/// Escape content that cannot appear verbatim inside a pipe-table cell
pub fn escape_table_cell(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '|' => result.push_str("\\|"),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                result.push_str("<br>");
            }
            '\n' => result.push_str("<br>"),
            _ => result.push(c),
        }
    }
    result
}

/// Collapse runs of blank lines outside fenced code into one, and trim
/// leading and trailing newlines
fn collapse_and_trim(s: &mut String) {
    let mut result = String::with_capacity(s.len());
    let mut blank_run = 0;
    let mut open_fence: Option<(char, usize)> = None;

    for line in s.trim_matches('\n').split('\n') {
        let bare = line.trim_start_matches(|c: char| c == '>' || c == ' ');
        if let Some((marker, len)) = fence_run(bare) {
            match open_fence {
                None => open_fence = Some((marker, len)),
                // Only a bare fence of the same marker, at least as long, closes
                Some((open, open_len))
                    if marker == open && len >= open_len && bare[len..].trim().is_empty() =>
                {
                    open_fence = None
                }
                Some(_) => {}
            }
        }

        if line.is_empty() && open_fence.is_none() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }

        result.push_str(line);
        result.push('\n');
    }

    result.truncate(result.trim_end_matches('\n').len());
    *s = result;
}

/// Marker and length of a fence opening the line, if any
fn fence_run(line: &str) -> Option<(char, usize)> {
    let marker = line.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = line.chars().take_while(|c| *c == marker).count();
    (len >= 3).then_some((marker, len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn default_options() -> Options {
        Options::default()
    }

    fn text(s: &str) -> Inline {
        Inline::Text(s.to_string())
    }

    #[test]
    fn test_paragraph() {
        let block = Block::Paragraph(vec![text("Hello World")]);
        let result = serialize(&block, &default_options());
        assert_eq!(result, "Hello World\n");
    }

    #[test]
    fn test_empty_document() {
        let block = Block::Document(vec![Block::Paragraph(vec![text("  ")])]);
        assert_eq!(serialize(&block, &default_options()), "");
    }

    #[test]
    fn test_heading_atx() {
        let block = Block::Heading {
            level: 3,
            content: vec![text("Section")],
        };
        let result = serialize(&block, &default_options());
        assert_eq!(result, "### Section\n");
    }

    #[test]
    fn test_heading_setext_h1() {
        let mut options = default_options();
        options.heading_style = HeadingStyle::Setext;

        let block = Block::Heading {
            level: 1,
            content: vec![text("Title")],
        };
        let result = serialize(&block, &options);
        assert_eq!(result, "Title\n=====\n");
    }

    #[test]
    fn test_heading_beyond_six_is_paragraph() {
        let block = Block::Heading {
            level: 8,
            content: vec![text("Deep")],
        };
        assert_eq!(serialize(&block, &default_options()), "Deep\n");
    }

    #[test]
    fn test_strong_emphasis_strike() {
        let block = Block::Paragraph(vec![Inline::Strikethrough(vec![Inline::Strong(vec![
            Inline::Emphasis(vec![text("x")]),
        ])])]);
        let result = serialize(&block, &default_options());
        assert_eq!(result, "~~***x***~~\n");
    }

    #[test]
    fn test_inline_code() {
        let block = Block::Paragraph(vec![Inline::Code("a`b".to_string())]);
        let result = serialize(&block, &default_options());
        assert_eq!(result, "``a`b``\n");
    }

    #[test]
    fn test_math() {
        let block = Block::Paragraph(vec![Inline::Math("E=mc^2".to_string())]);
        assert_eq!(serialize(&block, &default_options()), "$E=mc^2$\n");
    }

    #[test]
    fn test_link() {
        let block = Block::Paragraph(vec![Inline::Link {
            content: vec![text("Example")],
            url: "https://example.com".to_string(),
            title: None,
        }]);
        let result = serialize(&block, &default_options());
        assert_eq!(result, "[Example](https://example.com)\n");
    }

    #[test]
    fn test_image() {
        let block = Block::Paragraph(vec![Inline::Image {
            alt: "Alt text".to_string(),
            url: "image.png".to_string(),
            title: None,
        }]);
        let result = serialize(&block, &default_options());
        assert_eq!(result, "![Alt text](image.png)\n");
    }

    #[test]
    fn test_colored_escapes_content() {
        let block = Block::Paragraph(vec![Inline::Colored {
            foreground: Some("#d83931".to_string()),
            background: Some("#fbbfbc".to_string()),
            content: vec![text("a<b")],
        }]);
        let result = serialize(&block, &default_options());
        assert_eq!(
            result,
            "<mark style=\"background:#fbbfbc\"><font color=\"#d83931\">a&lt;b</font></mark>\n"
        );
    }

    #[test]
    fn test_colored_without_markup() {
        let mut options = default_options();
        options.color_markup = false;
        let block = Block::Paragraph(vec![Inline::Colored {
            foreground: Some("#d83931".to_string()),
            background: None,
            content: vec![text("plain")],
        }]);
        assert_eq!(serialize(&block, &options), "plain\n");
    }

    #[test]
    fn test_code_block() {
        let block = Block::CodeBlock {
            language: Some("rust".to_string()),
            code: "let x = 1;\n\n\n\nlet y = 2;".to_string(),
        };
        let result = serialize(&block, &default_options());
        assert_eq!(result, "```rust\nlet x = 1;\n\n\n\nlet y = 2;\n```\n");
    }

    #[test]
    fn test_code_block_with_fence_inside() {
        let block = Block::CodeBlock {
            language: None,
            code: "```\nnested\n```".to_string(),
        };
        let result = serialize(&block, &default_options());
        assert_eq!(result, "````\n```\nnested\n```\n````\n");
    }

    #[test]
    fn test_blockquote() {
        let block = Block::BlockQuote(vec![
            Block::Paragraph(vec![text("Quote")]),
            Block::Paragraph(vec![text("More")]),
        ]);
        let result = serialize(&block, &default_options());
        assert_eq!(result, "> Quote\n>\n> More\n");
    }

    #[test]
    fn test_bullet_list() {
        let block = Block::List(vec![
            ListItem::from_inlines(ListMarker::Bullet, vec![text("One")]),
            ListItem::from_inlines(ListMarker::Bullet, vec![text("Two")]),
        ]);
        let result = serialize(&block, &default_options());
        assert_eq!(result, "- One\n- Two\n");
    }

    #[test]
    fn test_ordered_list_keeps_given_numbers() {
        let block = Block::List(vec![
            ListItem::from_inlines(ListMarker::Ordered(1), vec![text("First")]),
            ListItem::from_inlines(ListMarker::Ordered(2), vec![text("Second")]),
        ]);
        let result = serialize(&block, &default_options());
        assert_eq!(result, "1. First\n2. Second\n");
    }

    #[test]
    fn test_task_list() {
        let block = Block::List(vec![
            ListItem::from_inlines(ListMarker::Task { done: true }, vec![text("done")]),
            ListItem::from_inlines(ListMarker::Task { done: false }, vec![text("open")]),
        ]);
        let result = serialize(&block, &default_options());
        assert_eq!(result, "- [x] done\n- [ ] open\n");
    }

    #[test]
    fn test_nested_list_indents_by_marker_width() {
        let inner = Block::List(vec![
            ListItem::from_inlines(ListMarker::Bullet, vec![text("x")]),
            ListItem::from_inlines(ListMarker::Bullet, vec![text("y")]),
        ]);
        let block = Block::List(vec![
            ListItem::new(
                ListMarker::Ordered(1),
                vec![Block::Paragraph(vec![text("a")]), inner],
            ),
            ListItem::from_inlines(ListMarker::Ordered(2), vec![text("b")]),
        ]);
        let result = serialize(&block, &default_options());
        assert_eq!(result, "1. a\n   - x\n   - y\n2. b\n");
    }

    #[test]
    fn test_empty_list_item_has_no_trailing_space() {
        let block = Block::List(vec![ListItem::from_inlines(ListMarker::Bullet, vec![])]);
        assert_eq!(serialize(&block, &default_options()), "-\n");
    }

    #[test]
    fn test_thematic_break() {
        let block = Block::ThematicBreak;
        let result = serialize(&block, &default_options());
        assert_eq!(result, "---\n");
    }

    #[test]
    fn test_table_with_partial_row() {
        let block = Block::Table {
            headers: vec![vec![text("A")], vec![text("B")]],
            rows: vec![
                vec![vec![text("1")], vec![text("2")]],
                vec![vec![text("3")]],
            ],
        };
        let result = serialize(&block, &default_options());
        assert_eq!(result, "| A | B |\n| --- | --- |\n| 1 | 2 |\n| 3 |\n");
    }

    #[test]
    fn test_table_cell_escaping() {
        let block = Block::Table {
            headers: vec![vec![text("a|b")], vec![text("line1\nline2")]],
            rows: vec![],
        };
        let result = serialize(&block, &default_options());
        assert_eq!(result, "| a\\|b | line1<br>line2 |\n| --- | --- |\n");
    }

    #[test]
    fn test_code_containing_fence_keeps_blank_lines() {
        let code = "```rust\n\n\n\nx";
        let block = Block::Document(vec![
            Block::CodeBlock {
                language: None,
                code: code.to_string(),
            },
            Block::Paragraph(vec![text("after")]),
        ]);
        let result = serialize(&block, &default_options());
        assert_eq!(result, "````\n```rust\n\n\n\nx\n````\n\nafter\n");
    }

    #[test]
    fn test_blank_lines_collapse_after_long_fence_closes() {
        let block = Block::Document(vec![
            Block::CodeBlock {
                language: None,
                code: "~~~\n\n\nx".to_string(),
            },
            Block::HtmlBlock("a\n\n\n\nb".to_string()),
        ]);
        let result = serialize(&block, &default_options());
        assert!(result.contains("~~~\n\n\nx"));
        assert!(result.ends_with("a\n\nb\n"));
    }

    #[test]
    fn test_blocks_separated_by_one_blank_line() {
        let block = Block::Document(vec![
            Block::Paragraph(vec![text("one")]),
            Block::HtmlBlock("<!-- unsupported block: mindmap -->".to_string()),
            Block::ThematicBreak,
        ]);
        let result = serialize(&block, &default_options());
        assert_eq!(
            result,
            "one\n\n<!-- unsupported block: mindmap -->\n\n---\n"
        );
    }
}
