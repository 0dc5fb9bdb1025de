//! Style resolution
//!
//! Text runs and spreadsheet cells describe color and font in different
//! encodings. Both are resolved here into one [`StyleAttributes`] value so the
//! inline composer has a single code path.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::trace;

use crate::model::RunAttributes;

/// The platform's default text color. Text in this color carries no markup.
pub const DEFAULT_FOREGROUND: &str = "#1f2329";

/// Spreadsheet cells default to black rather than the document text color
const SHEET_DEFAULT_FOREGROUND: &str = "#000000";

static RGB_FUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^rgba?\(\s*([^,\s]+)\s*,\s*([^,\s]+)\s*,\s*([^,\s)]+)\s*(?:,\s*([^\s)]+)\s*)?\)$")
        .expect("valid regex")
});

/// Horizontal alignment of a sheet cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizontalAlign {
    Left,
    Center,
    Right,
    General,
}

/// Vertical alignment of a sheet cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalAlign {
    Top,
    Center,
    Bottom,
}

/// Canonical visual style. Colors are `#rrggbb` (or `#rrggbbaa` when
/// translucent); `None` means no color.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleAttributes {
    pub foreground: Option<String>,
    pub background: Option<String>,
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub underline: bool,
    pub horizontal_align: Option<HorizontalAlign>,
    pub vertical_align: Option<VerticalAlign>,
    pub border: bool,
}

impl StyleAttributes {
    /// Style of a rich-text run
    pub fn from_run(attrs: &RunAttributes) -> Self {
        Self {
            foreground: attrs.foreground.as_deref().and_then(resolve_foreground),
            background: attrs.background.as_deref().and_then(normalize_color),
            bold: attrs.bold,
            italic: attrs.italic,
            strikethrough: attrs.strikethrough,
            ..Default::default()
        }
    }

    /// Style of a spreadsheet style-reference object.
    ///
    /// Accepts both the public (`foreColor`) and private (`_foreColor`)
    /// property names, and a font given either as an object or as a CSS
    /// font shorthand.
    pub fn from_sheet_style(style: &Value) -> Self {
        let mut resolved = Self::default();

        if let Some(color) = first_str(style, &["foreColor", "_foreColor"]) {
            resolved.foreground = resolve_sheet_foreground(color);
        }
        if let Some(color) = first_str(style, &["backColor", "_backColor", "_backgroundColor"]) {
            resolved.background = normalize_color(color);
        }

        if let Some(font) = style.get("font").or_else(|| style.get("_font")) {
            resolved.apply_font(font);
        }

        // Bit flags: 1 underline, 2 line-through
        if let Some(decoration) = style.get("textDecoration").and_then(Value::as_u64) {
            resolved.underline |= decoration & 1 != 0;
            resolved.strikethrough |= decoration & 2 != 0;
        }

        resolved.horizontal_align = style
            .get("hAlign")
            .and_then(Value::as_u64)
            .and_then(|n| match n {
                0 => Some(HorizontalAlign::Left),
                1 => Some(HorizontalAlign::Center),
                2 => Some(HorizontalAlign::Right),
                3 => Some(HorizontalAlign::General),
                _ => None,
            });
        resolved.vertical_align = style
            .get("vAlign")
            .and_then(Value::as_u64)
            .and_then(|n| match n {
                0 => Some(VerticalAlign::Top),
                1 => Some(VerticalAlign::Center),
                2 => Some(VerticalAlign::Bottom),
                _ => None,
            });

        resolved.border = [
            "border",
            "borderLeft",
            "borderTop",
            "borderRight",
            "borderBottom",
            "_borderLeft",
            "_borderTop",
            "_borderRight",
            "_borderBottom",
        ]
        .iter()
        .any(|key| style.get(key).is_some_and(|v| !v.is_null() && v != &Value::Bool(false)));

        resolved
    }

    /// Style of a rich-text segment inside a sheet cell, layered over the
    /// cell's own style
    pub fn from_segment(segment_style: &Value, base: &StyleAttributes) -> Self {
        let mut resolved = base.clone();

        if let Some(color) = first_str(segment_style, &["fontColor", "fc", "_foreColor"]) {
            resolved.foreground = resolve_sheet_foreground(color);
        }
        if let Some(color) = first_str(segment_style, &["backgroundColor", "bc", "_backColor"]) {
            resolved.background = normalize_color(color);
        }
        resolved.bold |= flag(segment_style, &["bold", "bl"]);
        resolved.italic |= flag(segment_style, &["italic", "it"]);
        resolved.strikethrough |= flag(segment_style, &["strikethrough", "st"]);
        resolved.underline |= flag(segment_style, &["underline", "ul"]);

        if let Some(font) = segment_style.get("font") {
            resolved.apply_font(font);
        }

        resolved
    }

    /// Style of an HTML element's inline `style` attribute
    pub fn from_css(css: &str) -> Self {
        let mut resolved = Self::default();
        for declaration in css.split(';') {
            let Some((property, value)) = declaration.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match property.trim().to_ascii_lowercase().as_str() {
                "color" => resolved.foreground = resolve_sheet_foreground(value),
                "background-color" | "background" => resolved.background = normalize_color(value),
                "text-decoration" | "text-decoration-line" => {
                    resolved.strikethrough |= value.contains("line-through");
                    resolved.underline |= value.contains("underline");
                }
                "font-weight" => {
                    resolved.bold |= value == "bold"
                        || value == "bolder"
                        || value.parse::<u32>().is_ok_and(|n| n >= 700)
                }
                "font-style" => resolved.italic |= value == "italic" || value == "oblique",
                _ => {}
            }
        }
        resolved
    }

    fn apply_font(&mut self, font: &Value) {
        match font {
            Value::Object(_) => {
                let weight = match font.get("fontWeight") {
                    Some(Value::Number(n)) => n.as_u64().unwrap_or(400),
                    Some(Value::String(s)) if s == "bold" || s == "bolder" => 700,
                    Some(Value::String(s)) => s.parse().unwrap_or(400),
                    _ => 400,
                };
                self.bold |= weight >= 700;
                self.italic |= font
                    .get("fontStyle")
                    .and_then(Value::as_str)
                    .is_some_and(|s| s == "italic" || s == "oblique");
                if let Some(decoration) = font.get("textDecoration").and_then(Value::as_str) {
                    self.strikethrough |= decoration.contains("line-through");
                    self.underline |= decoration.contains("underline");
                }
            }
            Value::String(shorthand) => {
                let shorthand = shorthand.to_ascii_lowercase();
                let words: Vec<&str> = shorthand.split_whitespace().collect();
                self.bold |= words
                    .iter()
                    .any(|w| *w == "bold" || *w == "bolder" || w.parse::<u32>().is_ok_and(|n| n >= 700));
                self.italic |= words.iter().any(|w| *w == "italic" || *w == "oblique");
                self.strikethrough |= shorthand.contains("line-through");
            }
            _ => {}
        }
    }

    pub fn has_color(&self) -> bool {
        self.foreground.is_some() || self.background.is_some()
    }
}

fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| value.get(key).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
}

fn flag(value: &Value, keys: &[&str]) -> bool {
    keys.iter().any(|key| match value.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true",
        Some(Value::Number(n)) => n.as_u64().is_some_and(|n| n != 0),
        _ => false,
    })
}

/// Normalize a foreground color; the platform default becomes `None`
pub fn resolve_foreground(raw: &str) -> Option<String> {
    normalize_color(raw).filter(|color| color != DEFAULT_FOREGROUND)
}

fn resolve_sheet_foreground(raw: &str) -> Option<String> {
    resolve_foreground(raw).filter(|color| color != SHEET_DEFAULT_FOREGROUND)
}

/// Normalize `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(...)` and `rgba(...)`
/// to lower-case `#rrggbb`, or `#rrggbbaa` when alpha is below 1.
///
/// Returns `None` for transparent, `inherit`, empty or unparseable input.
pub fn normalize_color(raw: &str) -> Option<String> {
    let value = raw.trim().to_ascii_lowercase();
    if value.is_empty() || value == "inherit" || value == "transparent" || value == "none" {
        return None;
    }

    let rgba = if let Some(hex) = value.strip_prefix('#') {
        parse_hex(hex)
    } else if let Some(caps) = RGB_FUNCTION.captures(&value) {
        let channel = |i: usize| caps.get(i).and_then(|m| parse_channel(m.as_str()));
        let alpha = match caps.get(4) {
            Some(m) => parse_alpha(m.as_str()),
            None => Some(255),
        };
        match (channel(1), channel(2), channel(3), alpha) {
            (Some(r), Some(g), Some(b), Some(a)) => Some([r, g, b, a]),
            _ => None,
        }
    } else {
        None
    };

    let Some([r, g, b, a]) = rgba else {
        trace!("Unrecognized color value: {}", raw);
        return None;
    };

    match a {
        0 => None,
        255 => Some(format!("#{:02x}{:02x}{:02x}", r, g, b)),
        _ => Some(format!("#{:02x}{:02x}{:02x}{:02x}", r, g, b, a)),
    }
}

fn parse_hex(hex: &str) -> Option<[u8; 4]> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|n| n * 17);
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();

    match hex.len() {
        3 => Some([nibble(0)?, nibble(1)?, nibble(2)?, 255]),
        4 => Some([nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?]),
        6 => Some([byte(0)?, byte(2)?, byte(4)?, 255]),
        8 => Some([byte(0)?, byte(2)?, byte(4)?, byte(6)?]),
        _ => None,
    }
}

fn parse_channel(raw: &str) -> Option<u8> {
    if let Some(percent) = raw.strip_suffix('%') {
        let p: f64 = percent.parse().ok()?;
        return Some((p.clamp(0.0, 100.0) * 2.55).round() as u8);
    }
    let n: f64 = raw.parse().ok()?;
    Some(n.clamp(0.0, 255.0).round() as u8)
}

fn parse_alpha(raw: &str) -> Option<u8> {
    if let Some(percent) = raw.strip_suffix('%') {
        let p: f64 = percent.parse().ok()?;
        return Some((p.clamp(0.0, 100.0) * 2.55).round() as u8);
    }
    let a: f64 = raw.parse().ok()?;
    Some((a.clamp(0.0, 1.0) * 255.0).round() as u8)
}
