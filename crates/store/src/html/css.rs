//! Inline CSS declarations for formatting properties

use crate::xml::{fmt_num, parse_length};
use doc_model::{
    Alignment, Color, Formatting, LineSpacing, Property, PropertyScope, PropertyValue,
    VerticalAlign,
};

/// Render formatting as an inline `style` attribute value
pub fn to_css(formatting: &Formatting) -> String {
    let mut decls: Vec<(String, String)> = Vec::new();
    let mut push = |name: &str, value: String| decls.push((name.to_string(), value));

    for (property, value) in formatting.iter() {
        match (property, value) {
            (Property::FontFamily, PropertyValue::Text(name)) => {
                push("font-family", format!("'{}'", name.replace('\'', "")))
            }
            (Property::FontSize, PropertyValue::Points(pt)) => push("font-size", pt_value(*pt)),
            (Property::Bold, PropertyValue::Bool(b)) => {
                push("font-weight", if *b { "bold" } else { "normal" }.into())
            }
            (Property::Italic, PropertyValue::Bool(b)) => {
                push("font-style", if *b { "italic" } else { "normal" }.into())
            }
            (Property::Color, PropertyValue::Color(c)) => push("color", c.to_string()),
            (Property::Highlight | Property::CellShading, v) => push("background-color", color_value(v)),
            (Property::VerticalAlign, PropertyValue::VerticalAlign(v)) => push(
                "vertical-align",
                match v {
                    VerticalAlign::Baseline => "baseline",
                    VerticalAlign::Superscript => "super",
                    VerticalAlign::Subscript => "sub",
                }
                .into(),
            ),
            (Property::AllCaps, PropertyValue::Bool(b)) => {
                push("text-transform", if *b { "uppercase" } else { "none" }.into())
            }
            (Property::SmallCaps, PropertyValue::Bool(b)) => {
                push("font-variant", if *b { "small-caps" } else { "normal" }.into())
            }
            (Property::Alignment, PropertyValue::Alignment(a)) => push(
                "text-align",
                match a {
                    Alignment::Left => "left",
                    Alignment::Center => "center",
                    Alignment::Right => "right",
                    Alignment::Justify => "justify",
                }
                .into(),
            ),
            (Property::IndentLeft, PropertyValue::Points(pt)) => push("margin-left", pt_value(*pt)),
            (Property::IndentRight, PropertyValue::Points(pt)) => push("margin-right", pt_value(*pt)),
            (Property::IndentFirstLine, PropertyValue::Points(pt)) => {
                push("text-indent", pt_value(*pt))
            }
            (Property::SpaceBefore, PropertyValue::Points(pt)) => push("margin-top", pt_value(*pt)),
            (Property::SpaceAfter, PropertyValue::Points(pt)) => push("margin-bottom", pt_value(*pt)),
            (Property::LineSpacing, PropertyValue::LineSpacing(spacing)) => match spacing {
                LineSpacing::Multiple(m) => push("line-height", fmt_num(*m)),
                LineSpacing::Exact(pt) => push("line-height", pt_value(*pt)),
                LineSpacing::AtLeast(pt) => push("min-height", pt_value(*pt)),
            },
            (Property::KeepWithNext, PropertyValue::Bool(b)) => {
                push("page-break-after", if *b { "avoid" } else { "auto" }.into())
            }
            (Property::KeepTogether, PropertyValue::Bool(b)) => {
                push("page-break-inside", if *b { "avoid" } else { "auto" }.into())
            }
            (Property::PageBreakBefore, PropertyValue::Bool(b)) => {
                push("page-break-before", if *b { "always" } else { "auto" }.into())
            }
            (Property::BorderWidth, PropertyValue::Points(pt)) => push("border-width", pt_value(*pt)),
            (Property::CellPadding, PropertyValue::Points(pt)) => push("padding", pt_value(*pt)),
            _ => {}
        }
    }

    // Underline and strike share one declaration.
    let underline = formatting.get(Property::Underline).and_then(|v| v.as_bool());
    let strike = formatting.get(Property::Strikethrough).and_then(|v| v.as_bool());
    if underline.is_some() || strike.is_some() {
        let mut parts = Vec::new();
        if underline == Some(true) {
            parts.push("underline");
        }
        if strike == Some(true) {
            parts.push("line-through");
        }
        let value = if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join(" ")
        };
        decls.push(("text-decoration".into(), value));
    }

    decls
        .into_iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join("; ")
}

fn pt_value(pt: f32) -> String {
    format!("{}pt", fmt_num(pt))
}

fn color_value(value: &PropertyValue) -> String {
    match value {
        PropertyValue::Color(c) => c.to_string(),
        _ => "transparent".into(),
    }
}

/// Parse a CSS color: `#rrggbb`, `#rgb`, `rgb(r, g, b)` or a few names
pub fn parse_color(value: &str) -> Option<Color> {
    let v = value.trim().to_ascii_lowercase();
    if let Some(hex) = v.strip_prefix('#') {
        if hex.len() == 3 {
            let expanded: String = hex.chars().flat_map(|c| [c, c]).collect();
            return Color::from_hex(&expanded);
        }
        return Color::from_hex(hex);
    }
    if let Some(inner) = v.strip_prefix("rgb(").and_then(|s| s.strip_suffix(')')) {
        let channels: Vec<u8> = inner
            .split(',')
            .filter_map(|c| c.trim().parse::<u8>().ok())
            .collect();
        if let [r, g, b] = channels[..] {
            return Some(Color::rgb(r, g, b));
        }
        return None;
    }
    match v.as_str() {
        "black" => Some(Color::BLACK),
        "white" => Some(Color::WHITE),
        "red" => Some(Color::rgb(0xFF, 0, 0)),
        "green" => Some(Color::rgb(0, 0x80, 0)),
        "blue" => Some(Color::rgb(0, 0, 0xFF)),
        "yellow" => Some(Color::rgb(0xFF, 0xFF, 0)),
        "gray" | "grey" => Some(Color::rgb(0x80, 0x80, 0x80)),
        _ => None,
    }
}

/// Split a `style` attribute into lower-case property names and values
pub fn declarations(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| decl.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .collect()
}

/// Formatting carried by a `style` attribute. A background is cell shading
/// on table elements and highlight elsewhere. Declarations with no model
/// counterpart are returned by name.
pub fn from_css(style: &str, scope: PropertyScope) -> (Formatting, Vec<String>) {
    let mut f = Formatting::new();
    let mut unknown = Vec::new();
    let background = if scope == PropertyScope::Table {
        Property::CellShading
    } else {
        Property::Highlight
    };
    let set = |f: &mut Formatting, p: Property, v: PropertyValue| {
        f.set(p, Some(v));
    };

    for (name, value) in declarations(style) {
        let lower = value.to_ascii_lowercase();
        let points = parse_length(&value).map(PropertyValue::Points);
        match name.as_str() {
            "font-family" => {
                let first = value.split(',').next().unwrap_or("").trim();
                let family = first.trim_matches(|c| c == '\'' || c == '"').trim();
                if !family.is_empty() {
                    set(&mut f, Property::FontFamily, PropertyValue::Text(family.to_string()));
                }
            }
            "font-size" => {
                if let Some(v) = points {
                    set(&mut f, Property::FontSize, v);
                }
            }
            "font-weight" => {
                let bold = match lower.as_str() {
                    "bold" | "bolder" => true,
                    n => n.parse::<u32>().map(|w| w >= 600).unwrap_or(false),
                };
                set(&mut f, Property::Bold, PropertyValue::Bool(bold));
            }
            "font-style" => set(
                &mut f,
                Property::Italic,
                PropertyValue::Bool(lower == "italic" || lower == "oblique"),
            ),
            "text-decoration" | "text-decoration-line" => {
                set(&mut f, Property::Underline, PropertyValue::Bool(lower.contains("underline")));
                set(
                    &mut f,
                    Property::Strikethrough,
                    PropertyValue::Bool(lower.contains("line-through")),
                );
            }
            "color" => {
                if let Some(c) = parse_color(&value) {
                    set(&mut f, Property::Color, PropertyValue::Color(c));
                }
            }
            "background-color" | "background" => {
                let v = if lower == "transparent" || lower == "none" {
                    Some(PropertyValue::Transparent)
                } else {
                    parse_color(&value).map(PropertyValue::Color)
                };
                if let Some(v) = v {
                    set(&mut f, background, v);
                }
            }
            "vertical-align" => {
                let v = match lower.as_str() {
                    "super" => VerticalAlign::Superscript,
                    "sub" => VerticalAlign::Subscript,
                    _ => VerticalAlign::Baseline,
                };
                set(&mut f, Property::VerticalAlign, PropertyValue::VerticalAlign(v));
            }
            "text-transform" => {
                set(&mut f, Property::AllCaps, PropertyValue::Bool(lower == "uppercase"))
            }
            "font-variant" => {
                set(&mut f, Property::SmallCaps, PropertyValue::Bool(lower == "small-caps"))
            }
            "text-align" => {
                let a = match lower.as_str() {
                    "center" => Alignment::Center,
                    "right" | "end" => Alignment::Right,
                    "justify" => Alignment::Justify,
                    _ => Alignment::Left,
                };
                set(&mut f, Property::Alignment, PropertyValue::Alignment(a));
            }
            "margin-left" => points.into_iter().for_each(|v| set(&mut f, Property::IndentLeft, v)),
            "margin-right" => points.into_iter().for_each(|v| set(&mut f, Property::IndentRight, v)),
            "text-indent" => {
                points.into_iter().for_each(|v| set(&mut f, Property::IndentFirstLine, v))
            }
            "margin-top" => points.into_iter().for_each(|v| set(&mut f, Property::SpaceBefore, v)),
            "margin-bottom" => points.into_iter().for_each(|v| set(&mut f, Property::SpaceAfter, v)),
            "line-height" => {
                let spacing = if lower.ends_with("pt") || lower.ends_with("px") {
                    parse_length(&value).map(LineSpacing::Exact)
                } else if let Some(pct) = lower.strip_suffix('%') {
                    pct.trim().parse::<f32>().ok().map(|p| LineSpacing::Multiple(p / 100.0))
                } else {
                    lower.parse::<f32>().ok().map(LineSpacing::Multiple)
                };
                if let Some(s) = spacing {
                    set(&mut f, Property::LineSpacing, PropertyValue::LineSpacing(s));
                }
            }
            "min-height" => {
                if let Some(pt) = parse_length(&value) {
                    set(
                        &mut f,
                        Property::LineSpacing,
                        PropertyValue::LineSpacing(LineSpacing::AtLeast(pt)),
                    );
                }
            }
            "page-break-after" | "break-after" => {
                set(&mut f, Property::KeepWithNext, PropertyValue::Bool(lower == "avoid"))
            }
            "page-break-inside" | "break-inside" => {
                set(&mut f, Property::KeepTogether, PropertyValue::Bool(lower == "avoid"))
            }
            "page-break-before" | "break-before" => set(
                &mut f,
                Property::PageBreakBefore,
                PropertyValue::Bool(lower == "always" || lower == "page"),
            ),
            "border-width" => points.into_iter().for_each(|v| set(&mut f, Property::BorderWidth, v)),
            "padding" => {
                let first = value.split_whitespace().next().unwrap_or("");
                if let Some(pt) = parse_length(first) {
                    set(&mut f, Property::CellPadding, PropertyValue::Points(pt));
                }
            }
            "white-space" | "width" | "height" | "border-collapse" | "border-style"
            | "border-color" | "border" => {}
            other => unknown.push(other.to_string()),
        }
    }
    (f, unknown)
}
