//! Formatting properties as ODF style attributes
//!
//! ODF keeps character, paragraph and table formatting in separate
//! `style:*-properties` children of a style. Most attributes come from
//! XSL-FO and read like CSS.

use crate::html::parse_color;
use crate::xml::{fmt_num, parse_length, XmlElement, XmlWriter};
use doc_model::{
    Alignment, Formatting, LineSpacing, Property, PropertyScope, PropertyValue, VerticalAlign,
};

/// Which properties element a table-scope formatting belongs in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFamily {
    Table,
    Row,
    Cell,
}

impl TableFamily {
    fn element(self) -> &'static str {
        match self {
            TableFamily::Table => "style:table-properties",
            TableFamily::Row => "style:table-row-properties",
            TableFamily::Cell => "style:table-cell-properties",
        }
    }
}

fn pt(value: f32) -> String {
    format!("{}pt", fmt_num(value))
}

fn color(value: &PropertyValue) -> String {
    match value {
        PropertyValue::Color(c) => c.to_string(),
        _ => "transparent".into(),
    }
}

fn toggle(value: &PropertyValue, on: &str, off: &str) -> String {
    if value.as_bool().unwrap_or(false) { on } else { off }.to_string()
}

fn as_refs<'a>(attrs: &'a [(&'static str, String)]) -> Vec<(&'static str, &'a str)> {
    attrs.iter().map(|(k, v)| (*k, v.as_str())).collect()
}

// =============================================================================
// Writing
// =============================================================================

/// `style:text-properties` for the character properties of `f`
pub fn write_text(w: &mut XmlWriter, f: &Formatting) {
    let mut attrs: Vec<(&'static str, String)> = Vec::new();
    for (property, value) in f.iter() {
        match (property, value) {
            (Property::FontFamily, PropertyValue::Text(name)) => {
                attrs.push(("fo:font-family", format!("'{}'", name.replace('\'', ""))))
            }
            (Property::FontSize, PropertyValue::Points(size)) => attrs.push(("fo:font-size", pt(*size))),
            (Property::Bold, v) => attrs.push(("fo:font-weight", toggle(v, "bold", "normal"))),
            (Property::Italic, v) => attrs.push(("fo:font-style", toggle(v, "italic", "normal"))),
            (Property::Underline, v) => {
                attrs.push(("style:text-underline-style", toggle(v, "solid", "none")));
                if v.as_bool() == Some(true) {
                    attrs.push(("style:text-underline-width", "auto".into()));
                    attrs.push(("style:text-underline-color", "font-color".into()));
                }
            }
            (Property::Strikethrough, v) => {
                attrs.push(("style:text-line-through-style", toggle(v, "solid", "none")))
            }
            (Property::Color, PropertyValue::Color(c)) => attrs.push(("fo:color", c.to_string())),
            (Property::Highlight, v) => attrs.push(("fo:background-color", color(v))),
            (Property::VerticalAlign, PropertyValue::VerticalAlign(v)) => attrs.push((
                "style:text-position",
                match v {
                    VerticalAlign::Baseline => "0% 100%",
                    VerticalAlign::Superscript => "super 58%",
                    VerticalAlign::Subscript => "sub 58%",
                }
                .into(),
            )),
            (Property::AllCaps, v) => attrs.push(("fo:text-transform", toggle(v, "uppercase", "none"))),
            (Property::SmallCaps, v) => attrs.push(("fo:font-variant", toggle(v, "small-caps", "normal"))),
            _ => {}
        }
    }
    if !attrs.is_empty() {
        w.empty("style:text-properties", &as_refs(&attrs));
    }
}

/// `style:paragraph-properties` for the paragraph properties of `f`.
/// `page_number` restarts page numbering at this paragraph.
pub fn write_paragraph(w: &mut XmlWriter, f: &Formatting, page_number: Option<u32>) {
    let mut attrs: Vec<(&'static str, String)> = Vec::new();
    for (property, value) in f.iter() {
        match (property, value) {
            (Property::Alignment, PropertyValue::Alignment(a)) => attrs.push((
                "fo:text-align",
                match a {
                    Alignment::Left => "start",
                    Alignment::Center => "center",
                    Alignment::Right => "end",
                    Alignment::Justify => "justify",
                }
                .into(),
            )),
            (Property::IndentLeft, PropertyValue::Points(v)) => attrs.push(("fo:margin-left", pt(*v))),
            (Property::IndentRight, PropertyValue::Points(v)) => attrs.push(("fo:margin-right", pt(*v))),
            (Property::IndentFirstLine, PropertyValue::Points(v)) => attrs.push(("fo:text-indent", pt(*v))),
            (Property::SpaceBefore, PropertyValue::Points(v)) => attrs.push(("fo:margin-top", pt(*v))),
            (Property::SpaceAfter, PropertyValue::Points(v)) => attrs.push(("fo:margin-bottom", pt(*v))),
            (Property::LineSpacing, PropertyValue::LineSpacing(spacing)) => match spacing {
                LineSpacing::Multiple(m) => {
                    attrs.push(("fo:line-height", format!("{}%", fmt_num(m * 100.0))))
                }
                LineSpacing::Exact(v) => attrs.push(("fo:line-height", pt(*v))),
                LineSpacing::AtLeast(v) => attrs.push(("style:line-height-at-least", pt(*v))),
            },
            (Property::KeepWithNext, v) => attrs.push(("fo:keep-with-next", toggle(v, "always", "auto"))),
            (Property::KeepTogether, v) => attrs.push(("fo:keep-together", toggle(v, "always", "auto"))),
            (Property::PageBreakBefore, v) => attrs.push(("fo:break-before", toggle(v, "page", "auto"))),
            _ => {}
        }
    }
    if let Some(start) = page_number {
        attrs.push(("style:page-number", start.to_string()));
    }
    if !attrs.is_empty() {
        w.empty("style:paragraph-properties", &as_refs(&attrs));
    }
}

/// Properties element of a table, row or cell style
pub fn write_table(w: &mut XmlWriter, f: &Formatting, family: TableFamily, page_number: Option<u32>) {
    let mut attrs: Vec<(&'static str, String)> = Vec::new();
    for (property, value) in f.iter() {
        match (property, value) {
            (Property::CellShading, v) => attrs.push(("fo:background-color", color(v))),
            (Property::BorderWidth, PropertyValue::Points(width)) => attrs.push((
                "fo:border",
                if *width <= 0.0 {
                    "none".to_string()
                } else {
                    format!("{} solid #000000", pt(*width))
                },
            )),
            (Property::CellPadding, PropertyValue::Points(v)) => attrs.push(("fo:padding", pt(*v))),
            _ => {}
        }
    }
    if let Some(start) = page_number {
        attrs.push(("style:page-number", start.to_string()));
    }
    if !attrs.is_empty() {
        w.empty(family.element(), &as_refs(&attrs));
    }
}

/// Value of `style:default-outline-level`, when `f` sets one
pub fn outline_level(f: &Formatting) -> Option<String> {
    match f.get(Property::OutlineLevel) {
        Some(PropertyValue::Level(level)) => Some(level.to_string()),
        _ => None,
    }
}

// =============================================================================
// Reading
// =============================================================================

fn read_color(value: &str) -> Option<PropertyValue> {
    if value.trim() == "transparent" {
        return Some(PropertyValue::Transparent);
    }
    parse_color(value).map(PropertyValue::Color)
}

fn is_on(value: &str, on: &[&str]) -> bool {
    on.contains(&value.trim())
}

/// Formatting of a `style:style` or `style:default-style` element, from all
/// of its properties children
pub fn read_style(style: &XmlElement) -> Formatting {
    let mut f = Formatting::new();
    for props in style.elements() {
        match props.local_name() {
            "text-properties" => read_text(props, &mut f),
            "paragraph-properties" => read_paragraph(props, &mut f),
            "table-properties" | "table-row-properties" | "table-cell-properties" => {
                read_table(props, &mut f)
            }
            _ => {}
        }
    }
    if let Some(level) = style
        .attr("style:default-outline-level")
        .and_then(|v| v.trim().parse::<u8>().ok())
        .filter(|l| *l <= 9)
    {
        f.set(Property::OutlineLevel, Some(PropertyValue::Level(level)));
    }
    f
}

/// `style:page-number` of any properties child
pub fn page_number(style: &XmlElement) -> Option<u32> {
    style
        .elements()
        .find_map(|p| p.attr("style:page-number"))
        .and_then(|v| v.trim().parse().ok())
}

fn read_text(props: &XmlElement, f: &mut Formatting) {
    let mut set = |p: Property, v: PropertyValue| {
        f.set(p, Some(v));
    };
    for (name, value) in &props.attributes {
        let value = value.as_str();
        match name.as_str() {
            "fo:font-family" | "style:font-name" => {
                let family = value.split(',').next().unwrap_or("").trim().trim_matches(['\'', '"']);
                if !family.is_empty() {
                    set(Property::FontFamily, PropertyValue::Text(family.to_string()));
                }
            }
            "fo:font-size" => {
                if let Some(size) = parse_length(value).filter(|s| *s > 0.0) {
                    set(Property::FontSize, PropertyValue::Points(size));
                }
            }
            "fo:font-weight" => set(
                Property::Bold,
                PropertyValue::Bool(is_on(value, &["bold", "600", "700", "800", "900"])),
            ),
            "fo:font-style" => set(Property::Italic, PropertyValue::Bool(is_on(value, &["italic", "oblique"]))),
            "style:text-underline-style" => {
                set(Property::Underline, PropertyValue::Bool(!is_on(value, &["none"])))
            }
            "style:text-line-through-style" => {
                set(Property::Strikethrough, PropertyValue::Bool(!is_on(value, &["none"])))
            }
            "fo:color" => {
                if let Some(c) = parse_color(value) {
                    set(Property::Color, PropertyValue::Color(c));
                }
            }
            "fo:background-color" => {
                if let Some(v) = read_color(value) {
                    set(Property::Highlight, v);
                }
            }
            "style:text-position" => {
                let first = value.split_whitespace().next().unwrap_or("");
                let shift = first.trim_end_matches('%').parse::<f32>().ok();
                let align = match first {
                    "super" => VerticalAlign::Superscript,
                    "sub" => VerticalAlign::Subscript,
                    _ => match shift {
                        Some(s) if s > 0.0 => VerticalAlign::Superscript,
                        Some(s) if s < 0.0 => VerticalAlign::Subscript,
                        _ => VerticalAlign::Baseline,
                    },
                };
                set(Property::VerticalAlign, PropertyValue::VerticalAlign(align));
            }
            "fo:text-transform" => set(Property::AllCaps, PropertyValue::Bool(is_on(value, &["uppercase"]))),
            "fo:font-variant" => set(Property::SmallCaps, PropertyValue::Bool(is_on(value, &["small-caps"]))),
            _ => {}
        }
    }
}

fn read_paragraph(props: &XmlElement, f: &mut Formatting) {
    let mut set = |p: Property, v: PropertyValue| {
        f.set(p, Some(v));
    };
    for (name, value) in &props.attributes {
        let value = value.as_str();
        let length = || parse_length(value).map(PropertyValue::Points);
        match name.as_str() {
            "fo:text-align" => {
                let alignment = match value.trim() {
                    "center" => Some(Alignment::Center),
                    "end" | "right" => Some(Alignment::Right),
                    "justify" => Some(Alignment::Justify),
                    "start" | "left" => Some(Alignment::Left),
                    _ => None,
                };
                if let Some(a) = alignment {
                    set(Property::Alignment, PropertyValue::Alignment(a));
                }
            }
            "fo:margin-left" => length().into_iter().for_each(|v| set(Property::IndentLeft, v)),
            "fo:margin-right" => length().into_iter().for_each(|v| set(Property::IndentRight, v)),
            "fo:text-indent" => length().into_iter().for_each(|v| set(Property::IndentFirstLine, v)),
            "fo:margin-top" => length()
                .filter(|v| v.as_points().is_some_and(|p| p >= 0.0))
                .into_iter()
                .for_each(|v| set(Property::SpaceBefore, v)),
            "fo:margin-bottom" => length()
                .filter(|v| v.as_points().is_some_and(|p| p >= 0.0))
                .into_iter()
                .for_each(|v| set(Property::SpaceAfter, v)),
            "fo:line-height" => {
                let spacing = if value.trim() == "normal" {
                    Some(LineSpacing::Multiple(1.0))
                } else if let Some(pct) = value.trim().strip_suffix('%') {
                    pct.parse::<f32>().ok().map(|p| LineSpacing::Multiple(p / 100.0))
                } else {
                    parse_length(value).map(LineSpacing::Exact)
                };
                if let Some(s) = spacing.filter(|s| match s {
                    LineSpacing::Multiple(v) | LineSpacing::Exact(v) | LineSpacing::AtLeast(v) => *v > 0.0,
                }) {
                    set(Property::LineSpacing, PropertyValue::LineSpacing(s));
                }
            }
            "style:line-height-at-least" => {
                if let Some(v) = parse_length(value).filter(|v| *v > 0.0) {
                    set(Property::LineSpacing, PropertyValue::LineSpacing(LineSpacing::AtLeast(v)));
                }
            }
            "fo:keep-with-next" => set(Property::KeepWithNext, PropertyValue::Bool(is_on(value, &["always"]))),
            "fo:keep-together" => set(Property::KeepTogether, PropertyValue::Bool(is_on(value, &["always"]))),
            "fo:break-before" => set(Property::PageBreakBefore, PropertyValue::Bool(is_on(value, &["page"]))),
            _ => {}
        }
    }
}

fn read_table(props: &XmlElement, f: &mut Formatting) {
    for (name, value) in &props.attributes {
        let value = value.as_str();
        match name.as_str() {
            "fo:background-color" => {
                if let Some(v) = read_color(value) {
                    f.set(Property::CellShading, Some(v));
                }
            }
            "fo:border" | "fo:border-top" => {
                let width = if is_on(value, &["none", "hidden"]) {
                    Some(0.0)
                } else {
                    value.split_whitespace().find_map(parse_length)
                };
                if let Some(width) = width.filter(|w| *w >= 0.0) {
                    f.set(Property::BorderWidth, Some(PropertyValue::Points(width)));
                }
            }
            "fo:padding" | "fo:padding-left" => {
                if let Some(v) = parse_length(value).filter(|v| *v >= 0.0) {
                    f.set(Property::CellPadding, Some(PropertyValue::Points(v)));
                }
            }
            _ => {}
        }
    }
}

/// Whether `f` has anything for a properties element of this scope
pub fn has_scope(f: &Formatting, scope: PropertyScope) -> bool {
    !f.scoped(scope).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;
    use crate::Format;
    use doc_model::Color;

    fn style_with(write: impl Fn(&mut XmlWriter)) -> Formatting {
        let mut w = XmlWriter::bare(false);
        w.open("style:style", &[]);
        write(&mut w);
        w.close();
        read_style(&parse(&w.finish(), Format::Odt).unwrap())
    }

    #[test]
    fn test_text_properties_round_trip() {
        let f = Formatting::new()
            .with(Property::FontFamily, PropertyValue::Text("Liberation Serif".into()))
            .with(Property::FontSize, PropertyValue::Points(10.5))
            .with(Property::Bold, true)
            .with(Property::Italic, false)
            .with(Property::Underline, true)
            .with(Property::Color, Color::rgb(0x11, 0x22, 0x33))
            .with(Property::Highlight, PropertyValue::Transparent)
            .with(Property::VerticalAlign, PropertyValue::VerticalAlign(VerticalAlign::Subscript))
            .with(Property::SmallCaps, true);
        assert_eq!(style_with(|w| write_text(w, &f)), f);
    }

    #[test]
    fn test_paragraph_properties_round_trip() {
        let f = Formatting::new()
            .with(Property::Alignment, Alignment::Justify)
            .with(Property::IndentLeft, PropertyValue::Points(36.0))
            .with(Property::IndentFirstLine, PropertyValue::Points(-18.0))
            .with(Property::SpaceAfter, PropertyValue::Points(6.0))
            .with(Property::LineSpacing, PropertyValue::LineSpacing(LineSpacing::Multiple(1.5)))
            .with(Property::KeepWithNext, true)
            .with(Property::PageBreakBefore, false);
        assert_eq!(style_with(|w| write_paragraph(w, &f, None)), f);

        let exact = Formatting::new()
            .with(Property::LineSpacing, PropertyValue::LineSpacing(LineSpacing::AtLeast(14.0)));
        assert_eq!(style_with(|w| write_paragraph(w, &exact, Some(3))), exact);
    }

    #[test]
    fn test_table_properties_round_trip() {
        let f = Formatting::new()
            .with(Property::CellShading, Color::rgb(0xEE, 0xEE, 0xEE))
            .with(Property::BorderWidth, PropertyValue::Points(0.0))
            .with(Property::CellPadding, PropertyValue::Points(4.0));
        assert_eq!(style_with(|w| write_table(w, &f, TableFamily::Cell, None)), f);
    }

    #[test]
    fn test_outline_level_and_page_number() {
        let xml = r#"<style:style style:default-outline-level="2"><style:paragraph-properties style:page-number="4"/></style:style>"#;
        let el = parse(xml, Format::Odt).unwrap();
        assert_eq!(read_style(&el).get(Property::OutlineLevel), Some(&PropertyValue::Level(2)));
        assert_eq!(page_number(&el), Some(4));
    }
}
