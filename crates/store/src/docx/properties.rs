//! Mapping between formatting properties and `w:rPr`, `w:pPr` and table
//! property elements
//!
//! Lengths are stored in twentieths of a point (twips), font sizes in half
//! points and border widths in eighths of a point. Writers emit children in
//! schema order; the caller writes the style reference before and change
//! markers around them.

use super::numbering::Numbering;
use crate::xml::{XmlElement, XmlWriter};
use doc_model::{
    Alignment, Color, Formatting, LineSpacing, Property, PropertyValue, ThemeColorSlot, ThemeFont,
    VerticalAlign, MAX_LIST_LEVEL,
};

// =============================================================================
// Units
// =============================================================================

fn twips(points: f32) -> String {
    ((points * 20.0).round() as i64).to_string()
}

fn from_twips(value: &str) -> Option<f32> {
    value
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v / 20.0)
}

/// Line multiples are stored in 240ths, which does not hold two decimals
/// exactly; two decimals is what editors offer.
fn round_multiple(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

fn toggle(el: &XmlElement) -> bool {
    !matches!(el.attr("val"), Some("0" | "false" | "off"))
}

// =============================================================================
// Colors
// =============================================================================

pub fn theme_color_name(slot: ThemeColorSlot) -> &'static str {
    match slot {
        ThemeColorSlot::Text => "text1",
        ThemeColorSlot::Background => "background1",
        ThemeColorSlot::Accent => "accent1",
        ThemeColorSlot::Highlight => "accent2",
    }
}

pub fn theme_color_slot(name: &str) -> Option<ThemeColorSlot> {
    match name {
        "text1" | "dark1" => Some(ThemeColorSlot::Text),
        "background1" | "light1" => Some(ThemeColorSlot::Background),
        "accent1" => Some(ThemeColorSlot::Accent),
        "accent2" => Some(ThemeColorSlot::Highlight),
        _ => None,
    }
}

/// Colors of the `w:highlight` palette
fn highlight_color(name: &str) -> Option<PropertyValue> {
    let hex = match name {
        "none" => return Some(PropertyValue::Transparent),
        "yellow" => "FFFF00",
        "green" => "00FF00",
        "cyan" => "00FFFF",
        "magenta" => "FF00FF",
        "blue" => "0000FF",
        "red" => "FF0000",
        "darkBlue" => "000080",
        "darkCyan" => "008080",
        "darkGreen" => "008000",
        "darkMagenta" => "800080",
        "darkRed" => "800000",
        "darkYellow" => "808000",
        "darkGray" => "808080",
        "lightGray" => "C0C0C0",
        "black" => "000000",
        "white" => "FFFFFF",
        _ => return None,
    };
    Color::from_hex(hex).map(PropertyValue::Color)
}

fn read_shading(el: &XmlElement) -> Option<PropertyValue> {
    if let Some(slot) = el.attr("themeFill").and_then(theme_color_slot) {
        return Some(PropertyValue::ThemeColor(slot));
    }
    match el.attr("fill") {
        Some(hex) if hex != "auto" => Color::from_hex(hex).map(PropertyValue::Color),
        Some(_) => Some(PropertyValue::Transparent),
        None if el.attr("val") == Some("nil") => Some(PropertyValue::Transparent),
        None => None,
    }
}

fn write_shading(w: &mut XmlWriter, value: &PropertyValue) {
    match value {
        PropertyValue::Color(c) => {
            let hex = c.to_hex();
            w.empty(
                "w:shd",
                &[("w:val", "clear"), ("w:color", "auto"), ("w:fill", hex.as_str())],
            );
        }
        PropertyValue::ThemeColor(slot) => w.empty(
            "w:shd",
            &[
                ("w:val", "clear"),
                ("w:color", "auto"),
                ("w:fill", "auto"),
                ("w:themeFill", theme_color_name(*slot)),
            ],
        ),
        _ => w.empty(
            "w:shd",
            &[("w:val", "clear"), ("w:color", "auto"), ("w:fill", "auto")],
        ),
    }
}

// =============================================================================
// Run properties
// =============================================================================

/// Character formatting of a `w:rPr`
pub fn read_run(rpr: &XmlElement) -> Formatting {
    let mut f = Formatting::new();
    for el in rpr.elements() {
        match el.local_name() {
            "rFonts" => {
                let theme = el.attr("asciiTheme").or_else(|| el.attr("hAnsiTheme"));
                if let Some(theme) = theme {
                    let slot = if theme.starts_with("major") {
                        ThemeFont::Heading
                    } else {
                        ThemeFont::Body
                    };
                    f.set(Property::FontFamily, Some(PropertyValue::ThemeFont(slot)));
                } else if let Some(name) = el.attr("ascii").or_else(|| el.attr("hAnsi")) {
                    f.set(Property::FontFamily, Some(PropertyValue::Text(name.to_string())));
                }
            }
            "b" => {
                f.set(Property::Bold, Some(toggle(el).into()));
            }
            "i" => {
                f.set(Property::Italic, Some(toggle(el).into()));
            }
            "caps" => {
                f.set(Property::AllCaps, Some(toggle(el).into()));
            }
            "smallCaps" => {
                f.set(Property::SmallCaps, Some(toggle(el).into()));
            }
            "strike" => {
                f.set(Property::Strikethrough, Some(toggle(el).into()));
            }
            "u" => {
                let on = !matches!(el.attr("val"), Some("none") | None);
                f.set(Property::Underline, Some(on.into()));
            }
            "color" => {
                let value = match el.attr("themeColor").and_then(theme_color_slot) {
                    Some(slot) => Some(PropertyValue::ThemeColor(slot)),
                    None => el
                        .attr("val")
                        .and_then(Color::from_hex)
                        .map(PropertyValue::Color),
                };
                if value.is_some() {
                    f.set(Property::Color, value);
                }
            }
            "sz" => {
                if let Some(half) = el.attr("val").and_then(|v| v.parse::<f32>().ok()) {
                    f.set(Property::FontSize, Some(PropertyValue::Points(half / 2.0)));
                }
            }
            "highlight" => {
                if let Some(value) = el.attr("val").and_then(highlight_color) {
                    f.set(Property::Highlight, Some(value));
                }
            }
            "shd" => {
                if let Some(value) = read_shading(el) {
                    f.set(Property::Highlight, Some(value));
                }
            }
            "vertAlign" => {
                let align = match el.attr("val") {
                    Some("superscript") => VerticalAlign::Superscript,
                    Some("subscript") => VerticalAlign::Subscript,
                    _ => VerticalAlign::Baseline,
                };
                f.set(Property::VerticalAlign, Some(PropertyValue::VerticalAlign(align)));
            }
            _ => {}
        }
    }
    f
}

fn write_toggle(w: &mut XmlWriter, name: &str, f: &Formatting, property: Property) {
    match f.get(property).and_then(PropertyValue::as_bool) {
        Some(true) => w.empty(name, &[]),
        Some(false) => w.empty(name, &[("w:val", "0")]),
        None => {}
    }
}

/// Whether `write_run` would write anything
pub fn has_run(f: &Formatting) -> bool {
    !f.scoped(doc_model::PropertyScope::Character).is_empty()
}

/// Character properties as `w:rPr` children
pub fn write_run(w: &mut XmlWriter, f: &Formatting) {
    match f.get(Property::FontFamily) {
        Some(PropertyValue::ThemeFont(slot)) => {
            let theme = match slot {
                ThemeFont::Heading => "majorHAnsi",
                ThemeFont::Body => "minorHAnsi",
            };
            w.empty(
                "w:rFonts",
                &[("w:asciiTheme", theme), ("w:hAnsiTheme", theme), ("w:cstheme", theme)],
            );
        }
        Some(PropertyValue::Text(name)) => w.empty(
            "w:rFonts",
            &[("w:ascii", name.as_str()), ("w:hAnsi", name.as_str()), ("w:cs", name.as_str())],
        ),
        _ => {}
    }
    write_toggle(w, "w:b", f, Property::Bold);
    write_toggle(w, "w:i", f, Property::Italic);
    write_toggle(w, "w:caps", f, Property::AllCaps);
    write_toggle(w, "w:smallCaps", f, Property::SmallCaps);
    write_toggle(w, "w:strike", f, Property::Strikethrough);
    match f.get(Property::Color) {
        Some(PropertyValue::Color(c)) => {
            let hex = c.to_hex();
            w.empty("w:color", &[("w:val", hex.as_str())]);
        }
        Some(PropertyValue::ThemeColor(slot)) => w.empty(
            "w:color",
            &[("w:val", "auto"), ("w:themeColor", theme_color_name(*slot))],
        ),
        _ => {}
    }
    if let Some(size) = f.get(Property::FontSize).and_then(PropertyValue::as_points) {
        let half = ((size * 2.0).round() as i64).to_string();
        w.empty("w:sz", &[("w:val", half.as_str())]);
        w.empty("w:szCs", &[("w:val", half.as_str())]);
    }
    match f.get(Property::Underline).and_then(PropertyValue::as_bool) {
        Some(true) => w.empty("w:u", &[("w:val", "single")]),
        Some(false) => w.empty("w:u", &[("w:val", "none")]),
        None => {}
    }
    if let Some(value) = f.get(Property::Highlight) {
        write_shading(w, value);
    }
    if let Some(PropertyValue::VerticalAlign(align)) = f.get(Property::VerticalAlign) {
        let val = match align {
            VerticalAlign::Baseline => "baseline",
            VerticalAlign::Superscript => "superscript",
            VerticalAlign::Subscript => "subscript",
        };
        w.empty("w:vertAlign", &[("w:val", val)]);
    }
}

// =============================================================================
// Paragraph properties
// =============================================================================

/// Paragraph formatting of a `w:pPr`. A `w:numPr` pointing at an unknown
/// instance is skipped.
pub fn read_paragraph(ppr: &XmlElement, numbering: &Numbering) -> Formatting {
    let mut f = Formatting::new();
    for el in ppr.elements() {
        match el.local_name() {
            "keepNext" => {
                f.set(Property::KeepWithNext, Some(toggle(el).into()));
            }
            "keepLines" => {
                f.set(Property::KeepTogether, Some(toggle(el).into()));
            }
            "pageBreakBefore" => {
                f.set(Property::PageBreakBefore, Some(toggle(el).into()));
            }
            "numPr" => {
                if let Some(level) = el.child_val("ilvl").and_then(|v| v.parse::<u8>().ok()) {
                    let level = level.min(MAX_LIST_LEVEL);
                    f.set(Property::ListLevel, Some(PropertyValue::Level(level)));
                }
                match el.child_val("numId").and_then(|v| v.parse::<u32>().ok()) {
                    Some(0) => {
                        f.set(Property::ListStyle, Some(PropertyValue::ListRef(None)));
                    }
                    Some(n) => {
                        if let Some(list) = numbering.list(n) {
                            f.set(Property::ListStyle, Some(PropertyValue::ListRef(Some(list.clone()))));
                        }
                    }
                    None => {}
                }
            }
            "spacing" => {
                if let Some(v) = el.attr("before").and_then(from_twips) {
                    f.set(Property::SpaceBefore, Some(PropertyValue::Points(v)));
                }
                if let Some(v) = el.attr("after").and_then(from_twips) {
                    f.set(Property::SpaceAfter, Some(PropertyValue::Points(v)));
                }
                if let Some(line) = el.attr("line").and_then(|v| v.parse::<f32>().ok()) {
                    let spacing = match el.attr("lineRule") {
                        Some("exact") => LineSpacing::Exact(line / 20.0),
                        Some("atLeast") => LineSpacing::AtLeast(line / 20.0),
                        _ => LineSpacing::Multiple(round_multiple(line / 240.0)),
                    };
                    f.set(Property::LineSpacing, Some(PropertyValue::LineSpacing(spacing)));
                }
            }
            "ind" => {
                if let Some(v) = el.attr("left").or_else(|| el.attr("start")).and_then(from_twips) {
                    f.set(Property::IndentLeft, Some(PropertyValue::Points(v)));
                }
                if let Some(v) = el.attr("right").or_else(|| el.attr("end")).and_then(from_twips) {
                    f.set(Property::IndentRight, Some(PropertyValue::Points(v)));
                }
                if let Some(v) = el.attr("firstLine").and_then(from_twips) {
                    f.set(Property::IndentFirstLine, Some(PropertyValue::Points(v)));
                } else if let Some(v) = el.attr("hanging").and_then(from_twips) {
                    f.set(Property::IndentFirstLine, Some(PropertyValue::Points(-v)));
                }
            }
            "jc" => {
                let alignment = match el.attr("val") {
                    Some("center") => Some(Alignment::Center),
                    Some("right" | "end") => Some(Alignment::Right),
                    Some("both" | "distribute" | "justify") => Some(Alignment::Justify),
                    Some("left" | "start") => Some(Alignment::Left),
                    _ => None,
                };
                if let Some(a) = alignment {
                    f.set(Property::Alignment, Some(a.into()));
                }
            }
            "outlineLvl" => {
                if let Some(level) = el.attr("val").and_then(|v| v.parse::<u8>().ok()) {
                    let level = if level >= 9 { 0 } else { level + 1 };
                    f.set(Property::OutlineLevel, Some(PropertyValue::Level(level)));
                }
            }
            _ => {}
        }
    }
    f
}

pub fn has_paragraph(f: &Formatting) -> bool {
    !f.scoped(doc_model::PropertyScope::Paragraph).is_empty()
}

/// Paragraph properties as `w:pPr` children. A list missing from
/// `numbering` is written as no list.
pub fn write_paragraph(w: &mut XmlWriter, f: &Formatting, numbering: &Numbering) {
    write_toggle(w, "w:keepNext", f, Property::KeepWithNext);
    write_toggle(w, "w:keepLines", f, Property::KeepTogether);
    write_toggle(w, "w:pageBreakBefore", f, Property::PageBreakBefore);

    let level = match f.get(Property::ListLevel) {
        Some(PropertyValue::Level(l)) => Some(l.to_string()),
        _ => None,
    };
    let num_id = match f.get(Property::ListStyle) {
        Some(PropertyValue::ListRef(Some(list))) => Some(numbering.num_id(list).unwrap_or(0).to_string()),
        Some(PropertyValue::ListRef(None)) => Some("0".to_string()),
        _ => None,
    };
    if level.is_some() || num_id.is_some() {
        w.open("w:numPr", &[]);
        if let Some(v) = &level {
            w.empty("w:ilvl", &[("w:val", v.as_str())]);
        }
        if let Some(v) = &num_id {
            w.empty("w:numId", &[("w:val", v.as_str())]);
        }
        w.close();
    }

    let before = f.get(Property::SpaceBefore).and_then(PropertyValue::as_points).map(twips);
    let after = f.get(Property::SpaceAfter).and_then(PropertyValue::as_points).map(twips);
    let line = match f.get(Property::LineSpacing) {
        Some(PropertyValue::LineSpacing(LineSpacing::Multiple(m))) => {
            Some((((m * 240.0).round() as i64).to_string(), "auto"))
        }
        Some(PropertyValue::LineSpacing(LineSpacing::Exact(pt))) => Some((twips(*pt), "exact")),
        Some(PropertyValue::LineSpacing(LineSpacing::AtLeast(pt))) => Some((twips(*pt), "atLeast")),
        _ => None,
    };
    if before.is_some() || after.is_some() || line.is_some() {
        let mut attrs: Vec<(&str, &str)> = Vec::new();
        if let Some(v) = &before {
            attrs.push(("w:before", v.as_str()));
        }
        if let Some(v) = &after {
            attrs.push(("w:after", v.as_str()));
        }
        if let Some((v, rule)) = &line {
            attrs.push(("w:line", v.as_str()));
            attrs.push(("w:lineRule", *rule));
        }
        w.empty("w:spacing", &attrs);
    }

    let left = f.get(Property::IndentLeft).and_then(PropertyValue::as_points).map(twips);
    let right = f.get(Property::IndentRight).and_then(PropertyValue::as_points).map(twips);
    let first = f.get(Property::IndentFirstLine).and_then(PropertyValue::as_points);
    if left.is_some() || right.is_some() || first.is_some() {
        let first_attr = first.map(|pt| {
            if pt < 0.0 {
                ("w:hanging", twips(-pt))
            } else {
                ("w:firstLine", twips(pt))
            }
        });
        let mut attrs: Vec<(&str, &str)> = Vec::new();
        if let Some(v) = &left {
            attrs.push(("w:left", v.as_str()));
        }
        if let Some(v) = &right {
            attrs.push(("w:right", v.as_str()));
        }
        if let Some((name, v)) = &first_attr {
            attrs.push((*name, v.as_str()));
        }
        w.empty("w:ind", &attrs);
    }

    if let Some(PropertyValue::Alignment(a)) = f.get(Property::Alignment) {
        let val = match a {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
            Alignment::Justify => "both",
        };
        w.empty("w:jc", &[("w:val", val)]);
    }
    if let Some(PropertyValue::Level(level)) = f.get(Property::OutlineLevel) {
        let val = (if *level == 0 { 9 } else { level - 1 }).to_string();
        w.empty("w:outlineLvl", &[("w:val", val.as_str())]);
    }
}

// =============================================================================
// Table properties
// =============================================================================

/// Which table element the properties belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableLevel {
    /// `w:tblPr` and the row exceptions in `w:tblPrEx`
    Table,
    /// `w:tcPr`
    Cell,
}

impl TableLevel {
    fn borders(self) -> &'static str {
        match self {
            TableLevel::Table => "w:tblBorders",
            TableLevel::Cell => "w:tcBorders",
        }
    }

    fn margins(self) -> &'static str {
        match self {
            TableLevel::Table => "w:tblCellMar",
            TableLevel::Cell => "w:tcMar",
        }
    }

    fn sides(self) -> &'static [&'static str] {
        match self {
            TableLevel::Table => &["top", "left", "bottom", "right", "insideH", "insideV"],
            TableLevel::Cell => &["top", "left", "bottom", "right"],
        }
    }
}

/// Table formatting of a `w:tblPr`, `w:tblPrEx` or `w:tcPr`
pub fn read_table(el: &XmlElement) -> Formatting {
    let mut f = Formatting::new();
    for child in el.elements() {
        match child.local_name() {
            "shd" => {
                if let Some(value) = read_shading(child) {
                    f.set(Property::CellShading, Some(value));
                }
            }
            "tblBorders" | "tcBorders" => {
                if let Some(side) = child.elements().next() {
                    let width = match side.attr("val") {
                        Some("nil" | "none") => Some(0.0),
                        _ => side
                            .attr("sz")
                            .and_then(|v| v.parse::<f32>().ok())
                            .map(|eighths| eighths / 8.0),
                    };
                    if let Some(width) = width {
                        f.set(Property::BorderWidth, Some(PropertyValue::Points(width)));
                    }
                }
            }
            "tblCellMar" | "tcMar" => {
                let side = child.child("left").or_else(|| child.child("start"));
                if let Some(v) = side.and_then(|s| s.attr("w")).and_then(from_twips) {
                    f.set(Property::CellPadding, Some(PropertyValue::Points(v)));
                }
            }
            _ => {}
        }
    }
    f
}

pub fn has_table(f: &Formatting) -> bool {
    !f.scoped(doc_model::PropertyScope::Table).is_empty()
}

/// Table properties as children of the element for `level`
pub fn write_table(w: &mut XmlWriter, f: &Formatting, level: TableLevel) {
    if let Some(width) = f.get(Property::BorderWidth).and_then(PropertyValue::as_points) {
        w.open(level.borders(), &[]);
        let sz = ((width * 8.0).round() as i64).to_string();
        for side in level.sides() {
            let name = format!("w:{side}");
            if width <= 0.0 {
                w.empty(&name, &[("w:val", "nil")]);
            } else {
                w.empty(
                    &name,
                    &[
                        ("w:val", "single"),
                        ("w:sz", sz.as_str()),
                        ("w:space", "0"),
                        ("w:color", "auto"),
                    ],
                );
            }
        }
        w.close();
    }
    if let Some(value) = f.get(Property::CellShading) {
        write_shading(w, value);
    }
    if let Some(padding) = f.get(Property::CellPadding).and_then(PropertyValue::as_points) {
        let value = twips(padding);
        w.open(level.margins(), &[]);
        for side in ["top", "left", "bottom", "right"] {
            let name = format!("w:{side}");
            w.empty(&name, &[("w:w", value.as_str()), ("w:type", "dxa")]);
        }
        w.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;
    use crate::Format;

    fn wrap(tag: &str, write: impl FnOnce(&mut XmlWriter)) -> XmlElement {
        let mut w = XmlWriter::bare(false);
        w.open(tag, &[("xmlns:w", crate::docx::namespaces::W)]);
        write(&mut w);
        w.close();
        parse(&w.finish(), Format::Docx).unwrap()
    }

    #[test]
    fn test_run_properties_round_trip() {
        let f = Formatting::new()
            .with(Property::FontFamily, PropertyValue::ThemeFont(ThemeFont::Heading))
            .with(Property::FontSize, PropertyValue::Points(10.5))
            .with(Property::Bold, true)
            .with(Property::Italic, false)
            .with(Property::Underline, true)
            .with(Property::Color, PropertyValue::ThemeColor(ThemeColorSlot::Accent))
            .with(Property::Highlight, Color::rgb(255, 255, 0))
            .with(Property::VerticalAlign, PropertyValue::VerticalAlign(VerticalAlign::Superscript));
        let rpr = wrap("w:rPr", |w| write_run(w, &f));
        assert_eq!(read_run(&rpr), f);
    }

    #[test]
    fn test_paragraph_properties_round_trip() {
        let f = Formatting::new()
            .with(Property::Alignment, Alignment::Justify)
            .with(Property::IndentLeft, PropertyValue::Points(36.0))
            .with(Property::IndentFirstLine, PropertyValue::Points(-18.0))
            .with(Property::SpaceAfter, PropertyValue::Points(8.0))
            .with(Property::LineSpacing, PropertyValue::LineSpacing(LineSpacing::Multiple(1.08)))
            .with(Property::KeepWithNext, true)
            .with(Property::OutlineLevel, PropertyValue::Level(1));
        let ppr = wrap("w:pPr", |w| write_paragraph(w, &f, &Numbering::default()));
        assert_eq!(ppr.child("ind").and_then(|i| i.attr("hanging")), Some("360"));
        assert_eq!(ppr.child_val("outlineLvl"), Some("0"));
        assert_eq!(read_paragraph(&ppr, &Numbering::default()), f);
    }

    #[test]
    fn test_list_membership_maps_to_num_pr() {
        let mut tree = doc_model::DocumentTree::new();
        tree.put_style(doc_model::Style::list("Dots", "Dots")).unwrap();
        let numbering = Numbering::for_tree(&tree);
        let f = Formatting::new()
            .with(Property::ListStyle, PropertyValue::ListRef(Some("Dots".into())))
            .with(Property::ListLevel, PropertyValue::Level(2));
        let ppr = wrap("w:pPr", |w| write_paragraph(w, &f, &numbering));
        let num_pr = ppr.child("numPr").unwrap();
        assert_eq!(num_pr.child_val("ilvl"), Some("2"));
        assert_eq!(num_pr.child_val("numId"), Some("1"));
        assert_eq!(read_paragraph(&ppr, &numbering), f);

        // numId 0 takes the paragraph out of a list its style puts it in
        let out = Formatting::new().with(Property::ListStyle, PropertyValue::ListRef(None));
        let ppr = wrap("w:pPr", |w| write_paragraph(w, &out, &numbering));
        assert_eq!(ppr.child("numPr").and_then(|n| n.child_val("numId")), Some("0"));
        assert_eq!(read_paragraph(&ppr, &numbering), out);
    }

    #[test]
    fn test_table_properties_round_trip() {
        let f = Formatting::new()
            .with(Property::CellShading, PropertyValue::Transparent)
            .with(Property::BorderWidth, PropertyValue::Points(0.0))
            .with(Property::CellPadding, PropertyValue::Points(5.4));
        let tcpr = wrap("w:tcPr", |w| write_table(w, &f, TableLevel::Cell));
        assert_eq!(read_table(&tcpr), f);
    }

    #[test]
    fn test_highlight_palette_and_toggles() {
        let xml = r#"<w:rPr xmlns:w="w"><w:b w:val="false"/><w:highlight w:val="yellow"/><w:u w:val="double"/></w:rPr>"#;
        let f = read_run(&parse(xml, Format::Docx).unwrap());
        assert_eq!(f.get(Property::Bold), Some(&PropertyValue::Bool(false)));
        assert_eq!(f.get(Property::Underline), Some(&PropertyValue::Bool(true)));
        assert_eq!(
            f.get(Property::Highlight),
            Some(&PropertyValue::Color(Color::rgb(255, 255, 0)))
        );
    }
}
