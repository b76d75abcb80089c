//! Formatting properties as RTF control words
//!
//! Lengths are twips, font sizes half points. Fonts and colors are indexes
//! into the document's font and color tables.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use doc_model::{Alignment, Color, Formatting, LineSpacing, Property, PropertyValue, VerticalAlign};
use std::collections::HashMap;
use std::fmt::Write as _;

pub fn twips(points: f32) -> i32 {
    (points * 20.0).round() as i32
}

fn points(twips: i32) -> f32 {
    twips as f32 / 20.0
}

// =============================================================================
// Font and color tables
// =============================================================================

/// Entry for `\deff0` when the body names no font
const DEFAULT_FONT_ENTRY: &str = "{\\f0\\froman\\fcharset0 Times New Roman;}";

/// Font and color tables collected while the body is written
#[derive(Debug, Default)]
pub struct Tables {
    fonts: Vec<String>,
    /// Entry 0 of the color table is "auto" and not stored here
    colors: Vec<Color>,
}

impl Tables {
    pub fn font(&mut self, name: &str) -> usize {
        match self.fonts.iter().position(|f| f == name) {
            Some(i) => i,
            None => {
                self.fonts.push(name.to_string());
                self.fonts.len() - 1
            }
        }
    }

    pub fn color(&mut self, color: Color) -> usize {
        match self.colors.iter().position(|c| *c == color) {
            Some(i) => i + 1,
            None => {
                self.colors.push(color);
                self.colors.len()
            }
        }
    }

    pub fn write(&self, out: &mut String) {
        out.push_str("{\\fonttbl");
        if self.fonts.is_empty() {
            out.push_str(DEFAULT_FONT_ENTRY);
        }
        for (i, font) in self.fonts.iter().enumerate() {
            let _ = write!(out, "{{\\f{i}\\fnil\\fcharset0 {};}}", escape_name(font));
        }
        out.push('}');
        out.push_str("{\\colortbl;");
        for c in &self.colors {
            let _ = write!(out, "\\red{}\\green{}\\blue{};", c.r, c.g, c.b);
        }
        out.push('}');
    }
}

/// Table entry and style names end at ';' so it cannot appear in them
fn escape_name(name: &str) -> String {
    super::writer::escape_text(&name.replace(';', ","))
}

// =============================================================================
// Writing
// =============================================================================

fn toggle(out: &mut String, word: &str, value: &PropertyValue) {
    if value.as_bool() == Some(false) {
        let _ = write!(out, "\\{word}0");
    } else {
        let _ = write!(out, "\\{word}");
    }
}

/// Character properties of `f`
pub fn write_char(out: &mut String, f: &Formatting, tables: &mut Tables) {
    for (property, value) in f.iter() {
        match (property, value) {
            (Property::FontFamily, PropertyValue::Text(name)) => {
                let _ = write!(out, "\\f{}", tables.font(name));
            }
            (Property::FontSize, PropertyValue::Points(size)) => {
                let _ = write!(out, "\\fs{}", (size * 2.0).round() as i32);
            }
            (Property::Bold, v) => toggle(out, "b", v),
            (Property::Italic, v) => toggle(out, "i", v),
            (Property::Underline, v) => {
                out.push_str(if v.as_bool() == Some(false) { "\\ulnone" } else { "\\ul" })
            }
            (Property::Strikethrough, v) => toggle(out, "strike", v),
            (Property::AllCaps, v) => toggle(out, "caps", v),
            (Property::SmallCaps, v) => toggle(out, "scaps", v),
            (Property::Color, PropertyValue::Color(c)) => {
                let _ = write!(out, "\\cf{}", tables.color(*c));
            }
            (Property::Highlight, PropertyValue::Color(c)) => {
                let _ = write!(out, "\\highlight{}", tables.color(*c));
            }
            (Property::Highlight, PropertyValue::Transparent) => out.push_str("\\highlight0"),
            (Property::VerticalAlign, PropertyValue::VerticalAlign(v)) => out.push_str(match v {
                VerticalAlign::Baseline => "\\nosupersub",
                VerticalAlign::Superscript => "\\super",
                VerticalAlign::Subscript => "\\sub",
            }),
            _ => {}
        }
    }
}

/// Paragraph properties of `f`
pub fn write_paragraph(out: &mut String, f: &Formatting) {
    for (property, value) in f.iter() {
        match (property, value) {
            (Property::Alignment, PropertyValue::Alignment(a)) => out.push_str(match a {
                Alignment::Left => "\\ql",
                Alignment::Center => "\\qc",
                Alignment::Right => "\\qr",
                Alignment::Justify => "\\qj",
            }),
            (Property::IndentLeft, PropertyValue::Points(p)) => {
                let _ = write!(out, "\\li{}", twips(*p));
            }
            (Property::IndentRight, PropertyValue::Points(p)) => {
                let _ = write!(out, "\\ri{}", twips(*p));
            }
            (Property::IndentFirstLine, PropertyValue::Points(p)) => {
                let _ = write!(out, "\\fi{}", twips(*p));
            }
            (Property::SpaceBefore, PropertyValue::Points(p)) => {
                let _ = write!(out, "\\sb{}", twips(*p));
            }
            (Property::SpaceAfter, PropertyValue::Points(p)) => {
                let _ = write!(out, "\\sa{}", twips(*p));
            }
            (Property::LineSpacing, PropertyValue::LineSpacing(spacing)) => {
                let _ = match spacing {
                    LineSpacing::Multiple(m) => write!(out, "\\sl{}\\slmult1", (m * 240.0).round() as i32),
                    LineSpacing::Exact(p) => write!(out, "\\sl-{}\\slmult0", twips(*p)),
                    LineSpacing::AtLeast(p) => write!(out, "\\sl{}\\slmult0", twips(*p)),
                };
            }
            (Property::KeepWithNext, v) => toggle(out, "keepn", v),
            (Property::KeepTogether, v) => toggle(out, "keep", v),
            (Property::PageBreakBefore, v) => toggle(out, "pagebb", v),
            (Property::OutlineLevel, PropertyValue::Level(level)) => {
                let _ = write!(out, "\\outlinelevel{}", if *level == 0 { 9 } else { level - 1 });
            }
            _ => {}
        }
    }
}

/// Where table-scope properties are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableLevel {
    /// Row definition words standing for the whole table
    Row,
    Cell,
}

/// Shading, borders and padding of a row definition or a cell
pub fn write_table(out: &mut String, f: &Formatting, level: TableLevel, tables: &mut Tables) {
    let (shading, border, pad, pad_unit) = match level {
        TableLevel::Row => ("trcbpat", "trbrdr", "trpadd", "trpaddf"),
        TableLevel::Cell => ("clcbpat", "clbrdr", "clpad", "clpadf"),
    };
    for (property, value) in f.iter() {
        match (property, value) {
            (Property::CellShading, PropertyValue::Color(c)) => {
                let _ = write!(out, "\\{shading}{}", tables.color(*c));
            }
            (Property::BorderWidth, PropertyValue::Points(w)) => {
                for side in ['t', 'l', 'b', 'r'] {
                    if *w > 0.0 {
                        let _ = write!(out, "\\{border}{side}\\brdrs\\brdrw{}", twips(*w));
                    } else {
                        let _ = write!(out, "\\{border}{side}\\brdrnone");
                    }
                }
            }
            (Property::CellPadding, PropertyValue::Points(p)) => {
                for side in ['l', 't', 'b', 'r'] {
                    let _ = write!(out, "\\{pad}{side}{}\\{pad_unit}{side}3", twips(*p));
                }
            }
            _ => {}
        }
    }
}

// =============================================================================
// Reading
// =============================================================================

/// Font and color tables of the document being read
#[derive(Debug, Default)]
pub struct Lookup {
    pub fonts: HashMap<i32, String>,
    /// `None` is the "auto" color
    pub colors: Vec<Option<Color>>,
}

impl Lookup {
    pub fn color(&self, index: Option<i32>) -> Option<Color> {
        let index = usize::try_from(index?).ok()?;
        self.colors.get(index).copied().flatten()
    }
}

fn on(param: Option<i32>) -> PropertyValue {
    PropertyValue::Bool(param != Some(0))
}

/// Apply a character or paragraph control word. Returns false for words
/// that are not formatting.
pub fn apply(word: &str, param: Option<i32>, f: &mut Formatting, lookup: &Lookup) -> bool {
    let mut set = |p: Property, v: Option<PropertyValue>| {
        f.set(p, v);
    };
    let length = |p: Option<i32>| Some(PropertyValue::Points(points(p.unwrap_or(0))));
    match word {
        "b" => set(Property::Bold, Some(on(param))),
        "i" => set(Property::Italic, Some(on(param))),
        "ul" | "uld" | "uldb" | "ulw" | "uldash" | "ulth" | "ulwave" => {
            set(Property::Underline, Some(on(param)))
        }
        "ulnone" => set(Property::Underline, Some(PropertyValue::Bool(false))),
        "strike" | "striked" => set(Property::Strikethrough, Some(on(param))),
        "caps" => set(Property::AllCaps, Some(on(param))),
        "scaps" => set(Property::SmallCaps, Some(on(param))),
        "fs" => {
            if let Some(size) = param.filter(|s| *s > 0) {
                set(Property::FontSize, Some(PropertyValue::Points(size as f32 / 2.0)));
            }
        }
        "f" => {
            if let Some(name) = param.and_then(|i| lookup.fonts.get(&i)) {
                set(Property::FontFamily, Some(PropertyValue::Text(name.clone())));
            }
        }
        "cf" => set(Property::Color, lookup.color(param).map(PropertyValue::Color)),
        "highlight" | "cb" | "chcbpat" => set(
            Property::Highlight,
            Some(
                lookup
                    .color(param)
                    .map_or(PropertyValue::Transparent, PropertyValue::Color),
            ),
        ),
        "super" => set(Property::VerticalAlign, Some(VerticalAlign::Superscript.into())),
        "sub" => set(Property::VerticalAlign, Some(VerticalAlign::Subscript.into())),
        "nosupersub" => set(Property::VerticalAlign, Some(VerticalAlign::Baseline.into())),
        "ql" => set(Property::Alignment, Some(Alignment::Left.into())),
        "qc" => set(Property::Alignment, Some(Alignment::Center.into())),
        "qr" => set(Property::Alignment, Some(Alignment::Right.into())),
        "qj" => set(Property::Alignment, Some(Alignment::Justify.into())),
        "li" => set(Property::IndentLeft, length(param)),
        "ri" => set(Property::IndentRight, length(param)),
        "fi" => set(Property::IndentFirstLine, length(param)),
        "sb" => set(Property::SpaceBefore, length(param)),
        "sa" => set(Property::SpaceAfter, length(param)),
        "sl" => {
            let value = param.unwrap_or(0);
            let spacing = match value {
                0 => None,
                v if v < 0 => Some(LineSpacing::Exact(points(-v))),
                v => Some(LineSpacing::AtLeast(points(v))),
            };
            set(Property::LineSpacing, spacing.map(PropertyValue::LineSpacing));
        }
        "slmult" => {
            if param == Some(1) {
                if let Some(PropertyValue::LineSpacing(LineSpacing::AtLeast(p))) =
                    f.get(Property::LineSpacing).cloned()
                {
                    // 240 twips is single spacing
                    let multiple = (p * 20.0 / 240.0 * 100.0).round() / 100.0;
                    f.set(
                        Property::LineSpacing,
                        Some(PropertyValue::LineSpacing(LineSpacing::Multiple(multiple))),
                    );
                }
            }
        }
        "keepn" => set(Property::KeepWithNext, Some(on(param))),
        "keep" => set(Property::KeepTogether, Some(on(param))),
        "pagebb" => set(Property::PageBreakBefore, Some(on(param))),
        "outlinelevel" => {
            let level = param.unwrap_or(9);
            let level = if (0..9).contains(&level) { level as u8 + 1 } else { 0 };
            set(Property::OutlineLevel, Some(PropertyValue::Level(level)));
        }
        _ => return false,
    }
    true
}

/// Paragraph words among the ones [`apply`] knows; the rest are character
/// words
pub fn is_paragraph_word(word: &str) -> bool {
    matches!(
        word,
        "ql" | "qc"
            | "qr"
            | "qj"
            | "li"
            | "ri"
            | "fi"
            | "sb"
            | "sa"
            | "sl"
            | "slmult"
            | "keepn"
            | "keep"
            | "pagebb"
            | "outlinelevel"
    )
}

/// Row or cell level of a table formatting word. Border style and width
/// words have no level of their own.
pub fn table_level(word: &str) -> Option<TableLevel> {
    if ["trcbpat", "trbrdr", "trpadd"].iter().any(|p| word.starts_with(p)) {
        Some(TableLevel::Row)
    } else if ["clcbpat", "clbrdr", "clpad"].iter().any(|p| word.starts_with(p)) {
        Some(TableLevel::Cell)
    } else {
        None
    }
}

/// Apply a table shading, border or padding word. Borders of all sides
/// share one width.
pub fn apply_table(word: &str, param: Option<i32>, f: &mut Formatting, lookup: &Lookup) -> bool {
    match word {
        "trcbpat" | "clcbpat" => {
            f.set(Property::CellShading, lookup.color(param).map(PropertyValue::Color));
        }
        "trbrdrt" | "trbrdrl" | "trbrdrb" | "trbrdrr" | "trbrdrh" | "trbrdrv" | "clbrdrt"
        | "clbrdrl" | "clbrdrb" | "clbrdrr" => {
            if !f.contains(Property::BorderWidth) {
                f.set(Property::BorderWidth, Some(PropertyValue::Points(0.5)));
            }
        }
        "brdrw" => {
            f.set(Property::BorderWidth, Some(PropertyValue::Points(points(param.unwrap_or(0)))));
        }
        "brdrnone" => {
            f.set(Property::BorderWidth, Some(PropertyValue::Points(0.0)));
        }
        "trpaddl" | "trpaddt" | "trpaddb" | "trpaddr" | "clpadl" | "clpadt" | "clpadb" | "clpadr" => {
            f.set(Property::CellPadding, Some(PropertyValue::Points(points(param.unwrap_or(0)))));
        }
        w if w.starts_with("trpaddf") || w.starts_with("clpadf") => {}
        "brdrs" | "brdrth" | "brdrdb" | "brdrdot" | "brdrdash" | "brdrsh" => {}
        _ => return false,
    }
    true
}

// =============================================================================
// Dates
// =============================================================================

/// Packed revision date (`\revdttm`): minutes, hours, day, month, years
/// since 1900 and weekday in bit fields
pub fn to_dttm(date: &DateTime<Utc>) -> i32 {
    let year = (date.year() - 1900).clamp(0, 511) as u32;
    let packed = date.minute()
        | (date.hour() << 6)
        | (date.day() << 11)
        | (date.month() << 16)
        | (year << 20)
        | (date.weekday().num_days_from_sunday() << 29);
    packed as i32
}

pub fn from_dttm(value: i32) -> Option<DateTime<Utc>> {
    let v = value as u32;
    Utc.with_ymd_and_hms(
        1900 + ((v >> 20) & 0x1FF) as i32,
        (v >> 16) & 0xF,
        (v >> 11) & 0x1F,
        (v >> 6) & 0x1F,
        v & 0x3F,
        0,
    )
    .single()
}

/// `\yr..\sec` words of an info date
pub fn write_info_date(out: &mut String, word: &str, date: &DateTime<Utc>) {
    let _ = write!(
        out,
        "{{\\{word}\\yr{}\\mo{}\\dy{}\\hr{}\\min{}\\sec{}}}",
        date.year(),
        date.month(),
        date.day(),
        date.hour(),
        date.minute(),
        date.second()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtf::lexer::{parse, Item};

    /// Apply every control word of `words` to a fresh formatting
    fn read(words: &str, lookup: &Lookup) -> Formatting {
        let items = parse(format!("{{\\rtf1{words}}}").as_bytes()).unwrap();
        let mut f = Formatting::new();
        for item in items {
            if let Item::Word(name, param) = item {
                apply(&name, param, &mut f, lookup);
            }
        }
        f
    }

    #[test]
    fn test_char_round_trip() {
        let f = Formatting::new()
            .with(Property::FontFamily, PropertyValue::Text("Georgia".into()))
            .with(Property::FontSize, PropertyValue::Points(10.5))
            .with(Property::Bold, true)
            .with(Property::Italic, false)
            .with(Property::Underline, true)
            .with(Property::Color, Color::rgb(0x11, 0x22, 0x33))
            .with(Property::Highlight, PropertyValue::Transparent)
            .with(Property::VerticalAlign, VerticalAlign::Superscript);
        let mut tables = Tables::default();
        let mut out = String::new();
        write_char(&mut out, &f, &mut tables);
        assert!(out.contains("\\fs21"));

        let lookup = Lookup {
            fonts: HashMap::from([(0, "Georgia".to_string())]),
            colors: vec![None, Some(Color::rgb(0x11, 0x22, 0x33))],
        };
        assert_eq!(read(&out, &lookup), f);
    }

    #[test]
    fn test_paragraph_round_trip() {
        let f = Formatting::new()
            .with(Property::Alignment, Alignment::Justify)
            .with(Property::IndentLeft, PropertyValue::Points(36.0))
            .with(Property::IndentFirstLine, PropertyValue::Points(-18.0))
            .with(Property::SpaceAfter, PropertyValue::Points(8.0))
            .with(Property::LineSpacing, PropertyValue::LineSpacing(LineSpacing::Multiple(1.15)))
            .with(Property::KeepWithNext, true)
            .with(Property::PageBreakBefore, false)
            .with(Property::OutlineLevel, PropertyValue::Level(2));
        let mut out = String::new();
        write_paragraph(&mut out, &f);
        assert!(out.contains("\\sl276\\slmult1"));
        assert!(out.contains("\\outlinelevel1"));
        assert_eq!(read(&out, &Lookup::default()), f);
    }

    #[test]
    fn test_exact_line_spacing() {
        let f = read("\\sl-360\\slmult0", &Lookup::default());
        assert_eq!(
            f.get(Property::LineSpacing),
            Some(&PropertyValue::LineSpacing(LineSpacing::Exact(18.0)))
        );
    }

    #[test]
    fn test_table_words() {
        let f = Formatting::new()
            .with(Property::CellShading, Color::rgb(0xEE, 0xEE, 0xEE))
            .with(Property::BorderWidth, PropertyValue::Points(1.0))
            .with(Property::CellPadding, PropertyValue::Points(4.0));
        let mut tables = Tables::default();
        let mut out = String::new();
        write_table(&mut out, &f, TableLevel::Cell, &mut tables);
        assert!(out.starts_with("\\clcbpat1"));
        assert!(out.contains("\\clbrdrt\\brdrs\\brdrw20"));
        assert!(out.contains("\\clpadl80\\clpadfl3"));
    }

    #[test]
    fn test_table_words_read_back() {
        let lookup = Lookup {
            fonts: HashMap::new(),
            colors: vec![None, Some(Color::rgb(0xEE, 0xEE, 0xEE))],
        };
        let mut f = Formatting::new();
        for (word, param) in [
            ("clcbpat", Some(1)),
            ("clbrdrt", None),
            ("brdrs", None),
            ("brdrw", Some(30)),
            ("clpadl", Some(100)),
            ("clpadfl", Some(3)),
        ] {
            assert!(apply_table(word, param, &mut f, &lookup));
        }
        assert_eq!(f.get(Property::BorderWidth), Some(&PropertyValue::Points(1.5)));
        assert_eq!(f.get(Property::CellPadding), Some(&PropertyValue::Points(5.0)));
        assert_eq!(table_level("clbrdrb"), Some(TableLevel::Cell));
        assert_eq!(table_level("trpaddl"), Some(TableLevel::Row));
        assert_eq!(table_level("brdrw"), None);
        assert!(!apply_table("cellx", Some(100), &mut f, &lookup));
    }

    #[test]
    fn test_dttm() {
        let date = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 0).unwrap();
        assert_eq!(from_dttm(to_dttm(&date)), Some(date));
        assert_eq!(from_dttm(0), None);
    }

    #[test]
    fn test_tables() {
        let mut tables = Tables::default();
        assert_eq!(tables.font("Arial"), 0);
        assert_eq!(tables.font("Georgia"), 1);
        assert_eq!(tables.font("Arial"), 0);
        assert_eq!(tables.color(Color::BLACK), 1);
        let mut out = String::new();
        tables.write(&mut out);
        assert_eq!(
            out,
            "{\\fonttbl{\\f0\\fnil\\fcharset0 Arial;}{\\f1\\fnil\\fcharset0 Georgia;}}{\\colortbl;\\red0\\green0\\blue0;}"
        );
    }
}
