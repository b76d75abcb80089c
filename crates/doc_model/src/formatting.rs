//! Formatting properties and sparse formatting maps
//!
//! Direct formatting and style definitions both store a [`Formatting`]: a
//! sparse map from [`Property`] to [`PropertyValue`]. A property that is not
//! present means "inherit"; the resolver fills the gap from the next layer.

use crate::{StyleId, ThemeColorSlot, ThemeFont, MAX_LIST_LEVEL};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use self::Property as P;

// ===== Value types =====

/// Paragraph alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

/// Baseline position of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalAlign {
    #[default]
    Baseline,
    Superscript,
    Subscript,
}

/// Line spacing configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LineSpacing {
    /// Multiple of line height (1.0 = single, 2.0 = double)
    Multiple(f32),
    /// Exact spacing in points
    Exact(f32),
    /// At least this many points
    AtLeast(f32),
}

impl Default for LineSpacing {
    fn default() -> Self {
        LineSpacing::Multiple(1.0)
    }
}

/// An sRGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `RRGGBB` or `#RRGGBB`.
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Upper-case `RRGGBB` without a leading `#`.
    pub fn to_hex(&self) -> String {
        format!("{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Channels scaled to 0.0..=1.0
    pub fn to_unit(&self) -> (f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        )
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.to_hex())
    }
}

// ===== Properties =====

/// Which kind of node a property can be set on directly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyScope {
    Character,
    Paragraph,
    Table,
}

/// Every formatting property known to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Property {
    // Character
    FontFamily,
    FontSize,
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Color,
    Highlight,
    VerticalAlign,
    AllCaps,
    SmallCaps,
    // Paragraph
    Alignment,
    IndentLeft,
    IndentRight,
    IndentFirstLine,
    SpaceBefore,
    SpaceAfter,
    LineSpacing,
    KeepWithNext,
    KeepTogether,
    PageBreakBefore,
    OutlineLevel,
    ListStyle,
    ListLevel,
    // Table
    CellShading,
    BorderWidth,
    CellPadding,
}

impl Property {
    pub const ALL: [Property; 27] = [
        Property::FontFamily,
        Property::FontSize,
        Property::Bold,
        Property::Italic,
        Property::Underline,
        Property::Strikethrough,
        Property::Color,
        Property::Highlight,
        Property::VerticalAlign,
        Property::AllCaps,
        Property::SmallCaps,
        Property::Alignment,
        Property::IndentLeft,
        Property::IndentRight,
        Property::IndentFirstLine,
        Property::SpaceBefore,
        Property::SpaceAfter,
        Property::LineSpacing,
        Property::KeepWithNext,
        Property::KeepTogether,
        Property::PageBreakBefore,
        Property::OutlineLevel,
        Property::ListStyle,
        Property::ListLevel,
        Property::CellShading,
        Property::BorderWidth,
        Property::CellPadding,
    ];

    pub fn scope(self) -> PropertyScope {
        match self {
            P::FontFamily
            | P::FontSize
            | P::Bold
            | P::Italic
            | P::Underline
            | P::Strikethrough
            | P::Color
            | P::Highlight
            | P::VerticalAlign
            | P::AllCaps
            | P::SmallCaps => PropertyScope::Character,
            P::Alignment
            | P::IndentLeft
            | P::IndentRight
            | P::IndentFirstLine
            | P::SpaceBefore
            | P::SpaceAfter
            | P::LineSpacing
            | P::KeepWithNext
            | P::KeepTogether
            | P::PageBreakBefore
            | P::OutlineLevel
            | P::ListStyle
            | P::ListLevel => PropertyScope::Paragraph,
            P::CellShading | P::BorderWidth | P::CellPadding => PropertyScope::Table,
        }
    }

    /// Stable snake_case name, used in logs and the CLI
    pub fn name(self) -> &'static str {
        match self {
            P::FontFamily => "font_family",
            P::FontSize => "font_size",
            P::Bold => "bold",
            P::Italic => "italic",
            P::Underline => "underline",
            P::Strikethrough => "strikethrough",
            P::Color => "color",
            P::Highlight => "highlight",
            P::VerticalAlign => "vertical_align",
            P::AllCaps => "all_caps",
            P::SmallCaps => "small_caps",
            P::Alignment => "alignment",
            P::IndentLeft => "indent_left",
            P::IndentRight => "indent_right",
            P::IndentFirstLine => "indent_first_line",
            P::SpaceBefore => "space_before",
            P::SpaceAfter => "space_after",
            P::LineSpacing => "line_spacing",
            P::KeepWithNext => "keep_with_next",
            P::KeepTogether => "keep_together",
            P::PageBreakBefore => "page_break_before",
            P::OutlineLevel => "outline_level",
            P::ListStyle => "list_style",
            P::ListLevel => "list_level",
            P::CellShading => "cell_shading",
            P::BorderWidth => "border_width",
            P::CellPadding => "cell_padding",
        }
    }

    pub fn from_name(name: &str) -> Option<Property> {
        Property::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Whether `value` has the right shape for this property.
    pub fn accepts(self, value: &PropertyValue) -> bool {
        use PropertyValue as V;
        match (self, value) {
            (P::FontFamily, V::Text(name)) => !name.trim().is_empty(),
            (P::FontFamily, V::ThemeFont(_)) => true,
            (P::FontSize, V::Points(pt)) => *pt > 0.0 && pt.is_finite(),
            (P::IndentLeft | P::IndentRight | P::IndentFirstLine, V::Points(pt)) => pt.is_finite(),
            (P::SpaceBefore | P::SpaceAfter | P::BorderWidth | P::CellPadding, V::Points(pt)) => {
                *pt >= 0.0 && pt.is_finite()
            }
            (
                P::Bold
                | P::Italic
                | P::Underline
                | P::Strikethrough
                | P::AllCaps
                | P::SmallCaps
                | P::KeepWithNext
                | P::KeepTogether
                | P::PageBreakBefore,
                V::Bool(_),
            ) => true,
            (P::Color, V::Color(_) | V::ThemeColor(_)) => true,
            (P::Highlight | P::CellShading, V::Color(_) | V::ThemeColor(_) | V::Transparent) => true,
            (P::VerticalAlign, V::VerticalAlign(_)) => true,
            (P::Alignment, V::Alignment(_)) => true,
            (P::LineSpacing, V::LineSpacing(spacing)) => match spacing {
                crate::LineSpacing::Multiple(v)
                | crate::LineSpacing::Exact(v)
                | crate::LineSpacing::AtLeast(v) => *v > 0.0 && v.is_finite(),
            },
            (P::OutlineLevel, V::Level(level)) => *level <= 9,
            (P::ListLevel, V::Level(level)) => *level <= MAX_LIST_LEVEL,
            (P::ListStyle, V::ListRef(_)) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A concrete property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    Points(f32),
    Text(String),
    Color(Color),
    /// No fill (highlight and shading)
    Transparent,
    ThemeFont(ThemeFont),
    ThemeColor(ThemeColorSlot),
    Alignment(Alignment),
    VerticalAlign(VerticalAlign),
    LineSpacing(LineSpacing),
    Level(u8),
    /// List membership; `None` takes a paragraph out of an inherited list
    ListRef(Option<StyleId>),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_points(&self) -> Option<f32> {
        match self {
            PropertyValue::Points(pt) => Some(*pt),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Color> {
        match self {
            PropertyValue::Color(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_list_ref(&self) -> Option<&StyleId> {
        match self {
            PropertyValue::ListRef(id) => id.as_ref(),
            _ => None,
        }
    }

    /// True when the value points into the theme and needs substitution.
    pub fn is_theme_reference(&self) -> bool {
        matches!(self, PropertyValue::ThemeFont(_) | PropertyValue::ThemeColor(_))
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<Color> for PropertyValue {
    fn from(c: Color) -> Self {
        PropertyValue::Color(c)
    }
}

impl From<Alignment> for PropertyValue {
    fn from(a: Alignment) -> Self {
        PropertyValue::Alignment(a)
    }
}

impl From<VerticalAlign> for PropertyValue {
    fn from(v: VerticalAlign) -> Self {
        PropertyValue::VerticalAlign(v)
    }
}

impl From<LineSpacing> for PropertyValue {
    fn from(s: LineSpacing) -> Self {
        PropertyValue::LineSpacing(s)
    }
}

// ===== Formatting map =====

/// Sparse property map used for direct formatting and style definitions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<FormattingEntry>", into = "Vec<FormattingEntry>")]
pub struct Formatting {
    values: BTreeMap<Property, PropertyValue>,
}

/// Serialized form of one formatting entry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FormattingEntry {
    property: Property,
    value: PropertyValue,
}

impl From<Vec<FormattingEntry>> for Formatting {
    fn from(entries: Vec<FormattingEntry>) -> Self {
        Self {
            values: entries.into_iter().map(|e| (e.property, e.value)).collect(),
        }
    }
}

impl From<Formatting> for Vec<FormattingEntry> {
    fn from(formatting: Formatting) -> Self {
        formatting
            .values
            .into_iter()
            .map(|(property, value)| FormattingEntry { property, value })
            .collect()
    }
}

impl Formatting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, property: Property, value: impl Into<PropertyValue>) -> Self {
        self.values.insert(property, value.into());
        self
    }

    pub fn get(&self, property: Property) -> Option<&PropertyValue> {
        self.values.get(&property)
    }

    pub fn contains(&self, property: Property) -> bool {
        self.values.contains_key(&property)
    }

    /// Set or clear a property, returning the previous value.
    pub fn set(&mut self, property: Property, value: Option<PropertyValue>) -> Option<PropertyValue> {
        match value {
            Some(value) => self.values.insert(property, value),
            None => self.values.remove(&property),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Property, &PropertyValue)> {
        self.values.iter().map(|(p, v)| (*p, v))
    }

    /// Entries restricted to one scope
    pub fn scoped(&self, scope: PropertyScope) -> Formatting {
        Formatting {
            values: self
                .values
                .iter()
                .filter(|(p, _)| p.scope() == scope)
                .map(|(p, v)| (*p, v.clone()))
                .collect(),
        }
    }

    /// Copy of `self` with every entry of `other` written over it.
    pub fn merged_with(&self, other: &Formatting) -> Formatting {
        let mut values = self.values.clone();
        for (p, v) in &other.values {
            values.insert(*p, v.clone());
        }
        Formatting { values }
    }
}

impl FromIterator<(Property, PropertyValue)> for Formatting {
    fn from_iter<I: IntoIterator<Item = (Property, PropertyValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
