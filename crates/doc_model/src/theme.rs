//! Document theme and document-wide formatting defaults

use crate::{Alignment, Color, Formatting, LineSpacing, Property, PropertyValue, VerticalAlign};
use serde::{Deserialize, Serialize};

/// Semantic font slot of a theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeFont {
    Heading,
    Body,
}

/// Semantic color slot of a theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeColorSlot {
    Text,
    Background,
    Accent,
    Highlight,
}

/// Color palette of a theme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemePalette {
    pub text: Color,
    pub background: Color,
    pub accent: Color,
    pub highlight: Color,
}

/// Document-wide font and color choices.
///
/// A theme sits between the style chains and the document defaults: it
/// supplies the font family and text color for anything no style sets, and it
/// resolves `ThemeFont`/`ThemeColor` references held in styles or direct
/// formatting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub name: String,
    pub heading_font: String,
    pub body_font: String,
    pub palette: ThemePalette,
}

impl Theme {
    pub fn light() -> Self {
        Self {
            name: "Light".into(),
            heading_font: "Calibri Light".into(),
            body_font: "Calibri".into(),
            palette: ThemePalette {
                text: Color::rgb(0x00, 0x00, 0x00),
                background: Color::rgb(0xFF, 0xFF, 0xFF),
                accent: Color::rgb(0x00, 0x78, 0xD7),
                highlight: Color::rgb(0xE6, 0xF3, 0xFF),
            },
        }
    }

    pub fn dark() -> Self {
        Self {
            name: "Dark".into(),
            heading_font: "Calibri Light".into(),
            body_font: "Calibri".into(),
            palette: ThemePalette {
                text: Color::rgb(0xE0, 0xE0, 0xE0),
                background: Color::rgb(0x2D, 0x2D, 0x2D),
                accent: Color::rgb(0x4F, 0xA6, 0xED),
                highlight: Color::rgb(0x3E, 0x4A, 0x52),
            },
        }
    }

    pub fn sepia() -> Self {
        Self {
            name: "Sepia".into(),
            heading_font: "Georgia".into(),
            body_font: "Georgia".into(),
            palette: ThemePalette {
                text: Color::rgb(0x5B, 0x46, 0x36),
                background: Color::rgb(0xF4, 0xEC, 0xD8),
                accent: Color::rgb(0x9C, 0x78, 0x6C),
                highlight: Color::rgb(0xE4, 0xD4, 0xB1),
            },
        }
    }

    /// Look up a built-in preset by name (case-insensitive)
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "light" => Some(Self::light()),
            "dark" => Some(Self::dark()),
            "sepia" => Some(Self::sepia()),
            _ => None,
        }
    }

    pub fn font(&self, slot: ThemeFont) -> &str {
        match slot {
            ThemeFont::Heading => &self.heading_font,
            ThemeFont::Body => &self.body_font,
        }
    }

    pub fn color(&self, slot: ThemeColorSlot) -> Color {
        match slot {
            ThemeColorSlot::Text => self.palette.text,
            ThemeColorSlot::Background => self.palette.background,
            ThemeColorSlot::Accent => self.palette.accent,
            ThemeColorSlot::Highlight => self.palette.highlight,
        }
    }

    /// Replace a theme reference with the concrete value it names.
    pub fn substitute(&self, value: &PropertyValue) -> PropertyValue {
        match value {
            PropertyValue::ThemeFont(slot) => PropertyValue::Text(self.font(*slot).to_string()),
            PropertyValue::ThemeColor(slot) => PropertyValue::Color(self.color(*slot)),
            other => other.clone(),
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::light()
    }
}

/// Lowest layer of the cascade. Holds a value for every property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Formatting", into = "Formatting")]
pub struct DocumentDefaults {
    values: Formatting,
}

impl DocumentDefaults {
    /// Value used when no layer above sets `property`.
    pub fn get(&self, property: Property) -> PropertyValue {
        self.values
            .get(property)
            .cloned()
            .unwrap_or_else(|| builtin_default(property))
    }

    /// Override one default. Values of the wrong shape are ignored.
    pub fn set(&mut self, property: Property, value: PropertyValue) -> bool {
        if !property.accepts(&value) {
            return false;
        }
        self.values.set(property, Some(value));
        true
    }

    /// All defaults that differ from the built-in table
    pub fn overrides(&self) -> Formatting {
        self.values
            .iter()
            .filter(|(p, v)| builtin_default(*p) != **v)
            .map(|(p, v)| (p, v.clone()))
            .collect()
    }
}

impl Default for DocumentDefaults {
    fn default() -> Self {
        Self {
            values: Property::ALL
                .into_iter()
                .map(|p| (p, builtin_default(p)))
                .collect(),
        }
    }
}

impl From<Formatting> for DocumentDefaults {
    fn from(values: Formatting) -> Self {
        let mut defaults = DocumentDefaults::default();
        for (p, v) in values.iter() {
            defaults.set(p, v.clone());
        }
        defaults
    }
}

impl From<DocumentDefaults> for Formatting {
    fn from(defaults: DocumentDefaults) -> Self {
        defaults.values
    }
}

fn builtin_default(property: Property) -> PropertyValue {
    use PropertyValue as V;
    match property {
        Property::FontFamily => V::Text("Calibri".into()),
        Property::FontSize => V::Points(11.0),
        Property::Bold
        | Property::Italic
        | Property::Underline
        | Property::Strikethrough
        | Property::AllCaps
        | Property::SmallCaps
        | Property::KeepWithNext
        | Property::KeepTogether
        | Property::PageBreakBefore => V::Bool(false),
        Property::Color => V::Color(Color::BLACK),
        Property::Highlight | Property::CellShading => V::Transparent,
        Property::VerticalAlign => V::VerticalAlign(VerticalAlign::Baseline),
        Property::Alignment => V::Alignment(Alignment::Left),
        Property::IndentLeft
        | Property::IndentRight
        | Property::IndentFirstLine
        | Property::SpaceBefore
        | Property::SpaceAfter => V::Points(0.0),
        Property::LineSpacing => V::LineSpacing(LineSpacing::Multiple(1.0)),
        Property::OutlineLevel | Property::ListLevel => V::Level(0),
        Property::ListStyle => V::ListRef(None),
        Property::BorderWidth => V::Points(0.5),
        Property::CellPadding => V::Points(5.4),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_total() {
        let defaults = DocumentDefaults::default();
        for p in Property::ALL {
            assert!(p.accepts(&defaults.get(p)), "bad default for {p}");
        }
    }

    #[test]
    fn test_defaults_reject_wrong_shape() {
        let mut defaults = DocumentDefaults::default();
        assert!(!defaults.set(Property::FontSize, PropertyValue::Bool(true)));
        assert!(defaults.set(Property::FontSize, PropertyValue::Points(12.0)));
        assert_eq!(defaults.get(Property::FontSize), PropertyValue::Points(12.0));
        assert_eq!(defaults.overrides().len(), 1);
    }

    #[test]
    fn test_theme_substitution() {
        let theme = Theme::sepia();
        assert_eq!(
            theme.substitute(&PropertyValue::ThemeFont(ThemeFont::Heading)),
            PropertyValue::Text("Georgia".into())
        );
        assert_eq!(
            theme.substitute(&PropertyValue::ThemeColor(ThemeColorSlot::Text)),
            PropertyValue::Color(Color::rgb(0x5B, 0x46, 0x36))
        );
        assert_eq!(
            theme.substitute(&PropertyValue::Bool(true)),
            PropertyValue::Bool(true)
        );
    }

    #[test]
    fn test_presets() {
        assert_eq!(Theme::preset("DARK").unwrap().name, "Dark");
        assert!(Theme::preset("neon").is_none());
    }
}
