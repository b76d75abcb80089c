//! Named styles and the style registry
//!
//! Styles form a `based_on` DAG. Every edit that can change a chain goes
//! through [`StyleRegistry::check_based_on`], so a stored registry is always
//! acyclic and the resolver never has to guard against loops.

use crate::{
    Alignment, Color, DocModelError, Formatting, LineSpacing, ListKind, Property, PropertyValue,
    Result, ThemeColorSlot, ThemeFont,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Unique identifier for a style
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleId(String);

impl StyleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StyleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StyleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for StyleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a style applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleType {
    Paragraph,
    Character,
    Table,
    List,
}

/// A named style definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
    pub id: StyleId,
    /// Display name
    pub name: String,
    pub style_type: StyleType,
    pub based_on: Option<StyleId>,
    /// Style applied to the paragraph created after this one
    #[serde(default)]
    pub next_style: Option<StyleId>,
    #[serde(default)]
    pub built_in: bool,
    #[serde(default)]
    pub properties: Formatting,
    /// Marker of a list style
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_kind: Option<ListKind>,
}

impl Style {
    fn new(id: impl Into<StyleId>, name: impl Into<String>, style_type: StyleType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            style_type,
            based_on: None,
            next_style: None,
            built_in: false,
            properties: Formatting::new(),
            list_kind: None,
        }
    }

    /// Create a new paragraph style
    pub fn paragraph(id: impl Into<StyleId>, name: impl Into<String>) -> Self {
        Self::new(id, name, StyleType::Paragraph)
    }

    /// Create a new character style
    pub fn character(id: impl Into<StyleId>, name: impl Into<String>) -> Self {
        Self::new(id, name, StyleType::Character)
    }

    /// Create a new table style
    pub fn table(id: impl Into<StyleId>, name: impl Into<String>) -> Self {
        Self::new(id, name, StyleType::Table)
    }

    /// Create a new bulleted list style
    pub fn list(id: impl Into<StyleId>, name: impl Into<String>) -> Self {
        Self::new(id, name, StyleType::List)
    }

    pub fn list_of(id: impl Into<StyleId>, name: impl Into<String>, kind: ListKind) -> Self {
        Self {
            list_kind: Some(kind),
            ..Self::new(id, name, StyleType::List)
        }
    }

    /// Marker of this list style; bullets when unset
    pub fn list_kind(&self) -> ListKind {
        self.list_kind.unwrap_or_default()
    }

    pub fn with_based_on(mut self, base: impl Into<StyleId>) -> Self {
        self.based_on = Some(base.into());
        self
    }

    pub fn with_next_style(mut self, next: impl Into<StyleId>) -> Self {
        self.next_style = Some(next.into());
        self
    }

    pub fn with_property(mut self, property: Property, value: impl Into<PropertyValue>) -> Self {
        self.properties.set(property, Some(value.into()));
        self
    }

    pub fn as_built_in(mut self) -> Self {
        self.built_in = true;
        self
    }
}

/// All styles of one document.
///
/// Each stored style carries a revision number that changes whenever the
/// style is written. The resolve cache records the revisions it read and
/// treats an entry as stale as soon as one of them moves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleRegistry {
    styles: BTreeMap<StyleId, Style>,
    default_paragraph_style: Option<StyleId>,
    #[serde(skip)]
    revisions: HashMap<StyleId, u64>,
    #[serde(skip)]
    next_revision: u64,
    #[serde(skip)]
    default_epoch: u64,
}

impl PartialEq for StyleRegistry {
    fn eq(&self, other: &Self) -> bool {
        self.styles == other.styles && self.default_paragraph_style == other.default_paragraph_style
    }
}

impl StyleRegistry {
    /// Registry holding the built-in styles, with `Normal` as the default
    /// paragraph style
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_built_in_styles();
        registry.default_paragraph_style = Some(StyleId::new("Normal"));
        registry
    }

    /// Registry with no styles at all
    pub fn empty() -> Self {
        Self {
            styles: BTreeMap::new(),
            default_paragraph_style: None,
            revisions: HashMap::new(),
            next_revision: 1,
            default_epoch: 0,
        }
    }

    fn register_built_in_styles(&mut self) {
        let built_ins = [
            Style::paragraph("Normal", "Normal")
                .with_property(Property::FontFamily, PropertyValue::ThemeFont(ThemeFont::Body))
                .with_property(Property::FontSize, PropertyValue::Points(11.0))
                .with_property(Property::SpaceAfter, PropertyValue::Points(8.0))
                .with_property(
                    Property::LineSpacing,
                    PropertyValue::LineSpacing(LineSpacing::Multiple(1.08)),
                ),
            heading("Heading1", "Heading 1", 1, 16.0).with_property(Property::Bold, true),
            heading("Heading2", "Heading 2", 2, 13.0).with_property(Property::Bold, true),
            heading("Heading3", "Heading 3", 3, 12.0)
                .with_property(Property::Bold, true)
                .with_property(Property::Italic, true),
            Style::paragraph("Title", "Title")
                .with_based_on("Normal")
                .with_next_style("Normal")
                .with_property(Property::FontFamily, PropertyValue::ThemeFont(ThemeFont::Heading))
                .with_property(Property::FontSize, PropertyValue::Points(28.0))
                .with_property(Property::SpaceAfter, PropertyValue::Points(0.0)),
            Style::paragraph("Quote", "Quote")
                .with_based_on("Normal")
                .with_property(Property::IndentLeft, PropertyValue::Points(25.0))
                .with_property(Property::IndentRight, PropertyValue::Points(25.0))
                .with_property(Property::SpaceBefore, PropertyValue::Points(10.0))
                .with_property(Property::SpaceAfter, PropertyValue::Points(10.0))
                .with_property(Property::Alignment, Alignment::Center)
                .with_property(Property::Italic, true),
            Style::paragraph("Code", "Code")
                .with_based_on("Normal")
                .with_property(Property::FontFamily, PropertyValue::Text("Courier New".into()))
                .with_property(Property::FontSize, PropertyValue::Points(10.0))
                .with_property(Property::SpaceAfter, PropertyValue::Points(0.0))
                .with_property(Property::Highlight, Color::rgb(0xD3, 0xD3, 0xD3)),
            Style::character("Strong", "Strong").with_property(Property::Bold, true),
            Style::character("Emphasis", "Emphasis").with_property(Property::Italic, true),
            Style::character("Hyperlink", "Hyperlink")
                .with_property(Property::Color, PropertyValue::ThemeColor(ThemeColorSlot::Accent))
                .with_property(Property::Underline, true),
            Style::table("TableGrid", "Table Grid")
                .with_property(Property::BorderWidth, PropertyValue::Points(0.5))
                .with_property(Property::CellPadding, PropertyValue::Points(5.4)),
        ];
        for style in built_ins {
            let id = style.id.clone();
            let revision = self.bump();
            self.revisions.insert(id.clone(), revision);
            self.styles.insert(id, style.as_built_in());
        }
    }

    fn bump(&mut self) -> u64 {
        let revision = self.next_revision;
        self.next_revision += 1;
        revision
    }

    pub fn get(&self, id: &StyleId) -> Option<&Style> {
        self.styles.get(id)
    }

    pub fn contains(&self, id: &StyleId) -> bool {
        self.styles.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    /// Styles in id order
    pub fn iter(&self) -> impl Iterator<Item = &Style> {
        self.styles.values()
    }

    /// Current revision of a style, `None` if it does not exist
    pub fn revision_of(&self, id: &StyleId) -> Option<u64> {
        if !self.styles.contains_key(id) {
            return None;
        }
        Some(self.revisions.get(id).copied().unwrap_or(0))
    }

    pub fn default_paragraph_style(&self) -> Option<&StyleId> {
        self.default_paragraph_style.as_ref()
    }

    /// Changes whenever the default paragraph style is reassigned
    pub fn default_epoch(&self) -> u64 {
        self.default_epoch
    }

    pub fn set_default_paragraph_style(&mut self, id: Option<StyleId>) -> Result<()> {
        if let Some(id) = &id {
            match self.styles.get(id) {
                None => return Err(DocModelError::StyleNotFound(id.clone())),
                Some(style) if style.style_type != StyleType::Paragraph => {
                    return Err(DocModelError::structural(format!(
                        "default paragraph style '{id}' is not a paragraph style"
                    )))
                }
                Some(_) => {}
            }
        }
        self.default_paragraph_style = id;
        self.default_epoch += 1;
        Ok(())
    }

    /// Reject `style.based_on = based_on` if it would close a loop.
    ///
    /// A base that is not registered yet simply ends the chain, but the walk
    /// still follows it, so a style added later that points back at `style`
    /// is caught when it is added.
    pub fn check_based_on(&self, style: &StyleId, based_on: Option<&StyleId>) -> Result<()> {
        let Some(start) = based_on else {
            return Ok(());
        };
        let mut seen = HashSet::new();
        let mut current = Some(start.clone());
        while let Some(id) = current {
            if &id == style {
                return Err(DocModelError::CyclicStyle {
                    style: style.clone(),
                    based_on: start.clone(),
                });
            }
            if !seen.insert(id.clone()) {
                // Pre-existing loop elsewhere; cannot happen for a registry
                // built through this API.
                break;
            }
            current = self.styles.get(&id).and_then(|s| s.based_on.clone());
        }
        Ok(())
    }

    /// Add a style or replace the one with the same id.
    pub fn insert(&mut self, style: Style) -> Result<Option<Style>> {
        self.check_based_on(&style.id, style.based_on.as_ref())?;
        let revision = self.bump();
        self.revisions.insert(style.id.clone(), revision);
        Ok(self.styles.insert(style.id.clone(), style))
    }

    /// Change the base of an existing style, returning the old base.
    pub fn set_based_on(&mut self, id: &StyleId, based_on: Option<StyleId>) -> Result<Option<StyleId>> {
        if !self.styles.contains_key(id) {
            return Err(DocModelError::StyleNotFound(id.clone()));
        }
        self.check_based_on(id, based_on.as_ref())?;
        let revision = self.bump();
        self.revisions.insert(id.clone(), revision);
        let style = self
            .styles
            .get_mut(id)
            .ok_or_else(|| DocModelError::StyleNotFound(id.clone()))?;
        Ok(std::mem::replace(&mut style.based_on, based_on))
    }

    /// Set or clear one property of a style.
    pub fn set_property(
        &mut self,
        id: &StyleId,
        property: Property,
        value: Option<PropertyValue>,
    ) -> Result<Option<PropertyValue>> {
        if let Some(value) = &value {
            if !property.accepts(value) {
                return Err(DocModelError::structural(format!(
                    "value {value:?} is not valid for {property}"
                )));
            }
        }
        let revision = self.bump();
        let style = self
            .styles
            .get_mut(id)
            .ok_or_else(|| DocModelError::StyleNotFound(id.clone()))?;
        self.revisions.insert(id.clone(), revision);
        Ok(style.properties.set(property, value))
    }

    /// Remove a style. Callers check node references first; see
    /// `DocumentTree::remove_style`.
    pub fn remove(&mut self, id: &StyleId) -> Result<Style> {
        let style = self
            .styles
            .remove(id)
            .ok_or_else(|| DocModelError::StyleNotFound(id.clone()))?;
        self.revisions.remove(id);
        if self.default_paragraph_style.as_ref() == Some(id) {
            self.default_paragraph_style = None;
            self.default_epoch += 1;
        }
        Ok(style)
    }

    /// The chain starting at `id`, nearest style first. A dangling base ends
    /// the chain.
    pub fn chain(&self, id: &StyleId) -> Vec<&Style> {
        let mut chain = Vec::new();
        let mut current = self.styles.get(id);
        while let Some(style) = current {
            if chain.iter().any(|s: &&Style| s.id == style.id) {
                break;
            }
            chain.push(style);
            current = style.based_on.as_ref().and_then(|b| self.styles.get(b));
        }
        chain
    }

    /// Ids visited while walking the chain, including a dangling base.
    pub fn chain_ids(&self, id: &StyleId) -> Vec<StyleId> {
        let mut ids = vec![id.clone()];
        let mut current = self.styles.get(id).and_then(|s| s.based_on.clone());
        while let Some(next) = current {
            if ids.contains(&next) {
                break;
            }
            current = self.styles.get(&next).and_then(|s| s.based_on.clone());
            ids.push(next);
        }
        ids
    }

    /// Check the whole registry for cycles. Used after deserializing or
    /// importing, where styles arrive without going through `insert`.
    pub fn validate(&self) -> Result<()> {
        for style in self.styles.values() {
            let mut seen = HashSet::new();
            let mut current = Some(&style.id);
            while let Some(id) = current {
                if !seen.insert(id) {
                    return Err(DocModelError::CyclicStyle {
                        style: style.id.clone(),
                        based_on: style.based_on.clone().unwrap_or_else(|| style.id.clone()),
                    });
                }
                current = self.styles.get(id).and_then(|s| s.based_on.as_ref());
            }
        }
        Ok(())
    }

    /// Assign fresh revisions after deserialization
    pub(crate) fn reindex(&mut self) {
        let ids: Vec<StyleId> = self.styles.keys().cloned().collect();
        for id in ids {
            let revision = self.bump();
            self.revisions.insert(id, revision);
        }
    }
}

impl Default for StyleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn heading(id: &str, name: &str, level: u8, size: f32) -> Style {
    Style::paragraph(id, name)
        .with_based_on("Normal")
        .with_next_style("Normal")
        .with_property(Property::FontFamily, PropertyValue::ThemeFont(ThemeFont::Heading))
        .with_property(Property::FontSize, PropertyValue::Points(size))
        .with_property(Property::OutlineLevel, PropertyValue::Level(level))
        .with_property(Property::KeepWithNext, true)
        .with_property(Property::SpaceBefore, PropertyValue::Points(12.0))
        .with_property(Property::SpaceAfter, PropertyValue::Points(4.0))
}
