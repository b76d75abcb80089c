//! Node kinds, payloads and containment rules

use crate::{Formatting, NodeId, PropertyScope, StyleId, StyleType};
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Kind of a node in the content tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Document,
    Section,
    Paragraph,
    Table,
    TableRow,
    TableCell,
    Run,
    InlineObject,
    Bookmark,
    FieldReference,
}

impl NodeKind {
    /// Whether a node of this kind may hold `child` directly.
    pub fn can_contain(self, child: NodeKind) -> bool {
        use NodeKind::*;
        matches!(
            (self, child),
            (Document, Section)
                | (Section, Paragraph | Table)
                | (Paragraph, Run | InlineObject | Bookmark | FieldReference)
                | (Table, TableRow)
                | (TableRow, TableCell)
                | (TableCell, Paragraph | Table)
        )
    }

    pub fn is_inline(self) -> bool {
        matches!(
            self,
            NodeKind::Run | NodeKind::InlineObject | NodeKind::Bookmark | NodeKind::FieldReference
        )
    }

    pub fn is_block(self) -> bool {
        matches!(self, NodeKind::Paragraph | NodeKind::Table)
    }

    /// Formatting scope accepted as direct formatting, if any
    pub fn formatting_scope(self) -> Option<PropertyScope> {
        match self {
            NodeKind::Run | NodeKind::FieldReference => Some(PropertyScope::Character),
            NodeKind::Paragraph => Some(PropertyScope::Paragraph),
            NodeKind::Table | NodeKind::TableRow | NodeKind::TableCell => Some(PropertyScope::Table),
            _ => None,
        }
    }

    /// Style type a node of this kind may reference
    pub fn style_type(self) -> Option<StyleType> {
        match self {
            NodeKind::Run | NodeKind::FieldReference => Some(StyleType::Character),
            NodeKind::Paragraph => Some(StyleType::Paragraph),
            NodeKind::Table => Some(StyleType::Table),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Document => "document",
            NodeKind::Section => "section",
            NodeKind::Paragraph => "paragraph",
            NodeKind::Table => "table",
            NodeKind::TableRow => "table row",
            NodeKind::TableCell => "table cell",
            NodeKind::Run => "run",
            NodeKind::InlineObject => "inline object",
            NodeKind::Bookmark => "bookmark",
            NodeKind::FieldReference => "field",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Page break position reported back by the layout collaborator.
///
/// Advisory only; nothing in the model depends on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageBreakHint {
    /// First paragraph on the page
    pub paragraph: NodeId,
    pub page: u32,
}

/// Section-level settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionProperties {
    pub header: Option<String>,
    pub footer: Option<String>,
    pub page_number_start: Option<u32>,
    #[serde(default)]
    pub page_hints: Vec<PageBreakHint>,
}

/// An embedded picture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageObject {
    /// MIME type, e.g. `image/png`
    pub content_type: String,
    pub data: Vec<u8>,
    /// Width in points
    pub width: f32,
    /// Height in points
    pub height: f32,
    pub alt_text: Option<String>,
}

impl ImageObject {
    /// File extension for the content type
    pub fn extension(&self) -> &'static str {
        match self.content_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpeg",
            "image/gif" => "gif",
            "image/bmp" => "bmp",
            _ => "png",
        }
    }

    pub fn content_type_for_extension(ext: &str) -> &'static str {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "bmp" => "image/bmp",
            _ => "image/png",
        }
    }
}

/// Field instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Page,
    NumPages,
    Date,
    /// Cross-reference to a bookmark by name
    Ref(String),
    Other(String),
}

impl FieldKind {
    /// Instruction text as written in field codes
    pub fn instruction(&self) -> String {
        match self {
            FieldKind::Page => "PAGE".into(),
            FieldKind::NumPages => "NUMPAGES".into(),
            FieldKind::Date => "DATE".into(),
            FieldKind::Ref(name) => format!("REF {name}"),
            FieldKind::Other(instr) => instr.clone(),
        }
    }

    /// Parse an instruction string. Switches after the first word are kept
    /// only for `Other`.
    pub fn parse(instruction: &str) -> FieldKind {
        let trimmed = instruction.trim();
        let mut words = trimmed.split_whitespace();
        match words.next().map(|w| w.to_ascii_uppercase()).as_deref() {
            Some("PAGE") => FieldKind::Page,
            Some("NUMPAGES") => FieldKind::NumPages,
            Some("DATE") => FieldKind::Date,
            Some("REF") => match words.next() {
                Some(name) => FieldKind::Ref(name.to_string()),
                None => FieldKind::Other(trimmed.to_string()),
            },
            _ => FieldKind::Other(trimmed.to_string()),
        }
    }
}

/// A field with its last computed result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub kind: FieldKind,
    pub result: String,
}

/// Variant payload of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeData {
    Document,
    Section(SectionProperties),
    Paragraph,
    Table,
    TableRow,
    TableCell,
    Run { text: String },
    InlineObject(ImageObject),
    Bookmark { name: String },
    FieldReference(Field),
}

impl NodeData {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::Document => NodeKind::Document,
            NodeData::Section(_) => NodeKind::Section,
            NodeData::Paragraph => NodeKind::Paragraph,
            NodeData::Table => NodeKind::Table,
            NodeData::TableRow => NodeKind::TableRow,
            NodeData::TableCell => NodeKind::TableCell,
            NodeData::Run { .. } => NodeKind::Run,
            NodeData::InlineObject(_) => NodeKind::InlineObject,
            NodeData::Bookmark { .. } => NodeKind::Bookmark,
            NodeData::FieldReference(_) => NodeKind::FieldReference,
        }
    }
}

/// One node of the content tree.
///
/// `parent` and `children` are maintained by `DocumentTree`; a node built with
/// the constructors below starts detached with no children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    id: NodeId,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    #[serde(default)]
    direct_formatting: Formatting,
    #[serde(default)]
    style_ref: Option<StyleId>,
    data: NodeData,
}

impl Node {
    pub fn new(data: NodeData) -> Self {
        Self {
            id: NodeId::new(),
            parent: None,
            children: Vec::new(),
            direct_formatting: Formatting::new(),
            style_ref: None,
            data,
        }
    }

    pub fn section() -> Self {
        Self::new(NodeData::Section(SectionProperties::default()))
    }

    pub fn paragraph() -> Self {
        Self::new(NodeData::Paragraph)
    }

    pub fn run(text: impl Into<String>) -> Self {
        Self::new(NodeData::Run { text: text.into() })
    }

    pub fn table() -> Self {
        Self::new(NodeData::Table)
    }

    pub fn table_row() -> Self {
        Self::new(NodeData::TableRow)
    }

    pub fn table_cell() -> Self {
        Self::new(NodeData::TableCell)
    }

    pub fn image(image: ImageObject) -> Self {
        Self::new(NodeData::InlineObject(image))
    }

    pub fn bookmark(name: impl Into<String>) -> Self {
        Self::new(NodeData::Bookmark { name: name.into() })
    }

    pub fn field(kind: FieldKind, result: impl Into<String>) -> Self {
        Self::new(NodeData::FieldReference(Field {
            kind,
            result: result.into(),
        }))
    }

    pub fn with_style(mut self, style: impl Into<StyleId>) -> Self {
        self.style_ref = Some(style.into());
        self
    }

    pub fn with_formatting(mut self, formatting: Formatting) -> Self {
        self.direct_formatting = formatting;
        self
    }

    /// Copy of this node's payload and formatting under a fresh id
    pub fn fresh_copy(&self) -> Self {
        Self {
            id: NodeId::new(),
            parent: None,
            children: Vec::new(),
            direct_formatting: self.direct_formatting.clone(),
            style_ref: self.style_ref.clone(),
            data: self.data.clone(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn direct_formatting(&self) -> &Formatting {
        &self.direct_formatting
    }

    pub fn style_ref(&self) -> Option<&StyleId> {
        self.style_ref.as_ref()
    }

    pub fn data(&self) -> &NodeData {
        &self.data
    }

    /// Run text, if this is a run
    pub fn text(&self) -> Option<&str> {
        match &self.data {
            NodeData::Run { text } => Some(text),
            _ => None,
        }
    }

    /// Length in grapheme clusters. Non-run nodes have length zero.
    pub fn text_len(&self) -> usize {
        self.text().map(|t| t.graphemes(true).count()).unwrap_or(0)
    }

    /// Text this node contributes to plain-text extraction
    pub fn display_text(&self) -> Option<&str> {
        match &self.data {
            NodeData::Run { text } => Some(text),
            NodeData::FieldReference(field) => Some(&field.result),
            _ => None,
        }
    }

    pub(crate) fn set_parent(&mut self, parent: Option<NodeId>) {
        self.parent = parent;
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<NodeId> {
        &mut self.children
    }

    pub(crate) fn direct_formatting_mut(&mut self) -> &mut Formatting {
        &mut self.direct_formatting
    }

    pub(crate) fn set_style_ref(&mut self, style: Option<StyleId>) -> Option<StyleId> {
        std::mem::replace(&mut self.style_ref, style)
    }

    pub(crate) fn data_mut(&mut self) -> &mut NodeData {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_containment_rules() {
        assert!(NodeKind::Document.can_contain(NodeKind::Section));
        assert!(NodeKind::Section.can_contain(NodeKind::Table));
        assert!(NodeKind::TableCell.can_contain(NodeKind::Table));
        assert!(!NodeKind::Section.can_contain(NodeKind::Run));
        assert!(!NodeKind::Document.can_contain(NodeKind::Paragraph));
        assert!(!NodeKind::Run.can_contain(NodeKind::Run));
        assert!(!NodeKind::Paragraph.can_contain(NodeKind::Section));
    }

    #[test]
    fn test_field_instruction_parse() {
        assert_eq!(FieldKind::parse(" page "), FieldKind::Page);
        assert_eq!(
            FieldKind::parse("REF intro \\h"),
            FieldKind::Ref("intro".into())
        );
        assert_eq!(
            FieldKind::parse("TOC \\o"),
            FieldKind::Other("TOC \\o".into())
        );
        assert_eq!(FieldKind::Ref("x".into()).instruction(), "REF x");
    }

    #[test]
    fn test_text_len_counts_graphemes() {
        let run = Node::run("e\u{301}te\u{301}");
        assert_eq!(run.text_len(), 3);
        assert_eq!(Node::paragraph().text_len(), 0);
    }

    #[test]
    fn test_fresh_copy_has_new_id() {
        let run = Node::run("abc").with_style("Strong");
        let copy = run.fresh_copy();
        assert_ne!(run.id(), copy.id());
        assert_eq!(copy.style_ref(), Some(&StyleId::new("Strong")));
        assert_eq!(copy.text(), Some("abc"));
    }
}
