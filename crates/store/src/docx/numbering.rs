//! `word/numbering.xml`: list definitions
//!
//! Every list style is written as one `w:abstractNum` linked back to the
//! style through `w:styleLink`, plus one `w:num` instance numbered from 1 in
//! style id order. Paragraphs join a list with `w:numPr`.
//!
//! Foreign files often carry instances with no style link; each of those is
//! read as a list style of its own named `List<numId>`.

use super::namespaces;
use crate::xml::{XmlElement, XmlWriter};
use doc_model::{DocumentTree, ListKind, Style, StyleId, StyleType, MAX_LIST_LEVEL};
use std::collections::HashMap;

/// Indent step per level, in twips
const LEVEL_INDENT: u32 = 720;
const HANGING: u32 = 360;

/// Two-way map between list styles and `w:numId` values
#[derive(Debug, Clone, Default)]
pub struct Numbering {
    ids: HashMap<StyleId, u32>,
    lists: HashMap<u32, StyleId>,
    kinds: HashMap<StyleId, ListKind>,
}

impl Numbering {
    /// Number the list styles of `tree`
    pub fn for_tree(tree: &DocumentTree) -> Self {
        let mut numbering = Numbering::default();
        let lists = tree.styles().iter().filter(|s| s.style_type == StyleType::List);
        for (num_id, style) in (1..).zip(lists) {
            numbering.insert(num_id, style.id.clone(), style.list_kind());
        }
        numbering
    }

    fn insert(&mut self, num_id: u32, list: StyleId, kind: ListKind) {
        self.ids.entry(list.clone()).or_insert(num_id);
        self.kinds.entry(list.clone()).or_insert(kind);
        self.lists.insert(num_id, list);
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    pub fn num_id(&self, list: &StyleId) -> Option<u32> {
        self.ids.get(list).copied()
    }

    pub fn list(&self, num_id: u32) -> Option<&StyleId> {
        self.lists.get(&num_id)
    }

    pub fn kind(&self, list: &StyleId) -> Option<ListKind> {
        self.kinds.get(list).copied()
    }

    /// One list style per distinct list, for registering before the body is
    /// read
    pub fn styles(&self) -> Vec<Style> {
        let mut styles: Vec<Style> = self
            .kinds
            .iter()
            .map(|(id, kind)| Style::list_of(id.clone(), id.as_str(), *kind))
            .collect();
        styles.sort_by(|a, b| a.id.cmp(&b.id));
        styles
    }
}

fn num_format(kind: ListKind) -> &'static str {
    match kind {
        ListKind::Bullet => "bullet",
        ListKind::Decimal => "decimal",
        ListKind::LowerAlpha => "lowerLetter",
        ListKind::UpperAlpha => "upperLetter",
        ListKind::LowerRoman => "lowerRoman",
        ListKind::UpperRoman => "upperRoman",
    }
}

fn list_kind(num_format: &str) -> ListKind {
    match num_format {
        "decimal" | "decimalZero" => ListKind::Decimal,
        "lowerLetter" => ListKind::LowerAlpha,
        "upperLetter" => ListKind::UpperAlpha,
        "lowerRoman" => ListKind::LowerRoman,
        "upperRoman" => ListKind::UpperRoman,
        _ => ListKind::Bullet,
    }
}

/// Write the numbering part, `None` when the document has no lists
pub fn write_numbering(tree: &DocumentTree, numbering: &Numbering, pretty: bool) -> Option<String> {
    if numbering.is_empty() {
        return None;
    }
    let mut lists: Vec<(u32, &StyleId)> = numbering.lists.iter().map(|(n, id)| (*n, id)).collect();
    lists.sort();

    let mut w = XmlWriter::new(pretty);
    w.open("w:numbering", &[("xmlns:w", namespaces::W)]);
    for (num_id, list) in &lists {
        let kind = tree
            .styles()
            .get(list)
            .map(Style::list_kind)
            .unwrap_or_default();
        let abstract_id = (num_id - 1).to_string();
        w.open("w:abstractNum", &[("w:abstractNumId", abstract_id.as_str())]);
        w.empty("w:multiLevelType", &[("w:val", "hybridMultilevel")]);
        w.empty("w:styleLink", &[("w:val", list.as_str())]);
        for level in 0..=MAX_LIST_LEVEL {
            let ilvl = level.to_string();
            let text = match kind {
                ListKind::Bullet => ListKind::bullet(level).to_string(),
                _ => format!("%{}.", level + 1),
            };
            let left = (LEVEL_INDENT * (u32::from(level) + 1)).to_string();
            let hanging = HANGING.to_string();
            w.open("w:lvl", &[("w:ilvl", ilvl.as_str())]);
            w.empty("w:start", &[("w:val", "1")]);
            w.empty("w:numFmt", &[("w:val", num_format(kind))]);
            w.empty("w:lvlText", &[("w:val", text.as_str())]);
            w.empty("w:lvlJc", &[("w:val", "left")]);
            w.open("w:pPr", &[]);
            w.empty("w:ind", &[("w:left", left.as_str()), ("w:hanging", hanging.as_str())]);
            w.close();
            w.close();
        }
        w.close();
    }
    for (num_id, _) in &lists {
        let num = num_id.to_string();
        let abstract_id = (num_id - 1).to_string();
        w.open("w:num", &[("w:numId", num.as_str())]);
        w.empty("w:abstractNumId", &[("w:val", abstract_id.as_str())]);
        w.close();
    }
    w.close();
    Some(w.finish())
}

/// Map every `w:num` of a numbering part to a list style
pub fn read_numbering(root: &XmlElement) -> Numbering {
    struct Abstract<'x> {
        link: Option<&'x str>,
        style_link: Option<&'x str>,
        kind: Option<ListKind>,
    }

    let mut abstracts: HashMap<&str, Abstract<'_>> = HashMap::new();
    for el in root.children_named("abstractNum") {
        let Some(id) = el.attr("abstractNumId") else {
            continue;
        };
        let kind = el
            .children_named("lvl")
            .find(|l| l.attr("ilvl").unwrap_or("0") == "0")
            .and_then(|l| l.child_val("numFmt"))
            .map(list_kind);
        abstracts.insert(
            id,
            Abstract {
                link: el.child_val("numStyleLink"),
                style_link: el.child_val("styleLink"),
                kind,
            },
        );
    }
    // Kinds of linked list styles, for instances that only name the style
    let linked_kinds: HashMap<&str, ListKind> = abstracts
        .values()
        .filter_map(|a| Some((a.style_link?, a.kind?)))
        .collect();

    let mut numbering = Numbering::default();
    for num in root.children_named("num") {
        let Some(num_id) = num.attr("numId").and_then(|v| v.parse::<u32>().ok()) else {
            continue;
        };
        if num_id == 0 {
            continue;
        }
        let definition = num.child_val("abstractNumId").and_then(|a| abstracts.get(a));
        let link = definition.and_then(|d| d.style_link.or(d.link));
        let kind = definition
            .and_then(|d| d.kind.or_else(|| d.link.and_then(|l| linked_kinds.get(l).copied())))
            .unwrap_or_default();
        let list = match link {
            Some(name) => StyleId::from(name),
            None => StyleId::new(format!("List{num_id}")),
        };
        numbering.insert(num_id, list, kind);
    }
    tracing::debug!(lists = numbering.kinds.len(), "Read DOCX numbering");
    numbering
}
