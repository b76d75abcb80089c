//! Bulleted and numbered lists
//!
//! A list is a [`StyleType::List`] style that names its marker
//! [`ListKind`]. Paragraphs join a list through the paragraph-scope
//! `ListStyle` and `ListLevel` properties, so list membership cascades
//! from paragraph styles like any other formatting.
//!
//! Numbering is derived, never stored: [`list_labels`] walks the document
//! in reading order and counts items per list and level.

use crate::{resolve, DocumentTree, NodeId, NodeKind, Result, StyleId, StyleType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Deepest nesting level, zero-based
pub const MAX_LIST_LEVEL: u8 = 8;

const BULLETS: [char; 3] = ['\u{2022}', '\u{25E6}', '\u{25AA}'];

/// Marker drawn in front of each item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    #[default]
    Bullet,
    Decimal,
    LowerAlpha,
    UpperAlpha,
    LowerRoman,
    UpperRoman,
}

impl ListKind {
    pub fn name(self) -> &'static str {
        match self {
            ListKind::Bullet => "bullet",
            ListKind::Decimal => "decimal",
            ListKind::LowerAlpha => "lower_alpha",
            ListKind::UpperAlpha => "upper_alpha",
            ListKind::LowerRoman => "lower_roman",
            ListKind::UpperRoman => "upper_roman",
        }
    }

    pub fn is_ordered(self) -> bool {
        self != ListKind::Bullet
    }

    /// Bullet character used at `level`
    pub fn bullet(level: u8) -> char {
        BULLETS[usize::from(level) % BULLETS.len()]
    }

    /// Marker of the `n`th item (counting from 1) at `level`.
    pub fn label(self, n: usize, level: u8) -> String {
        match self {
            ListKind::Bullet => ListKind::bullet(level).to_string(),
            ListKind::Decimal => format!("{n}."),
            ListKind::LowerAlpha => format!("{}.", alphabetic(n)),
            ListKind::UpperAlpha => format!("{}.", alphabetic(n).to_uppercase()),
            ListKind::LowerRoman => format!("{}.", roman(n)),
            ListKind::UpperRoman => format!("{}.", roman(n).to_uppercase()),
        }
    }
}

impl std::fmt::Display for ListKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// a, b, ..., z, aa, ab, ...
fn alphabetic(mut n: usize) -> String {
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(char::from(b'a' + (n % 26) as u8));
        n /= 26;
    }
    letters.iter().rev().collect()
}

fn roman(mut n: usize) -> String {
    const NUMERALS: [(usize, &str); 13] = [
        (1000, "m"),
        (900, "cm"),
        (500, "d"),
        (400, "cd"),
        (100, "c"),
        (90, "xc"),
        (50, "l"),
        (40, "xl"),
        (10, "x"),
        (9, "ix"),
        (5, "v"),
        (4, "iv"),
        (1, "i"),
    ];
    let mut out = String::new();
    for (value, numeral) in NUMERALS {
        while n >= value {
            out.push_str(numeral);
            n -= value;
        }
    }
    out
}

/// The list a paragraph belongs to, with its level.
///
/// A reference that resolves to a missing style, or to a style that is not
/// a list style, counts as no list.
pub fn list_membership(tree: &DocumentTree, paragraph: NodeId) -> Result<Option<(StyleId, u8)>> {
    let effective = resolve(tree, paragraph)?;
    let Some((id, level)) = effective.list() else {
        return Ok(None);
    };
    match tree.styles().get(id) {
        Some(style) if style.style_type == StyleType::List => {
            Ok(Some((id.clone(), level.min(MAX_LIST_LEVEL))))
        }
        _ => Ok(None),
    }
}

/// Marker text of every list paragraph, numbered in reading order.
pub fn list_labels(tree: &DocumentTree) -> Result<HashMap<NodeId, String>> {
    number_lists(tree, tree.nodes_of_kind(NodeKind::Paragraph))
}

/// Marker text of the list paragraphs among `paragraphs`, which must be in
/// reading order. Paragraphs left out do not count.
///
/// Each list keeps one counter per level. An item resets the counters of
/// all deeper levels of its list, so a nested run restarts at 1.
pub fn number_lists(
    tree: &DocumentTree,
    paragraphs: impl IntoIterator<Item = NodeId>,
) -> Result<HashMap<NodeId, String>> {
    let mut counters: HashMap<StyleId, [usize; MAX_LIST_LEVEL as usize + 1]> = HashMap::new();
    let mut labels = HashMap::new();
    for paragraph in paragraphs {
        let Some((list, level)) = list_membership(tree, paragraph)? else {
            continue;
        };
        let kind = tree
            .styles()
            .get(&list)
            .map(|s| s.list_kind())
            .unwrap_or_default();
        let slots = counters.entry(list).or_default();
        let level_index = usize::from(level);
        slots[level_index] += 1;
        for deeper in &mut slots[level_index + 1..] {
            *deeper = 0;
        }
        labels.insert(paragraph, kind.label(slots[level_index], level));
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Formatting, Node, Property, PropertyValue, Style};

    fn list_paragraph(tree: &mut DocumentTree, list: &str, level: u8, text: &str) -> NodeId {
        let section = tree.nodes_of_kind(NodeKind::Section)[0];
        let para = tree
            .append(
                section,
                Node::paragraph().with_formatting(
                    Formatting::new()
                        .with(Property::ListStyle, PropertyValue::ListRef(Some(list.into())))
                        .with(Property::ListLevel, PropertyValue::Level(level)),
                ),
            )
            .unwrap();
        tree.append(para, Node::run(text)).unwrap();
        para
    }

    #[test]
    fn test_labels() {
        assert_eq!(ListKind::Decimal.label(3, 0), "3.");
        assert_eq!(ListKind::LowerAlpha.label(28, 0), "ab.");
        assert_eq!(ListKind::UpperAlpha.label(26, 0), "Z.");
        assert_eq!(ListKind::LowerRoman.label(14, 0), "xiv.");
        assert_eq!(ListKind::UpperRoman.label(1994, 0), "MCMXCIV.");
        assert_eq!(ListKind::Bullet.label(5, 1), "\u{25E6}");
    }

    #[test]
    fn test_numbering_restarts_below_a_new_item() {
        let mut tree = DocumentTree::blank();
        tree.put_style(Style::list_of("Steps", "Steps", ListKind::Decimal))
            .unwrap();
        let one = list_paragraph(&mut tree, "Steps", 0, "one");
        let one_a = list_paragraph(&mut tree, "Steps", 1, "one a");
        let two = list_paragraph(&mut tree, "Steps", 0, "two");
        let two_a = list_paragraph(&mut tree, "Steps", 1, "two a");

        let labels = list_labels(&tree).unwrap();
        assert_eq!(labels[&one], "1.");
        assert_eq!(labels[&one_a], "1.");
        assert_eq!(labels[&two], "2.");
        assert_eq!(labels[&two_a], "1.");
    }

    #[test]
    fn test_membership_cascades_from_paragraph_style() {
        let mut tree = DocumentTree::blank();
        tree.put_style(Style::list_of("Dots", "Dots", ListKind::Bullet))
            .unwrap();
        tree.put_style(
            Style::paragraph("ListParagraph", "List Paragraph")
                .with_based_on("Normal")
                .with_property(Property::ListStyle, PropertyValue::ListRef(Some("Dots".into()))),
        )
        .unwrap();
        let para = tree.nodes_of_kind(NodeKind::Paragraph)[0];
        tree.set_style_ref(para, Some("ListParagraph".into())).unwrap();
        assert_eq!(
            list_membership(&tree, para).unwrap(),
            Some((StyleId::new("Dots"), 0))
        );

        tree.set_direct_formatting(para, Property::ListStyle, Some(PropertyValue::ListRef(None)))
            .unwrap();
        assert_eq!(list_membership(&tree, para).unwrap(), None);
    }

    #[test]
    fn test_reference_to_a_non_list_style_is_ignored() {
        let mut tree = DocumentTree::blank();
        tree.put_style(
            Style::paragraph("Odd", "Odd")
                .with_property(Property::ListStyle, PropertyValue::ListRef(Some("Normal".into()))),
        )
        .unwrap();
        let para = tree.nodes_of_kind(NodeKind::Paragraph)[0];
        tree.set_style_ref(para, Some("Odd".into())).unwrap();
        assert_eq!(list_membership(&tree, para).unwrap(), None);
        assert!(list_labels(&tree).unwrap().is_empty());
    }
}
