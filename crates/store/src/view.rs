//! What an exporter sees of a document in one view
//!
//! [`ExportView`] filters the tree by the overlay for the requested view,
//! answers which change marks a node carries in markup, and places comment
//! anchors at run offsets and paragraph edges so writers can emit range
//! markers in document order.

use crate::{CodecResult, DocumentSnapshot, FeatureCategory, FidelityReport, WarningSeverity};
use doc_model::{
    DocumentTree, EffectiveFormatting, Formatting, Node, NodeId, NodeKind, StyleId, Theme,
};
use revisions::{ChangeKind, Comment, CommentAnchor, Overlay, TrackedChange, ViewMode, Visibility};
use std::borrow::Cow;
use std::collections::HashMap;

/// Kind of change mark carried by a node in markup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Inserted,
    Deleted,
}

/// A change mark with the change it comes from
#[derive(Debug, Clone, Copy)]
pub struct ChangeMark<'a> {
    pub mark: Mark,
    /// Position of the change in the overlay; writers use it as the id
    pub index: usize,
    pub change: &'a TrackedChange,
}

/// Piece of a run's text with comment edges between pieces
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPiece {
    Text(String),
    CommentStart(usize),
    CommentEnd(usize),
}

/// Which overlay features a format can carry
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlaySupport {
    pub changes: bool,
    pub format_changes: bool,
    pub comments: bool,
    pub replies: bool,
}

#[derive(Debug, Clone, Copy)]
enum Edge {
    Start(usize),
    End(usize),
}

pub struct ExportView<'a> {
    tree: Cow<'a, DocumentTree>,
    overlay: &'a Overlay,
    mode: ViewMode,
    inserted: HashMap<NodeId, usize>,
    deleted: HashMap<NodeId, usize>,
    comments: Vec<&'a Comment>,
    hidden_comments: usize,
    run_edges: HashMap<NodeId, Vec<(usize, Edge)>>,
    paragraph_starts: HashMap<NodeId, Vec<usize>>,
    paragraph_ends: HashMap<NodeId, Vec<usize>>,
}

impl<'a> ExportView<'a> {
    pub fn new(document: &'a DocumentSnapshot, mode: ViewMode) -> Self {
        let overlay = &document.overlay;
        let mut inserted = HashMap::new();
        let mut deleted = HashMap::new();
        for (index, change) in overlay.changes().iter().enumerate() {
            match &change.kind {
                ChangeKind::Insertion { nodes } => {
                    inserted.extend(nodes.iter().map(|n| (*n, index)));
                }
                ChangeKind::Deletion { nodes } => {
                    deleted.extend(nodes.iter().map(|n| (*n, index)));
                }
                _ => {}
            }
        }

        let mut tree = Cow::Borrowed(&document.tree);
        if mode == ViewMode::Original {
            // Put formatting back the way it was before tracked edits.
            for change in overlay.changes().iter().rev() {
                if let ChangeKind::FormatChange { node, property, old, .. } = &change.kind {
                    if document.tree.contains(*node) {
                        if let Err(e) =
                            tree.to_mut().set_direct_formatting(*node, *property, old.clone())
                        {
                            tracing::debug!(node = %node.short(), "Cannot revert format change: {e}");
                        }
                    }
                }
            }
        }

        let mut view = Self {
            tree,
            overlay,
            mode,
            inserted,
            deleted,
            comments: Vec::new(),
            hidden_comments: 0,
            run_edges: HashMap::new(),
            paragraph_starts: HashMap::new(),
            paragraph_ends: HashMap::new(),
        };
        view.place_comments();
        view
    }

    fn place_comments(&mut self) {
        let overlay: &'a Overlay = self.overlay;
        for comment in overlay.comments() {
            let index = self.comments.len();
            let placed = match comment.anchor {
                CommentAnchor::Text { start, end } => {
                    let visible = [start.node, end.node]
                        .iter()
                        .all(|n| self.tree.is_attached(*n) && self.is_visible(*n));
                    if visible {
                        self.run_edges
                            .entry(start.node)
                            .or_default()
                            .push((start.offset, Edge::Start(index)));
                        self.run_edges
                            .entry(end.node)
                            .or_default()
                            .push((end.offset, Edge::End(index)));
                    }
                    visible
                }
                CommentAnchor::Node(node) => match self.anchor_paragraphs(node) {
                    Some((first, last)) => {
                        self.paragraph_starts.entry(first).or_default().push(index);
                        self.paragraph_ends.entry(last).or_default().push(index);
                        true
                    }
                    None => false,
                },
            };
            if placed {
                self.comments.push(comment);
            } else {
                self.hidden_comments += 1;
            }
        }
    }

    /// First and last visible paragraph covered by a node anchor
    fn anchor_paragraphs(&self, node: NodeId) -> Option<(NodeId, NodeId)> {
        if !self.tree.is_attached(node) || !self.is_visible(node) {
            return None;
        }
        let kind = self.tree.kind(node).ok()?;
        if kind.is_inline() {
            let para = self.tree.enclosing(node, NodeKind::Paragraph)?;
            return Some((para, para));
        }
        let paragraphs: Vec<NodeId> = self
            .tree
            .descendants(node)
            .into_iter()
            .filter(|d| self.tree.kind(*d).ok() == Some(NodeKind::Paragraph) && self.is_visible(*d))
            .collect();
        Some((*paragraphs.first()?, *paragraphs.last()?))
    }

    // =========================================================================
    // Content
    // =========================================================================

    /// The tree as this view formats it
    pub fn tree(&self) -> &DocumentTree {
        &self.tree
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.tree.get(id)
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.tree.get(id).map(|n| n.kind())
    }

    fn marked(&self, node: NodeId, set: &HashMap<NodeId, usize>) -> bool {
        set.contains_key(&node) || self.tree.ancestors(node).iter().any(|a| set.contains_key(a))
    }

    pub fn visibility(&self, node: NodeId) -> Visibility {
        let deleted = self.marked(node, &self.deleted);
        let inserted = self.marked(node, &self.inserted);
        match self.mode {
            ViewMode::Final if deleted => Visibility::Hidden,
            ViewMode::Original if inserted => Visibility::Hidden,
            ViewMode::Markup if deleted => Visibility::Deleted,
            ViewMode::Markup if inserted => Visibility::Inserted,
            _ => Visibility::Visible,
        }
    }

    pub fn is_visible(&self, node: NodeId) -> bool {
        self.visibility(node).is_shown()
    }

    /// Children shown in this view
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.tree
            .children(id)
            .iter()
            .copied()
            .filter(|c| self.is_visible(*c))
            .collect()
    }

    /// Sections shown in this view
    pub fn sections(&self) -> Vec<NodeId> {
        self.children(self.tree.root_id())
    }

    /// Visible paragraphs below `id` in reading order
    pub fn paragraphs(&self, id: NodeId) -> Vec<NodeId> {
        self.tree
            .descendants(id)
            .into_iter()
            .filter(|d| self.kind(*d) == Some(NodeKind::Paragraph) && self.is_visible(*d))
            .collect()
    }

    /// Displayed text of a subtree in this view
    pub fn text_of(&self, id: NodeId) -> String {
        self.tree
            .descendants(id)
            .into_iter()
            .filter(|d| self.is_visible(*d))
            .filter_map(|d| self.tree.get(d).and_then(|n| n.display_text()))
            .collect()
    }

    pub fn resolve(&self, id: NodeId) -> CodecResult<EffectiveFormatting> {
        Ok(doc_model::resolve(&self.tree, id)?)
    }

    /// List and level of a paragraph; `None` outside lists and on failure
    pub fn list_membership(&self, paragraph: NodeId) -> Option<(StyleId, u8)> {
        doc_model::list_membership(&self.tree, paragraph).ok().flatten()
    }

    /// Marker text of the list paragraphs this view shows, numbered as
    /// shown
    pub fn list_labels(&self) -> HashMap<NodeId, String> {
        let shown = self.paragraphs(self.tree.root_id());
        doc_model::number_lists(&self.tree, shown).unwrap_or_default()
    }

    // =========================================================================
    // Change marks
    // =========================================================================

    /// Nearest insertion or deletion mark on `id` or its ancestors. Only
    /// the markup view has marks.
    pub fn mark(&self, id: NodeId) -> Option<ChangeMark<'a>> {
        if self.mode != ViewMode::Markup {
            return None;
        }
        std::iter::once(id)
            .chain(self.tree.ancestors(id))
            .find_map(|n| self.mark_on(n))
    }

    /// Mark recorded on exactly this node
    pub fn mark_on(&self, id: NodeId) -> Option<ChangeMark<'a>> {
        if self.mode != ViewMode::Markup {
            return None;
        }
        let overlay: &'a Overlay = self.overlay;
        let changes = overlay.changes();
        let (mark, index) = if let Some(i) = self.deleted.get(&id) {
            (Mark::Deleted, *i)
        } else {
            (Mark::Inserted, *self.inserted.get(&id)?)
        };
        Some(ChangeMark {
            mark,
            index,
            change: &changes[index],
        })
    }

    /// Pending format changes on a node (markup only)
    pub fn format_changes(&self, id: NodeId) -> Vec<(usize, &'a TrackedChange)> {
        if self.mode != ViewMode::Markup {
            return Vec::new();
        }
        self.overlay
            .changes()
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c.kind, ChangeKind::FormatChange { node, .. } if node == id))
            .collect()
    }

    pub fn change(&self, index: usize) -> Option<&'a TrackedChange> {
        self.overlay.changes().get(index)
    }

    // =========================================================================
    // Comments
    // =========================================================================

    /// Comments placed in this view, indexed as the writers number them
    pub fn comments(&self) -> &[&'a Comment] {
        &self.comments
    }

    /// Comment indices whose node anchor starts at this paragraph
    pub fn paragraph_comment_starts(&self, paragraph: NodeId) -> &[usize] {
        self.paragraph_starts.get(&paragraph).map_or(&[], Vec::as_slice)
    }

    /// Comment indices whose node anchor ends at this paragraph
    pub fn paragraph_comment_ends(&self, paragraph: NodeId) -> &[usize] {
        self.paragraph_ends.get(&paragraph).map_or(&[], Vec::as_slice)
    }

    /// Text of a run cut at comment anchor offsets
    pub fn run_pieces(&self, run: NodeId) -> Vec<RunPiece> {
        let text = self.tree.get(run).and_then(|n| n.display_text()).unwrap_or("");
        let Some(edges) = self.run_edges.get(&run) else {
            return if text.is_empty() {
                Vec::new()
            } else {
                vec![RunPiece::Text(text.to_string())]
            };
        };
        let len = doc_model::text::grapheme_len(text);
        let mut edges = edges.clone();
        edges.sort_by_key(|(offset, edge)| (*offset, matches!(edge, Edge::End(_))));

        let mut pieces = Vec::new();
        let mut cursor = 0;
        for (offset, edge) in edges {
            let offset = offset.min(len);
            if offset > cursor {
                if let Some(slice) = doc_model::text::slice_graphemes(text, cursor, offset) {
                    pieces.push(RunPiece::Text(slice.to_string()));
                }
                cursor = offset;
            }
            pieces.push(match edge {
                Edge::Start(i) => RunPiece::CommentStart(i),
                Edge::End(i) => RunPiece::CommentEnd(i),
            });
        }
        if cursor < len {
            if let Some(slice) = doc_model::text::slice_graphemes(text, cursor, len) {
                pieces.push(RunPiece::Text(slice.to_string()));
            }
        }
        pieces
    }

    // =========================================================================
    // Loss reporting
    // =========================================================================

    /// Report overlay content the target format cannot carry
    pub fn report_overlay_loss(&self, report: &mut FidelityReport, support: OverlaySupport) {
        let changes = self.overlay.changes();
        let moves = changes
            .iter()
            .filter(|c| matches!(c.kind, ChangeKind::Move { .. }))
            .count();
        let format_changes = changes
            .iter()
            .filter(|c| matches!(c.kind, ChangeKind::FormatChange { .. }))
            .count();
        let marks = changes.len() - moves - format_changes;

        if moves > 0 && self.mode != ViewMode::Final {
            report.warn(
                "overlay.moves.flattened",
                FeatureCategory::TrackChanges,
                WarningSeverity::Moderate,
                format!("{moves} tracked move(s) written at the new position"),
            );
        }
        if self.mode == ViewMode::Markup {
            if marks > 0 && !support.changes {
                report.warn(
                    "overlay.changes.flattened",
                    FeatureCategory::TrackChanges,
                    WarningSeverity::Moderate,
                    format!("{marks} tracked insertion(s)/deletion(s) written as plain content"),
                );
            }
            if format_changes > 0 && !support.format_changes {
                report.warn(
                    "overlay.format_changes.dropped",
                    FeatureCategory::FormatChanges,
                    WarningSeverity::Moderate,
                    format!("{format_changes} tracked format change(s) dropped"),
                );
            }
        }

        let comments = self.overlay.comments();
        if comments.is_empty() {
            return;
        }
        if !support.comments {
            report.warn(
                "overlay.comments.dropped",
                FeatureCategory::Comments,
                WarningSeverity::Major,
                format!("{} comment(s) dropped", comments.len()),
            );
            return;
        }
        if self.hidden_comments > 0 {
            report.warn(
                "overlay.comments.hidden",
                FeatureCategory::Comments,
                WarningSeverity::Major,
                format!(
                    "{} comment(s) anchored to content hidden in the {} view dropped",
                    self.hidden_comments,
                    self.mode.display_name()
                ),
            );
        }
        if !support.replies && self.comments.iter().any(|c| !c.replies.is_empty()) {
            report.warn(
                "overlay.replies.flattened",
                FeatureCategory::Comments,
                WarningSeverity::Moderate,
                "Comment replies merged into the comment body",
            );
        }
        if self.comments.iter().any(|c| !c.tags.is_empty()) {
            report.warn(
                "overlay.comment_tags.dropped",
                FeatureCategory::Comments,
                WarningSeverity::Minor,
                "Comment tags dropped",
            );
        }
    }
}

/// Formatting with theme references replaced by their values. The flag
/// tells whether anything was replaced.
pub fn resolve_theme(theme: &Theme, formatting: &Formatting) -> (Formatting, bool) {
    let mut out = Formatting::new();
    let mut replaced = false;
    for (property, value) in formatting.iter() {
        let concrete = theme.substitute(value);
        replaced |= concrete != *value;
        out.set(property, Some(concrete));
    }
    (out, replaced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{Node, Property, PropertyValue, TextRange, ThemeColorSlot, ThemeFont};
    use revisions::{Comment, OverlayOp};

    fn sample() -> (DocumentSnapshot, NodeId, NodeId) {
        let mut tree = DocumentTree::blank();
        let para = tree.nodes_of_kind(NodeKind::Paragraph)[0];
        let keep = tree.append(para, Node::run("Hello ")).unwrap();
        let gone = tree.append(para, Node::run("world")).unwrap();
        let mut overlay = Overlay::new();
        OverlayOp::AddChange(TrackedChange::deletion("alice", vec![gone]))
            .apply(&mut overlay)
            .unwrap();
        (DocumentSnapshot::new(tree, overlay), keep, gone)
    }

    #[test]
    fn test_views_filter_deletions() {
        let (doc, keep, gone) = sample();
        let para = doc.tree.parent(keep).unwrap();

        let final_view = ExportView::new(&doc, ViewMode::Final);
        assert_eq!(final_view.children(para), vec![keep]);
        assert!(final_view.mark(gone).is_none());

        let markup = ExportView::new(&doc, ViewMode::Markup);
        assert_eq!(markup.children(para), vec![keep, gone]);
        assert_eq!(markup.mark(gone).map(|m| m.mark), Some(Mark::Deleted));
        assert!(markup.mark(keep).is_none());

        let original = ExportView::new(&doc, ViewMode::Original);
        assert_eq!(original.children(para), vec![keep, gone]);
        assert!(original.mark(gone).is_none());
    }

    #[test]
    fn test_original_view_reverts_format_changes() {
        let (mut doc, keep, _) = sample();
        doc.tree
            .set_direct_formatting(keep, Property::Bold, Some(PropertyValue::Bool(true)))
            .unwrap();
        OverlayOp::AddChange(TrackedChange::format_change(
            "bob",
            keep,
            Property::Bold,
            None,
            Some(PropertyValue::Bool(true)),
        ))
        .apply(&mut doc.overlay)
        .unwrap();

        let original = ExportView::new(&doc, ViewMode::Original);
        assert!(!original.resolve(keep).unwrap().bold());
        let markup = ExportView::new(&doc, ViewMode::Markup);
        assert!(markup.resolve(keep).unwrap().bold());
        assert_eq!(markup.format_changes(keep).len(), 1);
    }

    #[test]
    fn test_run_pieces_cut_at_anchor() {
        let (mut doc, keep, _) = sample();
        let comment = Comment::new(
            CommentAnchor::range(TextRange::within(keep, 1, 3)),
            "carol",
            "look",
        );
        OverlayOp::AddComment(comment).apply(&mut doc.overlay).unwrap();
        let view = ExportView::new(&doc, ViewMode::Final);
        assert_eq!(
            view.run_pieces(keep),
            vec![
                RunPiece::Text("H".into()),
                RunPiece::CommentStart(0),
                RunPiece::Text("el".into()),
                RunPiece::CommentEnd(0),
                RunPiece::Text("lo ".into()),
            ]
        );
    }

    #[test]
    fn test_comment_on_hidden_text_is_reported() {
        let (mut doc, _, gone) = sample();
        let comment = Comment::new(
            CommentAnchor::range(TextRange::within(gone, 0, 5)),
            "carol",
            "typo",
        );
        OverlayOp::AddComment(comment).apply(&mut doc.overlay).unwrap();
        let view = ExportView::new(&doc, ViewMode::Final);
        assert!(view.comments().is_empty());

        let mut report = FidelityReport::export(crate::Format::Docx);
        view.report_overlay_loss(
            &mut report,
            OverlaySupport {
                changes: true,
                format_changes: true,
                comments: true,
                replies: true,
            },
        );
        assert!(report.has_code("overlay.comments.hidden"));
    }

    #[test]
    fn test_theme_values_are_resolved() {
        let theme = Theme::sepia();
        let f = Formatting::new()
            .with(Property::FontFamily, PropertyValue::ThemeFont(ThemeFont::Heading))
            .with(Property::Color, PropertyValue::ThemeColor(ThemeColorSlot::Accent))
            .with(Property::Bold, true);
        let (resolved, replaced) = resolve_theme(&theme, &f);
        assert!(replaced);
        assert_eq!(
            resolved.get(Property::FontFamily),
            Some(&PropertyValue::Text(theme.heading_font.clone()))
        );
        assert_eq!(resolved.get(Property::Color), Some(&PropertyValue::Color(theme.palette.accent)));
        assert!(!resolve_theme(&theme, &Formatting::new().with(Property::Bold, true)).1);
    }
}
