//! Overlay state - tracked changes and comments over one content tree
//!
//! The overlay never owns tree content. It refers to nodes by id, so a node
//! it mentions may be a tombstone. All mutations go through [`OverlayOp`],
//! which the history engine records next to tree ops.

use crate::{
    ChangeId, ChangeKind, Comment, CommentAnchor, CommentId, OrphanedAnnotation, Orphaned,
    Result, RevisionError, TrackedChange,
};
use chrono::Utc;
use doc_model::{DocumentTree, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Which version of the document a reader wants to see
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// Every pending change applied, no markup
    #[default]
    Final,
    /// Everything visible, insertions and deletions flagged
    Markup,
    /// As before any pending change
    Original,
}

impl ViewMode {
    pub fn display_name(&self) -> &'static str {
        match self {
            ViewMode::Final => "Final",
            ViewMode::Markup => "Markup",
            ViewMode::Original => "Original",
        }
    }
}

impl std::str::FromStr for ViewMode {
    type Err = RevisionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "final" => Ok(ViewMode::Final),
            "markup" => Ok(ViewMode::Markup),
            "original" => Ok(ViewMode::Original),
            other => Err(RevisionError::InvalidOperation(format!("unknown view '{other}'"))),
        }
    }
}

/// How a node appears in a given view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Hidden,
    Visible,
    /// Shown and flagged as a pending insertion
    Inserted,
    /// Shown and flagged as a pending deletion
    Deleted,
}

impl Visibility {
    pub fn is_shown(self) -> bool {
        self != Visibility::Hidden
    }
}

/// A reversible change to the overlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OverlayOp {
    AddChange(TrackedChange),
    RemoveChange(TrackedChange),
    ReplaceChange { old: TrackedChange, new: TrackedChange },
    AddComment(Comment),
    RemoveComment(Comment),
    ReplaceComment { old: Comment, new: Comment },
}

impl OverlayOp {
    pub fn apply(&self, overlay: &mut Overlay) -> Result<()> {
        match self {
            OverlayOp::AddChange(change) => {
                if overlay.change(change.id).is_some() {
                    return Err(RevisionError::InvalidOperation(format!(
                        "change {} already recorded",
                        change.id
                    )));
                }
                overlay.changes.push(change.clone());
            }
            OverlayOp::RemoveChange(change) => {
                let pos = overlay.change_position(change.id)?;
                if overlay.changes[pos] != *change {
                    return Err(stale("change removal"));
                }
                overlay.changes.remove(pos);
            }
            OverlayOp::ReplaceChange { old, new } => {
                let pos = overlay.change_position(old.id)?;
                if overlay.changes[pos] != *old || old.id != new.id {
                    return Err(stale("change update"));
                }
                overlay.changes[pos] = new.clone();
            }
            OverlayOp::AddComment(comment) => {
                if overlay.comment(comment.id).is_some() {
                    return Err(RevisionError::InvalidOperation(format!(
                        "comment {} already exists",
                        comment.id
                    )));
                }
                overlay.comments.push(comment.clone());
            }
            OverlayOp::RemoveComment(comment) => {
                let pos = overlay.comment_position(comment.id)?;
                if overlay.comments[pos] != *comment {
                    return Err(stale("comment removal"));
                }
                overlay.comments.remove(pos);
            }
            OverlayOp::ReplaceComment { old, new } => {
                let pos = overlay.comment_position(old.id)?;
                if overlay.comments[pos] != *old || old.id != new.id {
                    return Err(stale("comment update"));
                }
                overlay.comments[pos] = new.clone();
            }
        }
        Ok(())
    }

    pub fn inverse(&self) -> OverlayOp {
        match self.clone() {
            OverlayOp::AddChange(c) => OverlayOp::RemoveChange(c),
            OverlayOp::RemoveChange(c) => OverlayOp::AddChange(c),
            OverlayOp::ReplaceChange { old, new } => OverlayOp::ReplaceChange { old: new, new: old },
            OverlayOp::AddComment(c) => OverlayOp::RemoveComment(c),
            OverlayOp::RemoveComment(c) => OverlayOp::AddComment(c),
            OverlayOp::ReplaceComment { old, new } => OverlayOp::ReplaceComment { old: new, new: old },
        }
    }

    /// Nodes the op mentions, on either side
    pub fn nodes(&self) -> Vec<NodeId> {
        let (before, after) = self.node_refs();
        let mut all = before;
        for n in after {
            if !all.contains(&n) {
                all.push(n);
            }
        }
        all
    }

    /// Nodes the overlay stops and starts referring to when this op is applied
    pub fn node_refs(&self) -> (Vec<NodeId>, Vec<NodeId>) {
        match self {
            OverlayOp::AddChange(c) => (Vec::new(), c.nodes()),
            OverlayOp::RemoveChange(c) => (c.nodes(), Vec::new()),
            OverlayOp::ReplaceChange { old, new } => (old.nodes(), new.nodes()),
            OverlayOp::AddComment(c) => (Vec::new(), comment_nodes(c)),
            OverlayOp::RemoveComment(c) => (comment_nodes(c), Vec::new()),
            OverlayOp::ReplaceComment { old, new } => (comment_nodes(old), comment_nodes(new)),
        }
    }
}

fn stale(what: &str) -> RevisionError {
    RevisionError::InvalidOperation(format!("stale {what}: overlay no longer matches"))
}

/// Nodes a comment keeps alive: its anchor and, when orphaned, its former
/// anchor so an undo can put it back.
fn comment_nodes(comment: &Comment) -> Vec<NodeId> {
    let mut nodes = comment.anchor.nodes();
    if let Some(orphaned) = &comment.orphaned {
        for n in orphaned.former.nodes() {
            if !nodes.contains(&n) {
                nodes.push(n);
            }
        }
    }
    nodes
}

/// Tracked changes and comments of one document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    changes: Vec<TrackedChange>,
    comments: Vec<Comment>,
    /// Author of tracked edits while tracking is on
    #[serde(default)]
    tracking: Option<String>,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Tracking control
    // =========================================================================

    pub fn begin_tracking(&mut self, author: impl Into<String>) -> Result<()> {
        let author = author.into();
        if author.trim().is_empty() {
            return Err(RevisionError::InvalidAuthor(
                "Author name cannot be empty".to_string(),
            ));
        }
        self.tracking = Some(author);
        Ok(())
    }

    pub fn end_tracking(&mut self) -> Option<String> {
        self.tracking.take()
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking.is_some()
    }

    pub fn tracking_author(&self) -> Option<&str> {
        self.tracking.as_deref()
    }

    // =========================================================================
    // Tracked changes
    // =========================================================================

    pub fn change(&self, id: ChangeId) -> Option<&TrackedChange> {
        self.changes.iter().find(|c| c.id == id)
    }

    fn change_position(&self, id: ChangeId) -> Result<usize> {
        self.changes
            .iter()
            .position(|c| c.id == id)
            .ok_or(RevisionError::ChangeNotFound(id))
    }

    /// Changes in the order they were recorded
    pub fn changes(&self) -> &[TrackedChange] {
        &self.changes
    }

    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn changes_by_author(&self, author: &str) -> Vec<&TrackedChange> {
        self.changes.iter().filter(|c| c.author == author).collect()
    }

    pub fn authors(&self) -> Vec<&str> {
        let mut authors: Vec<&str> = self
            .changes
            .iter()
            .map(|c| c.author.as_str())
            .chain(self.comments.iter().map(|c| c.author.as_str()))
            .collect();
        authors.sort();
        authors.dedup();
        authors
    }

    /// Changes covering `node` directly
    pub fn changes_for(&self, node: NodeId) -> Vec<&TrackedChange> {
        self.changes.iter().filter(|c| c.covers(node)).collect()
    }

    /// The insertion that added `node` or one of its ancestors, if pending
    pub fn insertion_covering(&self, tree: &DocumentTree, node: NodeId) -> Option<&TrackedChange> {
        self.covering(tree, node, TrackedChange::is_insertion)
    }

    /// The deletion marking `node` or one of its ancestors, if pending
    pub fn deletion_covering(&self, tree: &DocumentTree, node: NodeId) -> Option<&TrackedChange> {
        self.covering(tree, node, TrackedChange::is_deletion)
    }

    fn covering(
        &self,
        tree: &DocumentTree,
        node: NodeId,
        kind: fn(&TrackedChange) -> bool,
    ) -> Option<&TrackedChange> {
        let mut lineage = vec![node];
        lineage.extend(tree.ancestors(node));
        self.changes
            .iter()
            .filter(|c| kind(c))
            .find(|c| lineage.iter().any(|n| c.covers(*n)))
    }

    /// Pending changes in reading order. Changes whose nodes are all
    /// detached come last, in recording order.
    pub fn changes_in_document_order(&self, tree: &DocumentTree) -> Vec<&TrackedChange> {
        let order: HashMap<NodeId, usize> = tree
            .walk()
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect();
        let mut changes: Vec<(usize, usize, &TrackedChange)> = self
            .changes
            .iter()
            .enumerate()
            .map(|(seq, c)| {
                let pos = c
                    .nodes()
                    .iter()
                    .filter_map(|n| order.get(n).copied())
                    .min()
                    .unwrap_or(usize::MAX);
                (pos, seq, c)
            })
            .collect();
        changes.sort_by_key(|(pos, seq, _)| (*pos, *seq));
        changes.into_iter().map(|(_, _, c)| c).collect()
    }

    // =========================================================================
    // Comments
    // =========================================================================

    pub fn comment(&self, id: CommentId) -> Option<&Comment> {
        self.comments.iter().find(|c| c.id == id)
    }

    fn comment_position(&self, id: CommentId) -> Result<usize> {
        self.comments
            .iter()
            .position(|c| c.id == id)
            .ok_or(RevisionError::CommentNotFound(id))
    }

    /// All comments, orphaned ones included, in creation order
    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn comment_count(&self) -> usize {
        self.comments.len()
    }

    pub fn comments_by_author(&self, author: &str) -> Vec<&Comment> {
        self.comments.iter().filter(|c| c.author == author).collect()
    }

    pub fn comments_with_tag(&self, tag: &str) -> Vec<&Comment> {
        self.comments.iter().filter(|c| c.tags.contains(tag)).collect()
    }

    pub fn comments_mentioning(&self, user: &str) -> Vec<&Comment> {
        self.comments.iter().filter(|c| c.mentions_user(user)).collect()
    }

    /// Unresolved comments
    pub fn active_comments(&self) -> Vec<&Comment> {
        self.comments.iter().filter(|c| !c.resolved).collect()
    }

    pub fn resolved_comments(&self) -> Vec<&Comment> {
        self.comments.iter().filter(|c| c.resolved).collect()
    }

    pub fn orphaned_comments(&self) -> Vec<&Comment> {
        self.comments.iter().filter(|c| c.is_orphaned()).collect()
    }

    /// Build the op that replaces comment `id` with an edited copy
    pub fn edit_comment(&self, id: CommentId, edit: impl FnOnce(&mut Comment)) -> Result<OverlayOp> {
        let old = self
            .comment(id)
            .cloned()
            .ok_or(RevisionError::CommentNotFound(id))?;
        let mut new = old.clone();
        edit(&mut new);
        Ok(OverlayOp::ReplaceComment { old, new })
    }

    // =========================================================================
    // Node references
    // =========================================================================

    /// Nodes held by pending tracked changes
    pub fn change_nodes(&self) -> HashSet<NodeId> {
        self.changes
            .iter()
            .filter(|c| c.is_pending())
            .flat_map(|c| c.nodes())
            .collect()
    }

    /// Nodes held by comment anchors, including orphaned comments' former
    /// anchors
    pub fn comment_nodes(&self) -> HashSet<NodeId> {
        self.comments.iter().flat_map(comment_nodes).collect()
    }

    // =========================================================================
    // Anchor maintenance
    // =========================================================================

    /// Ops keeping comment anchors in place after a text edit in `node`
    pub fn plan_text_edit(&self, node: NodeId, offset: usize, removed: usize, inserted: usize) -> Vec<OverlayOp> {
        self.comments
            .iter()
            .filter_map(|old| {
                let mut new = old.clone();
                new.anchor
                    .adjust_for_edit(node, offset, removed, inserted)
                    .then(|| OverlayOp::ReplaceComment {
                        old: old.clone(),
                        new,
                    })
            })
            .collect()
    }

    /// Ops that make anchors and changes follow text into the right half of
    /// a split run. Emitted before the text moves.
    pub fn plan_split(&self, run: NodeId, offset: usize, right: NodeId) -> Vec<OverlayOp> {
        let mut ops = Vec::new();
        for old in &self.comments {
            let mut new = old.clone();
            if new.anchor.follow_split(run, offset, right) {
                ops.push(OverlayOp::ReplaceComment {
                    old: old.clone(),
                    new,
                });
            }
        }
        for old in &self.changes {
            match &old.kind {
                ChangeKind::Insertion { nodes } | ChangeKind::Deletion { nodes }
                    if nodes.contains(&run) =>
                {
                    let mut new = old.clone();
                    if let ChangeKind::Insertion { nodes } | ChangeKind::Deletion { nodes } =
                        &mut new.kind
                    {
                        if let Some(i) = nodes.iter().position(|n| *n == run) {
                            nodes.insert(i + 1, right);
                        }
                    }
                    ops.push(OverlayOp::ReplaceChange {
                        old: old.clone(),
                        new,
                    });
                }
                ChangeKind::FormatChange {
                    node,
                    property,
                    old: before,
                    new: after,
                } if *node == run => {
                    let twin = TrackedChange::format_change(
                        old.author.clone(),
                        right,
                        *property,
                        before.clone(),
                        after.clone(),
                    )
                    .with_timestamp(old.timestamp);
                    ops.push(OverlayOp::AddChange(twin));
                }
                _ => {}
            }
        }
        ops
    }

    /// Re-anchor comments whose content was detached.
    ///
    /// `detached` lists each detached subtree root with the parent it was
    /// removed from. A comment that lost its whole anchor is orphaned and
    /// attached to the nearest live ancestor; one that lost a single endpoint
    /// collapses onto the other.
    pub fn plan_repair(
        &self,
        tree: &DocumentTree,
        detached: &[(NodeId, NodeId)],
    ) -> (Vec<OverlayOp>, Vec<OrphanedAnnotation>) {
        let mut ops = Vec::new();
        let mut notices = Vec::new();
        for old in &self.comments {
            let lost: Vec<NodeId> = old
                .anchor
                .nodes()
                .into_iter()
                .filter(|n| !tree.is_attached(*n))
                .collect();
            if lost.is_empty() {
                continue;
            }
            let mut new = old.clone();
            let survivor = match old.anchor {
                CommentAnchor::Text { start, end } if start.node != end.node => {
                    if !lost.contains(&start.node) {
                        Some(start)
                    } else if !lost.contains(&end.node) {
                        Some(end)
                    } else {
                        None
                    }
                }
                _ => None,
            };
            if let Some(point) = survivor {
                new.anchor = CommentAnchor::Text {
                    start: point,
                    end: point,
                };
            } else {
                let Some(first) = lost.first().copied() else {
                    continue;
                };
                let target = nearest_live_ancestor(tree, first, detached);
                new.anchor = CommentAnchor::Node(target);
                if new.orphaned.is_none() {
                    new.orphaned = Some(Orphaned {
                        former: old.anchor,
                        at: Utc::now(),
                    });
                }
                tracing::info!("comment {} orphaned, re-anchored to {}", old.id, target.short());
                notices.push(OrphanedAnnotation {
                    comment: old.id,
                    former: old.anchor,
                    reanchored_to: target,
                });
            }
            ops.push(OverlayOp::ReplaceComment {
                old: old.clone(),
                new,
            });
        }
        (ops, notices)
    }

    /// Ops dropping pending deletions whose content an untracked delete has
    /// since removed outright. Such a record could no longer be rejected.
    pub fn plan_forget(&self, tree: &DocumentTree) -> Vec<OverlayOp> {
        self.changes
            .iter()
            .filter(|c| c.is_deletion() && c.nodes().iter().all(|n| !tree.is_attached(*n)))
            .map(|c| OverlayOp::RemoveChange(c.clone()))
            .collect()
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Visibility lookup for one view
    pub fn view<'a>(&'a self, tree: &'a DocumentTree, mode: ViewMode) -> OverlayView<'a> {
        let mut inserted = HashSet::new();
        let mut deleted = HashSet::new();
        for change in &self.changes {
            match &change.kind {
                ChangeKind::Insertion { nodes } => inserted.extend(nodes.iter().copied()),
                ChangeKind::Deletion { nodes } => deleted.extend(nodes.iter().copied()),
                _ => {}
            }
        }
        OverlayView {
            tree,
            mode,
            inserted,
            deleted,
        }
    }

    // =========================================================================
    // JSON exchange
    // =========================================================================

    pub fn export_changes_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.changes)?)
    }

    /// Parse a change list. Returns add ops for changes not already present.
    pub fn import_changes_json(&self, json: &str) -> Result<Vec<OverlayOp>> {
        let changes: Vec<TrackedChange> = serde_json::from_str(json)?;
        Ok(changes
            .into_iter()
            .filter(|c| self.change(c.id).is_none())
            .map(OverlayOp::AddChange)
            .collect())
    }

    pub fn export_comments_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.comments)?)
    }

    /// Parse a comment list. Returns add ops for comments not already present.
    pub fn import_comments_json(&self, json: &str) -> Result<Vec<OverlayOp>> {
        let comments: Vec<Comment> = serde_json::from_str(json)?;
        Ok(comments
            .into_iter()
            .filter(|c| self.comment(c.id).is_none())
            .map(OverlayOp::AddComment)
            .collect())
    }
}

fn nearest_live_ancestor(tree: &DocumentTree, node: NodeId, detached: &[(NodeId, NodeId)]) -> NodeId {
    let mut current = node;
    for _ in 0..=tree.node_count() {
        if tree.is_attached(current) {
            return current;
        }
        // Climb to the detached root, then jump to where it was removed from.
        let root = tree.ancestors(current).last().copied().unwrap_or(current);
        match detached.iter().find(|(r, _)| *r == root) {
            Some((_, parent)) => current = *parent,
            None => break,
        }
    }
    tree.root_id()
}

/// Per-view visibility of nodes
pub struct OverlayView<'a> {
    tree: &'a DocumentTree,
    mode: ViewMode,
    inserted: HashSet<NodeId>,
    deleted: HashSet<NodeId>,
}

impl OverlayView<'_> {
    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    fn marked(&self, node: NodeId, set: &HashSet<NodeId>) -> bool {
        set.contains(&node) || self.tree.ancestors(node).iter().any(|a| set.contains(a))
    }

    pub fn visibility(&self, node: NodeId) -> Visibility {
        let deleted = self.marked(node, &self.deleted);
        let inserted = self.marked(node, &self.inserted);
        match self.mode {
            ViewMode::Final if deleted => Visibility::Hidden,
            ViewMode::Final => Visibility::Visible,
            ViewMode::Original if inserted => Visibility::Hidden,
            ViewMode::Original => Visibility::Visible,
            ViewMode::Markup if deleted => Visibility::Deleted,
            ViewMode::Markup if inserted => Visibility::Inserted,
            ViewMode::Markup => Visibility::Visible,
        }
    }

    pub fn is_visible(&self, node: NodeId) -> bool {
        self.visibility(node).is_shown()
    }

    /// Plain text of the document as this view shows it
    pub fn plain_text(&self) -> String {
        self.tree
            .nodes_of_kind(doc_model::NodeKind::Paragraph)
            .into_iter()
            .filter(|p| self.is_visible(*p))
            .map(|p| {
                self.tree
                    .descendants(p)
                    .into_iter()
                    .filter(|d| self.is_visible(*d))
                    .filter_map(|d| self.tree.get(d).and_then(|n| n.display_text()))
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{Node, TextRange};

    fn doc() -> (DocumentTree, NodeId, NodeId) {
        let mut tree = DocumentTree::blank();
        let para = tree.nodes_of_kind(doc_model::NodeKind::Paragraph)[0];
        let run = tree.append(para, Node::run("Hello")).unwrap();
        (tree, para, run)
    }

    #[test]
    fn test_ops_invert() {
        let mut overlay = Overlay::new();
        let comment = Comment::new(CommentAnchor::node(NodeId::new()), "alice", "hi");
        let add = OverlayOp::AddComment(comment.clone());
        add.apply(&mut overlay).unwrap();
        assert_eq!(overlay.comment_count(), 1);

        let edit = overlay.edit_comment(comment.id, |c| c.edit("hello")).unwrap();
        edit.apply(&mut overlay).unwrap();
        assert_eq!(overlay.comment(comment.id).unwrap().body, "hello");
        edit.inverse().apply(&mut overlay).unwrap();
        assert_eq!(overlay.comment(comment.id).unwrap().body, "hi");

        add.inverse().apply(&mut overlay).unwrap();
        assert_eq!(overlay, Overlay::new());
    }

    #[test]
    fn test_stale_replace_is_rejected() {
        let mut overlay = Overlay::new();
        let comment = Comment::new(CommentAnchor::node(NodeId::new()), "alice", "hi");
        OverlayOp::AddComment(comment.clone()).apply(&mut overlay).unwrap();
        let mut other = comment.clone();
        other.body = "something else".into();
        let op = OverlayOp::ReplaceComment {
            old: other,
            new: comment,
        };
        assert!(op.apply(&mut overlay).is_err());
    }

    #[test]
    fn test_views() {
        let (mut tree, para, run) = doc();
        let added = tree.append(para, Node::run(" world")).unwrap();
        let mut overlay = Overlay::new();
        OverlayOp::AddChange(TrackedChange::deletion("alice", vec![run]))
            .apply(&mut overlay)
            .unwrap();
        OverlayOp::AddChange(TrackedChange::insertion("alice", vec![added]))
            .apply(&mut overlay)
            .unwrap();

        let final_view = overlay.view(&tree, ViewMode::Final);
        assert_eq!(final_view.plain_text(), " world");
        let original = overlay.view(&tree, ViewMode::Original);
        assert_eq!(original.plain_text(), "Hello");
        let markup = overlay.view(&tree, ViewMode::Markup);
        assert_eq!(markup.visibility(run), Visibility::Deleted);
        assert_eq!(markup.visibility(added), Visibility::Inserted);
        assert_eq!(markup.plain_text(), "Hello world");
    }

    #[test]
    fn test_text_edit_shifts_anchor() {
        let (_, _, run) = doc();
        let mut overlay = Overlay::new();
        let comment = Comment::new(CommentAnchor::range(TextRange::within(run, 1, 4)), "a", "x");
        OverlayOp::AddComment(comment.clone()).apply(&mut overlay).unwrap();
        let ops = overlay.plan_text_edit(run, 0, 0, 2);
        assert_eq!(ops.len(), 1);
        ops[0].apply(&mut overlay).unwrap();
        assert_eq!(
            overlay.comment(comment.id).unwrap().anchor,
            CommentAnchor::range(TextRange::within(run, 3, 6))
        );
        assert!(overlay.plan_text_edit(run, 9, 0, 2).is_empty());
    }

    #[test]
    fn test_whole_anchor_removed_orphans_comment() {
        let (mut tree, para, run) = doc();
        let mut overlay = Overlay::new();
        let comment = Comment::new(CommentAnchor::range(TextRange::within(run, 0, 5)), "a", "x");
        OverlayOp::AddComment(comment.clone()).apply(&mut overlay).unwrap();
        tree.detach(run).unwrap();

        let (ops, notices) = overlay.plan_repair(&tree, &[(run, para)]);
        for op in &ops {
            op.apply(&mut overlay).unwrap();
        }
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].reanchored_to, para);
        let kept = overlay.comment(comment.id).unwrap();
        assert!(kept.is_orphaned());
        assert_eq!(kept.anchor, CommentAnchor::Node(para));
        assert_eq!(kept.orphaned.unwrap().former, comment.anchor);
    }

    #[test]
    fn test_lost_endpoint_collapses_onto_survivor() {
        let (mut tree, para, run) = doc();
        let tail = tree.append(para, Node::run(" there")).unwrap();
        let mut overlay = Overlay::new();
        let anchor = CommentAnchor::Text {
            start: doc_model::TextPoint::new(run, 2),
            end: doc_model::TextPoint::new(tail, 3),
        };
        let comment = Comment::new(anchor, "a", "x");
        OverlayOp::AddComment(comment.clone()).apply(&mut overlay).unwrap();
        tree.detach(tail).unwrap();

        let (ops, notices) = overlay.plan_repair(&tree, &[(tail, para)]);
        assert!(notices.is_empty());
        ops[0].apply(&mut overlay).unwrap();
        let kept = overlay.comment(comment.id).unwrap();
        assert!(!kept.is_orphaned());
        assert_eq!(kept.anchor, CommentAnchor::range(TextRange::within(run, 2, 2)));
    }

    #[test]
    fn test_orphan_climbs_out_of_removed_paragraph() {
        let (mut tree, para, run) = doc();
        let section = tree.parent(para).unwrap();
        let mut overlay = Overlay::new();
        let comment = Comment::new(CommentAnchor::range(TextRange::within(run, 0, 2)), "a", "x");
        OverlayOp::AddComment(comment.clone()).apply(&mut overlay).unwrap();
        tree.detach(para).unwrap();
        let (ops, notices) = overlay.plan_repair(&tree, &[(para, section)]);
        ops[0].apply(&mut overlay).unwrap();
        assert_eq!(notices[0].reanchored_to, section);
    }

    #[test]
    fn test_split_extends_change_and_moves_anchor() {
        let (_, _, run) = doc();
        let right = NodeId::new();
        let mut overlay = Overlay::new();
        let change = TrackedChange::insertion("a", vec![run]);
        OverlayOp::AddChange(change.clone()).apply(&mut overlay).unwrap();
        let comment = Comment::new(CommentAnchor::range(TextRange::within(run, 3, 5)), "a", "x");
        OverlayOp::AddComment(comment.clone()).apply(&mut overlay).unwrap();

        for op in overlay.plan_split(run, 2, right) {
            op.apply(&mut overlay).unwrap();
        }
        assert_eq!(
            overlay.change(change.id).unwrap().kind,
            ChangeKind::Insertion { nodes: vec![run, right] }
        );
        assert_eq!(
            overlay.comment(comment.id).unwrap().anchor,
            CommentAnchor::range(TextRange::within(right, 1, 3))
        );
    }

    #[test]
    fn test_comment_queries_and_json() {
        let mut overlay = Overlay::new();
        let mut a = Comment::new(CommentAnchor::node(NodeId::new()), "alice", "ask @bob");
        a.add_tag("legal");
        let mut b = Comment::new(CommentAnchor::node(NodeId::new()), "bob", "fine");
        b.resolve("bob");
        OverlayOp::AddComment(a.clone()).apply(&mut overlay).unwrap();
        OverlayOp::AddComment(b.clone()).apply(&mut overlay).unwrap();

        assert_eq!(overlay.comments_by_author("alice").len(), 1);
        assert_eq!(overlay.comments_with_tag("legal")[0].id, a.id);
        assert_eq!(overlay.comments_mentioning("bob")[0].id, a.id);
        assert_eq!(overlay.active_comments().len(), 1);
        assert_eq!(overlay.resolved_comments()[0].id, b.id);

        let json = overlay.export_comments_json().unwrap();
        let fresh = Overlay::new();
        let ops = fresh.import_comments_json(&json).unwrap();
        assert_eq!(ops.len(), 2);
        assert!(overlay.import_comments_json(&json).unwrap().is_empty());
    }
}
