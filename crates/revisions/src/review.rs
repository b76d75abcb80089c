//! Tracked editing and change review
//!
//! These helpers run against an [`OverlayEditor`], which is a tree editor
//! that can also apply overlay ops. The editing engine supplies one per
//! command so every tree and overlay op lands in the same history entry.

use crate::{
    ChangeId, ChangeKind, ChangeStatus, Comment, CommentAnchor, CommentId, NodePosition, Overlay,
    OverlayOp, Result, RevisionError, TrackedChange,
};
use doc_model::{
    text, DocModelError, DocumentTree, Node, NodeId, NodeKind, Property, PropertyValue,
    TextRange, TreeEditor, TreeOp,
};

/// A tree editor that also owns the overlay
pub trait OverlayEditor: TreeEditor {
    fn overlay(&self) -> &Overlay;
    fn apply_overlay(&mut self, op: OverlayOp) -> Result<()>;
}

fn position_of(tree: &DocumentTree, node: NodeId) -> Result<NodePosition> {
    let parent = tree
        .parent(node)
        .ok_or_else(|| DocModelError::structural(format!("node {} is detached", node.short())))?;
    let index = tree
        .index_in_parent(node)
        .ok_or_else(|| DocModelError::structural("node missing from its parent"))?;
    Ok(NodePosition { parent, index })
}

fn detach<E: OverlayEditor>(editor: &mut E, node: NodeId) -> Result<()> {
    let at = position_of(editor.tree(), node)?;
    editor.apply(TreeOp::Detach {
        node,
        parent: at.parent,
        index: at.index,
    })?;
    Ok(())
}

// =============================================================================
// Tracked edits
// =============================================================================

/// Insert `node` and record it as a pending insertion
pub fn tracked_insert<E: OverlayEditor>(
    editor: &mut E,
    author: &str,
    parent: NodeId,
    index: usize,
    node: Node,
) -> Result<NodeId> {
    let id = editor.create(node)?;
    editor.apply(TreeOp::Attach {
        node: id,
        parent,
        index,
    })?;
    if editor.overlay().insertion_covering(editor.tree(), parent).is_none() {
        editor.apply_overlay(OverlayOp::AddChange(TrackedChange::insertion(author, vec![id])))?;
    }
    Ok(id)
}

/// Mark `nodes` for deletion.
///
/// Nodes that are themselves pending insertions are detached right away and
/// their insertion record stays pending. Nodes already marked deleted are
/// skipped. Returns the new deletion record, if any.
pub fn tracked_remove_nodes<E: OverlayEditor>(
    editor: &mut E,
    author: &str,
    nodes: &[NodeId],
) -> Result<Option<ChangeId>> {
    let mut marked = Vec::new();
    for &node in nodes {
        let tree = editor.tree();
        if !tree.is_attached(node) {
            return Err(DocModelError::structural(format!(
                "cannot delete detached node {}",
                node.short()
            ))
            .into());
        }
        if tree.kind(node)? == NodeKind::Document {
            return Err(DocModelError::structural("the document node cannot be removed").into());
        }
        let overlay = editor.overlay();
        if overlay.insertion_covering(tree, node).is_some() {
            detach(editor, node)?;
        } else if overlay.deletion_covering(tree, node).is_none() {
            marked.push(node);
        }
    }
    if marked.is_empty() {
        return Ok(None);
    }
    let change = TrackedChange::deletion(author, marked);
    let id = change.id;
    editor.apply_overlay(OverlayOp::AddChange(change))?;
    Ok(Some(id))
}

pub fn tracked_remove<E: OverlayEditor>(
    editor: &mut E,
    author: &str,
    node: NodeId,
) -> Result<Option<ChangeId>> {
    tracked_remove_nodes(editor, author, &[node])
}

/// Split the runs at the edges of `range` and mark what it covers deleted
pub fn tracked_remove_range<E: OverlayEditor>(
    editor: &mut E,
    author: &str,
    range: TextRange,
) -> Result<Option<ChangeId>> {
    let covered = text::isolate_range(editor, range)?;
    tracked_remove_nodes(editor, author, &covered)
}

/// Insert text while tracking.
///
/// Typing into a run that is already a pending insertion edits it in place.
/// Otherwise the run is split at `offset` and the text goes into a new run
/// with the same formatting, recorded as inserted. Returns the run holding
/// the new text.
pub fn tracked_insert_text<E: OverlayEditor>(
    editor: &mut E,
    author: &str,
    run: NodeId,
    offset: usize,
    inserted: &str,
) -> Result<NodeId> {
    if inserted.is_empty() {
        return Err(RevisionError::EmptyContent);
    }
    let tree = editor.tree();
    let source = tree.node(run)?;
    if source.kind() != NodeKind::Run {
        return Err(DocModelError::structural(format!("cannot type into a {}", source.kind())).into());
    }
    if editor.overlay().insertion_covering(tree, run).is_some() {
        text::insert_text(editor, run, offset, inserted)?;
        return Ok(run);
    }
    let len = source.text_len();
    if offset > len {
        return Err(DocModelError::InvalidOffset {
            node_id: run,
            offset,
            len,
        }
        .into());
    }
    let mut node = Node::run(inserted).with_formatting(source.direct_formatting().clone());
    if let Some(style) = source.style_ref() {
        node = node.with_style(style.clone());
    }

    text::split_run(editor, run, offset)?;
    let at = position_of(editor.tree(), run)?;
    let index = if offset == 0 { at.index } else { at.index + 1 };
    let id = editor.create(node)?;
    editor.apply(TreeOp::Attach {
        node: id,
        parent: at.parent,
        index,
    })?;
    editor.apply_overlay(OverlayOp::AddChange(TrackedChange::insertion(author, vec![id])))?;
    Ok(id)
}

/// Set direct formatting and record the change.
///
/// Repeated edits of the same property keep one record holding the value
/// from before tracking touched it. Setting the property back drops the
/// record.
pub fn tracked_set_property<E: OverlayEditor>(
    editor: &mut E,
    author: &str,
    node: NodeId,
    property: Property,
    value: Option<PropertyValue>,
) -> Result<()> {
    let tree = editor.tree();
    let old = tree.node(node)?.direct_formatting().get(property).cloned();
    editor.apply(TreeOp::SetProperty {
        node,
        property,
        old: old.clone(),
        new: value.clone(),
    })?;
    if editor.overlay().insertion_covering(editor.tree(), node).is_some() {
        return Ok(());
    }

    let existing = editor
        .overlay()
        .changes_for(node)
        .into_iter()
        .find(|c| matches!(&c.kind, ChangeKind::FormatChange { property: p, .. } if *p == property))
        .cloned();
    match existing {
        Some(previous) => {
            let ChangeKind::FormatChange { old: original, .. } = &previous.kind else {
                return Ok(());
            };
            if *original == value {
                editor.apply_overlay(OverlayOp::RemoveChange(previous))?;
            } else {
                let mut updated = previous.clone();
                updated.kind = ChangeKind::FormatChange {
                    node,
                    property,
                    old: original.clone(),
                    new: value,
                };
                editor.apply_overlay(OverlayOp::ReplaceChange {
                    old: previous,
                    new: updated,
                })?;
            }
        }
        None if old != value => {
            let change = TrackedChange::format_change(author, node, property, old, value);
            editor.apply_overlay(OverlayOp::AddChange(change))?;
        }
        None => {}
    }
    Ok(())
}

/// Move `node` and record where it came from
pub fn tracked_move<E: OverlayEditor>(
    editor: &mut E,
    author: &str,
    node: NodeId,
    new_parent: NodeId,
    new_index: usize,
) -> Result<Option<ChangeId>> {
    let from = position_of(editor.tree(), node)?;
    editor.apply(TreeOp::Move {
        node,
        from_parent: from.parent,
        from_index: from.index,
        to_parent: new_parent,
        to_index: new_index,
    })?;
    let to = position_of(editor.tree(), node)?;
    if editor.overlay().insertion_covering(editor.tree(), node).is_some() {
        return Ok(None);
    }

    let existing = editor
        .overlay()
        .changes_for(node)
        .into_iter()
        .find(|c| matches!(c.kind, ChangeKind::Move { .. }))
        .cloned();
    if let Some(previous) = existing {
        let ChangeKind::Move { from: origin, .. } = previous.kind else {
            return Ok(None);
        };
        if origin == to {
            editor.apply_overlay(OverlayOp::RemoveChange(previous))?;
            return Ok(None);
        }
        let mut updated = previous.clone();
        updated.kind = ChangeKind::Move {
            node,
            from: origin,
            to,
        };
        let id = updated.id;
        editor.apply_overlay(OverlayOp::ReplaceChange {
            old: previous,
            new: updated,
        })?;
        return Ok(Some(id));
    }
    let change = TrackedChange::move_node(author, node, from, to);
    let id = change.id;
    editor.apply_overlay(OverlayOp::AddChange(change))?;
    Ok(Some(id))
}

// =============================================================================
// Review
// =============================================================================

fn take_change<E: OverlayEditor>(editor: &E, id: ChangeId) -> Result<TrackedChange> {
    editor
        .overlay()
        .change(id)
        .cloned()
        .ok_or(RevisionError::ChangeNotFound(id))
}

/// Make a change permanent and drop its record
pub fn accept_change<E: OverlayEditor>(editor: &mut E, id: ChangeId) -> Result<TrackedChange> {
    let change = take_change(editor, id)?;
    editor.apply_overlay(OverlayOp::RemoveChange(change.clone()))?;
    if let ChangeKind::Deletion { nodes } = &change.kind {
        for node in nodes.iter().rev() {
            if editor.tree().is_attached(*node) {
                detach(editor, *node)?;
            }
        }
        // Format and move records inside the removed content have nothing
        // left to review.
        let superseded: Vec<TrackedChange> = editor
            .overlay()
            .changes()
            .iter()
            .filter(|c| matches!(c.kind, ChangeKind::FormatChange { .. } | ChangeKind::Move { .. }))
            .filter(|c| {
                c.kind
                    .primary_node()
                    .is_some_and(|n| !editor.tree().is_attached(n))
            })
            .cloned()
            .collect();
        for stale in superseded {
            editor.apply_overlay(OverlayOp::RemoveChange(stale))?;
        }
    }
    tracing::debug!("accepted {} change {}", change.kind.display_name(), change.id);
    Ok(TrackedChange {
        status: ChangeStatus::Accepted,
        ..change
    })
}

/// Undo a change in the tree and drop its record
pub fn reject_change<E: OverlayEditor>(editor: &mut E, id: ChangeId) -> Result<TrackedChange> {
    let change = take_change(editor, id)?;
    match &change.kind {
        ChangeKind::Insertion { nodes } => {
            for node in nodes.iter().rev() {
                if editor.tree().is_attached(*node) {
                    detach(editor, *node)?;
                }
            }
        }
        ChangeKind::Deletion { .. } => {}
        ChangeKind::FormatChange {
            node,
            property,
            old,
            ..
        } => {
            if editor.tree().contains(*node) {
                let current = editor
                    .tree()
                    .node(*node)?
                    .direct_formatting()
                    .get(*property)
                    .cloned();
                if current != *old {
                    editor.apply(TreeOp::SetProperty {
                        node: *node,
                        property: *property,
                        old: current,
                        new: old.clone(),
                    })?;
                }
            }
        }
        ChangeKind::Move { node, from, .. } => {
            let tree = editor.tree();
            if tree.is_attached(*node) && tree.is_attached(from.parent) {
                let at = position_of(tree, *node)?;
                let siblings = tree.children(from.parent).len();
                let limit = if at.parent == from.parent {
                    siblings.saturating_sub(1)
                } else {
                    siblings
                };
                editor.apply(TreeOp::Move {
                    node: *node,
                    from_parent: at.parent,
                    from_index: at.index,
                    to_parent: from.parent,
                    to_index: from.index.min(limit),
                })?;
            } else {
                tracing::warn!("move {} cannot be reverted: origin is gone", change.id);
            }
        }
    }
    editor.apply_overlay(OverlayOp::RemoveChange(change.clone()))?;
    tracing::debug!("rejected {} change {}", change.kind.display_name(), change.id);
    Ok(TrackedChange {
        status: ChangeStatus::Rejected,
        ..change
    })
}

/// Accept every pending change, oldest first
pub fn accept_all<E: OverlayEditor>(editor: &mut E) -> Result<Vec<TrackedChange>> {
    let ids: Vec<ChangeId> = editor.overlay().changes().iter().map(|c| c.id).collect();
    let mut done = Vec::new();
    for id in ids {
        if editor.overlay().change(id).is_some() {
            done.push(accept_change(editor, id)?);
        }
    }
    Ok(done)
}

/// Reject every pending change, newest first
pub fn reject_all<E: OverlayEditor>(editor: &mut E) -> Result<Vec<TrackedChange>> {
    let ids: Vec<ChangeId> = editor.overlay().changes().iter().rev().map(|c| c.id).collect();
    let mut done = Vec::new();
    for id in ids {
        if editor.overlay().change(id).is_some() {
            done.push(reject_change(editor, id)?);
        }
    }
    Ok(done)
}

// =============================================================================
// Comments
// =============================================================================

/// Check that an anchor points at live content with offsets in range
pub fn validate_anchor(tree: &DocumentTree, anchor: &CommentAnchor) -> Result<()> {
    match anchor {
        CommentAnchor::Node(id) => {
            if !tree.is_attached(*id) {
                return Err(RevisionError::InvalidAnchor(format!(
                    "node {} is not in the document",
                    id.short()
                )));
            }
        }
        CommentAnchor::Text { start, end } => {
            for point in [start, end] {
                let node = tree.get(point.node).filter(|_| tree.is_attached(point.node));
                let Some(node) = node else {
                    return Err(RevisionError::InvalidAnchor(format!(
                        "node {} is not in the document",
                        point.node.short()
                    )));
                };
                if node.kind() != NodeKind::Run || point.offset > node.text_len() {
                    return Err(RevisionError::InvalidAnchor(format!(
                        "offset {} is outside the text of {}",
                        point.offset,
                        point.node.short()
                    )));
                }
            }
            if tree.parent(start.node) != tree.parent(end.node) {
                return Err(RevisionError::InvalidAnchor(
                    "comment ranges cannot span paragraphs".to_string(),
                ));
            }
            let (a, b) = (
                tree.index_in_parent(start.node),
                tree.index_in_parent(end.node),
            );
            if a > b || (a == b && start.offset > end.offset) {
                return Err(RevisionError::InvalidAnchor(
                    "range start lies after its end".to_string(),
                ));
            }
        }
    }
    Ok(())
}

pub fn add_comment<E: OverlayEditor>(
    editor: &mut E,
    anchor: CommentAnchor,
    author: &str,
    body: &str,
) -> Result<CommentId> {
    if author.trim().is_empty() {
        return Err(RevisionError::InvalidAuthor(
            "Author name cannot be empty".to_string(),
        ));
    }
    if body.trim().is_empty() {
        return Err(RevisionError::EmptyContent);
    }
    validate_anchor(editor.tree(), &anchor)?;
    let comment = Comment::new(anchor, author, body);
    let id = comment.id;
    editor.apply_overlay(OverlayOp::AddComment(comment))?;
    Ok(id)
}

/// Remove a comment with its replies
pub fn delete_comment<E: OverlayEditor>(editor: &mut E, id: CommentId) -> Result<Comment> {
    let comment = editor
        .overlay()
        .comment(id)
        .cloned()
        .ok_or(RevisionError::CommentNotFound(id))?;
    editor.apply_overlay(OverlayOp::RemoveComment(comment.clone()))?;
    Ok(comment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ViewMode, Visibility};
    use doc_model::Result as ModelResult;

    /// Applies ops straight to a tree and overlay
    struct Direct {
        tree: DocumentTree,
        overlay: Overlay,
    }

    impl TreeEditor for Direct {
        fn tree(&self) -> &DocumentTree {
            &self.tree
        }

        fn create(&mut self, node: Node) -> ModelResult<NodeId> {
            self.tree.create(node)
        }

        fn apply(&mut self, op: TreeOp) -> ModelResult<()> {
            op.apply(&mut self.tree)
        }

        fn before_split(&mut self, run: NodeId, offset: usize, right: NodeId) -> ModelResult<()> {
            for op in self.overlay.plan_split(run, offset, right) {
                op.apply(&mut self.overlay)
                    .map_err(|e| DocModelError::structural(e.to_string()))?;
            }
            Ok(())
        }
    }

    impl OverlayEditor for Direct {
        fn overlay(&self) -> &Overlay {
            &self.overlay
        }

        fn apply_overlay(&mut self, op: OverlayOp) -> Result<()> {
            op.apply(&mut self.overlay)
        }
    }

    fn setup(text: &str) -> (Direct, NodeId, NodeId) {
        let mut tree = DocumentTree::blank();
        let para = tree.nodes_of_kind(NodeKind::Paragraph)[0];
        let run = tree.append(para, Node::run(text)).unwrap();
        (
            Direct {
                tree,
                overlay: Overlay::new(),
            },
            para,
            run,
        )
    }

    #[test]
    fn test_reject_deletion_restores_content() {
        let (mut ed, para, run) = setup("Hello");
        ed.apply(TreeOp::SetProperty {
            node: run,
            property: Property::Bold,
            old: None,
            new: Some(PropertyValue::Bool(true)),
        })
        .unwrap();
        let id = tracked_remove(&mut ed, "alice", run).unwrap().unwrap();
        assert!(ed.tree.is_attached(run));
        assert_eq!(ed.overlay.view(&ed.tree, ViewMode::Final).plain_text(), "");

        let rejected = reject_change(&mut ed, id).unwrap();
        assert_eq!(rejected.status, ChangeStatus::Rejected);
        assert_eq!(ed.tree.children(para), &[run]);
        assert_eq!(
            ed.tree.node(run).unwrap().direct_formatting().get(Property::Bold),
            Some(&PropertyValue::Bool(true))
        );
        assert!(!ed.overlay.has_changes());
    }

    #[test]
    fn test_accept_deletion_detaches() {
        let (mut ed, para, run) = setup("Hello");
        let id = tracked_remove(&mut ed, "alice", run).unwrap().unwrap();
        let accepted = accept_change(&mut ed, id).unwrap();
        assert_eq!(accepted.status, ChangeStatus::Accepted);
        assert!(ed.tree.children(para).is_empty());
        assert!(ed.tree.contains(run));
        assert!(!ed.overlay.has_changes());
    }

    #[test]
    fn test_tracked_text_goes_into_new_run() {
        let (mut ed, para, run) = setup("Hello");
        let added = tracked_insert_text(&mut ed, "bob", run, 2, "XY").unwrap();
        assert_eq!(ed.tree.text_of(para), "HeXYllo");
        assert_eq!(ed.tree.children(para).len(), 3);
        assert_eq!(ed.tree.children(para)[1], added);
        let view = ed.overlay.view(&ed.tree, ViewMode::Markup);
        assert_eq!(view.visibility(added), Visibility::Inserted);
        assert_eq!(ed.overlay.view(&ed.tree, ViewMode::Original).plain_text(), "Hello");

        // Typing on inside the inserted run extends it.
        let same = tracked_insert_text(&mut ed, "bob", added, 2, "Z").unwrap();
        assert_eq!(same, added);
        assert_eq!(ed.overlay.change_count(), 1);

        let id = ed.overlay.changes()[0].id;
        reject_change(&mut ed, id).unwrap();
        assert_eq!(ed.tree.text_of(para), "Hello");
    }

    #[test]
    fn test_deleting_own_insertion_leaves_tombstone() {
        let (mut ed, para, run) = setup("Hello");
        let added = tracked_insert(&mut ed, "bob", para, 1, Node::run(" there")).unwrap();
        assert_eq!(tracked_remove(&mut ed, "bob", added).unwrap(), None);
        assert!(!ed.tree.is_attached(added));
        assert!(ed.tree.contains(added));
        assert_eq!(ed.overlay.change_count(), 1);
        assert_eq!(ed.tree.children(para), &[run]);
    }

    #[test]
    fn test_format_changes_coalesce() {
        let (mut ed, _, run) = setup("Hello");
        tracked_set_property(&mut ed, "a", run, Property::Bold, Some(true.into())).unwrap();
        tracked_set_property(&mut ed, "a", run, Property::Bold, Some(false.into())).unwrap();
        assert_eq!(ed.overlay.change_count(), 1);
        match &ed.overlay.changes()[0].kind {
            ChangeKind::FormatChange { old, new, .. } => {
                assert_eq!(*old, None);
                assert_eq!(*new, Some(PropertyValue::Bool(false)));
            }
            other => panic!("unexpected {other:?}"),
        }
        tracked_set_property(&mut ed, "a", run, Property::Bold, None).unwrap();
        assert!(!ed.overlay.has_changes());
    }

    #[test]
    fn test_reject_format_change() {
        let (mut ed, _, run) = setup("Hello");
        tracked_set_property(&mut ed, "a", run, Property::Italic, Some(true.into())).unwrap();
        let id = ed.overlay.changes()[0].id;
        reject_change(&mut ed, id).unwrap();
        assert!(ed.tree.node(run).unwrap().direct_formatting().is_empty());
    }

    #[test]
    fn test_reject_move_returns_node() {
        let (mut ed, para, run) = setup("A");
        let b = ed.tree.append(para, Node::run("B")).unwrap();
        let c = ed.tree.append(para, Node::run("C")).unwrap();
        let id = tracked_move(&mut ed, "a", run, para, 2).unwrap().unwrap();
        assert_eq!(ed.tree.children(para), &[b, c, run]);
        reject_change(&mut ed, id).unwrap();
        assert_eq!(ed.tree.children(para), &[run, b, c]);
    }

    #[test]
    fn test_range_removal_splits_runs() {
        let (mut ed, para, run) = setup("Hello world");
        let id = tracked_remove_range(&mut ed, "a", TextRange::within(run, 5, 11))
            .unwrap()
            .unwrap();
        assert_eq!(ed.tree.text_of(para), "Hello world");
        assert_eq!(ed.overlay.view(&ed.tree, ViewMode::Final).plain_text(), "Hello");
        accept_change(&mut ed, id).unwrap();
        assert_eq!(ed.tree.text_of(para), "Hello");
    }

    #[test]
    fn test_accept_and_reject_all() {
        let (mut ed, para, run) = setup("Hello");
        tracked_insert(&mut ed, "a", para, 1, Node::run("!")).unwrap();
        tracked_set_property(&mut ed, "b", run, Property::Bold, Some(true.into())).unwrap();
        let mut copy = Direct {
            tree: ed.tree.clone(),
            overlay: ed.overlay.clone(),
        };
        assert_eq!(accept_all(&mut ed).unwrap().len(), 2);
        assert_eq!(ed.tree.text_of(para), "Hello!");
        assert_eq!(reject_all(&mut copy).unwrap().len(), 2);
        assert_eq!(copy.tree.text_of(para), "Hello");
        assert!(copy.tree.node(run).unwrap().direct_formatting().is_empty());
    }

    #[test]
    fn test_comment_validation() {
        let (mut ed, para, run) = setup("Hello");
        assert!(add_comment(&mut ed, CommentAnchor::range(TextRange::within(run, 0, 9)), "a", "x").is_err());
        assert!(add_comment(&mut ed, CommentAnchor::node(para), "a", "  ").is_err());
        assert!(add_comment(&mut ed, CommentAnchor::node(para), "", "x").is_err());
        let id = add_comment(&mut ed, CommentAnchor::range(TextRange::within(run, 1, 3)), "a", "x").unwrap();
        assert_eq!(ed.overlay.comment_count(), 1);
        delete_comment(&mut ed, id).unwrap();
        assert_eq!(ed.overlay.comment_count(), 0);
    }
}
