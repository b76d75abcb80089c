//! Command transactions over the tree and overlay
//!
//! A command runs against an [`EditTransaction`]. Ops take effect as they are
//! applied and are recorded in order. Comment anchors are kept in step with
//! text edits and run splits here, as extra overlay ops in the same record,
//! so undo and redo replay them exactly instead of recomputing anything.

use crate::{EditOp, Result};
use doc_model::{DocModelError, DocumentTree, Node, NodeId, TreeEditor, TreeOp};
use revisions::{Overlay, OverlayEditor, OverlayOp, OrphanedAnnotation};

pub struct EditTransaction<'a> {
    tree: &'a mut DocumentTree,
    overlay: &'a mut Overlay,
    ops: Vec<EditOp>,
    /// Detached subtree roots with the parent they left
    detached: Vec<(NodeId, NodeId)>,
    actor: &'a str,
    committed: bool,
}

impl<'a> EditTransaction<'a> {
    pub(crate) fn new(tree: &'a mut DocumentTree, overlay: &'a mut Overlay, actor: &'a str) -> Self {
        Self {
            tree,
            overlay,
            ops: Vec::new(),
            detached: Vec::new(),
            actor,
            committed: false,
        }
    }

    /// Acting user for untracked edits
    pub fn actor(&self) -> &str {
        self.actor
    }

    /// Author to record tracked changes under, while tracking is on
    pub fn tracking_author(&self) -> Option<String> {
        self.overlay.tracking_author().map(str::to_string)
    }

    pub fn ops(&self) -> &[EditOp] {
        &self.ops
    }

    fn record_overlay(&mut self, op: OverlayOp) -> revisions::Result<()> {
        op.apply(self.overlay)?;
        self.ops.push(EditOp::Overlay(op));
        Ok(())
    }

    /// Re-anchor comments that lost content and drop deletion records whose
    /// content is gone, then hand back the recorded ops together with the
    /// comments that were orphaned.
    pub(crate) fn commit(mut self) -> Result<(Vec<EditOp>, Vec<OrphanedAnnotation>)> {
        let mut notices = Vec::new();
        if !self.detached.is_empty() {
            let (repairs, orphaned) = self.overlay.plan_repair(self.tree, &self.detached);
            for op in repairs {
                self.record_overlay(op)?;
            }
            notices = orphaned;
            for op in self.overlay.plan_forget(self.tree) {
                tracing::debug!("dropping deletion record over removed content");
                self.record_overlay(op)?;
            }
        }
        self.committed = true;
        Ok((std::mem::take(&mut self.ops), notices))
    }
}

impl TreeEditor for EditTransaction<'_> {
    fn tree(&self) -> &DocumentTree {
        self.tree
    }

    fn create(&mut self, node: Node) -> doc_model::Result<NodeId> {
        self.tree.create(node)
    }

    fn apply(&mut self, op: TreeOp) -> doc_model::Result<()> {
        op.apply(self.tree)?;
        if let TreeOp::Detach { node, parent, .. } = &op {
            self.detached.push((*node, *parent));
        }
        let anchors = match &op {
            TreeOp::EditText {
                node,
                offset,
                removed,
                inserted,
            } => self.overlay.plan_text_edit(
                *node,
                *offset,
                doc_model::text::grapheme_len(removed),
                doc_model::text::grapheme_len(inserted),
            ),
            _ => Vec::new(),
        };
        self.ops.push(EditOp::Tree(op));
        for anchor in anchors {
            self.record_overlay(anchor)
                .map_err(|e| DocModelError::structural(e.to_string()))?;
        }
        Ok(())
    }

    fn before_split(&mut self, run: NodeId, offset: usize, right: NodeId) -> doc_model::Result<()> {
        for op in self.overlay.plan_split(run, offset, right) {
            self.record_overlay(op)
                .map_err(|e| DocModelError::structural(e.to_string()))?;
        }
        Ok(())
    }
}

impl OverlayEditor for EditTransaction<'_> {
    fn overlay(&self) -> &Overlay {
        self.overlay
    }

    fn apply_overlay(&mut self, op: OverlayOp) -> revisions::Result<()> {
        self.record_overlay(op)
    }
}

impl Drop for EditTransaction<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for op in self.ops.drain(..).rev() {
            if let Err(e) = op.inverse().apply(self.tree, self.overlay) {
                tracing::error!("rollback failed: {e}");
            }
        }
    }
}

/// Apply `ops` in order. If one fails, the ones already applied are undone
/// and the error is returned.
pub(crate) fn replay(tree: &mut DocumentTree, overlay: &mut Overlay, ops: &[EditOp]) -> Result<()> {
    for (done, op) in ops.iter().enumerate() {
        if let Err(e) = op.apply(tree, overlay) {
            for applied in ops[..done].iter().rev() {
                if let Err(rollback) = applied.inverse().apply(tree, overlay) {
                    tracing::error!("rollback failed: {rollback}");
                }
            }
            return Err(crate::EditError::ReplayFailed(e.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{text, NodeKind, TextRange};
    use revisions::{Comment, CommentAnchor};

    fn setup() -> (DocumentTree, Overlay, NodeId, NodeId) {
        let mut tree = DocumentTree::blank();
        let para = tree.nodes_of_kind(NodeKind::Paragraph)[0];
        let run = tree.append(para, Node::run("Hello world")).unwrap();
        (tree, Overlay::new(), para, run)
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let (mut tree, mut overlay, para, run) = setup();
        let before = tree.clone();
        {
            let mut tx = EditTransaction::new(&mut tree, &mut overlay, "a");
            text::split_run(&mut tx, run, 5).unwrap();
            assert_eq!(tx.tree().children(para).len(), 2);
        }
        assert_eq!(tree, before);
    }

    #[test]
    fn test_text_edit_moves_comment_anchor() {
        let (mut tree, mut overlay, _, run) = setup();
        let comment = Comment::new(CommentAnchor::range(TextRange::within(run, 6, 11)), "a", "x");
        OverlayOp::AddComment(comment.clone()).apply(&mut overlay).unwrap();
        let mut tx = EditTransaction::new(&mut tree, &mut overlay, "a");
        text::insert_text(&mut tx, run, 0, ">> ").unwrap();
        let (ops, notices) = tx.commit().unwrap();
        assert_eq!(ops.len(), 2);
        assert!(notices.is_empty());
        assert_eq!(
            overlay.comment(comment.id).unwrap().anchor,
            CommentAnchor::range(TextRange::within(run, 9, 14))
        );
    }

    #[test]
    fn test_commit_orphans_comment_on_removed_text() {
        let (mut tree, mut overlay, para, run) = setup();
        let comment = Comment::new(CommentAnchor::range(TextRange::within(run, 6, 11)), "a", "x");
        OverlayOp::AddComment(comment.clone()).apply(&mut overlay).unwrap();
        let mut tx = EditTransaction::new(&mut tree, &mut overlay, "a");
        text::remove_range(&mut tx, TextRange::within(run, 5, 11)).unwrap();
        let (ops, notices) = tx.commit().unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].reanchored_to, para);
        assert_eq!(overlay.comment(comment.id).unwrap().anchor, CommentAnchor::Node(para));

        // Replaying the inverses restores both the text and the anchor.
        let inverses: Vec<EditOp> = ops.iter().rev().map(EditOp::inverse).collect();
        replay(&mut tree, &mut overlay, &inverses).unwrap();
        assert_eq!(tree.text_of(para), "Hello world");
        assert_eq!(overlay.comment(comment.id).unwrap(), &comment);
    }

    #[test]
    fn test_failed_replay_leaves_state_alone() {
        let (mut tree, mut overlay, _, run) = setup();
        let before = tree.clone();
        let ops = vec![
            EditOp::Tree(TreeOp::EditText {
                node: run,
                offset: 0,
                removed: String::new(),
                inserted: "x".into(),
            }),
            EditOp::Tree(TreeOp::EditText {
                node: run,
                offset: 0,
                removed: "nope".into(),
                inserted: String::new(),
            }),
        ];
        assert!(replay(&mut tree, &mut overlay, &ops).is_err());
        assert_eq!(tree, before);
    }
}
