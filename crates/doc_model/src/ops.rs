//! Reversible tree operations
//!
//! Every change to a [`DocumentTree`] that the history engine records is one
//! of these. Each op carries enough state to build its inverse, and `apply`
//! checks that the tree still looks the way the op expects before touching
//! anything.

use crate::{
    DocModelError, DocumentMetadata, DocumentTree, Node, NodeData, NodeId, Property,
    PropertyValue, Result, Style, StyleId, Theme,
};
use serde::{Deserialize, Serialize};

/// A single reversible edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeOp {
    /// insertNode: attach an existing detached node
    Attach {
        node: NodeId,
        parent: NodeId,
        index: usize,
    },
    /// deleteNode: detach a live node, leaving a tombstone
    Detach {
        node: NodeId,
        parent: NodeId,
        index: usize,
    },
    /// moveRange: relocate a live node
    Move {
        node: NodeId,
        from_parent: NodeId,
        from_index: usize,
        to_parent: NodeId,
        to_index: usize,
    },
    /// setProperty on direct formatting
    SetProperty {
        node: NodeId,
        property: Property,
        old: Option<PropertyValue>,
        new: Option<PropertyValue>,
    },
    SetStyleRef {
        node: NodeId,
        old: Option<StyleId>,
        new: Option<StyleId>,
    },
    /// Replace `removed` with `inserted` at a grapheme offset of a run
    EditText {
        node: NodeId,
        offset: usize,
        removed: String,
        inserted: String,
    },
    ReplaceData {
        node: NodeId,
        old: NodeData,
        new: NodeData,
    },
    PutStyle {
        id: StyleId,
        old: Option<Style>,
        new: Option<Style>,
    },
    SetTheme {
        old: Theme,
        new: Theme,
    },
    SetMetadata {
        old: DocumentMetadata,
        new: DocumentMetadata,
    },
}

fn stale(what: &str) -> DocModelError {
    DocModelError::structural(format!("stale {what}: tree no longer matches the recorded state"))
}

impl TreeOp {
    /// Apply to `tree`. On error the tree is unchanged.
    pub fn apply(&self, tree: &mut DocumentTree) -> Result<()> {
        match self {
            TreeOp::Attach { node, parent, index } => tree.attach(*node, *parent, *index),
            TreeOp::Detach { node, parent, index } => {
                if tree.parent(*node) != Some(*parent) || tree.index_in_parent(*node) != Some(*index) {
                    return Err(stale("detach"));
                }
                tree.detach(*node).map(|_| ())
            }
            TreeOp::Move {
                node,
                from_parent,
                from_index,
                to_parent,
                to_index,
            } => {
                if tree.parent(*node) != Some(*from_parent)
                    || tree.index_in_parent(*node) != Some(*from_index)
                {
                    return Err(stale("move"));
                }
                tree.move_node(*node, *to_parent, *to_index).map(|_| ())
            }
            TreeOp::SetProperty {
                node,
                property,
                old,
                new,
            } => {
                if tree.node(*node)?.direct_formatting().get(*property) != old.as_ref() {
                    return Err(stale("property edit"));
                }
                tree.set_direct_formatting(*node, *property, new.clone()).map(|_| ())
            }
            TreeOp::SetStyleRef { node, old, new } => {
                if tree.node(*node)?.style_ref() != old.as_ref() {
                    return Err(stale("style reference"));
                }
                tree.set_style_ref(*node, new.clone()).map(|_| ())
            }
            TreeOp::EditText {
                node,
                offset,
                removed,
                inserted,
            } => tree.replace_text(*node, *offset, removed, inserted),
            TreeOp::ReplaceData { node, old, new } => {
                if tree.node(*node)?.data() != old {
                    return Err(stale("payload edit"));
                }
                tree.replace_data(*node, new.clone()).map(|_| ())
            }
            TreeOp::PutStyle { id, old, new } => {
                if tree.styles().get(id) != old.as_ref() {
                    return Err(stale("style edit"));
                }
                match new {
                    Some(style) => tree.put_style(style.clone()).map(|_| ()),
                    None => tree.remove_style(id).map(|_| ()),
                }
            }
            TreeOp::SetTheme { new, .. } => {
                tree.set_theme(new.clone());
                Ok(())
            }
            TreeOp::SetMetadata { new, .. } => {
                tree.set_metadata(new.clone());
                Ok(())
            }
        }
    }

    /// The op that undoes this one
    pub fn inverse(&self) -> TreeOp {
        match self.clone() {
            TreeOp::Attach { node, parent, index } => TreeOp::Detach { node, parent, index },
            TreeOp::Detach { node, parent, index } => TreeOp::Attach { node, parent, index },
            TreeOp::Move {
                node,
                from_parent,
                from_index,
                to_parent,
                to_index,
            } => TreeOp::Move {
                node,
                from_parent: to_parent,
                from_index: to_index,
                to_parent: from_parent,
                to_index: from_index,
            },
            TreeOp::SetProperty {
                node,
                property,
                old,
                new,
            } => TreeOp::SetProperty {
                node,
                property,
                old: new,
                new: old,
            },
            TreeOp::SetStyleRef { node, old, new } => TreeOp::SetStyleRef {
                node,
                old: new,
                new: old,
            },
            TreeOp::EditText {
                node,
                offset,
                removed,
                inserted,
            } => TreeOp::EditText {
                node,
                offset,
                removed: inserted,
                inserted: removed,
            },
            TreeOp::ReplaceData { node, old, new } => TreeOp::ReplaceData {
                node,
                old: new,
                new: old,
            },
            TreeOp::PutStyle { id, old, new } => TreeOp::PutStyle { id, old: new, new: old },
            TreeOp::SetTheme { old, new } => TreeOp::SetTheme { old: new, new: old },
            TreeOp::SetMetadata { old, new } => TreeOp::SetMetadata { old: new, new: old },
        }
    }

    /// Node ids this op refers to
    pub fn nodes(&self) -> Vec<NodeId> {
        match self {
            TreeOp::Attach { node, parent, .. } | TreeOp::Detach { node, parent, .. } => {
                vec![*node, *parent]
            }
            TreeOp::Move {
                node,
                from_parent,
                to_parent,
                ..
            } => vec![*node, *from_parent, *to_parent],
            TreeOp::SetProperty { node, .. }
            | TreeOp::SetStyleRef { node, .. }
            | TreeOp::EditText { node, .. }
            | TreeOp::ReplaceData { node, .. } => vec![*node],
            TreeOp::PutStyle { .. } | TreeOp::SetTheme { .. } | TreeOp::SetMetadata { .. } => {
                Vec::new()
            }
        }
    }

    /// Root of the subtree whose resolved formatting this op can change.
    ///
    /// Style and theme edits are not listed: the resolve cache detects those
    /// through style revisions and the theme version.
    pub fn formatting_scope(&self) -> Option<NodeId> {
        match self {
            TreeOp::Attach { node, .. }
            | TreeOp::Detach { node, .. }
            | TreeOp::Move { node, .. }
            | TreeOp::SetProperty { node, .. }
            | TreeOp::SetStyleRef { node, .. } => Some(*node),
            _ => None,
        }
    }

    /// Pure text insertion, a candidate for coalescing
    pub fn is_text_insertion(&self) -> bool {
        matches!(self, TreeOp::EditText { removed, .. } if removed.is_empty())
    }

    pub fn is_set_property(&self) -> bool {
        matches!(self, TreeOp::SetProperty { .. })
    }

    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            TreeOp::Attach { .. } | TreeOp::Detach { .. } | TreeOp::Move { .. }
        )
    }
}

/// Something that can apply tree ops and create nodes: a plain
/// [`Transaction`] or an engine transaction that also records overlay ops.
pub trait TreeEditor {
    fn tree(&self) -> &DocumentTree;
    fn create(&mut self, node: Node) -> Result<NodeId>;
    fn apply(&mut self, op: TreeOp) -> Result<()>;

    /// Called by [`crate::text::split_run`] once the right half exists and
    /// before any text moves into it. Editors that track positions inside
    /// runs remap them here.
    fn before_split(&mut self, _run: NodeId, _offset: usize, _right: NodeId) -> Result<()> {
        Ok(())
    }
}

/// All-or-nothing batch of tree ops.
///
/// Ops take effect as they are applied so later steps can see them. If the
/// transaction is dropped without [`Transaction::commit`], applied ops are
/// undone in reverse order.
pub struct Transaction<'a> {
    tree: &'a mut DocumentTree,
    applied: Vec<TreeOp>,
    committed: bool,
}

impl<'a> Transaction<'a> {
    pub fn new(tree: &'a mut DocumentTree) -> Self {
        Self {
            tree,
            applied: Vec::new(),
            committed: false,
        }
    }

    /// Ops applied so far
    pub fn applied(&self) -> &[TreeOp] {
        &self.applied
    }

    /// Keep the changes and hand back the applied ops
    pub fn commit(mut self) -> Vec<TreeOp> {
        self.committed = true;
        std::mem::take(&mut self.applied)
    }

    fn rollback(&mut self) {
        while let Some(op) = self.applied.pop() {
            if let Err(e) = op.inverse().apply(self.tree) {
                tracing::error!("rollback of {:?} failed: {}", op, e);
            }
        }
    }
}

impl TreeEditor for Transaction<'_> {
    fn tree(&self) -> &DocumentTree {
        self.tree
    }

    fn create(&mut self, node: Node) -> Result<NodeId> {
        self.tree.create(node)
    }

    fn apply(&mut self, op: TreeOp) -> Result<()> {
        op.apply(self.tree)?;
        self.applied.push(op);
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Node, StyleId};

    fn setup() -> (DocumentTree, NodeId, NodeId) {
        let mut tree = DocumentTree::new();
        let section = tree.append(tree.root_id(), Node::section()).unwrap();
        let para = tree.append(section, Node::paragraph()).unwrap();
        let run = tree.append(para, Node::run("Hello")).unwrap();
        (tree, para, run)
    }

    #[test]
    fn test_every_op_inverts() {
        let (mut tree, para, run) = setup();
        let section = tree.parent(para).unwrap();
        let other = tree.append(section, Node::paragraph()).unwrap();
        let ops = vec![
            TreeOp::SetProperty {
                node: run,
                property: Property::Bold,
                old: None,
                new: Some(true.into()),
            },
            TreeOp::SetStyleRef {
                node: para,
                old: None,
                new: Some(StyleId::new("Heading1")),
            },
            TreeOp::EditText {
                node: run,
                offset: 5,
                removed: String::new(),
                inserted: "!".into(),
            },
            TreeOp::Move {
                node: run,
                from_parent: para,
                from_index: 0,
                to_parent: other,
                to_index: 0,
            },
            TreeOp::Detach {
                node: other,
                parent: section,
                index: 1,
            },
        ];
        for op in ops {
            let before = tree.clone();
            op.apply(&mut tree).unwrap();
            assert_ne!(tree, before, "{op:?} changed nothing");
            op.inverse().apply(&mut tree).unwrap();
            assert_eq!(tree, before, "{op:?} did not invert");
            op.apply(&mut tree).unwrap();
        }
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_stale_detach_is_rejected() {
        let (mut tree, para, run) = setup();
        let op = TreeOp::Detach {
            node: run,
            parent: para,
            index: 3,
        };
        assert!(op.apply(&mut tree).is_err());
        assert!(tree.is_attached(run));
    }

    #[test]
    fn test_stale_property_edit_is_rejected() {
        let (mut tree, _, run) = setup();
        let op = TreeOp::SetProperty {
            node: run,
            property: Property::Bold,
            old: Some(false.into()),
            new: Some(true.into()),
        };
        assert!(op.apply(&mut tree).is_err());
    }

    #[test]
    fn test_style_put_and_remove_invert() {
        let (mut tree, _, _) = setup();
        let style = Style::paragraph("Note", "Note").with_based_on("Normal");
        let op = TreeOp::PutStyle {
            id: style.id.clone(),
            old: None,
            new: Some(style),
        };
        op.apply(&mut tree).unwrap();
        assert!(tree.styles().contains(&StyleId::new("Note")));
        op.inverse().apply(&mut tree).unwrap();
        assert!(!tree.styles().contains(&StyleId::new("Note")));
    }

    #[test]
    fn test_transaction_rolls_back_on_drop() {
        let (mut tree, para, run) = setup();
        let before = tree.clone();
        {
            let mut tx = Transaction::new(&mut tree);
            tx.apply(TreeOp::Detach {
                node: run,
                parent: para,
                index: 0,
            })
            .unwrap();
            assert!(!tx.tree().is_attached(run));
        }
        assert_eq!(tree, before);
    }
}
