//! Command system for document editing
//!
//! A command is a small value describing one user action. The engine runs
//! it inside an [`EditTransaction`] and records whatever ops it applied as
//! one history entry. When the overlay is tracking, structural, text and
//! formatting commands go through the tracked variants instead.

use crate::{Coalesce, EditError, EditTransaction, Result};
use doc_model::{
    text, DocModelError, Node, NodeId, NodeKind, Property, PropertyValue, StyleId, TextRange,
    TreeEditor, TreeOp,
};
use revisions::{
    tracked_insert, tracked_insert_text, tracked_move, tracked_remove, tracked_remove_range,
    tracked_set_property, ChangeId,
};

/// Trait for all editing commands
pub trait Command: std::fmt::Debug {
    type Output;

    /// Apply this command through `tx`. On error the engine drops the
    /// transaction, which undoes whatever was applied.
    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<Self::Output>;

    /// Get a display name for this command
    fn display_name(&self) -> &str;

    /// Whether consecutive runs of this command may share a history entry
    fn coalesce(&self) -> Option<Coalesce> {
        None
    }
}

fn detach(tx: &mut EditTransaction<'_>, node: NodeId) -> Result<()> {
    let tree = tx.tree();
    if tree.kind(node)? == NodeKind::Document {
        return Err(DocModelError::structural("the document node cannot be removed").into());
    }
    let parent = tree
        .parent(node)
        .ok_or_else(|| DocModelError::structural(format!("node {} is already detached", node.short())))?;
    let index = tree
        .index_in_parent(node)
        .ok_or_else(|| DocModelError::structural("node missing from its parent"))?;
    tx.apply(TreeOp::Detach { node, parent, index })?;
    Ok(())
}

// =============================================================================
// Structure
// =============================================================================

/// Insert a new node under `parent` at `index`
#[derive(Debug, Clone)]
pub struct InsertNode {
    pub parent: NodeId,
    pub index: usize,
    pub node: Node,
}

impl InsertNode {
    pub fn new(parent: NodeId, index: usize, node: Node) -> Self {
        Self { parent, index, node }
    }
}

impl Command for InsertNode {
    type Output = NodeId;

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<NodeId> {
        if let Some(author) = tx.tracking_author() {
            return Ok(tracked_insert(tx, &author, self.parent, self.index, self.node.clone())?);
        }
        let id = tx.create(self.node.clone())?;
        tx.apply(TreeOp::Attach {
            node: id,
            parent: self.parent,
            index: self.index,
        })?;
        Ok(id)
    }

    fn display_name(&self) -> &str {
        "Insert"
    }
}

/// Remove a node and its subtree. While tracking, the node is only marked
/// deleted and the new change id is returned.
#[derive(Debug, Clone)]
pub struct RemoveNode {
    pub node: NodeId,
}

impl RemoveNode {
    pub fn new(node: NodeId) -> Self {
        Self { node }
    }
}

impl Command for RemoveNode {
    type Output = Option<ChangeId>;

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<Option<ChangeId>> {
        if let Some(author) = tx.tracking_author() {
            return Ok(tracked_remove(tx, &author, self.node)?);
        }
        detach(tx, self.node)?;
        Ok(None)
    }

    fn display_name(&self) -> &str {
        "Delete"
    }
}

/// Remove the text covered by a range, splitting runs at its edges
#[derive(Debug, Clone)]
pub struct RemoveRange {
    pub range: TextRange,
}

impl RemoveRange {
    pub fn new(range: TextRange) -> Self {
        Self { range }
    }
}

impl Command for RemoveRange {
    type Output = Option<ChangeId>;

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<Option<ChangeId>> {
        if let Some(author) = tx.tracking_author() {
            return Ok(tracked_remove_range(tx, &author, self.range)?);
        }
        text::remove_range(tx, self.range)?;
        Ok(None)
    }

    fn display_name(&self) -> &str {
        "Delete"
    }
}

/// Move a node. `index` counts positions after the node is taken out.
#[derive(Debug, Clone)]
pub struct MoveNode {
    pub node: NodeId,
    pub parent: NodeId,
    pub index: usize,
}

impl MoveNode {
    pub fn new(node: NodeId, parent: NodeId, index: usize) -> Self {
        Self { node, parent, index }
    }
}

impl Command for MoveNode {
    type Output = Option<ChangeId>;

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<Option<ChangeId>> {
        if let Some(author) = tx.tracking_author() {
            return Ok(tracked_move(tx, &author, self.node, self.parent, self.index)?);
        }
        let tree = tx.tree();
        let from_parent = tree
            .parent(self.node)
            .ok_or_else(|| DocModelError::structural("cannot move a detached node"))?;
        let from_index = tree.index_in_parent(self.node).unwrap_or(0);
        tx.apply(TreeOp::Move {
            node: self.node,
            from_parent,
            from_index,
            to_parent: self.parent,
            to_index: self.index,
        })?;
        Ok(None)
    }

    fn display_name(&self) -> &str {
        "Move"
    }
}

// =============================================================================
// Text
// =============================================================================

/// Insert text into a run. Returns the run now holding the text, which is a
/// new run when tracking.
#[derive(Debug, Clone)]
pub struct InsertText {
    pub run: NodeId,
    pub offset: usize,
    pub text: String,
}

impl InsertText {
    pub fn new(run: NodeId, offset: usize, text: impl Into<String>) -> Self {
        Self {
            run,
            offset,
            text: text.into(),
        }
    }
}

impl Command for InsertText {
    type Output = NodeId;

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<NodeId> {
        if self.text.is_empty() {
            return Err(EditError::InvalidCommand("nothing to insert".to_string()));
        }
        if let Some(author) = tx.tracking_author() {
            return Ok(tracked_insert_text(tx, &author, self.run, self.offset, &self.text)?);
        }
        text::insert_text(tx, self.run, self.offset, &self.text)?;
        Ok(self.run)
    }

    fn display_name(&self) -> &str {
        "Typing"
    }

    fn coalesce(&self) -> Option<Coalesce> {
        Some(Coalesce::Typing)
    }
}

/// Split a run in two at a grapheme offset
#[derive(Debug, Clone)]
pub struct SplitRun {
    pub run: NodeId,
    pub offset: usize,
}

impl Command for SplitRun {
    type Output = Option<NodeId>;

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<Option<NodeId>> {
        Ok(text::split_run(tx, self.run, self.offset)?)
    }

    fn display_name(&self) -> &str {
        "Split"
    }
}

// =============================================================================
// Formatting
// =============================================================================

/// Set or clear one direct formatting property
#[derive(Debug, Clone)]
pub struct SetDirectFormatting {
    pub node: NodeId,
    pub property: Property,
    pub value: Option<PropertyValue>,
}

impl SetDirectFormatting {
    pub fn new(node: NodeId, property: Property, value: Option<PropertyValue>) -> Self {
        Self { node, property, value }
    }
}

impl Command for SetDirectFormatting {
    type Output = ();

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<()> {
        if let Some(author) = tx.tracking_author() {
            tracked_set_property(tx, &author, self.node, self.property, self.value.clone())?;
            return Ok(());
        }
        let old = tx
            .tree()
            .node(self.node)?
            .direct_formatting()
            .get(self.property)
            .cloned();
        if old == self.value {
            return Ok(());
        }
        tx.apply(TreeOp::SetProperty {
            node: self.node,
            property: self.property,
            old,
            new: self.value.clone(),
        })?;
        Ok(())
    }

    fn display_name(&self) -> &str {
        "Format"
    }

    fn coalesce(&self) -> Option<Coalesce> {
        Some(Coalesce::Formatting)
    }
}

/// Point a node at a named style, or clear its style
#[derive(Debug, Clone)]
pub struct SetStyleRef {
    pub node: NodeId,
    pub style: Option<StyleId>,
}

impl SetStyleRef {
    pub fn new(node: NodeId, style: Option<StyleId>) -> Self {
        Self { node, style }
    }
}

impl Command for SetStyleRef {
    type Output = ();

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<()> {
        let old = tx.tree().node(self.node)?.style_ref().cloned();
        if old == self.style {
            return Ok(());
        }
        tx.apply(TreeOp::SetStyleRef {
            node: self.node,
            old,
            new: self.style.clone(),
        })?;
        Ok(())
    }

    fn display_name(&self) -> &str {
        "Apply Style"
    }
}
