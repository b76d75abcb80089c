//! Undo/redo history with coalescing and overlay pinning

use doc_model::{DocumentTree, NodeId, NodeRefs, RefHolder, TreeOp};
use revisions::{Overlay, OverlayOp};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One recorded step: a tree op or an overlay op
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EditOp {
    Tree(TreeOp),
    Overlay(OverlayOp),
}

impl EditOp {
    pub fn inverse(&self) -> EditOp {
        match self {
            EditOp::Tree(op) => EditOp::Tree(op.inverse()),
            EditOp::Overlay(op) => EditOp::Overlay(op.inverse()),
        }
    }

    pub fn nodes(&self) -> Vec<NodeId> {
        match self {
            EditOp::Tree(op) => op.nodes(),
            EditOp::Overlay(op) => op.nodes(),
        }
    }

    pub fn apply(&self, tree: &mut DocumentTree, overlay: &mut Overlay) -> crate::Result<()> {
        match self {
            EditOp::Tree(op) => op.apply(tree)?,
            EditOp::Overlay(op) => op.apply(overlay)?,
        }
        Ok(())
    }

    pub fn as_tree(&self) -> Option<&TreeOp> {
        match self {
            EditOp::Tree(op) => Some(op),
            EditOp::Overlay(_) => None,
        }
    }
}

/// Kind of user action an entry may be merged with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Coalesce {
    Typing,
    Formatting,
}

/// An applied command as recorded for undo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub label: String,
    pub actor: String,
    /// Selection epoch the command ran in
    pub epoch: u64,
    pub coalesce: Option<Coalesce>,
    /// Commands merged into this entry
    pub merged: usize,
    pub ops: Vec<EditOp>,
}

impl HistoryEntry {
    pub fn new(label: impl Into<String>, actor: impl Into<String>, epoch: u64, ops: Vec<EditOp>) -> Self {
        Self {
            label: label.into(),
            actor: actor.into(),
            epoch,
            coalesce: None,
            merged: 1,
            ops,
        }
    }

    pub fn with_coalesce(mut self, coalesce: Option<Coalesce>) -> Self {
        self.coalesce = coalesce;
        self
    }

    fn nodes(&self) -> Vec<NodeId> {
        self.ops.iter().flat_map(EditOp::nodes).collect()
    }

    fn accepts(&self, next: &HistoryEntry, window: usize) -> bool {
        self.coalesce.is_some()
            && self.coalesce == next.coalesce
            && self.actor == next.actor
            && self.epoch == next.epoch
            && self.merged + next.merged <= window
    }
}

/// Manages undo and redo stacks
pub struct UndoManager {
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    /// Maximum number of undo entries, unless pinned
    max_entries: usize,
    /// Maximum number of commands merged into one entry
    coalesce_window: usize,
    /// Whether the top entry may still absorb the next command
    open: bool,
}

impl UndoManager {
    pub fn new() -> Self {
        Self::with_limits(100, 20)
    }

    /// Create with custom limits
    pub fn with_limits(max_entries: usize, coalesce_window: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_entries: max_entries.max(1),
            coalesce_window: coalesce_window.max(1),
            open: false,
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn coalesce_window(&self) -> usize {
        self.coalesce_window
    }

    /// Record an applied command. Clears the redo stack.
    pub fn push(&mut self, entry: HistoryEntry, refs: &mut NodeRefs) {
        for dropped in self.redo_stack.drain(..) {
            refs.release_all(dropped.nodes(), RefHolder::History);
        }
        refs.retain_all(entry.nodes(), RefHolder::History);

        if self.open {
            if let Some(last) = self.undo_stack.back_mut() {
                if last.accepts(&entry, self.coalesce_window) {
                    tracing::debug!("coalesced '{}' into '{}'", entry.label, last.label);
                    last.merged += entry.merged;
                    last.ops.extend(entry.ops);
                    return;
                }
            }
        }
        self.undo_stack.push_back(entry);
        self.open = true;
        self.trim(refs);
    }

    /// Drop the oldest entries beyond the limit. Entries touching a node a
    /// pending tracked change holds are kept and skipped over; comment
    /// anchors never pin. The newest entry is always kept. Undoing across a
    /// dropped entry later fails the stale-state check of the kept one and
    /// leaves the document untouched.
    pub fn trim(&mut self, refs: &mut NodeRefs) {
        let mut index = 0;
        while self.undo_stack.len() > self.max_entries && index + 1 < self.undo_stack.len() {
            let pinned = self.undo_stack[index]
                .nodes()
                .iter()
                .any(|n| refs.change_count(*n) > 0);
            if pinned {
                index += 1;
                continue;
            }
            if let Some(dropped) = self.undo_stack.remove(index) {
                refs.release_all(dropped.nodes(), RefHolder::History);
            }
        }
        if self.undo_stack.len() > self.max_entries {
            tracing::debug!(
                "history over limit ({} > {}): {} entries pinned by tracked changes",
                self.undo_stack.len(),
                self.max_entries,
                index
            );
        }
    }

    /// Take the newest entry for undo. The caller applies its inverse and
    /// hands it back with [`UndoManager::push_redo`] on success.
    pub fn pop_undo(&mut self) -> Option<HistoryEntry> {
        self.open = false;
        self.undo_stack.pop_back()
    }

    pub fn push_redo(&mut self, entry: HistoryEntry) {
        self.redo_stack.push(entry);
    }

    pub fn pop_redo(&mut self) -> Option<HistoryEntry> {
        self.open = false;
        self.redo_stack.pop()
    }

    /// Put an entry back on the undo stack without clearing redo, after a
    /// redo or a failed undo
    pub fn push_undo(&mut self, entry: HistoryEntry) {
        self.undo_stack.push_back(entry);
    }

    /// Stop the top entry from absorbing further commands
    pub fn seal(&mut self) {
        self.open = false;
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn undo_label(&self) -> Option<&str> {
        self.undo_stack.back().map(|e| e.label.as_str())
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.redo_stack.last().map(|e| e.label.as_str())
    }

    /// Labels of undoable entries, newest first
    pub fn undo_labels(&self) -> Vec<&str> {
        self.undo_stack.iter().rev().map(|e| e.label.as_str()).collect()
    }

    pub fn redo_labels(&self) -> Vec<&str> {
        self.redo_stack.iter().rev().map(|e| e.label.as_str()).collect()
    }

    /// Clear all undo/redo history
    pub fn clear(&mut self, refs: &mut NodeRefs) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        refs.clear_holder(RefHolder::History);
        self.open = false;
    }
}

impl Default for UndoManager {
    fn default() -> Self {
        Self::new()
    }
}
