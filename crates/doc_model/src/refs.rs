//! Reference counts on node ids held by history and overlay entries
//!
//! A detached node stays in the arena as a tombstone while any entry holds a
//! reference to it. The history engine consults the tracked-change count
//! before discarding old entries; comment anchors never pin history.

use crate::NodeId;
use std::collections::HashMap;

/// Who holds a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefHolder {
    History,
    /// Pending tracked changes
    Change,
    /// Comment anchors, current and former
    Comment,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counts {
    history: usize,
    change: usize,
    comment: usize,
}

impl Counts {
    fn total(&self) -> usize {
        self.history + self.change + self.comment
    }

    fn slot(&mut self, holder: RefHolder) -> &mut usize {
        match holder {
            RefHolder::History => &mut self.history,
            RefHolder::Change => &mut self.change,
            RefHolder::Comment => &mut self.comment,
        }
    }
}

/// Shared reference ledger
#[derive(Debug, Clone, Default)]
pub struct NodeRefs {
    counts: HashMap<NodeId, Counts>,
}

impl NodeRefs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retain(&mut self, id: NodeId, holder: RefHolder) {
        *self.counts.entry(id).or_default().slot(holder) += 1;
    }

    /// Drop one reference. Releasing an id that is not held is a no-op.
    pub fn release(&mut self, id: NodeId, holder: RefHolder) {
        let Some(counts) = self.counts.get_mut(&id) else {
            return;
        };
        let slot = counts.slot(holder);
        *slot = slot.saturating_sub(1);
        if counts.total() == 0 {
            self.counts.remove(&id);
        }
    }

    pub fn retain_all(&mut self, ids: impl IntoIterator<Item = NodeId>, holder: RefHolder) {
        for id in ids {
            self.retain(id, holder);
        }
    }

    pub fn release_all(&mut self, ids: impl IntoIterator<Item = NodeId>, holder: RefHolder) {
        for id in ids {
            self.release(id, holder);
        }
    }

    pub fn is_referenced(&self, id: NodeId) -> bool {
        self.counts.contains_key(&id)
    }

    /// Overlay references of either kind
    pub fn overlay_count(&self, id: NodeId) -> usize {
        self.counts.get(&id).map(|c| c.change + c.comment).unwrap_or(0)
    }

    pub fn change_count(&self, id: NodeId) -> usize {
        self.counts.get(&id).map(|c| c.change).unwrap_or(0)
    }

    pub fn history_count(&self, id: NodeId) -> usize {
        self.counts.get(&id).map(|c| c.history).unwrap_or(0)
    }

    /// Drop every reference held by one side
    pub fn clear_holder(&mut self, holder: RefHolder) {
        for counts in self.counts.values_mut() {
            *counts.slot(holder) = 0;
        }
        self.counts.retain(|_, c| c.total() > 0);
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
