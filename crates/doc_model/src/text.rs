//! Text positions and run-level editing helpers
//!
//! Offsets count grapheme clusters. Range removal never cuts inside a run:
//! the run is split at the boundary first so each run keeps uniform
//! formatting, then whole inline nodes are detached.

use crate::{DocModelError, NodeId, NodeKind, Result, TreeEditor, TreeOp};
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Number of grapheme clusters in `s`
pub fn grapheme_len(s: &str) -> usize {
    s.graphemes(true).count()
}

/// Byte index of grapheme `offset`; `offset == len` maps to `s.len()`.
pub fn byte_index(s: &str, offset: usize) -> Option<usize> {
    if offset == 0 {
        return Some(0);
    }
    let mut count = 0;
    for (idx, _) in s.grapheme_indices(true) {
        if count == offset {
            return Some(idx);
        }
        count += 1;
    }
    (count == offset).then_some(s.len())
}

/// Substring between two grapheme offsets
pub fn slice_graphemes(s: &str, start: usize, end: usize) -> Option<&str> {
    let a = byte_index(s, start)?;
    let b = byte_index(s, end)?;
    (a <= b).then(|| &s[a..b])
}

/// A position inside a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextPoint {
    pub node: NodeId,
    pub offset: usize,
}

impl TextPoint {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// A span of text between two points in the same paragraph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextRange {
    pub start: TextPoint,
    pub end: TextPoint,
}

impl TextRange {
    pub fn new(start: TextPoint, end: TextPoint) -> Self {
        Self { start, end }
    }

    /// Range inside a single run
    pub fn within(run: NodeId, start: usize, end: usize) -> Self {
        Self::new(TextPoint::new(run, start), TextPoint::new(run, end))
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

fn run_text(editor: &impl TreeEditor, run: NodeId) -> Result<String> {
    let node = editor.tree().node(run)?;
    node.text()
        .map(str::to_string)
        .ok_or_else(|| DocModelError::structural(format!("a {} has no text", node.kind())))
}

/// Split `run` at `offset`. The left part keeps the id; the right part
/// becomes a new sibling with the same formatting and style. Returns `None`
/// when the offset is at either end and no split is needed.
pub fn split_run<E: TreeEditor>(editor: &mut E, run: NodeId, offset: usize) -> Result<Option<NodeId>> {
    let text = run_text(editor, run)?;
    let len = grapheme_len(&text);
    if offset > len {
        return Err(DocModelError::InvalidOffset {
            node_id: run,
            offset,
            len,
        });
    }
    if offset == 0 || offset == len {
        return Ok(None);
    }
    let tree = editor.tree();
    let parent = tree
        .parent(run)
        .ok_or_else(|| DocModelError::structural("cannot split a detached run"))?;
    let index = tree
        .index_in_parent(run)
        .ok_or_else(|| DocModelError::structural("run missing from its paragraph"))?;
    let right = slice_graphemes(&text, offset, len)
        .unwrap_or_default()
        .to_string();
    let mut copy = tree.node(run)?.fresh_copy();
    if let crate::NodeData::Run { text } = copy.data_mut() {
        *text = right.clone();
    }
    let new_run = editor.create(copy)?;
    editor.before_split(run, offset, new_run)?;
    editor.apply(TreeOp::EditText {
        node: run,
        offset,
        removed: right,
        inserted: String::new(),
    })?;
    editor.apply(TreeOp::Attach {
        node: new_run,
        parent,
        index: index + 1,
    })?;
    Ok(Some(new_run))
}

/// Insert text into a run at `offset`.
pub fn insert_text<E: TreeEditor>(editor: &mut E, run: NodeId, offset: usize, text: &str) -> Result<()> {
    let current = run_text(editor, run)?;
    let len = grapheme_len(&current);
    if offset > len {
        return Err(DocModelError::InvalidOffset {
            node_id: run,
            offset,
            len,
        });
    }
    editor.apply(TreeOp::EditText {
        node: run,
        offset,
        removed: String::new(),
        inserted: text.to_string(),
    })
}

/// Split at both ends of `range` and return the inline nodes it covers, in
/// order. Nothing is removed.
pub fn isolate_range<E: TreeEditor>(editor: &mut E, range: TextRange) -> Result<Vec<NodeId>> {
    let TextRange { start, end } = range;
    let tree = editor.tree();
    for point in [start, end] {
        let kind = tree.kind(point.node)?;
        if kind != NodeKind::Run {
            return Err(DocModelError::structural(format!(
                "text ranges must start and end in runs, not a {kind}"
            )));
        }
    }
    let paragraph = tree
        .parent(start.node)
        .ok_or_else(|| DocModelError::structural("range start is detached"))?;
    if tree.parent(end.node) != Some(paragraph) {
        return Err(DocModelError::structural("text ranges cannot span paragraphs"));
    }
    let start_index = tree.index_in_parent(start.node).unwrap_or(0);
    let end_index = tree.index_in_parent(end.node).unwrap_or(0);
    if start_index > end_index || (start.node == end.node && start.offset > end.offset) {
        return Err(DocModelError::structural("range start lies after its end"));
    }
    let start_len = tree.node(start.node)?.text_len();
    let end_len = tree.node(end.node)?.text_len();
    if start.offset > start_len || end.offset > end_len {
        return Err(DocModelError::InvalidOffset {
            node_id: if start.offset > start_len { start.node } else { end.node },
            offset: start.offset.max(end.offset),
            len: start_len.max(end_len),
        });
    }

    // Last covered node, decided before any split shifts indices.
    let last = if end.offset == 0 {
        end_index.checked_sub(1).map(|i| tree.children(paragraph)[i])
    } else {
        Some(end.node)
    };
    if end.offset > 0 && end.offset < end_len {
        split_run(editor, end.node, end.offset)?;
    }

    let mut last = last;
    let first = if start.offset == 0 {
        Some(start.node)
    } else if start.offset < start_len {
        let right = split_run(editor, start.node, start.offset)?;
        // Covered text of a single-run range moved into the right half.
        if right.is_some() && last == Some(start.node) {
            last = right;
        }
        right
    } else {
        let tree = editor.tree();
        let idx = tree.index_in_parent(start.node).unwrap_or(0);
        tree.children(paragraph).get(idx + 1).copied()
    };

    let (Some(first), Some(last)) = (first, last) else {
        return Ok(Vec::new());
    };
    let tree = editor.tree();
    let (Some(a), Some(b)) = (tree.index_in_parent(first), tree.index_in_parent(last)) else {
        return Ok(Vec::new());
    };
    if a > b {
        return Ok(Vec::new());
    }
    Ok(tree.children(paragraph)[a..=b].to_vec())
}

/// Remove the text covered by `range`, splitting runs at the edges.
/// Returns the detached nodes.
pub fn remove_range<E: TreeEditor>(editor: &mut E, range: TextRange) -> Result<Vec<NodeId>> {
    let covered = isolate_range(editor, range)?;
    for id in covered.iter().rev() {
        let tree = editor.tree();
        let parent = tree
            .parent(*id)
            .ok_or_else(|| DocModelError::structural("covered node lost its parent"))?;
        let index = tree.index_in_parent(*id).unwrap_or(0);
        editor.apply(TreeOp::Detach {
            node: *id,
            parent,
            index,
        })?;
    }
    Ok(covered)
}
