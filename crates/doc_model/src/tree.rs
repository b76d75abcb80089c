//! Arena-backed content tree
//!
//! Nodes live in a table keyed by [`NodeId`]; structure is expressed only
//! through `parent`/`children` ids. Removing a node detaches it from the live
//! tree but leaves it in the arena, so history and overlay entries can keep
//! pointing at it until [`DocumentTree::collect_garbage`] finds no holder.
//!
//! Nodes are stored behind `Arc`, which makes cloning the whole tree cheap:
//! a background export works on a clone while later edits copy only the nodes
//! they touch.

use crate::text::{byte_index, grapheme_len};
use crate::{
    DocModelError, DocumentDefaults, DocumentMetadata, Field, FieldKind, Node, NodeData, NodeId,
    NodeKind, NodeRefs, Property, PropertyValue, Result, Style, StyleId, StyleRegistry, StyleType,
    Theme,
};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use unicode_segmentation::UnicodeSegmentation;

/// The complete document: content nodes plus styles, theme, defaults and
/// metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "TreeRepr", try_from = "TreeRepr")]
pub struct DocumentTree {
    root: NodeId,
    nodes: HashMap<NodeId, Arc<Node>>,
    styles: StyleRegistry,
    theme: Theme,
    theme_version: u64,
    defaults: DocumentDefaults,
    metadata: DocumentMetadata,
    version: u64,
}

/// Two trees are equal when their live content, styles, theme, defaults and
/// metadata match. Tombstones are storage detail and do not take part.
impl PartialEq for DocumentTree {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
            && self.live_nodes() == other.live_nodes()
            && self.styles == other.styles
            && self.theme == other.theme
            && self.defaults == other.defaults
            && self.metadata == other.metadata
    }
}

/// Word and paragraph counts over the live tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStatistics {
    pub paragraphs: usize,
    pub words: usize,
    pub characters: usize,
    pub characters_no_spaces: usize,
}

impl DocumentTree {
    /// Create a tree holding only the document node
    pub fn new() -> Self {
        let root = Node::new(NodeData::Document);
        let root_id = root.id();
        let mut nodes = HashMap::new();
        nodes.insert(root_id, Arc::new(root));
        Self {
            root: root_id,
            nodes,
            styles: StyleRegistry::new(),
            theme: Theme::default(),
            theme_version: 0,
            defaults: DocumentDefaults::default(),
            metadata: DocumentMetadata::default(),
            version: 0,
        }
    }

    /// Create a tree with one section holding one empty paragraph
    pub fn blank() -> Self {
        let mut tree = Self::new();
        let root = tree.root;
        // Both inserts are legal on a fresh tree.
        if let Ok(section) = tree.append(root, Node::section()) {
            let _ = tree.append(section, Node::paragraph());
        }
        tree
    }

    /// Replace the style registry wholesale. Used by importers that build
    /// their own registry.
    pub fn with_styles(mut self, styles: StyleRegistry) -> Result<Self> {
        styles.validate()?;
        self.styles = styles;
        Ok(self)
    }

    // ===== Read access =====

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    /// Mutation counter, bumped by every successful edit
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id).map(|n| n.as_ref())
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.get(id).ok_or(DocModelError::NodeNotFound(id))
    }

    /// Owned snapshot of one node
    pub fn query(&self, id: NodeId) -> Result<Node> {
        self.node(id).cloned()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn kind(&self, id: NodeId) -> Result<NodeKind> {
        Ok(self.node(id)?.kind())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.parent())
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|n| n.children()).unwrap_or(&[])
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|c| *c == id)
    }

    /// Arena size, tombstones included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether `id` is reachable from the document node
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        for _ in 0..=self.nodes.len() {
            if current == self.root {
                return true;
            }
            match self.parent(current) {
                Some(p) => current = p,
                None => return false,
            }
        }
        false
    }

    /// Ancestors of `id`, nearest first
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(p) = current {
            if out.contains(&p) {
                break;
            }
            out.push(p);
            current = self.parent(p);
        }
        out
    }

    /// Nearest ancestor of the given kind
    pub fn enclosing(&self, id: NodeId, kind: NodeKind) -> Option<NodeId> {
        self.ancestors(id)
            .into_iter()
            .find(|a| self.get(*a).map(|n| n.kind()) == Some(kind))
    }

    /// `id` and everything below it, pre-order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.get(current) else {
                continue;
            };
            out.push(current);
            stack.extend(node.children().iter().rev());
        }
        out
    }

    /// Every live node in reading order
    pub fn walk(&self) -> Vec<NodeId> {
        self.descendants(self.root)
    }

    fn live_nodes(&self) -> Vec<&Node> {
        self.walk().into_iter().filter_map(|id| self.get(id)).collect()
    }

    /// Live nodes of one kind in reading order
    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        self.walk()
            .into_iter()
            .filter(|id| self.get(*id).map(|n| n.kind()) == Some(kind))
            .collect()
    }

    /// Concatenated display text below `id`
    pub fn text_of(&self, id: NodeId) -> String {
        self.descendants(id)
            .into_iter()
            .filter_map(|d| self.get(d).and_then(|n| n.display_text()))
            .collect()
    }

    /// Plain text of the live document, one line per paragraph
    pub fn plain_text(&self) -> String {
        self.nodes_of_kind(NodeKind::Paragraph)
            .into_iter()
            .map(|p| self.text_of(p))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn statistics(&self) -> DocumentStatistics {
        let mut stats = DocumentStatistics::default();
        for para in self.nodes_of_kind(NodeKind::Paragraph) {
            let text = self.text_of(para);
            stats.paragraphs += 1;
            stats.words += text.unicode_words().count();
            stats.characters += text.graphemes(true).count();
            stats.characters_no_spaces += text
                .graphemes(true)
                .filter(|g| !g.chars().all(char::is_whitespace))
                .count();
        }
        stats
    }

    pub fn styles(&self) -> &StyleRegistry {
        &self.styles
    }

    /// Direct registry access for building documents. Removing styles this
    /// way skips the usage check done by [`DocumentTree::remove_style`].
    pub fn styles_mut(&mut self) -> &mut StyleRegistry {
        self.version += 1;
        &mut self.styles
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    /// Changes every time the theme is replaced
    pub fn theme_version(&self) -> u64 {
        self.theme_version
    }

    pub fn defaults(&self) -> &DocumentDefaults {
        &self.defaults
    }

    pub fn defaults_mut(&mut self) -> &mut DocumentDefaults {
        self.version += 1;
        // Defaults feed every resolved value, same as the theme.
        self.theme_version += 1;
        &mut self.defaults
    }

    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    pub fn set_metadata(&mut self, metadata: DocumentMetadata) -> DocumentMetadata {
        self.version += 1;
        std::mem::replace(&mut self.metadata, metadata)
    }

    // ===== Bookmarks and fields =====

    /// Live bookmark with the given name
    pub fn bookmark(&self, name: &str) -> Option<NodeId> {
        self.nodes_of_kind(NodeKind::Bookmark).into_iter().find(|id| {
            matches!(self.get(*id).map(|n| n.data()), Some(NodeData::Bookmark { name: n }) if n == name)
        })
    }

    pub fn bookmark_names(&self) -> Vec<String> {
        self.nodes_of_kind(NodeKind::Bookmark)
            .into_iter()
            .filter_map(|id| match self.get(id).map(|n| n.data()) {
                Some(NodeData::Bookmark { name }) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// `REF` fields whose bookmark does not exist
    pub fn broken_references(&self) -> Vec<NodeId> {
        let names: HashSet<String> = self.bookmark_names().into_iter().collect();
        self.nodes_of_kind(NodeKind::FieldReference)
            .into_iter()
            .filter(|id| match self.get(*id).map(|n| n.data()) {
                Some(NodeData::FieldReference(Field {
                    kind: FieldKind::Ref(name),
                    ..
                })) => !names.contains(name),
                _ => false,
            })
            .collect()
    }

    /// Text a `REF` field should show: the text of the paragraph holding the
    /// bookmark.
    pub fn reference_text(&self, bookmark: &str) -> Option<String> {
        let mark = self.bookmark(bookmark)?;
        let para = self.enclosing(mark, NodeKind::Paragraph)?;
        Some(self.text_of(para))
    }

    fn bookmark_name_pattern() -> Option<&'static Regex> {
        static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
        PATTERN
            .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,39}$").ok())
            .as_ref()
    }

    /// Validate a bookmark name: a letter or underscore, then up to 39
    /// letters, digits or underscores
    pub fn validate_bookmark_name(name: &str) -> Result<()> {
        if matches!(Self::bookmark_name_pattern(), Some(re) if re.is_match(name)) {
            Ok(())
        } else {
            Err(DocModelError::InvalidBookmarkName(name.to_string()))
        }
    }

    fn check_bookmark_conflicts(&self, subtree_root: NodeId) -> Result<()> {
        let incoming: Vec<&str> = self
            .descendants(subtree_root)
            .into_iter()
            .filter_map(|id| match self.get(id).map(|n| n.data()) {
                Some(NodeData::Bookmark { name }) => Some(name.as_str()),
                _ => None,
            })
            .collect();
        if incoming.is_empty() {
            return Ok(());
        }
        let live: HashSet<String> = self.bookmark_names().into_iter().collect();
        match incoming.into_iter().find(|n| live.contains(*n)) {
            Some(dup) => Err(DocModelError::DuplicateBookmark(dup.to_string())),
            None => Ok(()),
        }
    }

    // ===== Structural edits =====

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(&id)
            .map(Arc::make_mut)
            .ok_or(DocModelError::NodeNotFound(id))
    }

    /// Put a new, detached node into the arena.
    pub fn create(&mut self, node: Node) -> Result<NodeId> {
        let id = node.id();
        if self.nodes.contains_key(&id) {
            return Err(DocModelError::structural(format!("node {id} already exists")));
        }
        if node.kind() == NodeKind::Document {
            return Err(DocModelError::structural("a tree has exactly one document node"));
        }
        if node.parent().is_some() || !node.children().is_empty() {
            return Err(DocModelError::structural(
                "new nodes must be created detached and empty",
            ));
        }
        if let NodeData::Bookmark { name } = node.data() {
            Self::validate_bookmark_name(name)?;
        }
        if let Some(style) = node.style_ref() {
            self.check_style_fits(node.kind(), style)?;
        }
        if let Some(scope) = node.kind().formatting_scope() {
            for (property, value) in node.direct_formatting().iter() {
                if property.scope() != scope || !property.accepts(value) {
                    return Err(DocModelError::structural(format!(
                        "{property} cannot be set on a {}",
                        node.kind()
                    )));
                }
            }
            if let Some(list) = node.direct_formatting().get(Property::ListStyle) {
                self.check_list_ref(list)?;
            }
        } else if !node.direct_formatting().is_empty() {
            return Err(DocModelError::structural(format!(
                "a {} carries no direct formatting",
                node.kind()
            )));
        }
        self.nodes.insert(id, Arc::new(node));
        self.version += 1;
        Ok(id)
    }

    /// Check that `id` may be attached under `parent` at `index`.
    pub fn validate_attach(&self, id: NodeId, parent: NodeId, index: usize) -> Result<()> {
        if id == self.root {
            return Err(DocModelError::structural("the document node cannot be moved"));
        }
        let node = self.node(id)?;
        if node.parent().is_some() {
            return Err(DocModelError::structural(format!("node {id} is already attached")));
        }
        let parent_node = self.node(parent)?;
        if !self.is_attached(parent) {
            return Err(DocModelError::structural(format!(
                "parent {parent} is not part of the document"
            )));
        }
        if !parent_node.kind().can_contain(node.kind()) {
            return Err(DocModelError::structural(format!(
                "a {} cannot contain a {}",
                parent_node.kind(),
                node.kind()
            )));
        }
        if index > parent_node.children().len() {
            return Err(DocModelError::structural(format!(
                "index {index} out of range for {} children",
                parent_node.children().len()
            )));
        }
        self.check_bookmark_conflicts(id)
    }

    /// Attach a detached node (and its subtree).
    pub fn attach(&mut self, id: NodeId, parent: NodeId, index: usize) -> Result<()> {
        self.validate_attach(id, parent, index)?;
        self.node_mut(parent)?.children_mut().insert(index, id);
        self.node_mut(id)?.set_parent(Some(parent));
        self.version += 1;
        Ok(())
    }

    /// Create `node` and attach it in one step. Nothing is left in the arena
    /// if the attach is illegal.
    pub fn insert(&mut self, parent: NodeId, index: usize, node: Node) -> Result<NodeId> {
        let id = self.create(node)?;
        if let Err(e) = self.attach(id, parent, index) {
            self.nodes.remove(&id);
            return Err(e);
        }
        Ok(id)
    }

    /// Insert as the last child of `parent`
    pub fn append(&mut self, parent: NodeId, node: Node) -> Result<NodeId> {
        let index = self.node(parent)?.children().len();
        self.insert(parent, index, node)
    }

    /// Detach a live node; returns its former parent and index.
    pub fn detach(&mut self, id: NodeId) -> Result<(NodeId, usize)> {
        if id == self.root {
            return Err(DocModelError::structural("the document node cannot be removed"));
        }
        self.node(id)?;
        if !self.is_attached(id) {
            return Err(DocModelError::structural(format!("node {id} is not attached")));
        }
        let parent = self
            .parent(id)
            .ok_or_else(|| DocModelError::structural(format!("node {id} has no parent")))?;
        let index = self
            .index_in_parent(id)
            .ok_or_else(|| DocModelError::structural(format!("node {id} missing from parent")))?;
        self.node_mut(parent)?.children_mut().remove(index);
        self.node_mut(id)?.set_parent(None);
        self.version += 1;
        Ok((parent, index))
    }

    /// Move a live node. `new_index` is the index in the destination after
    /// the node has left its old position.
    pub fn move_node(&mut self, id: NodeId, new_parent: NodeId, new_index: usize) -> Result<(NodeId, usize)> {
        if id == self.root {
            return Err(DocModelError::structural("the document node cannot be moved"));
        }
        let kind = self.kind(id)?;
        let dest_kind = self.kind(new_parent)?;
        if !self.is_attached(id) || !self.is_attached(new_parent) {
            return Err(DocModelError::structural("moves are only possible within the document"));
        }
        if new_parent == id || self.ancestors(new_parent).contains(&id) {
            return Err(DocModelError::structural("a node cannot be moved into itself"));
        }
        if !dest_kind.can_contain(kind) {
            return Err(DocModelError::structural(format!(
                "a {dest_kind} cannot contain a {kind}"
            )));
        }
        let old_parent = self
            .parent(id)
            .ok_or_else(|| DocModelError::structural(format!("node {id} has no parent")))?;
        let mut dest_len = self.children(new_parent).len();
        if old_parent == new_parent {
            dest_len -= 1;
        }
        if new_index > dest_len {
            return Err(DocModelError::structural(format!(
                "index {new_index} out of range for {dest_len} children"
            )));
        }
        let old_index = self
            .index_in_parent(id)
            .ok_or_else(|| DocModelError::structural(format!("node {id} missing from parent")))?;
        self.node_mut(old_parent)?.children_mut().remove(old_index);
        self.node_mut(new_parent)?.children_mut().insert(new_index, id);
        self.node_mut(id)?.set_parent(Some(new_parent));
        self.version += 1;
        Ok((old_parent, old_index))
    }

    // ===== Formatting and payload edits =====

    /// Set or clear one direct formatting property; returns the old value.
    pub fn set_direct_formatting(
        &mut self,
        id: NodeId,
        property: Property,
        value: Option<PropertyValue>,
    ) -> Result<Option<PropertyValue>> {
        let kind = self.kind(id)?;
        match kind.formatting_scope() {
            Some(scope) if scope == property.scope() => {}
            _ => {
                return Err(DocModelError::structural(format!(
                    "{property} cannot be set on a {kind}"
                )))
            }
        }
        if let Some(v) = &value {
            if !property.accepts(v) {
                return Err(DocModelError::structural(format!(
                    "value {v:?} is not valid for {property}"
                )));
            }
            self.check_list_ref(v)?;
        }
        let old = self.node_mut(id)?.direct_formatting_mut().set(property, value);
        self.version += 1;
        Ok(old)
    }

    fn check_style_fits(&self, kind: NodeKind, style: &StyleId) -> Result<()> {
        let expected = kind.style_type().ok_or_else(|| {
            DocModelError::structural(format!("a {kind} cannot reference a style"))
        })?;
        let found = self
            .styles
            .get(style)
            .ok_or_else(|| DocModelError::StyleNotFound(style.clone()))?;
        if found.style_type != expected {
            return Err(DocModelError::structural(format!(
                "style '{style}' is a {:?} style, a {kind} needs a {expected:?} style",
                found.style_type
            )));
        }
        Ok(())
    }

    fn check_list_ref(&self, value: &PropertyValue) -> Result<()> {
        let Some(list) = value.as_list_ref() else {
            return Ok(());
        };
        match self.styles.get(list) {
            None => Err(DocModelError::StyleNotFound(list.clone())),
            Some(style) if style.style_type != StyleType::List => Err(DocModelError::structural(
                format!("style '{list}' is not a list style"),
            )),
            Some(_) => Ok(()),
        }
    }

    /// Point a node at a named style (or clear it); returns the old ref.
    pub fn set_style_ref(&mut self, id: NodeId, style: Option<StyleId>) -> Result<Option<StyleId>> {
        let kind = self.kind(id)?;
        match &style {
            Some(s) => self.check_style_fits(kind, s)?,
            None if kind.style_type().is_none() => {
                return Err(DocModelError::structural(format!(
                    "a {kind} cannot reference a style"
                )))
            }
            None => {}
        }
        let old = self.node_mut(id)?.set_style_ref(style);
        self.version += 1;
        Ok(old)
    }

    /// Replace `expected` at grapheme `offset` of a run with `inserted`.
    ///
    /// Fails without touching the run if the text at `offset` is not exactly
    /// `expected`.
    pub fn replace_text(&mut self, id: NodeId, offset: usize, expected: &str, inserted: &str) -> Result<()> {
        let node = self.node(id)?;
        let text = node
            .text()
            .ok_or_else(|| DocModelError::structural(format!("{} has no text", node.kind())))?;
        let len = grapheme_len(text);
        let start = byte_index(text, offset).ok_or(DocModelError::InvalidOffset {
            node_id: id,
            offset,
            len,
        })?;
        let end_offset = offset + grapheme_len(expected);
        let end = byte_index(text, end_offset).ok_or(DocModelError::InvalidOffset {
            node_id: id,
            offset: end_offset,
            len,
        })?;
        if &text[start..end] != expected {
            return Err(DocModelError::structural(format!(
                "text at offset {offset} of {id} does not match"
            )));
        }
        let mut updated = String::with_capacity(text.len() - expected.len() + inserted.len());
        updated.push_str(&text[..start]);
        updated.push_str(inserted);
        updated.push_str(&text[end..]);
        if let NodeData::Run { text } = self.node_mut(id)?.data_mut() {
            *text = updated;
        }
        self.version += 1;
        Ok(())
    }

    /// Swap a node's payload for another of the same kind.
    pub fn replace_data(&mut self, id: NodeId, data: NodeData) -> Result<NodeData> {
        let kind = self.kind(id)?;
        if data.kind() != kind {
            return Err(DocModelError::structural(format!(
                "cannot turn a {kind} into a {}",
                data.kind()
            )));
        }
        if let NodeData::Bookmark { name } = &data {
            Self::validate_bookmark_name(name)?;
            let current = self.bookmark(name);
            if current.is_some() && current != Some(id) {
                return Err(DocModelError::DuplicateBookmark(name.clone()));
            }
        }
        let old = std::mem::replace(self.node_mut(id)?.data_mut(), data);
        self.version += 1;
        Ok(old)
    }

    // ===== Styles and theme =====

    /// Add or replace a style (cycle-checked).
    pub fn put_style(&mut self, style: Style) -> Result<Option<Style>> {
        let old = self.styles.insert(style)?;
        self.version += 1;
        Ok(old)
    }

    /// Number of live nodes referencing `style`, either as their own style
    /// or as the list they belong to
    pub fn style_users(&self, style: &StyleId) -> usize {
        self.live_nodes()
            .into_iter()
            .filter(|n| {
                n.style_ref() == Some(style)
                    || n.direct_formatting()
                        .get(Property::ListStyle)
                        .and_then(PropertyValue::as_list_ref)
                        == Some(style)
            })
            .count()
    }

    /// Remove a style no live node references.
    pub fn remove_style(&mut self, style: &StyleId) -> Result<Style> {
        let count = self.style_users(style);
        if count > 0 {
            return Err(DocModelError::StyleInUse {
                style: style.clone(),
                count,
            });
        }
        let based_on_it: Vec<StyleId> = self
            .styles
            .iter()
            .filter(|s| {
                s.based_on.as_ref() == Some(style)
                    || s.properties
                        .get(Property::ListStyle)
                        .and_then(PropertyValue::as_list_ref)
                        == Some(style)
            })
            .map(|s| s.id.clone())
            .collect();
        if !based_on_it.is_empty() {
            return Err(DocModelError::StyleInUse {
                style: style.clone(),
                count: based_on_it.len(),
            });
        }
        let removed = self.styles.remove(style)?;
        self.version += 1;
        Ok(removed)
    }

    pub fn set_theme(&mut self, theme: Theme) -> Theme {
        self.theme_version += 1;
        self.version += 1;
        std::mem::replace(&mut self.theme, theme)
    }

    // ===== Garbage collection =====

    /// Detached subtree roots (tombstones)
    pub fn detached_roots(&self) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.parent().is_none() && n.id() != self.root)
            .map(|n| n.id())
            .collect()
    }

    /// Drop detached subtrees no ledger entry references. Returns the number
    /// of nodes removed.
    pub fn collect_garbage(&mut self, refs: &NodeRefs) -> usize {
        let mut removed = 0;
        for root in self.detached_roots() {
            let subtree = self.descendants(root);
            if subtree.iter().any(|id| refs.is_referenced(*id)) {
                continue;
            }
            for id in subtree {
                self.nodes.remove(&id);
                removed += 1;
            }
        }
        removed
    }

    // ===== Invariants =====

    /// Verify the structural invariants:
    /// every child link has a matching parent link and vice versa, each node
    /// appears in at most one child list, containment rules hold, and every
    /// node with a parent chain reaches the document without a loop.
    pub fn check_invariants(&self) -> Result<()> {
        let root = self.node(self.root)?;
        if root.kind() != NodeKind::Document || root.parent().is_some() {
            return Err(DocModelError::structural("root must be a parentless document node"));
        }
        let mut seen_as_child = HashSet::new();
        for node in self.nodes.values() {
            for child_id in node.children() {
                let child = self.get(*child_id).ok_or_else(|| {
                    DocModelError::structural(format!("{} lists missing child {child_id}", node.id()))
                })?;
                if child.parent() != Some(node.id()) {
                    return Err(DocModelError::structural(format!(
                        "child {child_id} does not point back at {}",
                        node.id()
                    )));
                }
                if !seen_as_child.insert(*child_id) {
                    return Err(DocModelError::structural(format!(
                        "node {child_id} appears in more than one child list"
                    )));
                }
                if !node.kind().can_contain(child.kind()) {
                    return Err(DocModelError::structural(format!(
                        "a {} holds a {}",
                        node.kind(),
                        child.kind()
                    )));
                }
            }
            if let Some(parent) = node.parent() {
                let count = self
                    .children(parent)
                    .iter()
                    .filter(|c| **c == node.id())
                    .count();
                if count != 1 {
                    return Err(DocModelError::structural(format!(
                        "node {} appears {count} times under its parent",
                        node.id()
                    )));
                }
            }
        }
        // Parent chains must end somewhere: either at the root or at a
        // detached subtree root.
        for node in self.nodes.values() {
            let mut current = node.id();
            let mut steps = 0;
            while let Some(p) = self.parent(current) {
                current = p;
                steps += 1;
                if steps > self.nodes.len() {
                    return Err(DocModelError::structural(format!(
                        "parent chain of {} loops",
                        node.id()
                    )));
                }
            }
        }
        let mut live_bookmarks = HashSet::new();
        for name in self.bookmark_names() {
            if !live_bookmarks.insert(name.clone()) {
                return Err(DocModelError::DuplicateBookmark(name));
            }
        }
        self.styles.validate()
    }
}

impl Default for DocumentTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialized form: nodes as a flat list, live nodes in reading order first.
#[derive(Serialize, Deserialize)]
struct TreeRepr {
    root: NodeId,
    nodes: Vec<Node>,
    styles: StyleRegistry,
    theme: Theme,
    defaults: DocumentDefaults,
    #[serde(default)]
    metadata: DocumentMetadata,
}

impl From<DocumentTree> for TreeRepr {
    fn from(tree: DocumentTree) -> Self {
        let mut order = tree.walk();
        let live: HashSet<NodeId> = order.iter().copied().collect();
        let mut rest: Vec<NodeId> = tree
            .nodes
            .keys()
            .filter(|id| !live.contains(id))
            .copied()
            .collect();
        rest.sort();
        order.extend(rest);
        let nodes = order
            .into_iter()
            .filter_map(|id| tree.nodes.get(&id).map(|n| n.as_ref().clone()))
            .collect();
        TreeRepr {
            root: tree.root,
            nodes,
            styles: tree.styles,
            theme: tree.theme,
            defaults: tree.defaults,
            metadata: tree.metadata,
        }
    }
}

impl TryFrom<TreeRepr> for DocumentTree {
    type Error = DocModelError;

    fn try_from(repr: TreeRepr) -> Result<Self> {
        let mut nodes = HashMap::with_capacity(repr.nodes.len());
        for node in repr.nodes {
            let id = node.id();
            if nodes.insert(id, Arc::new(node)).is_some() {
                return Err(DocModelError::structural(format!("duplicate node id {id}")));
            }
        }
        let mut styles = repr.styles;
        styles.reindex();
        let tree = DocumentTree {
            root: repr.root,
            nodes,
            styles,
            theme: repr.theme,
            theme_version: 0,
            defaults: repr.defaults,
            metadata: repr.metadata,
            version: 0,
        };
        tree.check_invariants()?;
        Ok(tree)
    }
}
