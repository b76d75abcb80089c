//! Document assembly shared by all importers
//!
//! Readers walk their format and feed [`DocumentBuilder`] in reading order:
//! containers are opened and closed, inline content is appended to whatever
//! is open, and change and comment markers are recorded by key. `finish`
//! turns the recorded markers into overlay entries and checks the result,
//! so a reader never hands out a half-built document.

use crate::view::Mark;
use crate::{
    CodecError, CodecResult, DocumentSnapshot, FeatureCategory, FidelityReport, Format, Imported,
    WarningSeverity,
};
use chrono::{DateTime, Utc};
use doc_model::{
    DocumentMetadata, DocumentTree, FieldKind, Formatting, ImageObject, Node, NodeId, NodeKind,
    Property, PropertyValue, SectionProperties, Style, StyleId, StyleType, Theme,
};
use revisions::{
    Comment, CommentAnchor, CommentReply, Overlay, OverlayOp, TrackedChange,
};
use std::collections::{HashMap, HashSet};

/// Author and date recorded with a change marker
#[derive(Debug, Clone, Default)]
pub struct ChangeInfo {
    pub author: String,
    pub date: Option<DateTime<Utc>>,
}

impl ChangeInfo {
    pub fn new(author: impl Into<String>, date: Option<DateTime<Utc>>) -> Self {
        let author = author.into();
        Self {
            author: if author.trim().is_empty() {
                "Unknown".to_string()
            } else {
                author
            },
            date,
        }
    }
}

/// A comment or reply as read from the file, before it is anchored
#[derive(Debug, Clone, Default)]
pub struct CommentDraft {
    /// Key used by range markers and replies
    pub key: String,
    pub author: String,
    pub created: Option<DateTime<Utc>>,
    pub body: String,
    pub resolved: bool,
    /// Key of the comment this one replies to
    pub parent: Option<String>,
}

struct ChangeDraft {
    mark: Mark,
    info: ChangeInfo,
    /// Block nodes carrying an explicit mark (paragraph marks, rows)
    blocks: Vec<NodeId>,
    /// Nodes created while the change was open
    covered: Vec<NodeId>,
}

#[derive(Default)]
struct RangeDraft {
    start: Option<(NodeId, usize)>,
    end: Option<(NodeId, usize)>,
}

pub struct DocumentBuilder {
    format: Format,
    tree: DocumentTree,
    report: FidelityReport,
    stack: Vec<NodeId>,
    changes: Vec<(String, ChangeDraft)>,
    active_changes: Vec<String>,
    format_changes: Vec<TrackedChange>,
    ranges: HashMap<String, RangeDraft>,
    comments: Vec<CommentDraft>,
}

impl DocumentBuilder {
    pub fn new(format: Format) -> Self {
        let tree = DocumentTree::new();
        let root = tree.root_id();
        Self {
            format,
            tree,
            report: FidelityReport::import(format),
            stack: vec![root],
            changes: Vec::new(),
            active_changes: Vec::new(),
            format_changes: Vec::new(),
            ranges: HashMap::new(),
            comments: Vec::new(),
        }
    }

    pub fn tree(&self) -> &DocumentTree {
        &self.tree
    }

    pub fn report_mut(&mut self) -> &mut FidelityReport {
        &mut self.report
    }

    pub fn warn(
        &mut self,
        code: &str,
        category: FeatureCategory,
        severity: WarningSeverity,
        message: impl Into<String>,
    ) {
        self.report.warn(code, category, severity, message);
    }

    pub fn malformed(&self, reason: impl Into<String>) -> CodecError {
        CodecError::malformed(self.format, reason)
    }

    // =========================================================================
    // Document-wide settings
    // =========================================================================

    /// Add or replace a style. Invalid values are dropped and a base that
    /// would close a cycle is cut, both with a warning.
    pub fn add_style(&mut self, mut style: Style) {
        style.properties = self.clean_values(style.properties, &style.id.to_string());
        if let Err(e) = self.tree.put_style(style.clone()) {
            self.warn(
                "styles.cycle",
                FeatureCategory::Styles,
                WarningSeverity::Minor,
                format!("Style '{}' lost its base: {e}", style.id),
            );
            style.based_on = None;
            if let Err(e) = self.tree.put_style(style) {
                tracing::debug!("Style rejected: {e}");
            }
        }
    }

    pub fn set_default_paragraph_style(&mut self, id: StyleId) {
        if let Err(e) = self.tree.styles_mut().set_default_paragraph_style(Some(id)) {
            tracing::debug!("Default paragraph style rejected: {e}");
        }
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.tree.set_theme(theme);
    }

    pub fn set_default(&mut self, property: Property, value: PropertyValue) {
        if !self.tree.defaults_mut().set(property, value) {
            self.warn(
                "defaults.invalid",
                FeatureCategory::Styles,
                WarningSeverity::Minor,
                format!("Invalid document default for {property} ignored"),
            );
        }
    }

    pub fn set_metadata(&mut self, metadata: DocumentMetadata) {
        self.tree.set_metadata(metadata);
    }

    fn clean_values(&mut self, formatting: Formatting, owner: &str) -> Formatting {
        let mut clean = Formatting::new();
        for (property, value) in formatting.iter() {
            if property.accepts(value) {
                clean.set(property, Some(value.clone()));
            } else {
                self.warn(
                    "formatting.invalid",
                    FeatureCategory::TextFormatting,
                    WarningSeverity::Minor,
                    format!("Invalid value for {property} on {owner} ignored"),
                );
            }
        }
        clean
    }

    /// Keep only the properties that apply to `kind`
    fn clean_formatting(&mut self, kind: NodeKind, formatting: Formatting) -> Formatting {
        let Some(scope) = kind.formatting_scope() else {
            return Formatting::new();
        };
        let formatting = self.clean_values(formatting, kind.name());
        let before = formatting.len();
        let mut scoped = formatting.scoped(scope);
        if scoped.len() < before {
            self.warn(
                "formatting.misplaced",
                FeatureCategory::TextFormatting,
                WarningSeverity::Minor,
                format!("Formatting that does not apply to a {kind} ignored"),
            );
        }
        let unknown_list = scoped
            .get(Property::ListStyle)
            .and_then(PropertyValue::as_list_ref)
            .filter(|list| {
                self.tree.styles().get(list).map(|s| s.style_type) != Some(StyleType::List)
            })
            .cloned();
        if let Some(list) = unknown_list {
            self.warn(
                "lists.unknown",
                FeatureCategory::ParagraphFormatting,
                WarningSeverity::Minor,
                format!("Unknown list '{list}' on a {kind} ignored"),
            );
            scoped.set(Property::ListStyle, None);
        }
        scoped
    }

    fn clean_style(&mut self, kind: NodeKind, style: Option<StyleId>) -> Option<StyleId> {
        let style = style?;
        let expected = kind.style_type()?;
        match self.tree.styles().get(&style).map(|s| s.style_type) {
            Some(found) if found == expected => Some(style),
            Some(_) | None => {
                self.warn(
                    "styles.unknown",
                    FeatureCategory::Styles,
                    WarningSeverity::Minor,
                    format!("Unknown or mismatched style '{style}' on a {kind} ignored"),
                );
                None
            }
        }
    }

    // =========================================================================
    // Containers
    // =========================================================================

    fn top(&self) -> NodeId {
        self.stack.last().copied().unwrap_or_else(|| self.tree.root_id())
    }

    fn top_kind(&self) -> NodeKind {
        self.tree.kind(self.top()).unwrap_or(NodeKind::Document)
    }

    /// Innermost open paragraph
    pub fn current_paragraph(&self) -> Option<NodeId> {
        match self.top_kind() {
            NodeKind::Paragraph => Some(self.top()),
            _ => None,
        }
    }

    /// Innermost open node of a kind
    pub fn current(&self, kind: NodeKind) -> Option<NodeId> {
        self.stack
            .iter()
            .rev()
            .copied()
            .find(|id| self.tree.kind(*id).ok() == Some(kind))
    }

    /// Make the top of the stack a node that can hold `kind`
    fn open_for(&mut self, kind: NodeKind) -> CodecResult<NodeId> {
        for _ in 0..16 {
            let top_kind = self.top_kind();
            if top_kind.can_contain(kind) {
                return Ok(self.top());
            }
            match (kind, top_kind) {
                (NodeKind::TableRow, _) => return Err(self.malformed("table row outside a table")),
                (NodeKind::TableCell, _) => return Err(self.malformed("table cell outside a row")),
                (_, NodeKind::Document) => {
                    let section = self.append(Node::section(), false)?;
                    self.stack.push(section);
                }
                (k, NodeKind::Section | NodeKind::TableCell) if k.is_inline() => {
                    let para = self.append(Node::paragraph(), false)?;
                    self.stack.push(para);
                }
                _ => {
                    self.stack.pop();
                }
            }
        }
        Err(self.malformed(format!("no place for a {kind}")))
    }

    fn append(&mut self, node: Node, track: bool) -> CodecResult<NodeId> {
        let parent = self.top();
        let id = self.tree.append(parent, node)?;
        if track {
            self.track_created(id);
        }
        Ok(id)
    }

    fn open(&mut self, kind: NodeKind, node: Node) -> CodecResult<NodeId> {
        self.open_for(kind)?;
        let id = self.append(node, true)?;
        self.stack.push(id);
        Ok(id)
    }

    /// Pop up to and including the innermost open node of `kind`
    fn close(&mut self, kind: NodeKind) {
        if self.current(kind).is_none() {
            return;
        }
        while let Some(id) = self.stack.pop() {
            if self.tree.kind(id).ok() == Some(kind) {
                break;
            }
        }
    }

    /// Close the innermost `kind` only when it belongs to the innermost
    /// open `parent`, so a nested table leaves the outer row and cell open.
    fn close_inside(&mut self, kind: NodeKind, parent: NodeKind) {
        let (Some(node), Some(owner)) = (self.current(kind), self.current(parent)) else {
            return;
        };
        if self.tree.parent(node) == Some(owner) {
            self.close(kind);
        }
    }

    pub fn begin_section(&mut self, properties: SectionProperties) -> CodecResult<NodeId> {
        while self.stack.len() > 1 {
            self.stack.pop();
        }
        self.open(
            NodeKind::Section,
            Node::new(doc_model::NodeData::Section(properties)),
        )
    }

    pub fn end_section(&mut self) {
        self.close(NodeKind::Section);
    }

    /// Replace the properties of the open section, opening one if needed.
    /// Formats that close a section with its properties use this.
    pub fn set_section_properties(&mut self, properties: SectionProperties) -> CodecResult<NodeId> {
        let section = match self.current(NodeKind::Section) {
            Some(section) => section,
            None => self.begin_section(SectionProperties::default())?,
        };
        self.tree
            .replace_data(section, doc_model::NodeData::Section(properties))?;
        Ok(section)
    }

    pub fn begin_paragraph(
        &mut self,
        style: Option<StyleId>,
        formatting: Formatting,
    ) -> CodecResult<NodeId> {
        self.close(NodeKind::Paragraph);
        let style = self.clean_style(NodeKind::Paragraph, style);
        let formatting = self.clean_formatting(NodeKind::Paragraph, formatting);
        let mut node = Node::paragraph().with_formatting(formatting);
        if let Some(style) = style {
            node = node.with_style(style);
        }
        self.open(NodeKind::Paragraph, node)
    }

    pub fn end_paragraph(&mut self) {
        self.close(NodeKind::Paragraph);
    }

    pub fn begin_table(
        &mut self,
        style: Option<StyleId>,
        formatting: Formatting,
    ) -> CodecResult<NodeId> {
        self.close(NodeKind::Paragraph);
        let style = self.clean_style(NodeKind::Table, style);
        let formatting = self.clean_formatting(NodeKind::Table, formatting);
        let mut node = Node::table().with_formatting(formatting);
        if let Some(style) = style {
            node = node.with_style(style);
        }
        self.open(NodeKind::Table, node)
    }

    pub fn end_table(&mut self) {
        self.close(NodeKind::Table);
    }

    pub fn begin_row(&mut self, formatting: Formatting) -> CodecResult<NodeId> {
        self.close_inside(NodeKind::TableRow, NodeKind::Table);
        let formatting = self.clean_formatting(NodeKind::TableRow, formatting);
        self.open(NodeKind::TableRow, Node::table_row().with_formatting(formatting))
    }

    pub fn end_row(&mut self) {
        self.close(NodeKind::TableRow);
    }

    pub fn begin_cell(&mut self, formatting: Formatting) -> CodecResult<NodeId> {
        self.close_inside(NodeKind::TableCell, NodeKind::TableRow);
        let formatting = self.clean_formatting(NodeKind::TableCell, formatting);
        self.open(NodeKind::TableCell, Node::table_cell().with_formatting(formatting))
    }

    pub fn end_cell(&mut self) {
        self.close(NodeKind::TableCell);
    }

    // =========================================================================
    // Inline content
    // =========================================================================

    /// Append a run. Empty text adds nothing.
    pub fn run(
        &mut self,
        text: &str,
        style: Option<StyleId>,
        formatting: Formatting,
    ) -> CodecResult<Option<NodeId>> {
        if text.is_empty() {
            return Ok(None);
        }
        let style = self.clean_style(NodeKind::Run, style);
        let formatting = self.clean_formatting(NodeKind::Run, formatting);
        let mut node = Node::run(text).with_formatting(formatting);
        if let Some(style) = style {
            node = node.with_style(style);
        }
        self.open_for(NodeKind::Run)?;
        self.append(node, true).map(Some)
    }

    pub fn image(&mut self, image: ImageObject) -> CodecResult<NodeId> {
        self.open_for(NodeKind::InlineObject)?;
        self.append(Node::image(image), true)
    }

    /// Append a bookmark. Invalid or duplicate names are skipped with a
    /// warning.
    pub fn bookmark(&mut self, name: &str) -> CodecResult<Option<NodeId>> {
        if DocumentTree::validate_bookmark_name(name).is_err() {
            self.warn(
                "bookmarks.invalid_name",
                FeatureCategory::Bookmarks,
                WarningSeverity::Minor,
                format!("Bookmark with invalid name '{name}' dropped"),
            );
            return Ok(None);
        }
        if self.tree.bookmark(name).is_some() {
            self.warn(
                "bookmarks.duplicate",
                FeatureCategory::Bookmarks,
                WarningSeverity::Minor,
                format!("Duplicate bookmark '{name}' dropped"),
            );
            return Ok(None);
        }
        self.open_for(NodeKind::Bookmark)?;
        self.append(Node::bookmark(name), true).map(Some)
    }

    pub fn field(
        &mut self,
        kind: FieldKind,
        result: &str,
        style: Option<StyleId>,
        formatting: Formatting,
    ) -> CodecResult<NodeId> {
        let style = self.clean_style(NodeKind::FieldReference, style);
        let formatting = self.clean_formatting(NodeKind::FieldReference, formatting);
        let mut node = Node::field(kind, result).with_formatting(formatting);
        if let Some(style) = style {
            node = node.with_style(style);
        }
        self.open_for(NodeKind::FieldReference)?;
        self.append(node, true)
    }

    // =========================================================================
    // Tracked changes
    // =========================================================================

    fn draft_mut(&mut self, key: &str, mark: Mark, info: ChangeInfo) -> &mut ChangeDraft {
        let pos = match self.changes.iter().position(|(k, _)| k == key) {
            Some(pos) => pos,
            None => {
                self.changes.push((
                    key.to_string(),
                    ChangeDraft {
                        mark,
                        info,
                        blocks: Vec::new(),
                        covered: Vec::new(),
                    },
                ));
                self.changes.len() - 1
            }
        };
        &mut self.changes[pos].1
    }

    /// Everything created until the matching `end_change` belongs to the
    /// change with this key.
    pub fn begin_change(&mut self, key: &str, mark: Mark, info: ChangeInfo) {
        self.draft_mut(key, mark, info);
        self.active_changes.push(key.to_string());
    }

    pub fn end_change(&mut self, key: &str) {
        if let Some(pos) = self.active_changes.iter().rposition(|k| k == key) {
            self.active_changes.remove(pos);
        }
    }

    /// Record an explicit mark on a block node (a paragraph mark or a row)
    pub fn mark_block(&mut self, key: &str, mark: Mark, info: ChangeInfo, node: NodeId) {
        let draft = self.draft_mut(key, mark, info);
        if !draft.blocks.contains(&node) {
            draft.blocks.push(node);
        }
    }

    fn track_created(&mut self, id: NodeId) {
        let Some(key) = self.active_changes.last().cloned() else {
            return;
        };
        let is_block = self.tree.kind(id).map(|k| k.is_block()).unwrap_or(false);
        if let Some((_, draft)) = self.changes.iter_mut().find(|(k, _)| *k == key) {
            if is_block {
                draft.blocks.push(id);
            } else {
                draft.covered.push(id);
            }
        }
    }

    /// Record a tracked formatting edit. `old` is the value before the edit;
    /// the node's current direct value is the new one.
    pub fn format_change(
        &mut self,
        node: NodeId,
        property: Property,
        old: Option<PropertyValue>,
        info: ChangeInfo,
    ) {
        let Ok(n) = self.tree.node(node) else {
            return;
        };
        if n.kind().formatting_scope() != Some(property.scope())
            || old.as_ref().is_some_and(|v| !property.accepts(v))
        {
            return;
        }
        let new = n.direct_formatting().get(property).cloned();
        if new == old {
            return;
        }
        let mut change = TrackedChange::format_change(info.author, node, property, old, new);
        if let Some(date) = info.date {
            change = change.with_timestamp(date);
        }
        self.format_changes.push(change);
    }

    // =========================================================================
    // Comments
    // =========================================================================

    fn position(&self) -> (NodeId, usize) {
        let top = self.top();
        (top, self.tree.children(top).len())
    }

    pub fn comment_start(&mut self, key: &str) {
        let pos = self.position();
        self.ranges.entry(key.to_string()).or_default().start = Some(pos);
    }

    pub fn comment_end(&mut self, key: &str) {
        let pos = self.position();
        self.ranges.entry(key.to_string()).or_default().end = Some(pos);
    }

    pub fn add_comment(&mut self, draft: CommentDraft) {
        self.comments.push(draft);
    }

    fn anchor_for(&self, key: &str) -> Option<CommentAnchor> {
        let range = self.ranges.get(key)?;
        let (sc, si) = range.start.or(range.end)?;
        let (ec, ei) = range
            .end
            .unwrap_or((sc, self.tree.children(sc).len()));
        if sc == ec && self.tree.kind(sc).ok() == Some(NodeKind::Paragraph) {
            let children = self.tree.children(sc);
            let runs: Vec<NodeId> = children
                .get(si.min(children.len())..ei.min(children.len()))
                .unwrap_or(&[])
                .iter()
                .copied()
                .filter(|c| self.tree.kind(*c).ok() == Some(NodeKind::Run))
                .collect();
            return Some(match (runs.first(), runs.last()) {
                (Some(first), Some(last)) => {
                    let len = self.tree.get(*last).map_or(0, |n| n.text_len());
                    CommentAnchor::Text {
                        start: doc_model::TextPoint::new(*first, 0),
                        end: doc_model::TextPoint::new(*last, len),
                    }
                }
                _ => CommentAnchor::Node(sc),
            });
        }
        Some(CommentAnchor::Node(self.common_ancestor(sc, ec)))
    }

    fn common_ancestor(&self, a: NodeId, b: NodeId) -> NodeId {
        let chain_b: HashSet<NodeId> = std::iter::once(b).chain(self.tree.ancestors(b)).collect();
        std::iter::once(a)
            .chain(self.tree.ancestors(a))
            .find(|n| chain_b.contains(n))
            .unwrap_or_else(|| self.tree.root_id())
    }

    // =========================================================================
    // Finish
    // =========================================================================

    fn ensure_body(&mut self) -> CodecResult<()> {
        if self.tree.nodes_of_kind(NodeKind::Paragraph).is_empty()
            && self.tree.nodes_of_kind(NodeKind::Table).is_empty()
        {
            self.stack.truncate(1);
            self.open_for(NodeKind::Paragraph)?;
            self.append(Node::paragraph(), false)?;
        }
        Ok(())
    }

    fn change_records(&mut self) -> Vec<TrackedChange> {
        let order: HashMap<NodeId, usize> = self
            .tree
            .walk()
            .into_iter()
            .enumerate()
            .map(|(i, n)| (n, i))
            .collect();
        let drafts = std::mem::take(&mut self.changes);
        let mut records = Vec::new();
        for (key, draft) in drafts {
            let covered: HashSet<NodeId> = draft.covered.iter().copied().collect();
            let mut nodes: Vec<NodeId> = Vec::new();
            for block in &draft.blocks {
                let inline_ok = self
                    .tree
                    .descendants(*block)
                    .into_iter()
                    .filter(|d| self.tree.kind(*d).map(|k| k.is_inline()).unwrap_or(false))
                    .all(|d| covered.contains(&d));
                if inline_ok {
                    nodes.push(*block);
                } else {
                    self.report.warn(
                        "changes.partial_block",
                        FeatureCategory::TrackChanges,
                        WarningSeverity::Minor,
                        "Tracked paragraph or row mark without its content dropped",
                    );
                }
            }
            nodes.extend(draft.covered.iter().copied());

            // Keep only the outermost marked nodes.
            let marked: HashSet<NodeId> = nodes.iter().copied().collect();
            let mut nodes: Vec<NodeId> = nodes
                .into_iter()
                .filter(|n| !self.tree.ancestors(*n).iter().any(|a| marked.contains(a)))
                .collect();
            nodes.sort_by_key(|n| order.get(n).copied().unwrap_or(usize::MAX));
            nodes.dedup();
            let nodes = self.collapse_tables(nodes);
            if nodes.is_empty() {
                tracing::debug!(key = %key, "Empty change marker ignored");
                continue;
            }
            let mut change = match draft.mark {
                Mark::Inserted => TrackedChange::insertion(draft.info.author, nodes),
                Mark::Deleted => TrackedChange::deletion(draft.info.author, nodes),
            };
            if let Some(date) = draft.info.date {
                change = change.with_timestamp(date);
            }
            records.push(change);
        }
        records
    }

    /// Replace a table's rows by the table when every row is marked
    fn collapse_tables(&self, nodes: Vec<NodeId>) -> Vec<NodeId> {
        let set: HashSet<NodeId> = nodes.iter().copied().collect();
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            if self.tree.kind(node).ok() == Some(NodeKind::TableRow) {
                if let Some(table) = self.tree.parent(node) {
                    let rows = self.tree.children(table);
                    if rows.iter().all(|r| set.contains(r)) {
                        if !out.contains(&table) {
                            out.push(table);
                        }
                        continue;
                    }
                }
            }
            out.push(node);
        }
        out
    }

    fn comment_records(&mut self) -> Vec<Comment> {
        let drafts = std::mem::take(&mut self.comments);
        let keys: HashSet<&str> = drafts
            .iter()
            .filter(|d| d.parent.is_none())
            .map(|d| d.key.as_str())
            .collect();
        let mut comments: Vec<(String, Comment)> = Vec::new();

        for draft in drafts.iter().filter(|d| d.parent.as_deref().map_or(true, |p| !keys.contains(p))) {
            if draft.parent.is_some() {
                self.report.warn(
                    "comments.orphan_reply",
                    FeatureCategory::Comments,
                    WarningSeverity::Minor,
                    "Reply without its parent comment kept as a comment",
                );
            }
            let anchor = match self.anchor_for(&draft.key) {
                Some(anchor) => anchor,
                None => {
                    self.report.warn(
                        "comments.unanchored",
                        FeatureCategory::Comments,
                        WarningSeverity::Minor,
                        "Comment without a range attached to the first paragraph",
                    );
                    let first = self
                        .tree
                        .nodes_of_kind(NodeKind::Paragraph)
                        .first()
                        .copied()
                        .unwrap_or_else(|| self.tree.root_id());
                    CommentAnchor::Node(first)
                }
            };
            let mut comment = Comment::new(anchor, author_or_unknown(&draft.author), &draft.body);
            if let Some(created) = draft.created {
                comment = comment.with_created(created);
            }
            comment.resolved = draft.resolved;
            comments.push((draft.key.clone(), comment));
        }

        for draft in drafts.iter().filter(|d| d.parent.as_deref().is_some_and(|p| keys.contains(p))) {
            let Some(parent) = draft.parent.as_deref() else {
                continue;
            };
            if let Some((_, comment)) = comments.iter_mut().find(|(k, _)| k == parent) {
                let mut reply = CommentReply::new(author_or_unknown(&draft.author), &draft.body);
                if let Some(created) = draft.created {
                    reply.created = created;
                }
                reply.resolved = draft.resolved;
                comment.add_reply(reply);
            }
        }
        comments.into_iter().map(|(_, c)| c).collect()
    }

    /// Turn markers into overlay entries and check the tree
    pub fn finish(mut self) -> CodecResult<Imported> {
        self.ensure_body()?;
        let mut overlay = Overlay::new();
        let mut ops: Vec<OverlayOp> = self
            .change_records()
            .into_iter()
            .map(OverlayOp::AddChange)
            .collect();
        ops.extend(
            std::mem::take(&mut self.format_changes)
                .into_iter()
                .map(OverlayOp::AddChange),
        );
        ops.extend(self.comment_records().into_iter().map(OverlayOp::AddComment));
        for op in ops {
            op.apply(&mut overlay)?;
        }

        self.tree
            .check_invariants()
            .map_err(|e| CodecError::malformed(self.format, e.to_string()))?;
        self.tree
            .styles()
            .validate()
            .map_err(|e| CodecError::malformed(self.format, e.to_string()))?;

        Ok(Imported {
            document: DocumentSnapshot::new(self.tree, overlay),
            report: self.report,
        })
    }
}

fn author_or_unknown(author: &str) -> &str {
    if author.trim().is_empty() {
        "Unknown"
    } else {
        author
    }
}

/// Style type a reader should give a style found in a file
pub fn style_type_for(kind: &str) -> StyleType {
    match kind {
        "character" | "text" => StyleType::Character,
        "table" => StyleType::Table,
        "numbering" | "list" => StyleType::List,
        _ => StyleType::Paragraph,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revisions::ChangeKind;

    fn info() -> ChangeInfo {
        ChangeInfo::new("alice", None)
    }

    #[test]
    fn test_implicit_containers() {
        let mut b = DocumentBuilder::new(Format::Html);
        b.run("loose text", None, Formatting::new()).unwrap();
        let imported = b.finish().unwrap();
        let tree = &imported.document.tree;
        assert_eq!(tree.nodes_of_kind(NodeKind::Section).len(), 1);
        assert_eq!(tree.plain_text(), "loose text");
    }

    #[test]
    fn test_empty_input_gets_a_paragraph() {
        let imported = DocumentBuilder::new(Format::Text).finish().unwrap();
        assert_eq!(imported.document.tree.nodes_of_kind(NodeKind::Paragraph).len(), 1);
    }

    #[test]
    fn test_misplaced_formatting_is_dropped() {
        let mut b = DocumentBuilder::new(Format::Docx);
        b.begin_paragraph(None, Formatting::new().with(Property::Bold, true))
            .unwrap();
        b.run("x", Some(StyleId::new("Missing")), Formatting::new())
            .unwrap();
        let imported = b.finish().unwrap();
        assert!(imported.report.has_code("formatting.misplaced"));
        assert!(imported.report.has_code("styles.unknown"));
    }

    #[test]
    fn test_change_marks_keep_outermost_nodes() {
        let mut b = DocumentBuilder::new(Format::Docx);
        let para = b.begin_paragraph(None, Formatting::new()).unwrap();
        b.mark_block("1", Mark::Deleted, info(), para);
        b.begin_change("1", Mark::Deleted, info());
        b.run("gone", None, Formatting::new()).unwrap();
        b.end_change("1");
        b.end_paragraph();
        b.begin_paragraph(None, Formatting::new()).unwrap();
        b.run("kept ", None, Formatting::new()).unwrap();
        b.begin_change("2", Mark::Inserted, info());
        let added = b.run("added", None, Formatting::new()).unwrap().unwrap();
        b.end_change("2");
        let imported = b.finish().unwrap();

        let changes = imported.document.overlay.changes();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].kind, ChangeKind::Deletion { nodes: vec![para] });
        assert_eq!(changes[1].kind, ChangeKind::Insertion { nodes: vec![added] });
    }

    #[test]
    fn test_paragraph_mark_without_content_is_dropped() {
        let mut b = DocumentBuilder::new(Format::Docx);
        let para = b.begin_paragraph(None, Formatting::new()).unwrap();
        b.mark_block("1", Mark::Deleted, info(), para);
        b.run("still here", None, Formatting::new()).unwrap();
        let imported = b.finish().unwrap();
        assert!(imported.document.overlay.changes().is_empty());
        assert!(imported.report.has_code("changes.partial_block"));
    }

    #[test]
    fn test_all_rows_collapse_to_table() {
        let mut b = DocumentBuilder::new(Format::Docx);
        let table = b.begin_table(None, Formatting::new()).unwrap();
        for text in ["a", "b"] {
            let row = b.begin_row(Formatting::new()).unwrap();
            b.mark_block("7", Mark::Inserted, info(), row);
            b.begin_change("7", Mark::Inserted, info());
            b.begin_cell(Formatting::new()).unwrap();
            b.begin_paragraph(None, Formatting::new()).unwrap();
            b.run(text, None, Formatting::new()).unwrap();
            b.end_cell();
            b.end_change("7");
            b.end_row();
        }
        b.end_table();
        let imported = b.finish().unwrap();
        let changes = imported.document.overlay.changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Insertion { nodes: vec![table] });
    }

    #[test]
    fn test_comment_ranges_and_replies() {
        let mut b = DocumentBuilder::new(Format::Docx);
        b.begin_paragraph(None, Formatting::new()).unwrap();
        b.run("before ", None, Formatting::new()).unwrap();
        b.comment_start("0");
        let first = b.run("noted", None, Formatting::new()).unwrap().unwrap();
        let last = b.run(" text", None, Formatting::new()).unwrap().unwrap();
        b.comment_end("0");
        b.end_paragraph();
        let empty = b.begin_paragraph(None, Formatting::new()).unwrap();
        b.comment_start("1");
        b.comment_end("1");
        b.add_comment(CommentDraft {
            key: "0".into(),
            author: "bob".into(),
            body: "Check this".into(),
            ..Default::default()
        });
        b.add_comment(CommentDraft {
            key: "2".into(),
            author: "carol".into(),
            body: "Agreed".into(),
            parent: Some("0".into()),
            resolved: true,
            ..Default::default()
        });
        b.add_comment(CommentDraft {
            key: "1".into(),
            author: "dan".into(),
            body: "Empty line".into(),
            ..Default::default()
        });
        let imported = b.finish().unwrap();
        let comments = imported.document.overlay.comments();
        assert_eq!(comments.len(), 2);
        assert_eq!(
            comments[0].anchor,
            CommentAnchor::Text {
                start: doc_model::TextPoint::new(first, 0),
                end: doc_model::TextPoint::new(last, 5),
            }
        );
        assert_eq!(comments[0].replies.len(), 1);
        assert!(comments[0].replies[0].resolved);
        assert_eq!(comments[1].anchor, CommentAnchor::Node(empty));
    }

    #[test]
    fn test_duplicate_bookmark_is_skipped() {
        let mut b = DocumentBuilder::new(Format::Rtf);
        b.begin_paragraph(None, Formatting::new()).unwrap();
        assert!(b.bookmark("intro").unwrap().is_some());
        assert!(b.bookmark("intro").unwrap().is_none());
        assert!(b.bookmark("9bad").unwrap().is_none());
        let imported = b.finish().unwrap();
        assert!(imported.report.has_code("bookmarks.duplicate"));
        assert!(imported.report.has_code("bookmarks.invalid_name"));
    }

    #[test]
    fn test_style_cycle_is_cut() {
        let mut b = DocumentBuilder::new(Format::Docx);
        b.add_style(Style::paragraph("A", "A").with_based_on("B"));
        b.add_style(Style::paragraph("B", "B").with_based_on("A"));
        let imported = b.finish().unwrap();
        let styles = imported.document.tree.styles();
        assert!(styles.get(&StyleId::new("B")).unwrap().based_on.is_none());
        assert!(imported.report.has_code("styles.cycle"));
    }
}
