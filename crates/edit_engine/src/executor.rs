//! Command execution engine

use crate::{
    replay, AcceptAllChanges, AcceptChange, AddComment, Command, DeleteComment, EditError,
    EditOp, EditTransaction, HistoryEntry, InsertNode, InsertText, MoveNode, PutStyle,
    RefreshReferences, RejectAllChanges, RejectChange, RemoveNode, RemoveRange, RemoveStyle,
    ReopenComment, ReplyToComment, ResolveComment, Result, SetBasedOn, SetDirectFormatting,
    SetMetadata, SetStyleRef, SetTheme, UndoManager,
};
use doc_model::{
    CacheStats, DocumentMetadata, DocumentTree, EffectiveFormatting, Node, NodeId, NodeRefs,
    Property, PropertyValue, RefHolder, Style, StyleCache, StyleId, TextRange, Theme,
};
use revisions::{
    ChangeId, Comment, CommentAnchor, CommentId, OrphanedAnnotation, Overlay, ReplyId,
    TrackedChange,
};

/// Owns one document's tree, overlay and history.
///
/// Every mutation goes through [`EditingEngine::execute`], which records it
/// for undo, keeps the resolve cache and the node reference ledger in step,
/// and sweeps tombstones nothing refers to any more.
pub struct EditingEngine {
    tree: DocumentTree,
    overlay: Overlay,
    undo_manager: UndoManager,
    refs: NodeRefs,
    cache: StyleCache,
    /// User issuing untracked edits
    actor: String,
    /// Bumped on every selection change; commands from different epochs are
    /// never coalesced
    epoch: u64,
    notices: Vec<OrphanedAnnotation>,
}

impl EditingEngine {
    /// Create a new editing engine with a blank document
    pub fn new() -> Self {
        Self::with_tree(DocumentTree::blank())
    }

    /// Create an editing engine with a specific document tree
    pub fn with_tree(tree: DocumentTree) -> Self {
        Self::with_document(tree, Overlay::new())
    }

    pub fn with_document(tree: DocumentTree, overlay: Overlay) -> Self {
        let mut engine = Self {
            tree,
            overlay,
            undo_manager: UndoManager::new(),
            refs: NodeRefs::new(),
            cache: StyleCache::new(),
            actor: "user".to_string(),
            epoch: 0,
            notices: Vec::new(),
        };
        engine.sync_overlay_refs();
        engine
    }

    /// Set history depth and coalescing window
    pub fn with_limits(mut self, max_depth: usize, coalesce_window: usize) -> Self {
        self.undo_manager.clear(&mut self.refs);
        self.undo_manager = UndoManager::with_limits(max_depth, coalesce_window);
        self
    }

    pub fn tree(&self) -> &DocumentTree {
        &self.tree
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    pub fn history(&self) -> &UndoManager {
        &self.undo_manager
    }

    pub fn node_refs(&self) -> &NodeRefs {
        &self.refs
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn set_actor(&mut self, actor: impl Into<String>) {
        self.actor = actor.into();
        self.undo_manager.seal();
    }

    /// Record that the selection moved. Ends any run of coalesced edits.
    pub fn selection_changed(&mut self) {
        self.epoch += 1;
    }

    /// Swap in a different document, dropping history
    pub fn replace_document(&mut self, tree: DocumentTree, overlay: Overlay) {
        self.undo_manager.clear(&mut self.refs);
        self.tree = tree;
        self.overlay = overlay;
        self.cache.clear();
        self.notices.clear();
        self.sync_overlay_refs();
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Execute a command
    pub fn execute<C: Command>(&mut self, command: &C) -> Result<C::Output> {
        let mut tx = EditTransaction::new(&mut self.tree, &mut self.overlay, &self.actor);
        let output = command.apply(&mut tx)?;
        let (ops, notices) = tx.commit()?;
        if ops.is_empty() {
            return Ok(output);
        }
        self.after_change(&ops);
        let entry = HistoryEntry::new(command.display_name(), self.actor.clone(), self.epoch, ops)
            .with_coalesce(command.coalesce());
        self.undo_manager.push(entry, &mut self.refs);
        self.undo_manager.trim(&mut self.refs);
        self.notices.extend(notices);
        self.collect_garbage();
        Ok(output)
    }

    /// Undo the last entry
    pub fn undo(&mut self) -> Result<()> {
        let entry = self.undo_manager.pop_undo().ok_or(EditError::UndoStackEmpty)?;
        let inverses: Vec<EditOp> = entry.ops.iter().rev().map(EditOp::inverse).collect();
        if let Err(e) = replay(&mut self.tree, &mut self.overlay, &inverses) {
            self.undo_manager.push_undo(entry);
            return Err(e);
        }
        tracing::debug!("undo '{}' ({} ops)", entry.label, entry.ops.len());
        self.after_change(&inverses);
        self.undo_manager.push_redo(entry);
        self.collect_garbage();
        Ok(())
    }

    /// Redo the last undone entry
    pub fn redo(&mut self) -> Result<()> {
        let entry = self.undo_manager.pop_redo().ok_or(EditError::RedoStackEmpty)?;
        if let Err(e) = replay(&mut self.tree, &mut self.overlay, &entry.ops) {
            self.undo_manager.push_redo(entry);
            return Err(e);
        }
        tracing::debug!("redo '{}' ({} ops)", entry.label, entry.ops.len());
        self.after_change(&entry.ops);
        self.undo_manager.push_undo(entry);
        self.collect_garbage();
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.undo_manager.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo_manager.can_redo()
    }

    pub fn undo_label(&self) -> Option<&str> {
        self.undo_manager.undo_label()
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.undo_manager.redo_label()
    }

    pub fn clear_history(&mut self) {
        self.undo_manager.clear(&mut self.refs);
        self.collect_garbage();
    }

    fn after_change(&mut self, ops: &[EditOp]) {
        for op in ops.iter().filter_map(EditOp::as_tree) {
            self.cache.observe(&self.tree, op);
        }
        self.sync_overlay_refs();
    }

    fn sync_overlay_refs(&mut self) {
        self.refs.clear_holder(RefHolder::Change);
        self.refs.clear_holder(RefHolder::Comment);
        self.refs.retain_all(self.overlay.change_nodes(), RefHolder::Change);
        self.refs.retain_all(self.overlay.comment_nodes(), RefHolder::Comment);
    }

    /// Purge tombstones that no history or overlay entry refers to
    pub fn collect_garbage(&mut self) -> usize {
        let removed = self.tree.collect_garbage(&self.refs);
        if removed > 0 {
            tracing::debug!("collected {removed} unreferenced node(s)");
        }
        removed
    }

    /// Comments orphaned since the last call
    pub fn take_notices(&mut self) -> Vec<OrphanedAnnotation> {
        std::mem::take(&mut self.notices)
    }

    // =========================================================================
    // Formatting
    // =========================================================================

    /// Effective formatting of a node, served from the cache when current
    pub fn resolve(&mut self, node: NodeId) -> Result<EffectiveFormatting> {
        Ok(self.cache.resolve(&self.tree, node)?)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // =========================================================================
    // Tracking
    // =========================================================================

    pub fn begin_tracking(&mut self, author: impl Into<String>) -> Result<()> {
        let author = author.into();
        self.overlay.begin_tracking(author.clone())?;
        self.undo_manager.seal();
        tracing::info!("tracking changes as '{author}'");
        Ok(())
    }

    pub fn end_tracking(&mut self) -> Option<String> {
        let author = self.overlay.end_tracking();
        if let Some(author) = &author {
            self.undo_manager.seal();
            tracing::info!("stopped tracking changes for '{author}'");
        }
        author
    }

    pub fn is_tracking(&self) -> bool {
        self.overlay.is_tracking()
    }

    // =========================================================================
    // Commands
    // =========================================================================

    pub fn insert(&mut self, parent: NodeId, index: usize, node: Node) -> Result<NodeId> {
        self.execute(&InsertNode::new(parent, index, node))
    }

    pub fn remove(&mut self, node: NodeId) -> Result<Option<ChangeId>> {
        self.execute(&RemoveNode::new(node))
    }

    pub fn remove_range(&mut self, range: TextRange) -> Result<Option<ChangeId>> {
        self.execute(&RemoveRange::new(range))
    }

    pub fn move_node(&mut self, node: NodeId, parent: NodeId, index: usize) -> Result<Option<ChangeId>> {
        self.execute(&MoveNode::new(node, parent, index))
    }

    pub fn insert_text(&mut self, run: NodeId, offset: usize, text: &str) -> Result<NodeId> {
        self.execute(&InsertText::new(run, offset, text))
    }

    pub fn set_direct_formatting(
        &mut self,
        node: NodeId,
        property: Property,
        value: Option<PropertyValue>,
    ) -> Result<()> {
        self.execute(&SetDirectFormatting::new(node, property, value))
    }

    pub fn set_style_ref(&mut self, node: NodeId, style: Option<StyleId>) -> Result<()> {
        self.execute(&SetStyleRef::new(node, style))
    }

    pub fn put_style(&mut self, style: Style) -> Result<()> {
        self.execute(&PutStyle::new(style))
    }

    pub fn remove_style(&mut self, id: StyleId) -> Result<Style> {
        self.execute(&RemoveStyle { id })
    }

    pub fn set_based_on(&mut self, id: StyleId, based_on: Option<StyleId>) -> Result<()> {
        self.execute(&SetBasedOn { id, based_on })
    }

    pub fn set_theme(&mut self, theme: Theme) -> Result<()> {
        self.execute(&SetTheme { theme })
    }

    pub fn set_metadata(&mut self, metadata: DocumentMetadata) -> Result<()> {
        self.execute(&SetMetadata { metadata })
    }

    /// Refresh `REF` fields from their bookmarks as one undoable edit
    pub fn refresh_references(&mut self) -> Result<usize> {
        self.execute(&RefreshReferences)
    }

    pub fn add_comment(&mut self, anchor: CommentAnchor, author: &str, body: &str) -> Result<CommentId> {
        self.execute(&AddComment::new(anchor, author, body))
    }

    pub fn reply_to_comment(&mut self, comment: CommentId, author: &str, body: &str) -> Result<ReplyId> {
        self.execute(&ReplyToComment::new(comment, author, body))
    }

    pub fn resolve_comment(&mut self, comment: CommentId, resolved_by: &str) -> Result<()> {
        self.execute(&ResolveComment {
            comment_id: comment,
            resolved_by: resolved_by.to_string(),
        })
    }

    pub fn reopen_comment(&mut self, comment: CommentId) -> Result<()> {
        self.execute(&ReopenComment { comment_id: comment })
    }

    pub fn delete_comment(&mut self, comment: CommentId) -> Result<Comment> {
        self.execute(&DeleteComment { comment_id: comment })
    }

    /// All comments, orphaned ones included
    pub fn list_comments(&self) -> &[Comment] {
        self.overlay.comments()
    }

    pub fn accept_change(&mut self, change: ChangeId) -> Result<TrackedChange> {
        self.execute(&AcceptChange { change_id: change })
    }

    pub fn reject_change(&mut self, change: ChangeId) -> Result<TrackedChange> {
        self.execute(&RejectChange { change_id: change })
    }

    pub fn accept_all(&mut self) -> Result<Vec<TrackedChange>> {
        self.execute(&AcceptAllChanges)
    }

    pub fn reject_all(&mut self) -> Result<Vec<TrackedChange>> {
        self.execute(&RejectAllChanges)
    }
}

impl Default for EditingEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::NodeKind;
    use revisions::ViewMode;

    fn engine_with(text: &str) -> (EditingEngine, NodeId, NodeId) {
        let mut tree = DocumentTree::blank();
        let para = tree.nodes_of_kind(NodeKind::Paragraph)[0];
        let run = tree.append(para, Node::run(text)).unwrap();
        (EditingEngine::with_tree(tree), para, run)
    }

    #[test]
    fn test_bold_undo_redo() {
        let (mut engine, _, run) = engine_with("Hello");
        assert!(!engine.resolve(run).unwrap().bold());
        engine
            .set_direct_formatting(run, Property::Bold, Some(true.into()))
            .unwrap();
        assert!(engine.resolve(run).unwrap().bold());
        engine.undo().unwrap();
        assert!(!engine.resolve(run).unwrap().bold());
        engine.redo().unwrap();
        assert!(engine.resolve(run).unwrap().bold());
    }

    #[test]
    fn test_typing_coalesces_until_selection_moves() {
        let (mut engine, para, run) = engine_with("");
        for (i, ch) in ["a", "b", "c"].iter().enumerate() {
            engine.insert_text(run, i, ch).unwrap();
        }
        assert_eq!(engine.history().undo_len(), 1);
        engine.selection_changed();
        engine.insert_text(run, 3, "d").unwrap();
        assert_eq!(engine.history().undo_len(), 2);

        engine.undo().unwrap();
        assert_eq!(engine.tree().text_of(para), "abc");
        engine.undo().unwrap();
        assert_eq!(engine.tree().text_of(para), "");
    }

    #[test]
    fn test_untracked_remove_drops_stale_deletion() {
        let (mut engine, _, run) = engine_with("Hello");
        engine.begin_tracking("alice").unwrap();
        assert!(engine.remove(run).unwrap().is_some());
        engine.end_tracking();
        assert_eq!(engine.overlay().changes().len(), 1);

        assert!(engine.remove(run).unwrap().is_none());
        assert!(!engine.tree().is_attached(run));
        assert!(engine.overlay().changes().is_empty());

        engine.undo().unwrap();
        assert!(engine.tree().is_attached(run));
        assert_eq!(engine.overlay().changes().len(), 1);
        let change = engine.overlay().changes()[0].id;
        engine.reject_change(change).unwrap();
        assert!(engine.tree().is_attached(run));
        assert!(engine.overlay().changes().is_empty());
    }

    #[test]
    fn test_history_stays_bounded_under_a_comment() {
        let (engine, para, _) = engine_with("Hello");
        let mut engine = engine.with_limits(5, 1);
        engine
            .add_comment(CommentAnchor::node(para), "bob", "Check this")
            .unwrap();
        for _ in 0..200 {
            engine.selection_changed();
            engine.insert(para, 0, Node::run("x")).unwrap();
        }
        assert!(engine.history().undo_len() <= 5);
        assert_eq!(engine.list_comments().len(), 1);
    }

    #[test]
    fn test_refresh_references_is_undoable() {
        use doc_model::{FieldKind, NodeData};

        let (mut engine, para, _) = engine_with("Intro");
        engine.insert(para, 0, Node::bookmark("intro")).unwrap();
        let section = engine.tree().parent(para).unwrap();
        let second = engine.insert(section, 1, Node::paragraph()).unwrap();
        let field = engine
            .insert(second, 0, Node::field(FieldKind::Ref("intro".into()), "old"))
            .unwrap();
        let cached = |engine: &EditingEngine| match engine.tree().get(field).map(|n| n.data()) {
            Some(NodeData::FieldReference(f)) => f.result.clone(),
            _ => String::new(),
        };

        assert_eq!(engine.refresh_references().unwrap(), 1);
        assert_eq!(cached(&engine), "Intro");
        assert_eq!(engine.undo_label(), Some("Update Fields"));
        assert_eq!(engine.refresh_references().unwrap(), 0);

        engine.undo().unwrap();
        assert_eq!(cached(&engine), "old");
    }

    #[test]
    fn test_new_edit_clears_redo() {
        let (mut engine, _, run) = engine_with("Hello");
        engine.insert_text(run, 5, "!").unwrap();
        engine.undo().unwrap();
        assert!(engine.can_redo());
        engine
            .set_direct_formatting(run, Property::Italic, Some(true.into()))
            .unwrap();
        assert!(!engine.can_redo());
        assert_eq!(engine.undo_label(), Some("Format"));
    }

    #[test]
    fn test_failed_command_leaves_no_trace() {
        let (mut engine, para, run) = engine_with("Hello");
        let before = engine.tree().clone();
        let err = engine.insert(run, 0, Node::paragraph()).unwrap_err();
        assert!(err.is_structural());
        assert_eq!(engine.tree(), &before);
        assert!(!engine.can_undo());
        assert!(engine.remove(engine.tree().root_id()).is_err());
        assert_eq!(engine.tree().children(para), &[run]);
    }

    #[test]
    fn test_removed_node_survives_for_redo() {
        let (mut engine, para, run) = engine_with("Hello");
        engine.remove(run).unwrap();
        assert!(engine.tree().children(para).is_empty());
        assert!(engine.tree().contains(run));
        engine.undo().unwrap();
        assert_eq!(engine.tree().children(para), &[run]);

        engine.clear_history();
        let tail = engine.insert(para, 1, Node::run("x")).unwrap();
        engine.remove(tail).unwrap();
        engine.clear_history();
        assert!(!engine.tree().contains(tail));
    }

    #[test]
    fn test_tracked_deletion_scenario() {
        let (mut engine, para, run) = engine_with("Hello");
        engine.begin_tracking("alice").unwrap();
        let id = engine.remove(run).unwrap().unwrap();
        assert_eq!(engine.overlay().view(engine.tree(), ViewMode::Final).plain_text(), "");
        assert_eq!(
            engine.overlay().view(engine.tree(), ViewMode::Markup).plain_text(),
            "Hello"
        );
        engine.reject_change(id).unwrap();
        assert_eq!(engine.tree().children(para), &[run]);
        assert!(!engine.overlay().has_changes());

        let id = engine.remove(run).unwrap().unwrap();
        let accepted = engine.accept_change(id).unwrap();
        assert_eq!(accepted.status, revisions::ChangeStatus::Accepted);
        assert!(engine.tree().children(para).is_empty());
        assert!(!engine.overlay().has_changes());
    }

    #[test]
    fn test_orphaned_comment_is_kept_and_reported() {
        let (mut engine, para, run) = engine_with("Hello");
        let id = engine
            .add_comment(CommentAnchor::range(TextRange::within(run, 0, 5)), "bob", "check")
            .unwrap();
        engine.remove(run).unwrap();
        let notices = engine.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].comment, id);
        let comment = &engine.list_comments()[0];
        assert!(comment.is_orphaned());
        assert_eq!(comment.anchor, CommentAnchor::Node(para));

        engine.undo().unwrap();
        let comment = &engine.list_comments()[0];
        assert!(!comment.is_orphaned());
        assert_eq!(comment.anchor, CommentAnchor::range(TextRange::within(run, 0, 5)));
    }

    #[test]
    fn test_history_pinned_by_pending_change() {
        let (engine, para, run) = engine_with("Hello");
        let mut engine = engine.with_limits(2, 1);
        engine.begin_tracking("alice").unwrap();
        engine
            .set_direct_formatting(run, Property::Bold, Some(true.into()))
            .unwrap();
        engine.end_tracking();
        for i in 0..3 {
            engine.selection_changed();
            engine.insert(para, 1 + i, Node::run("x")).unwrap();
        }
        // The formatting entry touches a run the overlay still refers to.
        assert_eq!(engine.history().undo_len(), 4);
        engine.accept_all().unwrap();
        assert!(engine.history().undo_len() <= 3);
    }

    #[test]
    fn test_cyclic_style_edit_is_rejected() {
        let mut engine = EditingEngine::new();
        engine
            .put_style(Style::paragraph("A", "A").with_based_on("B"))
            .unwrap();
        engine.put_style(Style::paragraph("B", "B")).unwrap();
        let err = engine.set_based_on(StyleId::new("B"), Some(StyleId::new("A")));
        assert!(matches!(
            err,
            Err(EditError::DocModel(doc_model::DocModelError::CyclicStyle { .. }))
        ));
        assert_eq!(engine.history().undo_len(), 2);
    }
}
