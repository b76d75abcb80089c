//! One open document
//!
//! A [`DocumentSession`] is the single writer for its document. Commands run
//! synchronously on the caller's task; exports and autosave run on
//! snapshots in the background and report back through notices.

use crate::{Result, SessionError};
use doc_model::{
    DocumentMetadata, DocumentStatistics, DocumentTree, EffectiveFormatting, Node, NodeId,
    Property, PropertyValue, Style, StyleId, TextRange, Theme,
};
use edit_engine::EditingEngine;
use revisions::{ChangeId, Comment, CommentAnchor, CommentId, Overlay, ReplyId, TrackedChange, ViewMode};
use std::path::{Path, PathBuf};
use store::background::{notice_channel, spawn_export, ExportHandle, ExportJob};
use store::{
    export_bytes, import_bytes, start_autosave, AutosaveHandle, AutosaveStore, DocumentSnapshot,
    EditorSettings, Exported, FidelityReport, Format, Notice, NoticeReceiver, NoticeSender,
};
use uuid::Uuid;

pub struct DocumentSession {
    id: String,
    engine: EditingEngine,
    settings: EditorSettings,
    /// Author of tracked changes and comments
    author: String,
    path: Option<PathBuf>,
    dirty: bool,
    notices: NoticeSender,
    autosave: Option<AutosaveHandle>,
}

impl DocumentSession {
    /// A blank document with default settings
    pub fn new() -> Self {
        Self::with_settings(EditorSettings::default())
    }

    /// A blank document with explicit settings
    pub fn with_settings(settings: EditorSettings) -> Self {
        Self::from_snapshot(DocumentSnapshot::blank(), settings)
    }

    pub fn from_snapshot(snapshot: DocumentSnapshot, settings: EditorSettings) -> Self {
        let mut engine = EditingEngine::with_document(snapshot.tree, snapshot.overlay)
            .with_limits(settings.history.max_depth, settings.history.coalesce_window);
        let author = settings.review.default_author.clone();
        engine.set_actor(author.clone());
        let (notices, _) = notice_channel();
        Self {
            id: Uuid::new_v4().to_string(),
            engine,
            settings,
            author,
            path: None,
            dirty: false,
            notices,
            autosave: None,
        }
    }

    /// Open a file in the format its extension names
    pub fn open(path: impl AsRef<Path>, settings: EditorSettings) -> Result<(Self, FidelityReport)> {
        let path = path.as_ref();
        let imported = store::load_document_sync(path)?;
        let mut session = Self::from_snapshot(imported.document, settings);
        session.path = Some(path.to_path_buf());
        tracing::info!(path = %path.display(), id = %session.id, "Opened document");
        Ok((session, imported.report))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tree(&self) -> &DocumentTree {
        self.engine.tree()
    }

    pub fn overlay(&self) -> &Overlay {
        self.engine.overlay()
    }

    pub fn engine(&self) -> &EditingEngine {
        &self.engine
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    /// Change who is editing. Ends any run of coalesced edits.
    pub fn set_author(&mut self, author: impl Into<String>) {
        self.author = author.into();
        self.engine.set_actor(self.author.clone());
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn metadata(&self) -> &DocumentMetadata {
        self.engine.tree().metadata()
    }

    pub fn statistics(&self) -> DocumentStatistics {
        self.engine.tree().statistics()
    }

    /// An immutable copy of the document for background work
    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot::new(self.engine.tree().clone(), self.engine.overlay().clone())
    }

    /// Receive notices sent after this call
    pub fn subscribe(&self) -> NoticeReceiver {
        self.notices.subscribe()
    }

    /// Plain text as seen in a view
    pub fn text(&self, view: ViewMode) -> String {
        self.overlay().view(self.tree(), view).plain_text()
    }

    /// Effective formatting of a node
    pub fn resolve(&mut self, node: NodeId) -> Result<EffectiveFormatting> {
        Ok(self.engine.resolve(node)?)
    }

    // =========================================================================
    // Editing
    // =========================================================================

    /// Run an engine command, then publish what it left behind
    fn edit<T>(&mut self, command: impl FnOnce(&mut EditingEngine) -> edit_engine::Result<T>) -> Result<T> {
        let output = command(&mut self.engine)?;
        self.after_edit();
        Ok(output)
    }

    fn after_edit(&mut self) {
        self.dirty = true;
        for notice in self.engine.take_notices() {
            tracing::info!(comment = %notice.comment, node = %notice.reanchored_to, "Comment orphaned");
            let _ = self.notices.send(Notice::Orphaned(notice));
        }
        if let Some(autosave) = &self.autosave {
            autosave.submit(self.snapshot());
        }
    }

    pub fn insert(&mut self, parent: NodeId, index: usize, node: Node) -> Result<NodeId> {
        self.edit(|engine| engine.insert(parent, index, node))
    }

    /// Remove a node. While tracking this records a deletion instead.
    pub fn remove(&mut self, node: NodeId) -> Result<Option<ChangeId>> {
        self.edit(|engine| engine.remove(node))
    }

    pub fn remove_range(&mut self, range: TextRange) -> Result<Option<ChangeId>> {
        self.edit(|engine| engine.remove_range(range))
    }

    pub fn move_node(&mut self, node: NodeId, parent: NodeId, index: usize) -> Result<Option<ChangeId>> {
        self.edit(|engine| engine.move_node(node, parent, index))
    }

    pub fn insert_text(&mut self, run: NodeId, offset: usize, text: &str) -> Result<NodeId> {
        self.edit(|engine| engine.insert_text(run, offset, text))
    }

    pub fn set_direct_formatting(
        &mut self,
        node: NodeId,
        property: Property,
        value: Option<PropertyValue>,
    ) -> Result<()> {
        self.edit(|engine| engine.set_direct_formatting(node, property, value))
    }

    pub fn set_style_ref(&mut self, node: NodeId, style: Option<StyleId>) -> Result<()> {
        self.edit(|engine| engine.set_style_ref(node, style))
    }

    pub fn set_metadata(&mut self, metadata: DocumentMetadata) -> Result<()> {
        self.edit(|engine| engine.set_metadata(metadata))
    }

    /// Add a style or replace the one with the same id
    pub fn put_style(&mut self, style: Style) -> Result<()> {
        self.edit(|engine| engine.put_style(style))
    }

    pub fn remove_style(&mut self, id: StyleId) -> Result<Style> {
        self.edit(|engine| engine.remove_style(id))
    }

    pub fn set_based_on(&mut self, id: StyleId, based_on: Option<StyleId>) -> Result<()> {
        self.edit(|engine| engine.set_based_on(id, based_on))
    }

    pub fn set_theme(&mut self, theme: Theme) -> Result<()> {
        self.edit(|engine| engine.set_theme(theme))
    }

    pub fn refresh_references(&mut self) -> Result<usize> {
        self.edit(|engine| engine.refresh_references())
    }

    /// Mark a selection change; edits before and after never coalesce
    pub fn selection_changed(&mut self) {
        self.engine.selection_changed();
    }

    pub fn undo(&mut self) -> Result<()> {
        self.edit(|engine| engine.undo())
    }

    pub fn redo(&mut self) -> Result<()> {
        self.edit(|engine| engine.redo())
    }

    pub fn can_undo(&self) -> bool {
        self.engine.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.engine.can_redo()
    }

    // =========================================================================
    // Review
    // =========================================================================

    /// Start recording edits as changes by the session author
    pub fn begin_tracking(&mut self) -> Result<()> {
        Ok(self.engine.begin_tracking(self.author.clone())?)
    }

    pub fn end_tracking(&mut self) -> Option<String> {
        self.engine.end_tracking()
    }

    pub fn is_tracking(&self) -> bool {
        self.engine.is_tracking()
    }

    pub fn accept_change(&mut self, change: ChangeId) -> Result<TrackedChange> {
        self.edit(|engine| engine.accept_change(change))
    }

    pub fn reject_change(&mut self, change: ChangeId) -> Result<TrackedChange> {
        self.edit(|engine| engine.reject_change(change))
    }

    pub fn accept_all(&mut self) -> Result<Vec<TrackedChange>> {
        self.edit(|engine| engine.accept_all())
    }

    pub fn reject_all(&mut self) -> Result<Vec<TrackedChange>> {
        self.edit(|engine| engine.reject_all())
    }

    /// Pending changes in document order
    pub fn pending_changes(&self) -> Vec<&TrackedChange> {
        self.overlay().changes_in_document_order(self.tree())
    }

    pub fn add_comment(&mut self, anchor: CommentAnchor, body: &str) -> Result<CommentId> {
        let author = self.author.clone();
        self.edit(|engine| engine.add_comment(anchor, &author, body))
    }

    pub fn reply_to_comment(&mut self, comment: CommentId, body: &str) -> Result<ReplyId> {
        let author = self.author.clone();
        self.edit(|engine| engine.reply_to_comment(comment, &author, body))
    }

    pub fn resolve_comment(&mut self, comment: CommentId) -> Result<()> {
        let author = self.author.clone();
        self.edit(|engine| engine.resolve_comment(comment, &author))
    }

    pub fn reopen_comment(&mut self, comment: CommentId) -> Result<()> {
        self.edit(|engine| engine.reopen_comment(comment))
    }

    pub fn list_comments(&self) -> &[Comment] {
        self.engine.list_comments()
    }

    // =========================================================================
    // Import and export
    // =========================================================================

    /// Replace the document with imported bytes. History is dropped. On
    /// malformed input the current document is left as it was.
    pub fn import_from(&mut self, format: Format, bytes: &[u8]) -> Result<FidelityReport> {
        let imported = import_bytes(format, bytes)?;
        let DocumentSnapshot { tree, overlay } = imported.document;
        self.engine.replace_document(tree, overlay);
        self.dirty = false;
        if let Some(autosave) = &self.autosave {
            autosave.submit(self.snapshot());
        }
        Ok(imported.report)
    }

    /// Encode the document. `None` uses the configured default view.
    pub fn export_to(&self, format: Format, view: Option<ViewMode>) -> Result<Exported> {
        let options = self.settings.export_options(view);
        Ok(export_bytes(format, &self.snapshot(), &options)?)
    }

    /// Write the document to `path` atomically and remember the path
    pub fn save_as(&mut self, path: impl AsRef<Path>, view: Option<ViewMode>) -> Result<FidelityReport> {
        let path = path.as_ref();
        let options = self.settings.export_options(view);
        let report = store::save_document_sync(&self.snapshot(), path, &options)?;
        self.path = Some(path.to_path_buf());
        self.dirty = false;
        Ok(report)
    }

    /// Export a snapshot to `path` on the blocking pool. The session stays
    /// editable; the outcome arrives as a notice and through the handle.
    pub fn export_in_background(&self, path: impl Into<PathBuf>, view: Option<ViewMode>) -> Result<ExportHandle> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(SessionError::NoRuntime("background export"));
        }
        let job = ExportJob::for_path(self.snapshot(), path, self.settings.export_options(view))?;
        Ok(spawn_export(job, self.notices.clone()))
    }

    // =========================================================================
    // Autosave
    // =========================================================================

    /// Start saving numbered versions in the configured location. The
    /// current state is offered right away.
    pub fn start_autosave(&mut self) -> Result<()> {
        if !self.settings.autosave.enabled {
            return Err(SessionError::AutosaveDisabled);
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(SessionError::NoRuntime("autosave"));
        }
        if self.autosave.is_some() {
            return Ok(());
        }
        let store = AutosaveStore::from_settings(self.id.clone(), &self.settings.autosave);
        let handle = start_autosave(store, self.settings.autosave.interval(), self.notices.clone());
        handle.submit(self.snapshot());
        tracing::info!(id = %self.id, location = %self.settings.autosave.location.display(), "Autosave started");
        self.autosave = Some(handle);
        Ok(())
    }

    pub fn is_autosaving(&self) -> bool {
        self.autosave.is_some()
    }

    /// Stop autosave, writing the latest pending state first
    pub async fn stop_autosave(&mut self) -> Result<()> {
        if let Some(handle) = self.autosave.take() {
            handle.stop().await?;
        }
        Ok(())
    }

    /// Autosave files of this session
    pub fn autosave_store(&self) -> AutosaveStore {
        AutosaveStore::from_settings(self.id.clone(), &self.settings.autosave)
    }
}

impl Default for DocumentSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::NodeKind;

    fn session_with(text: &str) -> (DocumentSession, NodeId, NodeId) {
        let mut session = DocumentSession::new();
        let para = session.tree().nodes_of_kind(NodeKind::Paragraph)[0];
        let run = session.insert(para, 0, Node::run(text)).unwrap();
        (session, para, run)
    }

    #[test]
    fn test_cyclic_style_edit_is_rejected() {
        let (mut session, _, _) = session_with("Hello");
        let err = session
            .set_based_on(StyleId::new("Normal"), Some(StyleId::new("Heading1")))
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Edit(edit_engine::EditError::DocModel(
                doc_model::DocModelError::CyclicStyle { .. }
            ))
        ));
        assert_eq!(
            session.tree().styles().get(&StyleId::new("Normal")).and_then(|s| s.based_on.clone()),
            None
        );
    }

    #[test]
    fn test_settings_shape_history() {
        let mut settings = EditorSettings::default();
        settings.history.max_depth = 2;
        settings.review.default_author = "carol".into();
        let mut session = DocumentSession::with_settings(settings);
        let para = session.tree().nodes_of_kind(NodeKind::Paragraph)[0];
        for i in 0..4 {
            session.selection_changed();
            session.insert(para, i, Node::run("x")).unwrap();
        }
        assert_eq!(session.engine().history().undo_len(), 2);
        assert_eq!(session.author(), "carol");
    }

    #[test]
    fn test_edit_marks_dirty_and_undo_restores() {
        let (mut session, para, run) = session_with("Hello");
        assert!(session.is_dirty());
        session
            .set_direct_formatting(run, Property::Bold, Some(true.into()))
            .unwrap();
        assert!(session.resolve(run).unwrap().bold());
        session.undo().unwrap();
        assert!(!session.resolve(run).unwrap().bold());
        session.redo().unwrap();
        assert!(session.resolve(run).unwrap().bold());
        assert_eq!(session.tree().text_of(para), "Hello");
    }

    #[test]
    fn test_structural_violation_is_reported() {
        let (mut session, _, run) = session_with("Hello");
        let err = session.insert(run, 0, Node::paragraph()).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn test_tracking_uses_session_author() {
        let (mut session, _, run) = session_with("Hello");
        session.set_author("dave");
        session.begin_tracking().unwrap();
        let change = session.remove(run).unwrap().unwrap();
        assert_eq!(session.pending_changes()[0].author, "dave");
        assert_eq!(session.text(ViewMode::Final), "");
        assert_eq!(session.text(ViewMode::Original), "Hello");
        session.accept_change(change).unwrap();
        assert!(session.pending_changes().is_empty());
        assert_eq!(session.end_tracking().as_deref(), Some("dave"));
    }

    #[test]
    fn test_orphaned_comment_is_broadcast() {
        let (mut session, para, run) = session_with("Hello");
        let mut notices = session.subscribe();
        let id = session
            .add_comment(CommentAnchor::range(TextRange::within(run, 0, 5)), "look")
            .unwrap();
        session.remove(run).unwrap();
        match notices.try_recv().unwrap() {
            Notice::Orphaned(notice) => {
                assert_eq!(notice.comment, id);
                assert_eq!(notice.reanchored_to, para);
            }
            other => panic!("unexpected notice {other:?}"),
        }
    }

    #[test]
    fn test_comment_thread() {
        let (mut session, _, run) = session_with("Hello");
        let id = session.add_comment(CommentAnchor::node(run), "first").unwrap();
        session.set_author("erin");
        session.reply_to_comment(id, "second").unwrap();
        session.resolve_comment(id).unwrap();

        let comment = &session.list_comments()[0];
        assert_eq!(comment.replies.len(), 1);
        assert_eq!(comment.replies[0].author, "erin");
        assert!(comment.resolved);
        assert_eq!(comment.resolved_by.as_deref(), Some("erin"));
    }

    #[test]
    fn test_malformed_import_keeps_document() {
        let (mut session, para, _) = session_with("Keep me");
        let err = session.import_from(Format::Docx, b"not a zip").unwrap_err();
        assert!(err.is_malformed_input());
        assert_eq!(session.tree().text_of(para), "Keep me");
        assert!(session.can_undo());
    }

    #[test]
    fn test_export_uses_default_view() {
        let (mut session, _, run) = session_with("Gone");
        session.begin_tracking().unwrap();
        session.remove(run).unwrap();

        let exported = session.export_to(Format::Text, None).unwrap();
        assert!(!String::from_utf8(exported.bytes).unwrap().contains("Gone"));
        let exported = session.export_to(Format::Text, Some(ViewMode::Original)).unwrap();
        assert!(String::from_utf8(exported.bytes).unwrap().contains("Gone"));
    }

    #[test]
    fn test_background_work_needs_runtime() {
        let (mut session, _, _) = session_with("x");
        assert!(matches!(
            session.export_in_background("/tmp/out.txt", None),
            Err(SessionError::NoRuntime(_))
        ));
        assert!(matches!(session.start_autosave(), Err(SessionError::NoRuntime(_))));
    }

    #[test]
    fn test_autosave_can_be_disabled() {
        let mut settings = EditorSettings::default();
        settings.autosave.enabled = false;
        let mut session = DocumentSession::with_settings(settings);
        assert!(matches!(session.start_autosave(), Err(SessionError::AutosaveDisabled)));
    }
}
