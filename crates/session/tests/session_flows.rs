//! End-to-end session scenarios: review round trips through the codecs,
//! background export and autosave against real directories.

use doc_model::{Node, NodeId, NodeKind, Property, PropertyValue, TextRange};
use revisions::{CommentAnchor, ViewMode};
use session::{DocumentSession, EditorSettings, Format, Notice};
use std::time::Duration;
use tempfile::TempDir;

fn session_with(text: &str) -> (DocumentSession, NodeId, NodeId) {
    let mut session = DocumentSession::new();
    let para = session.tree().nodes_of_kind(NodeKind::Paragraph)[0];
    let run = session.insert(para, 0, Node::run(text)).unwrap();
    (session, para, run)
}

#[test]
fn test_tracked_changes_survive_docx_round_trip() {
    let (mut session, para, run) = session_with("Hello");
    session.set_author("alice");
    session.begin_tracking().unwrap();
    session.insert(para, 1, Node::run(" world")).unwrap();
    session.remove(run).unwrap();
    session.end_tracking();

    let exported = session.export_to(Format::Docx, Some(ViewMode::Markup)).unwrap();

    let mut reopened = DocumentSession::new();
    reopened.import_from(Format::Docx, &exported.bytes).unwrap();
    assert_eq!(reopened.pending_changes().len(), 2);
    assert!(reopened.pending_changes().iter().all(|c| c.author == "alice"));
    assert_eq!(reopened.text(ViewMode::Final), " world");
    assert_eq!(reopened.text(ViewMode::Original), "Hello");

    reopened.accept_all().unwrap();
    assert_eq!(reopened.text(ViewMode::Markup), " world");
}

#[test]
fn test_comments_survive_odt_round_trip() {
    let (mut session, _, run) = session_with("Annotated");
    session.set_author("bob");
    session
        .add_comment(CommentAnchor::range(TextRange::within(run, 0, 9)), "Check this")
        .unwrap();

    let exported = session.export_to(Format::Odt, None).unwrap();
    let mut reopened = DocumentSession::new();
    reopened.import_from(Format::Odt, &exported.bytes).unwrap();

    let comments = reopened.list_comments();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].author, "bob");
    assert_eq!(comments[0].body, "Check this");
}

#[test]
fn test_formatting_survives_rtf_round_trip() {
    let (mut session, _, run) = session_with("Bold text");
    session
        .set_direct_formatting(run, Property::Bold, Some(true.into()))
        .unwrap();
    session
        .set_direct_formatting(run, Property::FontSize, Some(PropertyValue::Points(18.0)))
        .unwrap();

    let exported = session.export_to(Format::Rtf, None).unwrap();
    let mut reopened = DocumentSession::new();
    reopened.import_from(Format::Rtf, &exported.bytes).unwrap();

    let run = reopened.tree().nodes_of_kind(NodeKind::Run)[0];
    let formatting = reopened.resolve(run).unwrap();
    assert!(formatting.bold());
    assert_eq!(formatting.font_size(), 18.0);
}

#[test]
fn test_pdf_export_reports_dropped_comments() {
    let (mut session, _, run) = session_with("Printed");
    session.add_comment(CommentAnchor::node(run), "not printed").unwrap();
    let exported = session.export_to(Format::Pdf, None).unwrap();
    assert!(exported.bytes.starts_with(b"%PDF-1.4"));
    assert!(!exported.report.is_empty());
}

#[test]
fn test_sessions_are_independent() {
    let (mut a, para_a, _) = session_with("A");
    let (b, para_b, _) = session_with("B");
    a.insert(para_a, 1, Node::run("A")).unwrap();
    assert_eq!(a.tree().text_of(para_a), "AA");
    assert_eq!(b.tree().text_of(para_b), "B");
    assert_ne!(a.id(), b.id());
}

#[tokio::test]
async fn test_background_export_keeps_session_editable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("report.html");
    let (mut session, para, _) = session_with("Before");
    let mut notices = session.subscribe();

    let handle = session.export_in_background(&path, None).unwrap();
    session.insert(para, 1, Node::run(" after")).unwrap();
    handle.wait().await.unwrap();

    let html = std::fs::read_to_string(&path).unwrap();
    assert!(html.contains("Before"));
    assert!(!html.contains("after"));
    assert!(matches!(
        notices.recv().await.unwrap(),
        Notice::ExportPublished { format: Format::Html, .. }
    ));
}

#[tokio::test]
async fn test_failed_background_export_leaves_session_intact() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("no-such-dir").join("out.docx");
    let (session, para, _) = session_with("Safe");
    let mut notices = session.subscribe();

    let handle = session.export_in_background(&path, None).unwrap();
    assert!(handle.wait().await.is_err());
    assert!(matches!(
        notices.recv().await.unwrap(),
        Notice::BackgroundFailure { .. }
    ));
    assert_eq!(session.tree().text_of(para), "Safe");
}

#[tokio::test]
async fn test_autosave_writes_recoverable_versions() {
    let dir = TempDir::new().unwrap();
    let mut settings = EditorSettings::default();
    settings.autosave.location = dir.path().to_path_buf();
    settings.autosave.interval_secs = 3600;

    let mut session = DocumentSession::with_settings(settings);
    let para = session.tree().nodes_of_kind(NodeKind::Paragraph)[0];
    session.start_autosave().unwrap();
    session.insert(para, 0, Node::run("Draft")).unwrap();
    session.stop_autosave().await.unwrap();

    let (version, recovered) = session.autosave_store().recover().unwrap().unwrap();
    assert_eq!(version.number, 1);
    assert_eq!(recovered.tree.plain_text(), "Draft");
}

#[tokio::test]
async fn test_autosave_interval_writes_while_editing() {
    let dir = TempDir::new().unwrap();
    let mut settings = EditorSettings::default();
    settings.autosave.location = dir.path().to_path_buf();
    settings.autosave.interval_secs = 1;
    settings.autosave.max_versions = 2;

    let mut session = DocumentSession::with_settings(settings);
    let mut notices = session.subscribe();
    let para = session.tree().nodes_of_kind(NodeKind::Paragraph)[0];
    session.start_autosave().unwrap();

    for word in ["one", "two", "three"] {
        session.insert(para, 0, Node::run(word)).unwrap();
        let notice = tokio::time::timeout(Duration::from_secs(5), notices.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(notice, Notice::AutosaveWritten { .. }));
    }
    session.stop_autosave().await.unwrap();

    let versions = session.autosave_store().list_versions().unwrap();
    assert_eq!(versions.len(), 2);
}
