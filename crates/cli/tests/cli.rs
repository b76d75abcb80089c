//! Runs the built `wordtool` binary against documents in a scratch
//! directory.

use doc_model::{DocumentMetadata, Node, NodeKind};
use revisions::{Comment, CommentAnchor, OverlayOp, TrackedChange};
use std::path::Path;
use std::process::{Command, Output};
use store::{DocumentSnapshot, ExportOptions};
use tempfile::TempDir;

fn wordtool(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_wordtool"))
        .args(args)
        .output()
        .unwrap()
}

fn write_sample(path: &Path) {
    let mut snapshot = DocumentSnapshot::blank();
    let para = snapshot.tree.nodes_of_kind(NodeKind::Paragraph)[0];
    let run = snapshot.tree.append(para, Node::run("Quarterly report")).unwrap();
    let added = snapshot.tree.append(para, Node::run(" draft")).unwrap();
    snapshot.tree.set_metadata(DocumentMetadata {
        title: Some("Q3".into()),
        author: Some("alice".into()),
        ..DocumentMetadata::default()
    });
    OverlayOp::AddChange(TrackedChange::insertion("alice", vec![added]))
        .apply(&mut snapshot.overlay)
        .unwrap();
    OverlayOp::AddComment(Comment::new(CommentAnchor::node(run), "bob", "Numbers?"))
        .apply(&mut snapshot.overlay)
        .unwrap();
    store::save_document_sync(&snapshot, path, &ExportOptions::default()).unwrap();
}

#[test]
fn test_convert_writes_output_in_extension_format() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("report.wdj");
    let output = dir.path().join("report.txt");
    write_sample(&input);

    let out = wordtool(&[
        "convert",
        input.to_str().unwrap(),
        output.to_str().unwrap(),
        "--view",
        "original",
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let text = std::fs::read_to_string(&output).unwrap();
    assert!(text.contains("Quarterly report"));
    assert!(!text.contains("draft"));
}

#[test]
fn test_convert_prints_fidelity_warnings() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("report.wdj");
    let output = dir.path().join("report.pdf");
    write_sample(&input);

    let out = wordtool(&["convert", input.to_str().unwrap(), output.to_str().unwrap()]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("warning ["));
    assert!(std::fs::read(&output).unwrap().starts_with(b"%PDF"));
}

#[test]
fn test_unknown_output_extension_fails() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("report.wdj");
    write_sample(&input);

    let out = wordtool(&["convert", input.to_str().unwrap(), "out.doc"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Error:"));
}

#[test]
fn test_info_json() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("report.wdj");
    write_sample(&input);

    let out = wordtool(&["info", input.to_str().unwrap(), "--json"]);
    assert!(out.status.success());
    let info: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(info["metadata"]["title"], "Q3");
    assert_eq!(info["changes"].as_array().unwrap().len(), 1);
    assert_eq!(info["comments"]["total"], 1);
}

#[test]
fn test_comments_text_and_json() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("report.wdj");
    write_sample(&input);

    let out = wordtool(&["comments", input.to_str().unwrap()]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("bob"));

    let out = wordtool(&["comments", input.to_str().unwrap(), "--json"]);
    let comments: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(comments[0]["body"], "Numbers?");
}
