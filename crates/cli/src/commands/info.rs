use super::print_report;
use anyhow::{Context, Result};
use clap::Args;
use doc_model::{DocumentMetadata, DocumentStatistics, DocumentTree};
use revisions::{ChangeStatus, Overlay};
use serde::Serialize;
use session::DocumentSession;
use std::collections::BTreeMap;
use std::path::PathBuf;
use store::EditorSettings;

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Input document
    pub input: PathBuf,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct DocumentInfo {
    pub metadata: DocumentMetadata,
    pub statistics: DocumentStatistics,
    /// Style name and number of nodes using it
    pub styles_in_use: BTreeMap<String, usize>,
    pub changes: Vec<ChangeSummary>,
    pub comments: CommentSummary,
}

#[derive(Debug, Serialize)]
pub struct ChangeSummary {
    pub kind: &'static str,
    pub author: String,
    pub timestamp: String,
}

#[derive(Debug, Default, Serialize)]
pub struct CommentSummary {
    pub total: usize,
    pub active: usize,
    pub resolved: usize,
    pub orphaned: usize,
    pub replies: usize,
}

impl DocumentInfo {
    pub fn collect(tree: &DocumentTree, overlay: &Overlay) -> Self {
        let mut styles_in_use = BTreeMap::new();
        for id in tree.walk() {
            let Some(style) = tree.get(id).and_then(|n| n.style_ref()) else {
                continue;
            };
            let name = tree
                .styles()
                .get(style)
                .map(|s| s.name.clone())
                .unwrap_or_else(|| style.to_string());
            *styles_in_use.entry(name).or_insert(0) += 1;
        }

        let changes = overlay
            .changes_in_document_order(tree)
            .into_iter()
            .filter(|c| c.status == ChangeStatus::Pending)
            .map(|c| ChangeSummary {
                kind: c.kind.display_name(),
                author: c.author.clone(),
                timestamp: c.timestamp.to_rfc3339(),
            })
            .collect();

        let comments = CommentSummary {
            total: overlay.comment_count(),
            active: overlay.active_comments().len(),
            resolved: overlay.resolved_comments().len(),
            orphaned: overlay.orphaned_comments().len(),
            replies: overlay.comments().iter().map(|c| c.replies.len()).sum(),
        };

        Self {
            metadata: tree.metadata().clone(),
            statistics: tree.statistics(),
            styles_in_use,
            changes,
            comments,
        }
    }

    fn print(&self) {
        let meta = &self.metadata;
        let field = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
        println!("Title:      {}", field(&meta.title));
        println!("Author:     {}", field(&meta.author));
        println!("Subject:    {}", field(&meta.subject));
        println!("Keywords:   {}", meta.keywords_joined());
        println!("Created:    {}", meta.created.map_or("-".to_string(), |d| d.to_rfc3339()));
        println!("Modified:   {}", meta.modified.map_or("-".to_string(), |d| d.to_rfc3339()));
        println!();
        println!("Paragraphs: {}", self.statistics.paragraphs);
        println!("Words:      {}", self.statistics.words);
        println!("Characters: {}", self.statistics.characters);
        println!();
        println!("Styles in use:");
        if self.styles_in_use.is_empty() {
            println!("  (none)");
        }
        for (name, count) in &self.styles_in_use {
            println!("  {name}: {count}");
        }
        println!();
        println!("Tracked changes: {}", self.changes.len());
        for change in &self.changes {
            println!("  {} by {} at {}", change.kind, change.author, change.timestamp);
        }
        println!();
        let c = &self.comments;
        println!(
            "Comments: {} ({} active, {} resolved, {} orphaned, {} replies)",
            c.total, c.active, c.resolved, c.orphaned, c.replies
        );
    }
}

pub fn info(args: InfoArgs, settings: EditorSettings) -> Result<()> {
    let (session, report) = DocumentSession::open(&args.input, settings)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    print_report("Import", &report);

    let info = DocumentInfo::collect(session.tree(), session.overlay());
    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        info.print();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{Node, NodeKind, StyleId};
    use revisions::{Comment, CommentAnchor, OverlayOp, TrackedChange};

    #[test]
    fn test_collect_counts_styles_changes_and_comments() {
        let mut tree = DocumentTree::blank();
        let para = tree.nodes_of_kind(NodeKind::Paragraph)[0];
        let run = tree.append(para, Node::run("Hello there")).unwrap();
        tree.set_style_ref(para, Some(StyleId::new("Heading1"))).unwrap();

        let mut overlay = Overlay::new();
        OverlayOp::AddChange(TrackedChange::insertion("alice", vec![run]))
            .apply(&mut overlay)
            .unwrap();
        OverlayOp::AddComment(Comment::new(CommentAnchor::node(para), "bob", "Title?"))
            .apply(&mut overlay)
            .unwrap();

        let info = DocumentInfo::collect(&tree, &overlay);
        assert_eq!(info.statistics.words, 2);
        assert_eq!(info.styles_in_use.len(), 1);
        assert_eq!(info.changes.len(), 1);
        assert_eq!(info.changes[0].author, "alice");
        assert_eq!(info.comments.total, 1);
        assert_eq!(info.comments.active, 1);
    }
}
