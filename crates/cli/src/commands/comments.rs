use super::print_report;
use anyhow::{Context, Result};
use clap::Args;
use revisions::Comment;
use session::DocumentSession;
use std::path::PathBuf;
use store::EditorSettings;

#[derive(Args, Debug)]
pub struct CommentsArgs {
    /// Input document
    pub input: PathBuf,

    /// Print the comment threads as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn comments(args: CommentsArgs, settings: EditorSettings) -> Result<()> {
    let (session, report) = DocumentSession::open(&args.input, settings)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    print_report("Import", &report);

    if args.json {
        let json = session
            .overlay()
            .export_comments_json()
            .context("Failed to serialize comments")?;
        println!("{json}");
        return Ok(());
    }

    let comments = session.list_comments();
    if comments.is_empty() {
        println!("No comments");
    }
    for comment in comments {
        print_thread(comment);
    }
    Ok(())
}

fn print_thread(comment: &Comment) {
    let mut flags = Vec::new();
    if comment.resolved {
        flags.push("resolved");
    }
    if comment.is_orphaned() {
        flags.push("orphaned");
    }
    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(", "))
    };
    println!(
        "{} ({}){}: {}",
        comment.author,
        comment.created.format("%Y-%m-%d %H:%M"),
        flags,
        comment.body
    );
    for reply in &comment.replies {
        println!("    {}: {}", reply.author, reply.body);
    }
}
