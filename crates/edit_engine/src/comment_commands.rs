//! Comment commands for creating, editing, and managing comments
//!
//! These commands support:
//! - Adding comments to a text range or a whole node
//! - Editing comment and reply text
//! - Replying to comments (threaded discussions)
//! - Resolving and reopening comments
//! - Tagging
//! - Deleting comments and replies
//!
//! None of them touch the tree, but they are recorded in history like any
//! other edit.

use crate::{Command, EditTransaction, Result};
use revisions::{
    add_comment, delete_comment, Comment, CommentAnchor, CommentId, CommentReply, OverlayEditor,
    ReplyId, RevisionError,
};

fn edit<F>(tx: &mut EditTransaction<'_>, id: CommentId, f: F) -> Result<()>
where
    F: FnOnce(&mut Comment) -> std::result::Result<(), RevisionError>,
{
    let mut failure = None;
    let op = tx.overlay().edit_comment(id, |c| {
        if let Err(e) = f(c) {
            failure = Some(e);
        }
    })?;
    if let Some(e) = failure {
        return Err(e.into());
    }
    tx.apply_overlay(op)?;
    Ok(())
}

fn require_text(body: &str) -> std::result::Result<(), RevisionError> {
    if body.trim().is_empty() {
        Err(RevisionError::EmptyContent)
    } else {
        Ok(())
    }
}

// =============================================================================
// Add Comment Command
// =============================================================================

#[derive(Debug, Clone)]
pub struct AddComment {
    pub anchor: CommentAnchor,
    pub author: String,
    pub body: String,
}

impl AddComment {
    pub fn new(anchor: CommentAnchor, author: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            anchor,
            author: author.into(),
            body: body.into(),
        }
    }
}

impl Command for AddComment {
    type Output = CommentId;

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<CommentId> {
        Ok(add_comment(tx, self.anchor, &self.author, &self.body)?)
    }

    fn display_name(&self) -> &str {
        "Add Comment"
    }
}

// =============================================================================
// Delete Comment Command
// =============================================================================

/// Delete a comment together with its replies
#[derive(Debug, Clone)]
pub struct DeleteComment {
    pub comment_id: CommentId,
}

impl Command for DeleteComment {
    type Output = Comment;

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<Comment> {
        Ok(delete_comment(tx, self.comment_id)?)
    }

    fn display_name(&self) -> &str {
        "Delete Comment"
    }
}

// =============================================================================
// Edit Comment Command
// =============================================================================

#[derive(Debug, Clone)]
pub struct EditComment {
    pub comment_id: CommentId,
    pub body: String,
}

impl Command for EditComment {
    type Output = ();

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<()> {
        let body = self.body.clone();
        edit(tx, self.comment_id, |c| {
            require_text(&body)?;
            c.edit(body);
            Ok(())
        })
    }

    fn display_name(&self) -> &str {
        "Edit Comment"
    }
}

// =============================================================================
// Reply Commands
// =============================================================================

#[derive(Debug, Clone)]
pub struct ReplyToComment {
    pub comment_id: CommentId,
    pub author: String,
    pub body: String,
}

impl ReplyToComment {
    pub fn new(comment_id: CommentId, author: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            comment_id,
            author: author.into(),
            body: body.into(),
        }
    }
}

impl Command for ReplyToComment {
    type Output = ReplyId;

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<ReplyId> {
        if self.author.trim().is_empty() {
            return Err(RevisionError::InvalidAuthor("Author name cannot be empty".to_string()).into());
        }
        let reply = CommentReply::new(self.author.clone(), self.body.clone());
        let id = reply.id;
        let body = self.body.clone();
        edit(tx, self.comment_id, move |c| {
            require_text(&body)?;
            c.add_reply(reply);
            Ok(())
        })?;
        Ok(id)
    }

    fn display_name(&self) -> &str {
        "Reply"
    }
}

#[derive(Debug, Clone)]
pub struct EditReply {
    pub comment_id: CommentId,
    pub reply_id: ReplyId,
    pub body: String,
}

impl Command for EditReply {
    type Output = ();

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<()> {
        let (reply_id, body) = (self.reply_id, self.body.clone());
        edit(tx, self.comment_id, move |c| {
            require_text(&body)?;
            let reply = c.reply_mut(reply_id).ok_or(RevisionError::ReplyNotFound(reply_id))?;
            reply.body = body;
            reply.edited = Some(chrono::Utc::now());
            Ok(())
        })
    }

    fn display_name(&self) -> &str {
        "Edit Reply"
    }
}

#[derive(Debug, Clone)]
pub struct DeleteReply {
    pub comment_id: CommentId,
    pub reply_id: ReplyId,
}

impl Command for DeleteReply {
    type Output = ();

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<()> {
        let reply_id = self.reply_id;
        edit(tx, self.comment_id, move |c| {
            c.remove_reply(reply_id)
                .map(|_| ())
                .ok_or(RevisionError::ReplyNotFound(reply_id))
        })
    }

    fn display_name(&self) -> &str {
        "Delete Reply"
    }
}

// =============================================================================
// Resolve / Reopen Commands
// =============================================================================

/// Mark a comment and its replies resolved
#[derive(Debug, Clone)]
pub struct ResolveComment {
    pub comment_id: CommentId,
    pub resolved_by: String,
}

impl Command for ResolveComment {
    type Output = ();

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<()> {
        let by = self.resolved_by.clone();
        edit(tx, self.comment_id, move |c| {
            if c.resolved {
                return Err(RevisionError::InvalidOperation("comment is already resolved".to_string()));
            }
            c.resolve(by);
            Ok(())
        })
    }

    fn display_name(&self) -> &str {
        "Resolve Comment"
    }
}

#[derive(Debug, Clone)]
pub struct ReopenComment {
    pub comment_id: CommentId,
}

impl Command for ReopenComment {
    type Output = ();

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<()> {
        edit(tx, self.comment_id, |c| {
            if !c.resolved {
                return Err(RevisionError::InvalidOperation("comment is not resolved".to_string()));
            }
            c.reopen();
            Ok(())
        })
    }

    fn display_name(&self) -> &str {
        "Reopen Comment"
    }
}

// =============================================================================
// Tags
// =============================================================================

/// Add (`add == true`) or remove a tag
#[derive(Debug, Clone)]
pub struct TagComment {
    pub comment_id: CommentId,
    pub tag: String,
    pub add: bool,
}

impl Command for TagComment {
    type Output = bool;

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<bool> {
        let tag = self.tag.trim().to_string();
        if tag.is_empty() {
            return Err(RevisionError::EmptyContent.into());
        }
        let present = tx
            .overlay()
            .comment(self.comment_id)
            .ok_or(RevisionError::CommentNotFound(self.comment_id))?
            .tags
            .contains(&tag);
        if present == self.add {
            return Ok(false);
        }
        let add = self.add;
        edit(tx, self.comment_id, move |c| {
            if add {
                c.add_tag(tag);
            } else {
                c.remove_tag(&tag);
            }
            Ok(())
        })?;
        Ok(true)
    }

    fn display_name(&self) -> &str {
        "Tag Comment"
    }
}
