//! Error types for the change overlay

use crate::{ChangeId, CommentId, ReplyId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RevisionError {
    #[error("Tracked change not found: {0}")]
    ChangeNotFound(ChangeId),

    #[error("Comment not found: {0}")]
    CommentNotFound(CommentId),

    #[error("Reply not found: {0}")]
    ReplyNotFound(ReplyId),

    #[error("Invalid overlay operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid anchor: {0}")]
    InvalidAnchor(String),

    #[error("Invalid author: {0}")]
    InvalidAuthor(String),

    #[error("Comment text cannot be empty")]
    EmptyContent,

    #[error("Document model error: {0}")]
    DocModel(#[from] doc_model::DocModelError),

    #[error("Overlay serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RevisionError>;
