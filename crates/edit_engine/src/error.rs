//! Error types for editing operations

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EditError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Document model error: {0}")]
    DocModel(#[from] doc_model::DocModelError),

    #[error("Review error: {0}")]
    Revision(#[from] revisions::RevisionError),

    #[error("Undo stack is empty")]
    UndoStackEmpty,

    #[error("Redo stack is empty")]
    RedoStackEmpty,

    /// Replaying a recorded entry failed; the document was restored to its
    /// state before the replay started.
    #[error("History replay failed: {0}")]
    ReplayFailed(String),
}

impl EditError {
    /// True for errors that reject an illegal tree shape
    pub fn is_structural(&self) -> bool {
        match self {
            EditError::DocModel(e) => e.is_structural(),
            EditError::Revision(revisions::RevisionError::DocModel(e)) => e.is_structural(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, EditError>;
