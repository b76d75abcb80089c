//! Error types for session operations

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Edit(#[from] edit_engine::EditError),

    #[error(transparent)]
    Store(#[from] store::StoreError),

    #[error(transparent)]
    Codec(#[from] store::CodecError),

    /// Background work was requested outside a tokio runtime
    #[error("No async runtime available for {0}")]
    NoRuntime(&'static str),

    #[error("Autosave is disabled in the settings")]
    AutosaveDisabled,
}

impl SessionError {
    /// True for edits rejected because they would break the tree shape
    pub fn is_structural(&self) -> bool {
        matches!(self, SessionError::Edit(e) if e.is_structural())
    }

    pub fn is_malformed_input(&self) -> bool {
        match self {
            SessionError::Codec(e) => e.is_malformed(),
            SessionError::Store(store::StoreError::Codec(e)) => e.is_malformed(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
