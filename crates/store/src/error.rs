//! Error types for codecs and storage operations

use crate::Format;
use thiserror::Error;

/// Errors raised by a format codec.
///
/// Recoverable losses are not errors: they travel as warnings in a
/// [`crate::FidelityReport`] next to a successful result.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The input cannot be parsed. No partial document is returned.
    #[error("Malformed {format} input: {reason}")]
    MalformedInput { format: Format, reason: String },

    /// The format cannot carry the requested operation at all
    #[error("{format} does not support {feature}")]
    UnsupportedFeature { format: Format, feature: String },

    #[error("Document model error: {0}")]
    DocModel(#[from] doc_model::DocModelError),

    #[error("Revision error: {0}")]
    Revision(#[from] revisions::RevisionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl CodecError {
    pub fn malformed(format: Format, reason: impl Into<String>) -> Self {
        CodecError::MalformedInput {
            format,
            reason: reason.into(),
        }
    }

    pub fn unsupported(format: Format, feature: impl Into<String>) -> Self {
        CodecError::UnsupportedFeature {
            format,
            feature: feature.into(),
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, CodecError::MalformedInput { .. })
    }
}

pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Errors raised by persistence and background work
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Unknown file extension: {0}")]
    UnknownExtension(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Background task failed: {0}")]
    Background(String),
}

impl From<tempfile::PersistError> for StoreError {
    fn from(err: tempfile::PersistError) -> Self {
        StoreError::Io(err.error)
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Background(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
