//! Error types for the document model

use crate::{NodeId, StyleId};
use thiserror::Error;

/// Errors raised by tree and style edits.
///
/// Every mutating operation validates before it touches the tree, so an
/// `Err` always means the tree is exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DocModelError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Structural violation: {0}")]
    StructuralViolation(String),

    #[error("Cyclic style chain: '{style}' cannot be based on '{based_on}'")]
    CyclicStyle { style: StyleId, based_on: StyleId },

    #[error("Style not found: {0}")]
    StyleNotFound(StyleId),

    #[error("Style '{style}' is still used by {count} node(s)")]
    StyleInUse { style: StyleId, count: usize },

    #[error("Invalid offset {offset} in node {node_id} (length {len})")]
    InvalidOffset {
        node_id: NodeId,
        offset: usize,
        len: usize,
    },

    #[error("Invalid bookmark name: {0}")]
    InvalidBookmarkName(String),

    #[error("Duplicate bookmark name: {0}")]
    DuplicateBookmark(String),
}

impl DocModelError {
    /// Shorthand for a [`DocModelError::StructuralViolation`].
    pub fn structural(reason: impl Into<String>) -> Self {
        DocModelError::StructuralViolation(reason.into())
    }

    /// True for errors that reject an illegal tree shape.
    pub fn is_structural(&self) -> bool {
        matches!(self, DocModelError::StructuralViolation(_))
    }
}

pub type Result<T> = std::result::Result<T, DocModelError>;
