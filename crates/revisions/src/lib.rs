//! Change overlay: tracked changes and comments
//!
//! This crate layers review state over a [`doc_model::DocumentTree`]
//! without owning any content:
//! - Tracked insertions, deletions, format changes and moves
//! - Comment threads anchored to text ranges or whole nodes
//! - Final, markup and original views of the same tree
//! - Accept/reject of single changes or all of them
//!
//! Every mutation is an invertible [`OverlayOp`] so the history engine can
//! undo overlay edits alongside tree edits.

mod change;
mod comment;
mod error;
mod overlay;
mod review;

pub use change::*;
pub use comment::*;
pub use error::*;
pub use overlay::*;
pub use review::*;
