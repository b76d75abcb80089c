//! Session - the public surface of one open document
//!
//! A [`DocumentSession`] owns the editing engine for a document together
//! with its settings and notice channel. It exposes the editing, review,
//! import/export and background persistence commands. Sessions share
//! nothing, so any number of documents can be open at once.

mod error;
mod session;

pub use error::*;
pub use session::DocumentSession;

pub use store::{EditorSettings, Format, Notice};
