//! Document Model - content tree, styles and effective formatting
//!
//! Nodes live in an arena keyed by stable [`NodeId`]s. Every change that
//! should be undoable is expressed as a [`TreeOp`] so the history engine can
//! record and invert it.

mod error;
mod formatting;
mod list;
mod metadata;
mod node;
mod node_id;
mod ops;
mod refs;
pub mod resolve;
pub mod style;
pub mod text;
mod theme;
mod tree;

pub use error::*;
pub use formatting::*;
pub use list::*;
pub use metadata::*;
pub use node::*;
pub use node_id::*;
pub use ops::*;
pub use refs::*;
pub use resolve::{resolve, CacheStats, EffectiveFormatting, PropertySource, ResolvedValue, StyleCache};
pub use style::*;
pub use text::{TextPoint, TextRange};
pub use theme::*;
pub use tree::*;
