//! Edit Engine - commands, transactions and undo/redo
//!
//! Commands run inside a transaction over the document tree and its
//! overlay. The ops a command applies become one history entry; undo
//! replays their inverses, redo replays them forward.

mod command;
mod comment_commands;
mod error;
mod executor;
mod review_commands;
mod style_commands;
mod transaction;
mod undo;

pub use command::*;
pub use comment_commands::*;
pub use error::*;
pub use executor::*;
pub use review_commands::*;
pub use style_commands::*;
pub use transaction::EditTransaction;
pub(crate) use transaction::replay;
pub use undo::*;
