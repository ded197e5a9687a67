#![warn(missing_docs)]

//! Undo/Redo engine
//!
//! Command-based history stacks with composable macros, a local context
//! registry that binds commands to their runtime collaborators late, an
//! observer protocol, and versioned pack/restore with schema migration hooks.

pub mod command;
pub mod context;
pub mod error;
pub mod packet;
pub mod stack;
pub mod watcher;

// Re-export public API
pub use command::{Caption, Command, Entry, Macro};
pub use context::{
    ContextFn, ContextValue, LocalContexts, Resources, StringTable, MISSING_CAPTION, RESOURCES_KEY,
};
pub use error::{CommandError, UndoError};
pub use packet::{
    Packet, PacketBuilder, Peeked, Rejection, Restore, SubjectInfo, UnpackCode, UnpackResult,
};
pub use stack::{Stack, StackConfig};
pub use watcher::Watcher;

/// Result type of the undo engine
pub type Result<T> = std::result::Result<T, UndoError>;
