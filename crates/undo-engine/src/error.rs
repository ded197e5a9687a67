//! Error types for the undo engine

use thiserror::Error;

/// Error type returned by command implementations from `apply`/`revert`
pub type CommandError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur in the undo engine
#[derive(Debug, Error)]
pub enum UndoError {
    /// `end_macro` was called without a matching `begin_macro`
    #[error("Unbalanced macro: {0}")]
    UnbalancedMacro(String),

    /// The operation is not allowed while a macro is being built
    #[error("Macro in progress: cannot {0} while a macro is open")]
    MacroInProgress(&'static str),

    /// A command failed while applying or reverting
    #[error("Command failed: {0}")]
    Command(#[source] CommandError),

    /// The packet does not carry the expected identifier
    ///
    /// [`Packet::peek_expecting`](crate::Packet::peek_expecting) renders this
    /// into [`Rejection::msg`](crate::Rejection::msg) instead of returning it.
    #[error("Identifier mismatch: expected {expected}, found {found}")]
    IdMismatch {
        /// Identifier the caller asked for
        expected: String,
        /// Identifier found in the packet
        found: String,
    },

    /// The packet schema version cannot be handled
    ///
    /// Rendered into rejection messages like [`UndoError::IdMismatch`].
    #[error("Unsupported version: {0}")]
    VersionUnsupported(u32),

    /// The packet payload could not be decoded
    #[error("Corrupt payload: {0}")]
    CorruptPayload(String),

    /// The subject could not be restored and no default factory was given
    #[error("Missing default factory: subject of packet {0} could not be restored")]
    MissingDefaultFactory(String),

    /// The subject has no projection to store it with
    #[error("Missing store hook: subject cannot be stored without on_store or native()")]
    MissingStoreHook,

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl UndoError {
    /// Create a new UnbalancedMacro error with context
    pub fn unbalanced_macro(msg: impl Into<String>) -> Self {
        Self::UnbalancedMacro(msg.into())
    }

    /// Create a new CorruptPayload error with context
    pub fn corrupt_payload(msg: impl Into<String>) -> Self {
        Self::CorruptPayload(msg.into())
    }

    /// Create a new MissingDefaultFactory error for the given packet id
    pub fn missing_default_factory(id: impl Into<String>) -> Self {
        Self::MissingDefaultFactory(id.into())
    }

    /// Wrap a command failure
    pub fn command(err: impl Into<CommandError>) -> Self {
        Self::Command(err.into())
    }
}
