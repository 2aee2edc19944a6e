//! Error types for the session core.

use agent_core::AgentError;

use super::storage::StorageError;

/// Core error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request is missing or has malformed input.
    #[error("{0}")]
    Validation(String),

    /// A referenced resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// A turn is already running for this session.
    #[error("session {0} is busy with another message")]
    Busy(String),

    /// Session or agent construction failed.
    #[error("initialization failed: {0}")]
    Init(String),

    /// The agent rejected an operation.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Snapshot persistence failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
