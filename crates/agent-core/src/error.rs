//! Agent error types.

/// Agent-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// API key not configured.
    #[error("API key not configured for provider {0}")]
    ApiKeyMissing(String),

    /// The model id does not map to a known provider.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// Provider returned an error while streaming.
    #[error("provider error: {0}")]
    Provider(String),

    /// No git repository at or above the given path.
    #[error("no git repository found at {0}")]
    NoRepository(String),

    /// A git command failed.
    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    /// The requested file is not part of the repository.
    #[error("file not found in repository: {0}")]
    FileNotFound(String),

    /// Commit cannot be undone.
    #[error("cannot undo commit: {0}")]
    Undo(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;
